use qdrant_client::qdrant::Distance;

use crate::{Error, Result};

/// The immutable (layer × category) table. Every pair maps to exactly one
/// collection named `{category}_{layer}`, all sharing one dimensionality and
/// one distance metric for their lifetime.
#[derive(Debug, Clone)]
pub struct Namespaces {
	layers: Vec<String>,
	categories: Vec<String>,
	vector_dim: u32,
	distance: Distance,
}
impl Namespaces {
	pub fn new(
		cfg: &ember_config::NamespacesConfig,
		vector_dim: u32,
		distance: &str,
	) -> Result<Self> {
		if cfg.layers.is_empty() || cfg.categories.is_empty() {
			return Err(Error::InvalidArgument(
				"Namespace layers and categories must be non-empty.".to_string(),
			));
		}

		Ok(Self {
			layers: cfg.layers.clone(),
			categories: cfg.categories.clone(),
			vector_dim,
			distance: parse_distance(distance)?,
		})
	}

	pub fn layers(&self) -> &[String] {
		&self.layers
	}

	pub fn categories(&self) -> &[String] {
		&self.categories
	}

	pub fn vector_dim(&self) -> u32 {
		self.vector_dim
	}

	pub fn distance(&self) -> Distance {
		self.distance
	}

	pub fn len(&self) -> usize {
		self.categories.len() * self.layers.len()
	}

	pub fn is_empty(&self) -> bool {
		self.categories.is_empty() || self.layers.is_empty()
	}

	pub fn contains(&self, category: &str, layer: &str) -> bool {
		self.categories.iter().any(|c| c == category) && self.layers.iter().any(|l| l == layer)
	}

	pub fn collection_name(&self, category: &str, layer: &str) -> Result<String> {
		if !self.contains(category, layer) {
			return Err(Error::UnknownNamespace {
				category: category.to_string(),
				layer: layer.to_string(),
			});
		}

		Ok(format!("{category}_{layer}"))
	}

	/// Iterates every (category, layer, collection) triple, categories outer.
	pub fn iter(&self) -> impl Iterator<Item = (&str, &str, String)> {
		self.categories.iter().flat_map(move |category| {
			self.layers.iter().map(move |layer| {
				(category.as_str(), layer.as_str(), format!("{category}_{layer}"))
			})
		})
	}
}

pub fn parse_distance(raw: &str) -> Result<Distance> {
	match raw {
		"cosine" => Ok(Distance::Cosine),
		"dot" => Ok(Distance::Dot),
		"euclid" => Ok(Distance::Euclid),
		other => Err(Error::InvalidArgument(format!("Unknown distance metric {other:?}."))),
	}
}
