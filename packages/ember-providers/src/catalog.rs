use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// Identifier fragments that mark a model as embedding-capable.
const EMBEDDING_MARKERS: &[&str] =
	&["embed", "bge-", "e5-", "gte-", "minilm", "mxbai", "nomic-"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
	Primary,
	Secondary,
	Tertiary,
}
impl Tier {
	pub const ALL: [Self; 3] = [Self::Primary, Self::Secondary, Self::Tertiary];

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Primary => "primary",
			Self::Secondary => "secondary",
			Self::Tertiary => "tertiary",
		}
	}

	pub fn parse(raw: &str) -> Option<Self> {
		match raw {
			"primary" => Some(Self::Primary),
			"secondary" => Some(Self::Secondary),
			"tertiary" => Some(Self::Tertiary),
			_ => None,
		}
	}

	/// The ordered fallback chain starting at this tier. The cascade is this
	/// slice walked front to back; no recursion, no wrap-around.
	pub fn cascade_order(self) -> &'static [Self] {
		match self {
			Self::Primary => &[Self::Primary, Self::Secondary, Self::Tertiary],
			Self::Secondary => &[Self::Secondary, Self::Tertiary],
			Self::Tertiary => &[Self::Tertiary],
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDescriptor {
	pub id: String,
	pub score: i32,
}

/// A derived ranking snapshot; recomputed on every catalog refresh, never
/// persisted.
#[derive(Debug, Clone, Default)]
pub struct Selection {
	pub primary: Option<ModelDescriptor>,
	pub secondary: Option<ModelDescriptor>,
	pub tertiary: Option<ModelDescriptor>,
}
impl Selection {
	pub fn from_ids<I, S>(ids: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		let mut candidates: Vec<ModelDescriptor> = ids
			.into_iter()
			.filter(|id| is_embedding_model(id.as_ref()))
			.map(|id| ModelDescriptor { score: score_model(id.as_ref()), id: id.as_ref().to_string() })
			.collect();

		// Ties break on the identifier so refreshes are stable.
		candidates.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.id.cmp(&b.id)));

		let mut ranked = candidates.into_iter();

		Self { primary: ranked.next(), secondary: ranked.next(), tertiary: ranked.next() }
	}

	pub fn model_for(&self, tier: Tier) -> Option<&ModelDescriptor> {
		match tier {
			Tier::Primary => self.primary.as_ref(),
			Tier::Secondary => self.secondary.as_ref(),
			Tier::Tertiary => self.tertiary.as_ref(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.primary.is_none()
	}
}

pub fn is_embedding_model(id: &str) -> bool {
	let id = id.to_ascii_lowercase();

	EMBEDDING_MARKERS.iter().any(|marker| id.contains(marker))
}

/// Deterministic weighted heuristic over the identifier string; higher wins.
pub fn score_model(id: &str) -> i32 {
	let id = id.to_ascii_lowercase();
	let mut score = 0;

	if id.contains("large") || id.contains("-xl") {
		score += 30;
	} else if id.contains("base") {
		score += 15;
	} else if id.contains("small") || id.contains("mini") {
		score += 5;
	}

	for (family, bonus) in [
		("text-embedding-3", 25),
		("bge-", 25),
		("gte-", 20),
		("e5-", 20),
		("mxbai", 15),
		("nomic-", 15),
	] {
		if id.contains(family) {
			score += bonus;
		}
	}

	if id.contains("v2") || id.contains("v3") || id.contains("v1.5") {
		score += 5;
	}
	if id.contains("instruct") {
		score += 5;
	}

	score
}

/// Parses a models-list response of the shape `{ "data": [{ "id": ... }] }`.
pub fn parse_models_response(json: Value) -> Result<Vec<String>> {
	let data = json.get("data").and_then(|value| value.as_array()).ok_or_else(|| {
		Error::InvalidResponse { message: "Models response is missing data array.".to_string() }
	})?;
	let mut ids = Vec::with_capacity(data.len());

	for item in data {
		let id = item.get("id").and_then(|value| value.as_str()).ok_or_else(|| {
			Error::InvalidResponse { message: "Model entry is missing an id.".to_string() }
		})?;

		ids.push(id.to_string());
	}

	Ok(ids)
}
