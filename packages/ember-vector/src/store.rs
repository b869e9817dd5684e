use std::{collections::HashMap, sync::Arc};

use qdrant_client::{
	Qdrant,
	client::Payload,
	qdrant::{
		CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter, PointId, PointStruct,
		PointsIdsList, Query, QueryPointsBuilder, ScoredPoint, SetPayloadPointsBuilder,
		UpsertPointsBuilder, Value, VectorParamsBuilder, VectorsOutput,
		point_id::PointIdOptions, vectors_output::VectorsOptions,
	},
};
use serde_json::Value as JsonValue;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::{Error, Result, namespace::Namespaces};

#[derive(Debug, Clone)]
pub struct NewPoint {
	pub id: Option<String>,
	pub vector: Vec<f32>,
	pub text: String,
	pub metadata: JsonValue,
	pub model: String,
}

#[derive(Debug, Clone)]
pub struct ScoredHit {
	pub id: String,
	pub score: f32,
	pub payload: HashMap<String, Value>,
	pub vector: Option<Vec<f32>>,
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
	pub limit: u64,
	pub score_threshold: f32,
	pub filter: Option<Filter>,
	pub with_vector: bool,
}
impl Default for SearchOptions {
	fn default() -> Self {
		Self { limit: 10, score_threshold: 0.7, filter: None, with_vector: false }
	}
}

#[derive(Debug)]
pub struct NamespaceHits {
	pub category: String,
	pub layer: String,
	pub hits: Vec<ScoredHit>,
	pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BestMatch {
	pub id: String,
	pub score: f32,
	pub category: String,
	pub layer: String,
}

#[derive(Debug, Clone)]
pub struct CrossSummary {
	pub total_matches: usize,
	pub best_match: Option<BestMatch>,
	pub avg_score: f32,
}

#[derive(Debug)]
pub struct CrossNamespaceSearch {
	pub results: Vec<NamespaceHits>,
	pub summary: CrossSummary,
}

#[derive(Debug, Clone)]
pub struct NamespaceStats {
	pub collection: String,
	pub points_count: u64,
}

#[derive(Debug, Clone)]
pub struct NamespaceStatsEntry {
	pub category: String,
	pub layer: String,
	pub collection: String,
	pub points_count: Option<u64>,
	pub error: Option<String>,
}

#[derive(Clone)]
pub struct VectorStore {
	client: Arc<Qdrant>,
	namespaces: Arc<Namespaces>,
}
impl VectorStore {
	pub async fn connect(cfg: &ember_config::Qdrant, namespaces: Namespaces) -> Result<Self> {
		let client =
			Qdrant::from_url(&cfg.url).build().map_err(|err| Error::Connection(Box::new(err)))?;
		let store = Self { client: Arc::new(client), namespaces: Arc::new(namespaces) };

		store.client.health_check().await.map_err(|err| Error::Connection(Box::new(err)))?;

		Ok(store)
	}

	pub fn namespaces(&self) -> &Namespaces {
		&self.namespaces
	}

	/// Idempotent: an existing collection is left untouched, its configuration
	/// is not re-checked against the arguments.
	pub async fn ensure_collection(
		&self,
		name: &str,
		vector_dim: u32,
		distance: Distance,
	) -> Result<()> {
		if self.client.collection_exists(name).await? {
			return Ok(());
		}

		self.client
			.create_collection(
				CreateCollectionBuilder::new(name)
					.vectors_config(VectorParamsBuilder::new(vector_dim.into(), distance)),
			)
			.await?;

		Ok(())
	}

	pub async fn ensure_collections(&self) -> Result<()> {
		let vector_dim = self.namespaces.vector_dim();
		let distance = self.namespaces.distance();
		let collections: Vec<String> =
			self.namespaces.iter().map(|(_, _, collection)| collection).collect();

		for collection in collections {
			self.ensure_collection(&collection, vector_dim, distance).await?;
		}

		Ok(())
	}

	/// Upserts the given points into the namespace's collection. Points without
	/// an id receive a generated one; the stored payload is augmented with
	/// text, metadata, timestamp, category, layer, model, and dimensions.
	pub async fn upsert_points(
		&self,
		category: &str,
		layer: &str,
		points: Vec<NewPoint>,
	) -> Result<Vec<String>> {
		let collection = self.namespaces.collection_name(category, layer)?;
		let expected = self.namespaces.vector_dim() as usize;
		let now = format_timestamp(OffsetDateTime::now_utc())?;
		let mut structs = Vec::with_capacity(points.len());
		let mut ids = Vec::with_capacity(points.len());

		for point in points {
			if point.vector.len() != expected {
				return Err(Error::DimensionMismatch { expected, got: point.vector.len() });
			}

			let id = point.id.unwrap_or_else(|| Uuid::new_v4().to_string());
			let dimensions = point.vector.len();
			let mut payload_map = HashMap::new();

			payload_map.insert("text".to_string(), Value::from(point.text));
			payload_map.insert("metadata".to_string(), Value::from(point.metadata));
			payload_map.insert("timestamp".to_string(), Value::from(now.clone()));
			payload_map.insert("category".to_string(), Value::from(category.to_string()));
			payload_map.insert("layer".to_string(), Value::from(layer.to_string()));
			payload_map.insert("model".to_string(), Value::from(point.model));
			payload_map.insert("dimensions".to_string(), Value::from(dimensions as i64));

			structs.push(PointStruct::new(
				id.clone(),
				point.vector,
				Payload::from(payload_map),
			));
			ids.push(id);
		}

		self.client
			.upsert_points(UpsertPointsBuilder::new(collection, structs).wait(true))
			.await?;

		Ok(ids)
	}

	pub async fn similarity_search(
		&self,
		category: &str,
		layer: &str,
		query_vector: &[f32],
		options: &SearchOptions,
	) -> Result<Vec<ScoredHit>> {
		let collection = self.namespaces.collection_name(category, layer)?;
		let mut search = QueryPointsBuilder::new(collection)
			.query(Query::new_nearest(query_vector.to_vec()))
			.limit(options.limit)
			.score_threshold(options.score_threshold)
			.with_payload(true);

		if options.with_vector {
			search = search.with_vectors(true);
		}
		if let Some(filter) = options.filter.clone() {
			search = search.filter(filter);
		}

		let response = self.client.query(search).await?;

		Ok(response.result.into_iter().map(to_hit).collect())
	}

	/// Fans the search out concurrently across every (category × layer) pair
	/// requested; individual namespace failures are recorded in place without
	/// aborting the rest.
	pub async fn cross_namespace_search(
		&self,
		query_vector: &[f32],
		categories: Option<&[String]>,
		options: &SearchOptions,
	) -> Result<CrossNamespaceSearch> {
		let categories: Vec<String> = match categories {
			Some(requested) if !requested.is_empty() => {
				for category in requested {
					if !self.namespaces.categories().contains(category) {
						return Err(Error::InvalidArgument(format!(
							"Unknown category {category:?}."
						)));
					}
				}

				requested.to_vec()
			},
			_ => self.namespaces.categories().to_vec(),
		};
		let targets: Vec<(String, String)> = categories
			.iter()
			.flat_map(|category| {
				self.namespaces.layers().iter().map(move |layer| (category.clone(), layer.clone()))
			})
			.collect();
		let mut set = JoinSet::new();

		for (idx, (category, layer)) in targets.iter().cloned().enumerate() {
			let store = self.clone();
			let vector = query_vector.to_vec();
			let options = options.clone();

			set.spawn(async move {
				let result = store.similarity_search(&category, &layer, &vector, &options).await;

				(idx, category, layer, result)
			});
		}

		let mut slots: Vec<Option<NamespaceHits>> = Vec::new();

		slots.resize_with(targets.len(), || None);

		while let Some(joined) = set.join_next().await {
			let (idx, category, layer, result) = joined.map_err(|err| {
				Error::InvalidArgument(format!("Namespace search task failed: {err}."))
			})?;

			slots[idx] = Some(match result {
				Ok(hits) => NamespaceHits { category, layer, hits, error: None },
				Err(err) =>
					NamespaceHits { category, layer, hits: Vec::new(), error: Some(err.to_string()) },
			});
		}

		let results: Vec<NamespaceHits> = slots.into_iter().flatten().collect();
		let summary = summarize(&results);

		Ok(CrossNamespaceSearch { results, summary })
	}

	pub async fn delete_points(&self, category: &str, layer: &str, ids: &[String]) -> Result<()> {
		let collection = self.namespaces.collection_name(category, layer)?;
		let ids: Vec<PointId> = ids.iter().map(|id| PointId::from(id.clone())).collect();

		self.client
			.delete_points(
				DeletePointsBuilder::new(collection).points(PointsIdsList { ids }).wait(true),
			)
			.await?;

		Ok(())
	}

	/// Merges the patch into the point's payload; untouched keys survive.
	pub async fn update_payload(
		&self,
		category: &str,
		layer: &str,
		id: &str,
		patch: serde_json::Map<String, JsonValue>,
	) -> Result<()> {
		let collection = self.namespaces.collection_name(category, layer)?;
		let mut payload_map = HashMap::new();

		for (key, value) in patch {
			payload_map.insert(key, Value::from(value));
		}

		self.client
			.set_payload(
				SetPayloadPointsBuilder::new(collection, Payload::from(payload_map))
					.points_selector(PointsIdsList { ids: vec![PointId::from(id.to_string())] })
					.wait(true),
			)
			.await?;

		Ok(())
	}

	pub async fn stats(&self, category: &str, layer: &str) -> Result<NamespaceStats> {
		let collection = self.namespaces.collection_name(category, layer)?;
		let info = self.client.collection_info(&collection).await?;
		let points_count = info.result.and_then(|result| result.points_count).unwrap_or(0);

		Ok(NamespaceStats { collection, points_count })
	}

	/// Aggregates stats across the whole namespace table; a failing namespace
	/// contributes its error instead of aborting the sweep.
	pub async fn all_stats(&self) -> Vec<NamespaceStatsEntry> {
		let targets: Vec<(String, String, String)> = self
			.namespaces
			.iter()
			.map(|(category, layer, collection)| {
				(category.to_string(), layer.to_string(), collection)
			})
			.collect();
		let mut entries = Vec::with_capacity(targets.len());

		for (category, layer, collection) in targets {
			match self.stats(&category, &layer).await {
				Ok(stats) => entries.push(NamespaceStatsEntry {
					category,
					layer,
					collection,
					points_count: Some(stats.points_count),
					error: None,
				}),
				Err(err) => entries.push(NamespaceStatsEntry {
					category,
					layer,
					collection,
					points_count: None,
					error: Some(err.to_string()),
				}),
			}
		}

		entries
	}
}

/// Aggregates the fan-out: total matches, the single best hit anywhere, and
/// the mean of per-namespace top-1 scores.
pub fn summarize(results: &[NamespaceHits]) -> CrossSummary {
	let mut total_matches = 0;
	let mut best_match: Option<BestMatch> = None;
	let mut top_scores = Vec::new();

	for entry in results {
		total_matches += entry.hits.len();

		if let Some(first) = entry.hits.first() {
			top_scores.push(first.score);
		}

		for hit in &entry.hits {
			if best_match.as_ref().map(|best| hit.score > best.score).unwrap_or(true) {
				best_match = Some(BestMatch {
					id: hit.id.clone(),
					score: hit.score,
					category: entry.category.clone(),
					layer: entry.layer.clone(),
				});
			}
		}
	}

	let avg_score = if top_scores.is_empty() {
		0.0
	} else {
		top_scores.iter().sum::<f32>() / top_scores.len() as f32
	};

	CrossSummary { total_matches, best_match, avg_score }
}

fn to_hit(point: ScoredPoint) -> ScoredHit {
	ScoredHit {
		id: point_id_string(point.id),
		score: point.score,
		vector: vector_data(point.vectors),
		payload: point.payload,
	}
}

fn point_id_string(id: Option<PointId>) -> String {
	match id.and_then(|id| id.point_id_options) {
		Some(PointIdOptions::Uuid(value)) => value,
		Some(PointIdOptions::Num(value)) => value.to_string(),
		None => String::new(),
	}
}

fn vector_data(vectors: Option<VectorsOutput>) -> Option<Vec<f32>> {
	match vectors?.vectors_options? {
		VectorsOptions::Vector(vector) => Some(vector.data),
		VectorsOptions::Vectors(_) => None,
	}
}

fn format_timestamp(ts: OffsetDateTime) -> Result<String> {
	ts.format(&Rfc3339)
		.map_err(|_| Error::InvalidArgument("Failed to format timestamp.".to_string()))
}
