pub mod feedback;
pub mod metrics;

mod error;

pub use error::{Error, Result};
pub use feedback::{FeedbackAnalyzer, FeedbackSignal, TextProfileAnalyzer, default_analyzers};
pub use metrics::PipelineMetrics;

use std::{
	future::Future,
	pin::Pin,
	sync::{Arc, Mutex},
	time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::{sync::watch, time as tokio_time};
use uuid::Uuid;

use ember_providers::{Embedding, ModelSelector, Tier};
use ember_queue::{NewTask, Priority, Task, TaskQueue};
use ember_vector::{BestMatch, CrossNamespaceSearch, Namespaces, NewPoint, SearchOptions, VectorStore};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub const EMBED_TASK_KIND: &str = "embed";

const FEEDBACK_CATEGORY: &str = "confidence";
const CLEANUP_INTERVAL_SECONDS: u64 = 900;

/// The embedding seam of the pipeline; [`ModelSelector`] is the production
/// implementation, tests substitute stubs.
pub trait EmbeddingBackend
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		text: &'a str,
		tier: Tier,
	) -> BoxFuture<'a, ember_providers::Result<Embedding>>;
}
impl EmbeddingBackend for ModelSelector {
	fn embed<'a>(
		&'a self,
		text: &'a str,
		tier: Tier,
	) -> BoxFuture<'a, ember_providers::Result<Embedding>> {
		Box::pin(ModelSelector::embed(self, text, tier))
	}
}

/// The queue payload of one embedding task. The queue itself treats this as
/// opaque JSON; the pipeline validates the shape before enqueueing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedPayload {
	pub text: String,
	pub category: String,
	pub layer: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub model_tier: Option<String>,
	#[serde(default)]
	pub metadata: Value,
}

#[derive(Debug, Clone)]
pub struct SubmitTask {
	pub payload: EmbedPayload,
	pub priority: Priority,
}

#[derive(Debug)]
pub struct TaskOutcome {
	pub payload: EmbedPayload,
	pub embedding: Embedding,
	pub point_ids: Vec<String>,
	pub result: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryMatches {
	pub category: String,
	pub matches: usize,
}

#[derive(Debug, Serialize)]
pub struct FeedbackReport {
	pub query: String,
	pub confidence: f32,
	pub total_matches: usize,
	#[serde(skip)]
	pub best_match: Option<BestMatch>,
	pub category_matches: Vec<CategoryMatches>,
	pub suggestions: Vec<String>,
}

/// One logical consumer over the shared queue and vector store. Several
/// pipeline instances may run against the same backends; the queue's atomic
/// claim keeps them from ever sharing a task.
pub struct Pipeline {
	cfg: ember_config::Config,
	queue: TaskQueue,
	vectors: VectorStore,
	embedder: Arc<dyn EmbeddingBackend>,
	analyzers: Vec<Box<dyn FeedbackAnalyzer>>,
	metrics: Mutex<PipelineMetrics>,
}
impl Pipeline {
	pub fn new(
		cfg: ember_config::Config,
		queue: TaskQueue,
		vectors: VectorStore,
		embedder: Arc<dyn EmbeddingBackend>,
	) -> Self {
		Self {
			cfg,
			queue,
			vectors,
			embedder,
			analyzers: Vec::new(),
			metrics: Mutex::new(PipelineMetrics::default()),
		}
	}

	pub fn register_analyzer(&mut self, analyzer: Box<dyn FeedbackAnalyzer>) {
		self.analyzers.push(analyzer);
	}

	pub fn queue(&self) -> &TaskQueue {
		&self.queue
	}

	pub fn vectors(&self) -> &VectorStore {
		&self.vectors
	}

	pub fn metrics(&self) -> PipelineMetrics {
		*self.metrics.lock().unwrap_or_else(|err| err.into_inner())
	}

	/// Validates the payload shape and delegates to the queue.
	pub async fn submit(&self, task: SubmitTask) -> Result<Uuid> {
		validate_payload(self.vectors.namespaces(), &task.payload)?;

		self.enqueue(task).await
	}

	/// Validates every payload before the first enqueue, so one malformed
	/// entry rejects the whole batch without side effects.
	pub async fn submit_batch(&self, tasks: Vec<SubmitTask>) -> Result<Vec<Uuid>> {
		for task in &tasks {
			validate_payload(self.vectors.namespaces(), &task.payload)?;
		}

		let mut ids = Vec::with_capacity(tasks.len());

		for task in tasks {
			ids.push(self.enqueue(task).await?);
		}

		Ok(ids)
	}

	/// The consume loop: claim → embed → store → acknowledge, until the
	/// shutdown flag flips. The flag is only checked between tasks, so at most
	/// one in-flight task finishes after a stop request.
	pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
		let watch_timeout = Duration::from_secs(self.cfg.queue.watch_timeout_seconds);
		let retry_pause = Duration::from_secs(self.cfg.queue.retry_pause_seconds);
		let cleanup_interval = Duration::from_secs(CLEANUP_INTERVAL_SECONDS);
		let mut last_cleanup = Instant::now();

		tracing::info!("Pipeline consumer started.");

		while !*shutdown.borrow() {
			match self.queue.watch_blocking(watch_timeout).await {
				Ok(Some(task)) => self.handle_task(task).await,
				Ok(None) => {},
				Err(err) => {
					tracing::error!(error = %err, "Queue watch failed; backing off.");
					tokio_time::sleep(retry_pause).await;
				},
			}

			if last_cleanup.elapsed() >= cleanup_interval {
				match self.queue.cleanup(self.cfg.queue.archive_retention_days).await {
					Ok(removed) => {
						if removed > 0 {
							tracing::info!(count = removed, "Purged archived tasks.");
						}

						last_cleanup = Instant::now();
					},
					Err(err) => {
						tracing::error!(error = %err, "Task archive cleanup failed.");
					},
				}
			}
		}

		tracing::info!("Pipeline consumer stopped.");

		Ok(())
	}

	/// Claims and handles at most one task. Returns whether one was handled.
	pub async fn process_next(&self, timeout: Duration) -> Result<bool> {
		match self.queue.watch_blocking(timeout).await? {
			Some(task) => {
				self.handle_task(task).await;

				Ok(true)
			},
			None => Ok(false),
		}
	}

	/// Embeds the query and aggregates similar prior work across namespaces
	/// into a shallow recommendation.
	pub async fn feedback_analysis(
		&self,
		query_text: &str,
		categories: Option<&[String]>,
	) -> Result<FeedbackReport> {
		let embedding = self.embedder.embed(query_text, Tier::Primary).await?;
		let searched = self
			.vectors
			.cross_namespace_search(&embedding.vector, categories, &SearchOptions::default())
			.await?;

		Ok(build_report(query_text, &searched))
	}

	async fn enqueue(&self, task: SubmitTask) -> Result<Uuid> {
		let payload = serde_json::to_value(&task.payload)?;
		let task_id = self
			.queue
			.enqueue(NewTask {
				kind: EMBED_TASK_KIND.to_string(),
				payload,
				priority: task.priority,
				max_retries: self.cfg.queue.default_max_retries,
			})
			.await?;

		Ok(task_id)
	}

	async fn handle_task(&self, task: Task) {
		let started = Instant::now();
		let task_id = task.task_id;

		match self.process_task(&task).await {
			Ok(outcome) => {
				self.run_analyzers(&task, &outcome).await;

				match self.queue.complete(task_id, outcome.result.clone()).await {
					Ok(_) => {
						self.metrics
							.lock()
							.unwrap_or_else(|err| err.into_inner())
							.record_success(started.elapsed());
						tracing::info!(task_id = %task_id, model = %outcome.embedding.model, "Task completed.");
					},
					Err(err) => {
						self.metrics.lock().unwrap_or_else(|err| err.into_inner()).record_failure();
						tracing::error!(error = %err, task_id = %task_id, "Failed to acknowledge completed task.");
					},
				}
			},
			Err(err) => {
				self.metrics.lock().unwrap_or_else(|err| err.into_inner()).record_failure();
				tracing::warn!(error = %err, task_id = %task_id, "Task failed; applying retry policy.");

				if let Err(fail_err) = self.queue.fail(task_id, &err.to_string(), true).await {
					tracing::error!(error = %fail_err, task_id = %task_id, "Failed to record task failure.");
				}
			},
		}
	}

	async fn process_task(&self, task: &Task) -> Result<TaskOutcome> {
		let payload: EmbedPayload = serde_json::from_value(task.payload.clone())?;
		let tier = match payload.model_tier.as_deref() {
			Some(raw) => Tier::parse(raw).ok_or_else(|| Error::InvalidRequest {
				message: format!("Unknown model tier {raw:?}."),
			})?,
			None => Tier::Primary,
		};
		let embedding = self.embedder.embed(&payload.text, tier).await?;
		// A point id derived from the task id keeps retries from piling up
		// duplicate points.
		let point_id = Uuid::new_v5(&Uuid::NAMESPACE_OID, task.task_id.as_bytes()).to_string();
		let point = NewPoint {
			id: Some(point_id),
			vector: embedding.vector.clone(),
			text: payload.text.clone(),
			metadata: payload.metadata.clone(),
			model: embedding.model.clone(),
		};
		let point_ids =
			self.vectors.upsert_points(&payload.category, &payload.layer, vec![point]).await?;
		let result = serde_json::json!({
			"point_ids": point_ids,
			"model": embedding.model,
			"dimensions": embedding.dimensions,
			"usage": embedding.usage,
		});

		Ok(TaskOutcome { payload, embedding, point_ids, result })
	}

	async fn run_analyzers(&self, task: &Task, outcome: &TaskOutcome) {
		for analyzer in &self.analyzers {
			match analyzer.analyze(task, outcome) {
				Ok(Some(signal)) =>
					if let Err(err) = self.persist_signal(outcome, &signal).await {
						tracing::warn!(
							error = %err,
							analyzer = analyzer.name(),
							"Failed to persist feedback signal."
						);
					},
				Ok(None) => {},
				Err(err) => {
					tracing::warn!(error = %err, analyzer = analyzer.name(), "Feedback analyzer failed.");
				},
			}
		}
	}

	async fn persist_signal(&self, outcome: &TaskOutcome, signal: &FeedbackSignal) -> Result<()> {
		if !self.vectors.namespaces().contains(FEEDBACK_CATEGORY, &outcome.payload.layer) {
			tracing::debug!("No confidence namespace configured; dropping feedback signal.");

			return Ok(());
		}

		let point = NewPoint {
			id: None,
			vector: outcome.embedding.vector.clone(),
			text: signal.pattern.clone(),
			metadata: serde_json::to_value(signal)?,
			model: outcome.embedding.model.clone(),
		};

		self.vectors
			.upsert_points(FEEDBACK_CATEGORY, &outcome.payload.layer, vec![point])
			.await?;

		Ok(())
	}
}

pub fn validate_payload(namespaces: &Namespaces, payload: &EmbedPayload) -> Result<()> {
	if payload.text.trim().is_empty() {
		return Err(Error::InvalidRequest { message: "Task text must be non-empty.".to_string() });
	}
	if !namespaces.contains(&payload.category, &payload.layer) {
		return Err(Error::InvalidRequest {
			message: format!(
				"Unknown namespace {}/{}.",
				payload.category, payload.layer
			),
		});
	}
	if let Some(tier) = payload.model_tier.as_deref()
		&& Tier::parse(tier).is_none()
	{
		return Err(Error::InvalidRequest {
			message: format!("Unknown model tier {tier:?}."),
		});
	}

	Ok(())
}

/// Derives the recommendation from the fan-out summary. Intentionally shallow;
/// the tested contract is the aggregation, not the prose.
pub fn build_report(query: &str, searched: &CrossNamespaceSearch) -> FeedbackReport {
	let mut category_matches: Vec<CategoryMatches> = Vec::new();

	for entry in &searched.results {
		if entry.hits.is_empty() {
			continue;
		}

		match category_matches.iter_mut().find(|existing| existing.category == entry.category) {
			Some(existing) => existing.matches += entry.hits.len(),
			None => category_matches.push(CategoryMatches {
				category: entry.category.clone(),
				matches: entry.hits.len(),
			}),
		}
	}

	category_matches.sort_by(|a, b| b.matches.cmp(&a.matches).then_with(|| a.category.cmp(&b.category)));

	let summary = &searched.summary;
	let mut suggestions = Vec::new();

	if summary.total_matches == 0 {
		suggestions.push("No similar prior work found; treat this as novel ground.".to_string());
	} else {
		if summary.avg_score >= 0.85 {
			suggestions
				.push("Strong precedent exists; review the top match before new work.".to_string());
		} else if summary.avg_score < 0.75 {
			suggestions.push(
				"Matches are weak; consider enriching task metadata before relying on them."
					.to_string(),
			);
		}
		if let Some(best) = &summary.best_match {
			suggestions
				.push(format!("Closest match lives in {}/{}.", best.category, best.layer));
		}
	}

	FeedbackReport {
		query: query.to_string(),
		confidence: summary.avg_score,
		total_matches: summary.total_matches,
		best_match: summary.best_match.clone(),
		category_matches,
		suggestions,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use std::collections::HashMap;

	use ember_vector::{CrossSummary, NamespaceHits, ScoredHit};

	fn namespaces() -> Namespaces {
		Namespaces::new(&ember_config::NamespacesConfig::default(), 384, "cosine")
			.expect("Default namespace table must build.")
	}

	fn payload(text: &str, category: &str, layer: &str) -> EmbedPayload {
		EmbedPayload {
			text: text.to_string(),
			category: category.to_string(),
			layer: layer.to_string(),
			model_tier: None,
			metadata: serde_json::json!({}),
		}
	}

	fn hit(id: &str, score: f32) -> ScoredHit {
		ScoredHit { id: id.to_string(), score, payload: HashMap::new(), vector: None }
	}

	#[test]
	fn accepts_a_well_formed_payload() {
		assert!(validate_payload(&namespaces(), &payload("hello", "knowledge", "frontend")).is_ok());
	}

	#[test]
	fn rejects_blank_text() {
		let err = validate_payload(&namespaces(), &payload("  ", "knowledge", "frontend"))
			.expect_err("Blank text must be rejected.");

		assert!(matches!(err, Error::InvalidRequest { .. }));
	}

	#[test]
	fn rejects_unknown_namespaces() {
		assert!(validate_payload(&namespaces(), &payload("hello", "gossip", "frontend")).is_err());
		assert!(validate_payload(&namespaces(), &payload("hello", "knowledge", "middleware")).is_err());
	}

	#[test]
	fn rejects_unknown_model_tiers() {
		let mut bad_tier = payload("hello", "knowledge", "frontend");

		bad_tier.model_tier = Some("quaternary".to_string());

		assert!(validate_payload(&namespaces(), &bad_tier).is_err());

		let mut good_tier = payload("hello", "knowledge", "frontend");

		good_tier.model_tier = Some("secondary".to_string());

		assert!(validate_payload(&namespaces(), &good_tier).is_ok());
	}

	#[test]
	fn report_aggregates_matches_per_category() {
		let searched = CrossNamespaceSearch {
			results: vec![
				NamespaceHits {
					category: "knowledge".to_string(),
					layer: "frontend".to_string(),
					hits: vec![hit("a", 0.9), hit("b", 0.8)],
					error: None,
				},
				NamespaceHits {
					category: "knowledge".to_string(),
					layer: "backend".to_string(),
					hits: vec![hit("c", 0.7)],
					error: None,
				},
				NamespaceHits {
					category: "documentation".to_string(),
					layer: "frontend".to_string(),
					hits: vec![hit("d", 0.95)],
					error: None,
				},
			],
			summary: CrossSummary {
				total_matches: 4,
				best_match: Some(BestMatch {
					id: "d".to_string(),
					score: 0.95,
					category: "documentation".to_string(),
					layer: "frontend".to_string(),
				}),
				avg_score: 0.88,
			},
		};
		let report = build_report("query", &searched);

		assert_eq!(report.total_matches, 4);
		assert_eq!(report.category_matches.len(), 2);
		assert_eq!(report.category_matches[0].category, "knowledge");
		assert_eq!(report.category_matches[0].matches, 3);
		assert!(report.suggestions.iter().any(|s| s.contains("documentation/frontend")));
	}

	#[test]
	fn report_flags_novel_queries() {
		let searched = CrossNamespaceSearch {
			results: Vec::new(),
			summary: CrossSummary { total_matches: 0, best_match: None, avg_score: 0.0 },
		};
		let report = build_report("query", &searched);

		assert_eq!(report.confidence, 0.0);
		assert_eq!(report.suggestions.len(), 1);
		assert!(report.suggestions[0].contains("novel"));
	}
}
