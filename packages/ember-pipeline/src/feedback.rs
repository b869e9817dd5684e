use serde::{Deserialize, Serialize};
use serde_json::Value;

use ember_queue::Task;

use crate::{Result, TaskOutcome};

/// A pluggable post-task hook producing lightweight pattern summaries. Signals
/// are persisted into the confidence namespace of the task's layer; analyzer
/// failures are logged and swallowed, never fatal to the task.
pub trait FeedbackAnalyzer
where
	Self: Send + Sync,
{
	fn name(&self) -> &str;

	fn analyze(&self, task: &Task, outcome: &TaskOutcome) -> Result<Option<FeedbackSignal>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackSignal {
	pub analyzer: String,
	pub pattern: String,
	pub score: f32,
	pub details: Value,
}

/// Buckets task text by length and reports where the work landed.
pub struct TextProfileAnalyzer;
impl FeedbackAnalyzer for TextProfileAnalyzer {
	fn name(&self) -> &str {
		"text_profile"
	}

	fn analyze(&self, task: &Task, outcome: &TaskOutcome) -> Result<Option<FeedbackSignal>> {
		let words = outcome.payload.text.split_whitespace().count();
		let signal = FeedbackSignal {
			analyzer: self.name().to_string(),
			pattern: format!("{} {} task", word_bucket(words), outcome.payload.category),
			score: (words as f32 / 256.0).min(1.0),
			details: serde_json::json!({
				"task_id": task.task_id,
				"words": words,
				"chars": outcome.payload.text.chars().count(),
				"model": outcome.embedding.model,
				"dimensions": outcome.embedding.dimensions,
				"layer": outcome.payload.layer,
			}),
		};

		Ok(Some(signal))
	}
}

pub fn default_analyzers() -> Vec<Box<dyn FeedbackAnalyzer>> {
	vec![Box::new(TextProfileAnalyzer)]
}

fn word_bucket(words: usize) -> &'static str {
	match words {
		0..10 => "terse",
		10..200 => "standard",
		_ => "long",
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn buckets_split_at_ten_and_two_hundred_words() {
		assert_eq!(word_bucket(0), "terse");
		assert_eq!(word_bucket(9), "terse");
		assert_eq!(word_bucket(10), "standard");
		assert_eq!(word_bucket(199), "standard");
		assert_eq!(word_bucket(200), "long");
	}
}
