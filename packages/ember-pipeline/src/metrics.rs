use std::time::Duration;

use serde::Serialize;

/// Rolling counters for one pipeline instance. The latency average is a
/// running mean over completed tasks, not a window.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PipelineMetrics {
	pub processed: u64,
	pub completed: u64,
	pub failed: u64,
	pub avg_latency_ms: f64,
}
impl PipelineMetrics {
	pub fn record_success(&mut self, latency: Duration) {
		self.processed += 1;
		self.completed += 1;

		let sample = latency.as_secs_f64() * 1_000.0;
		let count = self.completed as f64;

		self.avg_latency_ms += (sample - self.avg_latency_ms) / count;
	}

	pub fn record_failure(&mut self) {
		self.processed += 1;
		self.failed += 1;
	}
}
