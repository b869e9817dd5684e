use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
	Urgent,
	High,
	Normal,
	Low,
}
impl Priority {
	pub const ALL: [Self; 4] = [Self::Urgent, Self::High, Self::Normal, Self::Low];

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Urgent => "urgent",
			Self::High => "high",
			Self::Normal => "normal",
			Self::Low => "low",
		}
	}

	/// Lower rank is claimed first.
	pub fn rank(&self) -> i16 {
		match self {
			Self::Urgent => 0,
			Self::High => 1,
			Self::Normal => 2,
			Self::Low => 3,
		}
	}
}
impl TryFrom<String> for Priority {
	type Error = Error;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		match value.as_str() {
			"urgent" => Ok(Self::Urgent),
			"high" => Ok(Self::High),
			"normal" => Ok(Self::Normal),
			"low" => Ok(Self::Low),
			other => Err(Error::InvalidArgument(format!("Unknown priority {other:?}."))),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
	Queued,
	Processing,
	Completed,
	Failed,
}
impl TaskStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Queued => "queued",
			Self::Processing => "processing",
			Self::Completed => "completed",
			Self::Failed => "failed",
		}
	}

	pub fn is_terminal(&self) -> bool {
		matches!(self, Self::Completed | Self::Failed)
	}
}
impl TryFrom<String> for TaskStatus {
	type Error = Error;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		match value.as_str() {
			"queued" => Ok(Self::Queued),
			"processing" => Ok(Self::Processing),
			"completed" => Ok(Self::Completed),
			"failed" => Ok(Self::Failed),
			other => Err(Error::InvalidArgument(format!("Unknown task status {other:?}."))),
		}
	}
}

#[derive(Debug, sqlx::FromRow)]
pub struct Task {
	pub task_id: Uuid,
	pub kind: String,
	pub payload: Value,
	#[sqlx(try_from = "String")]
	pub priority: Priority,
	#[sqlx(try_from = "String")]
	pub status: TaskStatus,
	pub retries: i32,
	pub max_retries: i32,
	pub seq: i64,
	pub created_at: OffsetDateTime,
	pub processed_at: Option<OffsetDateTime>,
	pub completed_at: Option<OffsetDateTime>,
	pub last_failed_at: Option<OffsetDateTime>,
	pub result: Option<Value>,
	pub last_error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewTask {
	pub kind: String,
	pub payload: Value,
	pub priority: Priority,
	pub max_retries: u32,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PriorityCounts {
	pub urgent: i64,
	pub high: i64,
	pub normal: i64,
	pub low: i64,
}
impl PriorityCounts {
	pub fn total(&self) -> i64 {
		self.urgent + self.high + self.normal + self.low
	}
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct QueueStats {
	pub queued: PriorityCounts,
	pub processing: i64,
	pub completed: i64,
	pub failed: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskEventKind {
	Completed,
	Retrying,
	Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
	pub task_id: Uuid,
	pub kind: TaskEventKind,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}
