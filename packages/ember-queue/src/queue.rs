use std::time::{Duration as StdDuration, Instant};

use sqlx::{PgPool, Postgres, Transaction, postgres::{PgListener, PgPoolOptions}};
use time::{Duration, OffsetDateTime};
use tokio::time as tokio_time;
use uuid::Uuid;

use crate::{
	Error, Result,
	events::TaskEvents,
	models::{NewTask, QueueStats, Task, TaskEvent, TaskEventKind, TaskStatus},
	schema,
};

pub(crate) const QUEUED_CHANNEL: &str = "ember_tasks_queued";
pub(crate) const EVENTS_CHANNEL: &str = "ember_task_events";

const SCHEMA_LOCK_ID: i64 = 3_090_517;

const CLAIM_SQL: &str = "\
UPDATE tasks
SET status = 'processing', processed_at = $1
WHERE task_id = (
	SELECT task_id
	FROM tasks
	WHERE status = 'queued'
	ORDER BY
		CASE priority
			WHEN 'urgent' THEN 0
			WHEN 'high' THEN 1
			WHEN 'normal' THEN 2
			ELSE 3
		END,
		seq
	LIMIT 1
	FOR UPDATE SKIP LOCKED
)
RETURNING *";

const COMPLETE_SQL: &str = "\
UPDATE tasks
SET status = 'completed', completed_at = $2, result = $3
WHERE task_id = $1 AND status IN ('queued', 'processing')
RETURNING *";

// `retries` on the right-hand side reads the pre-update value in every SET
// clause, so the whole retry decision is one atomic statement.
const FAIL_SQL: &str = "\
UPDATE tasks
SET retries = retries + 1,
	status = CASE WHEN $2 AND retries + 1 < max_retries THEN 'queued' ELSE 'failed' END,
	seq = CASE WHEN $2 AND retries + 1 < max_retries THEN nextval('tasks_seq') ELSE seq END,
	processed_at = CASE WHEN $2 AND retries + 1 < max_retries THEN NULL ELSE processed_at END,
	last_failed_at = CASE WHEN $2 AND retries + 1 < max_retries THEN last_failed_at ELSE $3 END,
	last_error = $4
WHERE task_id = $1 AND status IN ('queued', 'processing')
RETURNING *";

pub struct TaskQueue {
	pub pool: PgPool,
}
impl TaskQueue {
	pub async fn connect(cfg: &ember_config::Postgres) -> Result<Self> {
		let pool = PgPoolOptions::new()
			.max_connections(cfg.pool_max_conns)
			.connect(&cfg.dsn)
			.await
			.map_err(Error::Connection)?;

		Ok(Self { pool })
	}

	pub fn with_pool(pool: PgPool) -> Self {
		Self { pool }
	}

	pub async fn ensure_schema(&self) -> Result<()> {
		// Advisory locks are held per connection. Use a single transaction so the
		// lock is scoped to one connection and released when the transaction ends.
		let mut tx = self.pool.begin().await?;

		sqlx::query("SELECT pg_advisory_xact_lock($1)")
			.bind(SCHEMA_LOCK_ID)
			.execute(&mut *tx)
			.await?;

		for statement in schema::SCHEMA_SQL.split(';') {
			let trimmed = statement.trim();

			if trimmed.is_empty() {
				continue;
			}

			sqlx::query(trimmed).execute(&mut *tx).await?;
		}

		tx.commit().await?;

		Ok(())
	}

	/// Appends the task at the tail of its priority level and wakes blocked
	/// watchers. The returned id is the only handle producers need.
	pub async fn enqueue(&self, new_task: NewTask) -> Result<Uuid> {
		let task_id = Uuid::new_v4();
		let now = OffsetDateTime::now_utc();
		let mut tx = self.pool.begin().await?;

		sqlx::query(
			"\
INSERT INTO tasks (task_id, kind, payload, priority, status, max_retries, created_at)
VALUES ($1, $2, $3, $4, 'queued', $5, $6)",
		)
		.bind(task_id)
		.bind(&new_task.kind)
		.bind(&new_task.payload)
		.bind(new_task.priority.as_str())
		.bind(new_task.max_retries as i32)
		.bind(now)
		.execute(&mut *tx)
		.await?;
		sqlx::query("SELECT pg_notify($1, $2)")
			.bind(QUEUED_CHANNEL)
			.bind(task_id.to_string())
			.execute(&mut *tx)
			.await?;

		tx.commit().await?;

		Ok(task_id)
	}

	/// Like [`enqueue`](Self::enqueue), but the event subscription is opened
	/// before the insert commits, so the caller cannot miss the task's terminal
	/// event by subscribing too late.
	pub async fn enqueue_watched(&self, new_task: NewTask) -> Result<(Uuid, TaskEvents)> {
		let events = TaskEvents::subscribe(&self.pool).await?;
		let task_id = self.enqueue(new_task).await?;

		Ok((task_id, events))
	}

	/// Claims the oldest task of the first non-empty priority level, strictly
	/// urgent → high → normal → low, FIFO within a level. Non-blocking.
	pub async fn dequeue_next(&self) -> Result<Option<Task>> {
		let now = OffsetDateTime::now_utc();
		let task =
			sqlx::query_as::<_, Task>(CLAIM_SQL).bind(now).fetch_optional(&self.pool).await?;

		Ok(task)
	}

	/// Claims like [`dequeue_next`](Self::dequeue_next), blocking up to
	/// `timeout` while the queue is empty. Wakeups ride the queued-channel
	/// notifications; ordering across levels between wakeups is best-effort.
	pub async fn watch_blocking(&self, timeout: StdDuration) -> Result<Option<Task>> {
		if let Some(task) = self.dequeue_next().await? {
			return Ok(Some(task));
		}

		let mut listener = PgListener::connect_with(&self.pool).await?;

		listener.listen(QUEUED_CHANNEL).await?;

		// A task enqueued between the first claim and the LISTEN emits no
		// further notification; claim once more before waiting.
		if let Some(task) = self.dequeue_next().await? {
			return Ok(Some(task));
		}

		let deadline = Instant::now() + timeout;

		loop {
			let remaining = deadline.saturating_duration_since(Instant::now());

			if remaining.is_zero() {
				return Ok(None);
			}

			match tokio_time::timeout(remaining, listener.recv()).await {
				Err(_) => return Ok(None),
				Ok(notification) => {
					notification?;

					if let Some(task) = self.dequeue_next().await? {
						return Ok(Some(task));
					}
				},
			}
		}
	}

	/// Moves a live task to the completed archive and publishes a completion
	/// event (best-effort, at-most-once, live subscribers only).
	pub async fn complete(&self, task_id: Uuid, result: serde_json::Value) -> Result<Task> {
		let now = OffsetDateTime::now_utc();
		let mut tx = self.pool.begin().await?;
		let task = sqlx::query_as::<_, Task>(COMPLETE_SQL)
			.bind(task_id)
			.bind(now)
			.bind(&result)
			.fetch_optional(&mut *tx)
			.await?;
		let Some(task) = task else {
			drop(tx);

			return Err(self.transition_error(task_id, "complete").await?);
		};

		publish_event(
			&mut tx,
			&TaskEvent { task_id, kind: TaskEventKind::Completed, error: None },
		)
		.await?;

		tx.commit().await?;

		Ok(task)
	}

	/// Applies the retry policy in one atomic statement: requeue at the tail of
	/// the task's original priority level while retries remain, otherwise move
	/// to the terminal failed archive. Publishes the matching event.
	pub async fn fail(&self, task_id: Uuid, error: &str, retry: bool) -> Result<Task> {
		let now = OffsetDateTime::now_utc();
		let mut tx = self.pool.begin().await?;
		let task = sqlx::query_as::<_, Task>(FAIL_SQL)
			.bind(task_id)
			.bind(retry)
			.bind(now)
			.bind(error)
			.fetch_optional(&mut *tx)
			.await?;
		let Some(task) = task else {
			drop(tx);

			return Err(self.transition_error(task_id, "fail").await?);
		};
		let kind = if task.status == TaskStatus::Queued {
			TaskEventKind::Retrying
		} else {
			TaskEventKind::Failed
		};

		publish_event(
			&mut tx,
			&TaskEvent { task_id, kind, error: Some(error.to_string()) },
		)
		.await?;

		tx.commit().await?;

		Ok(task)
	}

	pub async fn get_status(&self, task_id: Uuid) -> Result<Task> {
		let task = sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE task_id = $1")
			.bind(task_id)
			.fetch_optional(&self.pool)
			.await?;

		task.ok_or_else(|| Error::NotFound(format!("Task {task_id} is not tracked.")))
	}

	pub async fn stats(&self) -> Result<QueueStats> {
		let rows: Vec<(String, String, i64)> =
			sqlx::query_as("SELECT status, priority, COUNT(*) FROM tasks GROUP BY status, priority")
				.fetch_all(&self.pool)
				.await?;
		let mut stats = QueueStats::default();

		for (status, priority, count) in rows {
			match status.as_str() {
				"queued" => match priority.as_str() {
					"urgent" => stats.queued.urgent += count,
					"high" => stats.queued.high += count,
					"normal" => stats.queued.normal += count,
					_ => stats.queued.low += count,
				},
				"processing" => stats.processing += count,
				"completed" => stats.completed += count,
				"failed" => stats.failed += count,
				_ => {},
			}
		}

		Ok(stats)
	}

	/// Purges archived tasks whose terminal timestamp predates the cutoff.
	/// Returns the number of rows removed.
	pub async fn cleanup(&self, older_than_days: i64) -> Result<u64> {
		let cutoff = OffsetDateTime::now_utc() - Duration::days(older_than_days);
		let result = sqlx::query(
			"\
DELETE FROM tasks
WHERE status IN ('completed', 'failed')
	AND COALESCE(completed_at, last_failed_at) < $1",
		)
		.bind(cutoff)
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected())
	}

	/// General event subscription; at-most-once, no replay.
	pub async fn events(&self) -> Result<TaskEvents> {
		TaskEvents::subscribe(&self.pool).await
	}

	async fn transition_error(&self, task_id: Uuid, op: &str) -> Result<Error> {
		let status: Option<String> =
			sqlx::query_scalar("SELECT status FROM tasks WHERE task_id = $1")
				.bind(task_id)
				.fetch_optional(&self.pool)
				.await?;

		Ok(match status {
			Some(status) =>
				Error::Conflict(format!("Cannot {op} task {task_id}; status is {status}.")),
			None => Error::NotFound(format!("Task {task_id} is not tracked.")),
		})
	}
}

async fn publish_event(tx: &mut Transaction<'_, Postgres>, event: &TaskEvent) -> Result<()> {
	let payload = serde_json::to_string(event)?;

	sqlx::query("SELECT pg_notify($1, $2)")
		.bind(EVENTS_CHANNEL)
		.bind(payload)
		.execute(&mut **tx)
		.await?;

	Ok(())
}

/// Mirror of the `FAIL_SQL` status decision, kept in sync for unit coverage.
pub fn retry_decision(retry: bool, retries_before: i32, max_retries: i32) -> TaskStatus {
	if retry && retries_before + 1 < max_retries {
		TaskStatus::Queued
	} else {
		TaskStatus::Failed
	}
}
