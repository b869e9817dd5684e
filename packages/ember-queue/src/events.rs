use std::time::{Duration, Instant};

use sqlx::{PgPool, postgres::PgListener};
use tokio::time as tokio_time;
use uuid::Uuid;

use crate::{Result, models::TaskEvent, queue::EVENTS_CHANNEL};

/// A live subscription to task terminal events. Delivery is at-most-once with
/// no replay; events published while no subscriber is connected are dropped.
pub struct TaskEvents {
	listener: PgListener,
}
impl TaskEvents {
	pub(crate) async fn subscribe(pool: &PgPool) -> Result<Self> {
		let mut listener = PgListener::connect_with(pool).await?;

		listener.listen(EVENTS_CHANNEL).await?;

		Ok(Self { listener })
	}

	pub async fn recv(&mut self) -> Result<TaskEvent> {
		let notification = self.listener.recv().await?;

		Ok(serde_json::from_str(notification.payload())?)
	}

	/// Waits for the given task's event, discarding events of other tasks.
	/// Returns `None` on timeout.
	pub async fn recv_for(&mut self, task_id: Uuid, timeout: Duration) -> Result<Option<TaskEvent>> {
		let deadline = Instant::now() + timeout;

		loop {
			let remaining = deadline.saturating_duration_since(Instant::now());

			if remaining.is_zero() {
				return Ok(None);
			}

			match tokio_time::timeout(remaining, self.listener.recv()).await {
				Err(_) => return Ok(None),
				Ok(notification) => {
					let event: TaskEvent = serde_json::from_str(notification?.payload())?;

					if event.task_id == task_id {
						return Ok(Some(event));
					}
				},
			}
		}
	}
}
