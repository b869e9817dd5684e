pub mod events;
pub mod models;
pub mod queue;
pub mod schema;

mod error;

pub use error::{Error, Result};
pub use events::TaskEvents;
pub use models::{
	NewTask, Priority, PriorityCounts, QueueStats, Task, TaskEvent, TaskEventKind, TaskStatus,
};
pub use queue::TaskQueue;
