//! Durable task scheduling on Redis Streams, plus the progress channel
//! that feeds WebSocket task updates.
//!
//! Delivery is at-least-once: tasks acknowledge late (after their result
//! is written), crashed workers are recovered via pending-claim, and
//! failed attempts are re-queued with exponential back-off through a
//! delayed sorted set.

pub mod error;
pub mod progress;
pub mod queue;
pub mod task;

pub use error::{QueueError, QueueResult};
pub use progress::{ProgressChannel, TaskUpdateEvent};
pub use queue::{QueueConfig, TaskQueue};
pub use task::{ScheduledTask, TaskPayload};
