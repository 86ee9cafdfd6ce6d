//! Request handlers.

pub mod audio;
pub mod health;
pub mod image;
pub mod prompt;
pub mod tasks;
pub mod video_tasks;

use schemars::JsonSchema;
use serde::Serialize;

/// Standard acceptance response for enqueue endpoints.
#[derive(Debug, Serialize, JsonSchema)]
pub struct EnqueueResponse {
    pub success: bool,
    pub message: String,
    /// Scheduler task id, usable with `/tasks/{task_id}` and the
    /// WebSocket `subscribe_task` message.
    pub task_id: String,
}

impl EnqueueResponse {
    pub fn accepted(message: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            task_id: task_id.into(),
        }
    }
}
