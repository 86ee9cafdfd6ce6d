//! Task progress via Redis Pub/Sub.
//!
//! Workers publish `task_update` checkpoints; WebSocket sessions
//! subscribe per task. Delivery to subscribers is at-most-once - only
//! events published after the subscription are seen. A short history is
//! kept in a sorted set for diagnostics.

use chrono::Utc;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::debug;

use narravo_models::{TaskId, WsServerMessage};

use crate::error::QueueResult;

/// History retention for progress events (seconds).
const PROGRESS_HISTORY_TTL_SECS: i64 = 3600;

/// One task progress checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskUpdateEvent {
    pub task_id: TaskId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub timestamp_ms: i64,
}

impl TaskUpdateEvent {
    pub fn new(
        task_id: TaskId,
        progress: Option<u8>,
        status: Option<String>,
        details: Option<String>,
    ) -> Self {
        Self {
            task_id,
            progress,
            status,
            details,
            timestamp_ms: Utc::now().timestamp_millis(),
        }
    }

    /// Convert into the WebSocket wire message.
    pub fn to_ws_message(&self) -> WsServerMessage {
        WsServerMessage::task_update(
            self.task_id.as_str(),
            self.progress,
            self.status.clone(),
            self.details.clone(),
        )
    }
}

/// Publishing/subscribing side of task progress.
#[derive(Clone)]
pub struct ProgressChannel {
    client: redis::Client,
}

impl ProgressChannel {
    pub fn new(redis_url: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    pub fn from_env() -> QueueResult<Self> {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        Self::new(&url)
    }

    fn channel_name(task_id: &TaskId) -> String {
        format!("narravo:progress:{task_id}")
    }

    fn history_key(task_id: &TaskId) -> String {
        format!("narravo:progress_history:{task_id}")
    }

    /// Publish a checkpoint: Pub/Sub for live subscribers plus a bounded
    /// history entry.
    pub async fn publish(&self, event: &TaskUpdateEvent) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let channel = Self::channel_name(&event.task_id);
        let history = Self::history_key(&event.task_id);
        let payload = serde_json::to_string(event)?;

        debug!(task_id = %event.task_id, "publishing task update");
        redis::pipe()
            .publish(&channel, &payload)
            .ignore()
            .zadd(&history, &payload, event.timestamp_ms as f64)
            .ignore()
            .expire(&history, PROGRESS_HISTORY_TTL_SECS)
            .ignore()
            .exec_async(&mut conn)
            .await?;

        Ok(())
    }

    /// Convenience: publish a status/progress checkpoint.
    pub async fn update(
        &self,
        task_id: &TaskId,
        progress: Option<u8>,
        status: Option<&str>,
        details: Option<String>,
    ) -> QueueResult<()> {
        self.publish(&TaskUpdateEvent::new(
            task_id.clone(),
            progress,
            status.map(|s| s.to_string()),
            details,
        ))
        .await
    }

    /// Subscribe to a task's updates. Only events published after this
    /// call are delivered.
    pub async fn subscribe(
        &self,
        task_id: &TaskId,
    ) -> QueueResult<std::pin::Pin<Box<dyn futures_util::Stream<Item = TaskUpdateEvent> + Send>>>
    {
        use futures_util::StreamExt;

        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(Self::channel_name(task_id)).await?;

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = msg.get_payload().ok()?;
            serde_json::from_str(&payload).ok()
        });

        Ok(Box::pin(stream))
    }

    /// Progress history since `since_ms`, oldest first.
    pub async fn history_since(
        &self,
        task_id: &TaskId,
        since_ms: i64,
    ) -> QueueResult<Vec<TaskUpdateEvent>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let events: Vec<String> = conn
            .zrangebyscore(Self::history_key(task_id), since_ms as f64, "+inf")
            .await?;

        Ok(events
            .into_iter()
            .filter_map(|s| serde_json::from_str(&s).ok())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_converts_to_ws_message() {
        let event = TaskUpdateEvent::new(
            TaskId::from_string("t-1"),
            Some(42),
            Some("synthesizing_videos".into()),
            None,
        );
        let msg = event.to_ws_message();
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"task_update\""));
        assert!(json.contains("\"task_id\":\"t-1\""));
        assert!(json.contains("\"progress\":42"));
        assert!(json.contains("\"status\":\"synthesizing_videos\""));
    }

    #[test]
    fn event_serde_skips_absent_fields() {
        let event = TaskUpdateEvent::new(TaskId::from_string("t-1"), None, None, None);
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("progress"));
        assert!(!json.contains("status"));
        assert!(!json.contains("details"));
    }
}
