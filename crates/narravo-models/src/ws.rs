//! WebSocket message schema for task progress streaming.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Messages a connected client may send.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsClientMessage {
    /// Start receiving updates for one task. Updates emitted before the
    /// subscription are not replayed.
    SubscribeTask { task_id: String },
    Ping,
}

/// Messages the server pushes.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsServerMessage {
    /// Progress checkpoint for a subscribed task. At-most-once delivery.
    TaskUpdate {
        task_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        progress: Option<u8>,
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<String>,
        timestamp: DateTime<Utc>,
    },
    Pong,
}

impl WsServerMessage {
    pub fn task_update(
        task_id: impl Into<String>,
        progress: Option<u8>,
        status: Option<String>,
        details: Option<String>,
    ) -> Self {
        WsServerMessage::TaskUpdate {
            task_id: task_id.into(),
            progress,
            status,
            details,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_message_parses_subscribe() {
        let msg: WsClientMessage =
            serde_json::from_str(r#"{"type":"subscribe_task","task_id":"t-1"}"#).unwrap();
        match msg {
            WsClientMessage::SubscribeTask { task_id } => assert_eq!(task_id, "t-1"),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn task_update_skips_absent_fields() {
        let msg = WsServerMessage::task_update("t-1", Some(42), None, None);
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"task_update\""));
        assert!(json.contains("\"progress\":42"));
        assert!(!json.contains("status"));
        assert!(!json.contains("details"));
    }

    #[test]
    fn pong_roundtrip() {
        let json = serde_json::to_string(&WsServerMessage::Pong).unwrap();
        assert_eq!(json, r#"{"type":"pong"}"#);
    }
}
