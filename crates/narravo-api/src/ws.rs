//! WebSocket progress endpoint: `/ws/connect?token=...`.
//!
//! After connecting, a client sends `subscribe_task` messages to start
//! receiving `task_update` pushes, and `ping` to keep the connection
//! alive. Updates are at-most-once; events published before the
//! subscription are not replayed.

use std::collections::HashSet;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use narravo_models::{TaskId, WsClientMessage, WsServerMessage};

use crate::auth::verify_token;
use crate::state::AppState;

/// Bounded send buffer; a slow client gets backpressure, not unbounded
/// memory.
const WS_SEND_BUFFER_SIZE: usize = 32;

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    token: String,
}

/// Upgrade handler.
pub async fn ws_connect(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    match verify_token(&params.token, &state.config.jwt_secret) {
        Ok(user_id) => {
            info!(user = %user_id, "websocket connected");
            ws.on_upgrade(move |socket| handle_socket(socket, state))
                .into_response()
        }
        Err(e) => e.into_response(),
    }
}

async fn send_server_message(tx: &mpsc::Sender<Message>, msg: &WsServerMessage) -> bool {
    let Ok(json) = serde_json::to_string(msg) else {
        return false;
    };
    tx.send(Message::Text(json)).await.is_ok()
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (ws_sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Message>(WS_SEND_BUFFER_SIZE);

    // Single writer task; subscriptions and the control loop both feed it.
    let send_task = tokio::spawn(async move {
        let mut ws_sender = ws_sender;
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    let mut subscriptions: HashSet<TaskId> = HashSet::new();
    let mut forwarders = tokio::task::JoinSet::new();

    while let Some(incoming) = receiver.next().await {
        let text = match incoming {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };

        let parsed: WsClientMessage = match serde_json::from_str(&text) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!("ignoring unparseable client message: {e}");
                continue;
            }
        };

        match parsed {
            WsClientMessage::Ping => {
                if !send_server_message(&tx, &WsServerMessage::Pong).await {
                    break;
                }
            }
            WsClientMessage::SubscribeTask { task_id } => {
                let task_id = TaskId::from_string(task_id);
                if !subscriptions.insert(task_id.clone()) {
                    continue;
                }

                match state.progress.subscribe(&task_id).await {
                    Ok(mut stream) => {
                        let tx = tx.clone();
                        forwarders.spawn(async move {
                            while let Some(event) = stream.next().await {
                                if !send_server_message(&tx, &event.to_ws_message()).await {
                                    break;
                                }
                            }
                        });
                        debug!(task = %task_id, "task subscription added");
                    }
                    Err(e) => {
                        warn!(task = %task_id, "failed to subscribe: {e}");
                    }
                }
            }
        }
    }

    forwarders.abort_all();
    drop(tx);
    let _ = send_task.await;
    info!("websocket closed");
}
