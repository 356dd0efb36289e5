use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use partbridge_core::task::TaskSummary;
use partbridge_engine::Subscription;
use tokio::sync::mpsc;

use crate::handlers::tasks::parse_task_id;
use crate::state::AppState;

/// Text sent before closing a socket that names an unknown task.
pub const NOT_FOUND_MESSAGE: &str = "Task not found.";

/// Close code for a subscription to an unknown task (policy violation).
const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// GET /api/v1/ws/tasks/{id}
///
/// Upgrades to a WebSocket that streams snapshots of one task: the
/// current state first, then one per change, until the client leaves or
/// the service shuts down.
pub async fn task_updates_handler(
    ws: WebSocketUpgrade,
    Path(raw_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, raw_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, raw_id: String) {
    let subscription = match parse_task_id(&raw_id) {
        Ok(task_id) => state.broadcaster.subscribe(task_id).await,
        Err(e) => Err(e),
    };
    let subscription = match subscription {
        Ok(subscription) => subscription,
        Err(_) => {
            tracing::debug!(task_id = %raw_id, "WebSocket subscription for unknown task");
            reject(socket).await;
            return;
        }
    };

    let Subscription {
        task_id,
        subscriber_id,
        receiver,
    } = subscription;
    tracing::info!(task_id = %task_id, subscriber_id, "Task observer connected");

    let (sink, mut stream) = socket.split();
    let mut send_task = tokio::spawn(forward_snapshots(
        sink,
        receiver,
        state.config.ws_ping_interval(),
    ));

    // Inbound frames carry no meaning; read until the client leaves.
    let recv_loop = async {
        while let Some(result) = stream.next().await {
            match result {
                Ok(Message::Close(_)) => break,
                Ok(Message::Pong(_)) => {
                    tracing::trace!(subscriber_id, "Pong received");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(subscriber_id, error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    };

    tokio::select! {
        _ = &mut send_task => {}
        () = recv_loop => {}
    }

    state.broadcaster.unsubscribe(&task_id, subscriber_id).await;
    send_task.abort();
    tracing::info!(task_id = %task_id, subscriber_id, "Task observer disconnected");
}

/// Forward snapshots to the socket, pinging every `ping_interval`.
///
/// Sends a Close frame once the broadcaster drops the subscription.
async fn forward_snapshots(
    mut sink: SplitSink<WebSocket, Message>,
    mut receiver: mpsc::UnboundedReceiver<TaskSummary>,
    ping_interval: Duration,
) {
    let start = tokio::time::Instant::now() + ping_interval;
    let mut ping = tokio::time::interval_at(start, ping_interval);

    loop {
        tokio::select! {
            snapshot = receiver.recv() => {
                let Some(snapshot) = snapshot else {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                };
                let text = match serde_json::to_string(&snapshot) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to serialize task snapshot");
                        continue;
                    }
                };
                if sink.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            _ = ping.tick() => {
                if sink.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Tell the client the task does not exist, then close with 1008.
async fn reject(mut socket: WebSocket) {
    let notice = serde_json::json!({ "error": NOT_FOUND_MESSAGE }).to_string();
    if socket.send(Message::Text(notice.into())).await.is_err() {
        return;
    }
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: CLOSE_POLICY_VIOLATION,
            reason: Utf8Bytes::from_static(NOT_FOUND_MESSAGE),
        })))
        .await;
}
