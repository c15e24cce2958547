//! WebSocket endpoint for incremental reply streams
//!
//! One logical subscription per correlation identifier. The server pushes
//! [`crate::stream::ReplyEvent`] frames in publish order and closes the
//! socket after the `done` event. Subscribing to an unknown or finished
//! identifier closes immediately; the viewer falls back to snapshot polling.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::SinkExt;
use tokio::sync::broadcast::error::RecvError;

use super::ApiState;

/// Handle a WebSocket upgrade for one correlation identifier
pub async fn ws_upgrade(
    State(state): State<Arc<ApiState>>,
    Path(correlation_id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, correlation_id))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<ApiState>, correlation_id: String) {
    let Some(mut rx) = state.hub.subscribe(&correlation_id).await else {
        tracing::debug!(correlation_id = %correlation_id, "no in-flight stream, closing subscription");
        drop(socket.close().await);
        return;
    };

    tracing::debug!(correlation_id = %correlation_id, "stream subscription opened");

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(event) => {
                    let done = event.done;
                    let Ok(frame) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if socket.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                    if done {
                        break;
                    }
                }
                // A lagged viewer only loses intermediate partials; the
                // next event carries the full cumulative text anyway
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(correlation_id = %correlation_id, skipped, "viewer lagged behind stream");
                }
                Err(RecvError::Closed) => break,
            },
            msg = socket.recv() => match msg {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // Ignore pings and stray client frames
                Some(Ok(_)) => {}
            },
        }
    }

    drop(socket.close().await);
    tracing::debug!(correlation_id = %correlation_id, "stream subscription closed");
}
