//! Signaling WebSocket handler.
//!
//! One task pair per browser connection:
//!
//! 1. Client connects to /signal and is attached to the coordinator
//! 2. Sender task drains the connection's outbound queue onto the socket
//! 3. Receive loop parses `{"event", "data"}` frames and dispatches them
//! 4. Socket closes → coordinator evicts the participant → cleanup
//!
//! The handler holds no signaling state of its own; everything it learns
//! goes straight to the coordinator.

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use tandem_common::{ConnectionId, RelayError};

use crate::coordinator::CoordinatorHandle;
use crate::protocol::ClientMessage;

/// Build the signaling WebSocket router.
pub fn build_router(handle: CoordinatorHandle) -> Router {
    Router::new()
        .route("/signal", get(ws_handler))
        .with_state(handle)
}

async fn ws_handler(ws: WebSocketUpgrade, State(handle): State<CoordinatorHandle>) -> Response {
    ws.on_upgrade(move |socket| handle_connection(socket, handle))
}

async fn handle_connection(socket: WebSocket, handle: CoordinatorHandle) {
    let (connection, mut outbound) = match handle.connect().await {
        Ok(attached) => attached,
        Err(e) => {
            tracing::error!(error = %e, "Refusing signaling client");
            return;
        }
    };
    tracing::info!(session = %connection, "Signaling client connected");

    let (mut sender, mut receiver) = socket.split();

    // ── Sender task ──────────────────────────────────────────────────────────
    let send_task = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let json = match serde_json::to_string(message.as_ref()) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!(
                        session = %connection,
                        event = message.event_name(),
                        error = %e,
                        "Failed to serialize outbound frame"
                    );
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // ── Receive loop ─────────────────────────────────────────────────────────
    while let Some(frame) = receiver.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text.as_str().to_owned(),
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => text,
                Err(_) => {
                    reject(&handle, connection, "binary frame is not UTF-8").await;
                    continue;
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(session = %connection, error = %e, "Signaling socket error");
                break;
            }
        };

        let dispatched = match serde_json::from_str::<ClientMessage>(&text) {
            Ok(message) => handle.dispatch(connection, message).await,
            Err(e) => handle.reject(connection, e.into()).await,
        };
        if dispatched.is_err() {
            tracing::error!(session = %connection, "Coordinator gone, closing client");
            break;
        }
    }

    // ── Cleanup ───────────────────────────────────────────────────────────────
    let _ = handle.disconnect(connection).await;
    send_task.abort();
    let connected_secs = connection
        .accepted_at()
        .map(|at| (chrono::Utc::now() - at).num_seconds());
    tracing::info!(
        session = %connection,
        connected_secs,
        "Signaling client disconnected"
    );
}

async fn reject(handle: &CoordinatorHandle, connection: ConnectionId, reason: &str) {
    let _ = handle
        .reject(
            connection,
            RelayError::MalformedPayload {
                reason: reason.to_string(),
            },
        )
        .await;
}
