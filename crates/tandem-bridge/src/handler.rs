//! Bridge WebSocket handler.
//!
//! The collaborator connects to /bridge. Text frames (and UTF-8 binary
//! frames) are ingested and forwarded to the coordinator; language changes
//! from clients flow back out on the same socket. A bad frame is logged and
//! dropped; the connection stays open. There is no reconnection logic: if
//! the collaborator goes away it is expected to dial in again.

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
use tandem_common::ConnectionId;
use tandem_common::config::BridgeConfig;
use tandem_signaling::CoordinatorHandle;
use tokio::sync::broadcast::error::RecvError;

use crate::ingest::{BridgeFrame, TranslationSummary, ingest, normalize_close_code};

/// Close code used when the socket ends without a close frame.
const NO_STATUS_RECEIVED: u16 = 1005;

#[derive(Clone)]
struct BridgeState {
    handle: CoordinatorHandle,
    max_frame_bytes: usize,
}

/// Build the bridge WebSocket router.
pub fn build_router(handle: CoordinatorHandle, config: &BridgeConfig) -> Router {
    Router::new()
        .route("/bridge", get(ws_handler))
        .with_state(BridgeState {
            handle,
            max_frame_bytes: config.max_frame_bytes,
        })
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<BridgeState>) -> Response {
    ws.max_message_size(state.max_frame_bytes)
        .max_frame_size(state.max_frame_bytes)
        .on_upgrade(move |socket| handle_bridge(socket, state))
}

async fn handle_bridge(socket: WebSocket, state: BridgeState) {
    let bridge = ConnectionId::generate();
    tracing::info!(bridge = %bridge, "Translation bridge connected");

    let (mut sender, mut receiver) = socket.split();

    // Subscribe before the receive loop so no language change is missed.
    let mut control = state.handle.subscribe_bridge();

    let send_task = tokio::spawn(async move {
        loop {
            let message = match control.recv().await {
                Ok(message) => message,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(bridge = %bridge, skipped, "Bridge lagged, control messages skipped");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            let Ok(json) = serde_json::to_string(&message) else {
                continue;
            };
            tracing::debug!(bridge = %bridge, "Forwarding language change to bridge");
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let mut close = None;
    while let Some(frame) = receiver.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text.as_str().to_owned(),
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => text,
                Err(_) => {
                    tracing::warn!(bridge = %bridge, "Dropping non-UTF-8 binary frame");
                    continue;
                }
            },
            Ok(Message::Close(frame)) => {
                close = frame;
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                tracing::error!(bridge = %bridge, error = %e, "Bridge socket error");
                break;
            }
        };

        match ingest(&text) {
            Ok(BridgeFrame::Keepalive) => tracing::trace!(bridge = %bridge, "Bridge keepalive"),
            Ok(BridgeFrame::Translation(payload)) => {
                let summary = TranslationSummary::of(&payload);
                tracing::debug!(
                    bridge = %bridge,
                    src = summary.src.as_deref().unwrap_or("-"),
                    tgt = summary.tgt.as_deref().unwrap_or("-"),
                    text_chars = summary.text_chars(),
                    audio_len = summary.audio_len(),
                    "Translation received"
                );
                if state.handle.translation(payload).await.is_err() {
                    tracing::error!(bridge = %bridge, "Coordinator gone, closing bridge");
                    break;
                }
            }
            Err(e) => tracing::warn!(bridge = %bridge, error = %e, "Dropping bridge frame"),
        }
    }

    send_task.abort();

    let (code, reason) = match close {
        Some(frame) => (frame.code, frame.reason.as_str().to_owned()),
        None => (NO_STATUS_RECEIVED, String::new()),
    };
    let normalized = normalize_close_code(code);
    if normalized != code {
        tracing::warn!(bridge = %bridge, code, "Invalid close code from bridge, treating as {normalized}");
    }
    tracing::info!(
        bridge = %bridge,
        code = normalized,
        reason = %reason,
        "Translation bridge disconnected"
    );
}
