//! # tandem-signaling
//!
//! WebRTC signaling for Tandem. The relay never touches media; it only moves
//! negotiation messages between named browsers:
//! - Participant registry (display name → live connection)
//! - Negotiation routing (offer, answer, candidates, hang-up)
//! - Presence broadcast (full participant list on every change)
//!
//! All state lives in a single coordinator task; sockets talk to it through
//! a [`CoordinatorHandle`].

pub mod coordinator;
pub mod handler;
pub mod presence;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod session;

use tandem_common::RelayResult;
use tandem_common::config::SignalingConfig;

pub use coordinator::{Coordinator, CoordinatorHandle, CoordinatorStats};
pub use protocol::{BridgeControl, ClientMessage, ServerMessage};

/// Signaling server: the running coordinator plus its WebSocket surface.
#[derive(Clone)]
pub struct SignalingServer {
    handle: CoordinatorHandle,
}

impl SignalingServer {
    /// Start the coordinator. Must be called inside a Tokio runtime.
    pub fn start(config: &SignalingConfig) -> Self {
        Self {
            handle: Coordinator::spawn(config),
        }
    }

    pub fn handle(&self) -> &CoordinatorHandle {
        &self.handle
    }

    /// Router serving `/signal`.
    pub fn router(&self) -> axum::Router {
        handler::build_router(self.handle.clone())
    }

    pub async fn stats(&self) -> RelayResult<CoordinatorStats> {
        self.handle.stats().await
    }
}
