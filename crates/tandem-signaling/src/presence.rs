//! Presence broadcaster: pushes the full participant list to everyone.
//!
//! No diffing and no per-client filtering: every registry change produces
//! one `joined` frame carrying the complete snapshot, addressed to every
//! open connection (joined or not). Because the frame is built in the same
//! coordinator step as the mutation, clients observe snapshots in the order
//! registrations happened.

use crate::protocol::ServerMessage;
use crate::registry::ParticipantRegistry;
use crate::router::{Delivery, Fanout};

#[derive(Debug, Default)]
pub struct PresenceBroadcaster {
    /// Snapshots announced so far.
    announced: u64,
}

impl PresenceBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the `joined` broadcast for the registry's current state.
    pub fn announce(&mut self, registry: &ParticipantRegistry) -> Delivery {
        self.announced += 1;
        let snapshot = registry.snapshot();

        tracing::debug!(
            sequence = self.announced,
            participants = snapshot.0.len(),
            "Presence snapshot broadcast"
        );

        Delivery {
            fanout: Fanout::All,
            message: ServerMessage::Joined(snapshot),
        }
    }

    pub fn announced(&self) -> u64 {
        self.announced
    }
}
