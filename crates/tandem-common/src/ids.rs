//! Connection identifiers.
//!
//! Every accepted WebSocket gets a `ConnectionId`, the transport-level handle
//! used to address frames to exactly that client. We use UUID v7 so ids sort
//! by accept time, which keeps log lines for one connection easy to group.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque handle for one live client or bridge connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generate a new, time-sortable connection id.
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    /// Approximate accept time, recovered from the UUID v7 timestamp bits.
    pub fn accepted_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        let (secs, nanos) = self.0.get_timestamp()?.to_unix();
        chrono::DateTime::from_timestamp(secs as i64, nanos)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
