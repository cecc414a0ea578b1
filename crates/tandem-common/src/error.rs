//! Centralized error types for Tandem.
//!
//! Uses `thiserror` for ergonomic error definitions. Every variant maps to a
//! stable string code and a numeric wire code so a failed operation can be
//! reported back to the client that caused it.

use serde::Serialize;

/// Core error type shared by the signaling coordinator and the translation bridge.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    // === Routing errors ===
    #[error("Participant '{name}' not found")]
    ParticipantNotFound { name: String },

    #[error("Participant '{name}' is already in a call")]
    ParticipantBusy { name: String },

    #[error("No pending offer between '{from}' and '{to}'")]
    NoPendingOffer { from: String, to: String },

    // === Registration errors ===
    #[error("Name '{name}' is already taken")]
    DuplicateRegistration { name: String },

    #[error("Connection already joined as '{name}'")]
    AlreadyJoined { name: String },

    #[error("Invalid name: {reason}")]
    InvalidName { reason: String },

    #[error("Connection must join before sending '{event}'")]
    NotJoined { event: &'static str },

    #[error("Connection joined as '{actual}' cannot send as '{claimed}'")]
    SenderMismatch { claimed: String, actual: String },

    // === Payload errors ===
    #[error("Malformed payload: {reason}")]
    MalformedPayload { reason: String },

    // === Infrastructure errors ===
    #[error("Signaling coordinator is not running")]
    CoordinatorUnavailable,
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedPayload {
            reason: err.to_string(),
        }
    }
}

/// Error body sent to a client over the signaling channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct ErrorBody {
    pub code: u16,
    pub error: String,
    pub message: String,
}

impl RelayError {
    /// Numeric code carried on the wire: 4xxx for client faults, 5xxx for ours.
    pub fn wire_code(&self) -> u16 {
        match self {
            Self::MalformedPayload { .. } => 4000,
            Self::InvalidName { .. } => 4001,
            Self::DuplicateRegistration { .. } => 4002,
            Self::AlreadyJoined { .. } => 4003,
            Self::NotJoined { .. } => 4005,
            Self::SenderMismatch { .. } => 4006,
            Self::ParticipantNotFound { .. } => 4004,
            Self::ParticipantBusy { .. } => 4009,
            Self::NoPendingOffer { .. } => 4010,
            Self::CoordinatorUnavailable => 5003,
        }
    }

    /// Error code string for programmatic handling by clients.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ParticipantNotFound { .. } => "PARTICIPANT_NOT_FOUND",
            Self::ParticipantBusy { .. } => "PARTICIPANT_BUSY",
            Self::NoPendingOffer { .. } => "NO_PENDING_OFFER",
            Self::DuplicateRegistration { .. } => "DUPLICATE_REGISTRATION",
            Self::AlreadyJoined { .. } => "ALREADY_JOINED",
            Self::InvalidName { .. } => "INVALID_NAME",
            Self::NotJoined { .. } => "NOT_JOINED",
            Self::SenderMismatch { .. } => "SENDER_MISMATCH",
            Self::MalformedPayload { .. } => "MALFORMED_PAYLOAD",
            Self::CoordinatorUnavailable => "COORDINATOR_UNAVAILABLE",
        }
    }

    /// Routing failures are not transient; retrying the same message cannot succeed.
    pub fn is_routing(&self) -> bool {
        matches!(
            self,
            Self::ParticipantNotFound { .. }
                | Self::ParticipantBusy { .. }
                | Self::NoPendingOffer { .. }
        )
    }

    /// Build the client-facing body.
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            code: self.wire_code(),
            error: self.error_code().to_string(),
            message: self.to_string(),
        }
    }
}

/// Convenience type alias for Results using RelayError.
pub type RelayResult<T> = Result<T, RelayError>;
