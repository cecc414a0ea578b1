//! Signaling wire protocol.
//!
//! Every frame on the `/signal` socket is a JSON envelope
//! `{"event": "<kind>", "data": <payload>}`. Event names and payload field
//! names match what browser clients already emit (`join-user`, `offer`,
//! `icecandidate`, ...), so the relay stays drop-in compatible with them.
//!
//! Negotiation payloads (`offer`, `answer`, candidates) are opaque JSON: the
//! relay routes them, it never inspects SDP.

use serde::{Deserialize, Serialize};
use tandem_common::error::ErrorBody;

use crate::registry::PresenceSnapshot;

/// Client → relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Register under a display name.
    JoinUser(String),

    /// Session description offer, routed to `to`.
    Offer(OfferPayload),

    /// Session description answer, routed back to `from` (the caller).
    Answer(AnswerPayload),

    /// Connectivity candidate.
    #[serde(rename = "icecandidate", alias = "candidate")]
    IceCandidate(CandidatePayload),

    /// One side hangs up; only the other side is told.
    EndCall(CallParties),

    /// Terminate the call for both parties.
    CallEnded(CallerPair),

    /// Change the translation language pair.
    SetLangs(LanguagePair),
}

/// Relay → client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Full presence snapshot, sent to everyone on every registry change.
    Joined(PresenceSnapshot),

    Offer(OfferPayload),

    Answer(AnswerPayload),

    #[serde(rename = "icecandidate")]
    IceCandidate(CandidatePayload),

    EndCall(CallParties),

    CallEnded(CallerPair),

    /// Opaque payload from the translation bridge, forwarded verbatim.
    Translation(serde_json::Value),

    /// Negative acknowledgment for the operation the client just attempted.
    Error(ErrorBody),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferPayload {
    pub from: String,
    pub to: String,
    pub offer: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerPayload {
    /// The original caller; the answer is delivered here.
    pub from: String,
    /// The answering side.
    pub to: String,
    pub answer: serde_json::Value,
}

/// A connectivity candidate, either addressed to one peer or bare.
///
/// Bare candidates (the browser's `RTCIceCandidate` JSON, no addressing) are
/// broadcast to every other connection; each client discards candidates that
/// do not belong to its active call. Addressed candidates are routed to `to`
/// only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CandidatePayload {
    Addressed {
        from: String,
        to: String,
        candidate: serde_json::Value,
    },
    Bare(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallParties {
    pub from: String,
    pub to: String,
}

/// `[from, to]`, as sent with `call-ended`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerPair(pub String, pub String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguagePair {
    pub src: String,
    pub tgt: String,
}

/// Relay → translation collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BridgeControl {
    #[serde(rename = "setLangs")]
    SetLangs { src: String, tgt: String },
}

impl From<LanguagePair> for BridgeControl {
    fn from(pair: LanguagePair) -> Self {
        Self::SetLangs {
            src: pair.src,
            tgt: pair.tgt,
        }
    }
}

impl ServerMessage {
    /// Event name as it appears on the wire, for log fields.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Joined(_) => "joined",
            Self::Offer(_) => "offer",
            Self::Answer(_) => "answer",
            Self::IceCandidate(_) => "icecandidate",
            Self::EndCall(_) => "end-call",
            Self::CallEnded(_) => "call-ended",
            Self::Translation(_) => "translation",
            Self::Error(_) => "error",
        }
    }
}
