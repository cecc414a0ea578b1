//! Call sessions: explicit negotiation state per pair of participants.
//!
//! A session is keyed by the unordered pair of names, so `(alice, bob)` and
//! `(bob, alice)` are the same call. No entry means the pair is idle.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tandem_common::{RelayError, RelayResult};

/// Unordered pair of participant names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallKey(String, String);

impl CallKey {
    pub fn new(a: &str, b: &str) -> Self {
        if a <= b {
            Self(a.to_string(), b.to_string())
        } else {
            Self(b.to_string(), a.to_string())
        }
    }

    pub fn involves(&self, name: &str) -> bool {
        self.0 == name || self.1 == name
    }

    /// The other side of the pair, if `name` is one side.
    pub fn peer_of(&self, name: &str) -> Option<&str> {
        if self.0 == name {
            Some(self.1.as_str())
        } else if self.1 == name {
            Some(self.0.as_str())
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallPhase {
    /// Offer forwarded, waiting for the callee's answer.
    Offered,
    /// Answer forwarded; the peers are connected.
    Answered,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallSession {
    pub caller: String,
    pub callee: String,
    pub phase: CallPhase,
    /// When the session entered its current phase.
    pub since: DateTime<Utc>,
}

/// All calls that are offered or answered.
#[derive(Debug, Default)]
pub struct CallSessions {
    sessions: HashMap<CallKey, CallSession>,
}

impl CallSessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, a: &str, b: &str) -> Option<&CallSession> {
        self.sessions.get(&CallKey::new(a, b))
    }

    /// Who `name` is currently negotiating with or connected to.
    pub fn peer_of(&self, name: &str) -> Option<&str> {
        self.sessions.keys().find_map(|key| key.peer_of(name))
    }

    /// Record an offer from `caller` to `callee`.
    ///
    /// Either side being in a call with someone else is `ParticipantBusy`.
    /// A repeated offer within the same pair is a renegotiation: an offered
    /// session is refreshed, an answered one stays answered.
    pub fn begin_offer(&mut self, caller: &str, callee: &str) -> RelayResult<CallPhase> {
        for (name, other) in [(callee, caller), (caller, callee)] {
            if let Some(peer) = self.peer_of(name) {
                if peer != other {
                    return Err(RelayError::ParticipantBusy {
                        name: name.to_string(),
                    });
                }
            }
        }

        let key = CallKey::new(caller, callee);
        let phase = match self.sessions.get_mut(&key) {
            Some(session) if session.phase == CallPhase::Answered => CallPhase::Answered,
            Some(session) => {
                session.caller = caller.to_string();
                session.callee = callee.to_string();
                session.since = Utc::now();
                CallPhase::Offered
            }
            None => {
                self.sessions.insert(
                    key,
                    CallSession {
                        caller: caller.to_string(),
                        callee: callee.to_string(),
                        phase: CallPhase::Offered,
                        since: Utc::now(),
                    },
                );
                CallPhase::Offered
            }
        };
        Ok(phase)
    }

    /// Record the callee's answer. The pair must have an offer on record.
    pub fn mark_answered(&mut self, caller: &str, callee: &str) -> RelayResult<()> {
        let session = self
            .sessions
            .get_mut(&CallKey::new(caller, callee))
            .ok_or_else(|| RelayError::NoPendingOffer {
                from: caller.to_string(),
                to: callee.to_string(),
            })?;

        if session.phase == CallPhase::Offered {
            session.phase = CallPhase::Answered;
            session.since = Utc::now();
        }
        Ok(())
    }

    /// Return the pair to idle.
    pub fn end(&mut self, a: &str, b: &str) -> Option<CallSession> {
        self.sessions.remove(&CallKey::new(a, b))
    }

    /// End every session `name` takes part in (the participant went away).
    pub fn end_all_for(&mut self, name: &str) -> Vec<CallSession> {
        let keys: Vec<CallKey> = self
            .sessions
            .keys()
            .filter(|key| key.involves(name))
            .cloned()
            .collect();

        keys.into_iter()
            .filter_map(|key| self.sessions.remove(&key))
            .collect()
    }

    pub fn count(&self, phase: CallPhase) -> usize {
        self.sessions.values().filter(|s| s.phase == phase).count()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
