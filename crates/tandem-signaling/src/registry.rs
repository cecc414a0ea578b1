//! Participant registry: who is online, and on which connection.
//!
//! This is the source of truth for name → connection resolution. It is owned
//! by the coordinator task and never shared, so it needs no locking; every
//! mutation happens inside one coordinator step.
//!
//! Entries are kept in registration order so presence snapshots list
//! participants the way they joined.

use chrono::{DateTime, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};
use tandem_common::{ConnectionId, RelayError, RelayResult};

/// One named, connected client.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Participant {
    pub username: String,
    pub id: ConnectionId,
    pub joined_at: DateTime<Utc>,
}

/// What to do when a name is already held by another connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Refuse the second registration.
    Reject,
    /// Last writer wins: the earlier holder silently loses the name.
    Replace,
}

/// Outcome of a successful [`ParticipantRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Inserted,
    /// Same name, same connection: nothing changed.
    Unchanged,
    /// The name moved here from `displaced`.
    Replaced { displaced: ConnectionId },
}

#[derive(Debug)]
pub struct ParticipantRegistry {
    entries: Vec<Participant>,
    policy: DuplicatePolicy,
}

impl ParticipantRegistry {
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self {
            entries: Vec::new(),
            policy,
        }
    }

    /// Register `name` for `connection`.
    ///
    /// A connection holds at most one name; a name maps to at most one
    /// connection. Under [`DuplicatePolicy::Replace`] the entry keeps its
    /// original position in the snapshot.
    pub fn register(&mut self, name: &str, connection: ConnectionId) -> RelayResult<Registration> {
        if let Some(current) = self.name_of(connection) {
            if current == name {
                return Ok(Registration::Unchanged);
            }
            return Err(RelayError::AlreadyJoined {
                name: current.to_string(),
            });
        }

        match self.position(name) {
            None => {
                self.entries.push(Participant {
                    username: name.to_string(),
                    id: connection,
                    joined_at: Utc::now(),
                });
                tracing::info!(user = %name, session = %connection, "Participant registered");
                Ok(Registration::Inserted)
            }
            Some(_) if self.policy == DuplicatePolicy::Reject => {
                Err(RelayError::DuplicateRegistration {
                    name: name.to_string(),
                })
            }
            Some(idx) => {
                let entry = &mut self.entries[idx];
                let displaced = entry.id;
                entry.id = connection;
                entry.joined_at = Utc::now();
                tracing::warn!(
                    user = %name,
                    session = %connection,
                    displaced = %displaced,
                    "Participant name taken over by a new connection"
                );
                Ok(Registration::Replaced { displaced })
            }
        }
    }

    /// Look up the live connection for `name`.
    pub fn resolve(&self, name: &str) -> RelayResult<ConnectionId> {
        self.entries
            .iter()
            .find(|p| p.username == name)
            .map(|p| p.id)
            .ok_or_else(|| RelayError::ParticipantNotFound {
                name: name.to_string(),
            })
    }

    /// The name held by `connection`, if it has joined.
    pub fn name_of(&self, connection: ConnectionId) -> Option<&str> {
        self.entries
            .iter()
            .find(|p| p.id == connection)
            .map(|p| p.username.as_str())
    }

    /// Remove whatever name `connection` holds. Returns the removed name.
    ///
    /// A name already taken over by another connection is left alone.
    pub fn evict(&mut self, connection: ConnectionId) -> Option<String> {
        let idx = self.entries.iter().position(|p| p.id == connection)?;
        let removed = self.entries.remove(idx);
        tracing::info!(
            user = %removed.username,
            session = %connection,
            "Participant evicted"
        );
        Some(removed.username)
    }

    /// Full registry in registration order.
    pub fn snapshot(&self) -> PresenceSnapshot {
        PresenceSnapshot(self.entries.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|p| p.username == name)
    }
}

impl Default for ParticipantRegistry {
    fn default() -> Self {
        Self::new(DuplicatePolicy::Reject)
    }
}

/// Presence snapshot: serialized as a JSON object keyed by name, in
/// registration order (`{"alice": {...}, "bob": {...}}`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PresenceSnapshot(pub Vec<Participant>);

impl PresenceSnapshot {
    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(|p| p.username.as_str()).collect()
    }
}

impl Serialize for PresenceSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for participant in &self.0 {
            map.serialize_entry(&participant.username, participant)?;
        }
        map.end()
    }
}
