//! Participant identity abstraction
//!
//! The coordination core correlates all signaling for a remote participant
//! by a stable identity key. This module keeps the core generic over the
//! embedder's identity scheme (user IDs, public keys, addresses) while
//! requiring the operations the registry and wire protocol need.

use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display};
use std::hash::Hash;

/// Trait for participant identity in the call core
///
/// Implementations must be usable as hash-map keys, serializable onto the
/// signaling wire, and displayable for logging.
pub trait ParticipantIdentity:
    Clone
    + Debug
    + Display
    + Eq
    + Hash
    + Serialize
    + for<'de> Deserialize<'de>
    + Send
    + Sync
    + 'static
{
    /// Stable string key correlating all signaling for this participant
    fn as_key(&self) -> String;

    /// Try to reconstruct an identity from its string key
    fn from_key(s: &str) -> anyhow::Result<Self>
    where
        Self: Sized;
}

/// Simple string-based participant identity
///
/// Suitable for tests and for hubs that hand out plain user IDs. Embedders
/// with richer identity schemes implement [`ParticipantIdentity`] directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    /// Create a new string-based identity
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ParticipantIdentity for ParticipantId {
    fn as_key(&self) -> String {
        self.0.clone()
    }

    fn from_key(s: &str) -> anyhow::Result<Self> {
        Ok(Self(s.to_string()))
    }
}

impl From<&str> for ParticipantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ParticipantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}
