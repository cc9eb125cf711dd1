//! Party identities and identity claims.
//!
//! An [`Identity`] (a "CruxId") is an opaque, immutable string handle. It
//! names a party and doubles as the suffix of that party's pub/sub topic.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::key_manager::KeyManager;

/// Prefix of every point-to-point topic.
pub const TOPIC_PREFIX: &str = "topic_";

/// Prefix of every gateway topic.
pub const GATEWAY_TOPIC_PREFIX: &str = "gateway_";

/// A textual party identifier.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Create an identity from any string-like value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The topic this identity receives secure packets on.
    pub fn topic(&self) -> String {
        format!("{TOPIC_PREFIX}{}", self.0)
    }

    /// The topic this identity receives gateway packets for `protocol` on.
    pub fn gateway_topic(&self, protocol: &str) -> String {
        format!("{GATEWAY_TOPIC_PREFIX}{protocol}_{}", self.0)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.0)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Identity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A self-assertion binding an identity to a key capability.
///
/// Created once per session by whoever owns an endpoint; never mutated.
#[derive(Clone)]
pub struct IdentityClaim {
    identity: Identity,
    key_manager: Arc<dyn KeyManager>,
}

impl IdentityClaim {
    pub fn new(identity: Identity, key_manager: Arc<dyn KeyManager>) -> Self {
        Self {
            identity,
            key_manager,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn key_manager(&self) -> &Arc<dyn KeyManager> {
        &self.key_manager
    }
}

impl fmt::Debug for IdentityClaim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityClaim")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}
