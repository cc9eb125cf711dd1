//! The secure packet wire format.
//!
//! Before outer encryption a packet is UTF-8 JSON:
//!
//! ```text
//! {"certificate": {"claim": "<identity>", "proof": "<token>"} | null,
//!  "data": "<application payload, JSON-encoded>",
//!  "messageId": "<uuid>",             // only with nonce binding
//!  "createdAt": <ms>}                 // only with nonce binding
//! ```
//!
//! With nonce binding the certificate signs `{"messageId": <uuid>.<digest>}`,
//! the digest covering recipient, `createdAt` and `data`.

use serde::{Deserialize, Serialize};

use crux_net_core::Certificate;

use crate::error::{Result, SecureError};

/// The unit serialized, encrypted and handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurePacket {
    /// Absent for anonymous senders.
    pub certificate: Option<Certificate>,
    /// JSON-encoded application payload.
    pub data: String,
    /// Per-message id the certificate nonce is derived from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Sender clock in milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<u64>,
}

impl SecurePacket {
    /// Serialize to JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| SecureError::Serialization(e.to_string()))
    }

    /// Parse from JSON bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| SecureError::MalformedPacket(e.to_string()))
    }

    pub fn is_anonymous(&self) -> bool {
        self.certificate.is_none()
    }
}
