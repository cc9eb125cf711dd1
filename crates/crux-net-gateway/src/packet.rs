//! The gateway packet wire format.
//!
//! ```text
//! {"message": <JSON>,
//!  "metadata": {"messageId": "...", "createdAt": <ms>, "protocolName": "...",
//!               "senderCertificate": {"claim": "...", "proof": "..."}}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crux_net_core::{BoundValue, Certificate, Identity};

use crate::error::{GatewayError, Result};

/// Envelope-level facts about a gateway message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayMetadata {
    /// Value the sender certificate is bound to.
    pub message_id: String,
    /// Milliseconds since the Unix epoch.
    pub created_at: u64,
    pub protocol_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_certificate: Option<Certificate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayPacket {
    pub message: Value,
    pub metadata: GatewayMetadata,
}

impl GatewayPacket {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| GatewayError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| GatewayError::MalformedPacket(e.to_string()))
    }
}

/// What a sender certificate is bound to: the message id together with the
/// recipient, protocol, creation time and message it travels with.
pub(crate) fn certificate_binding(
    recipient: &Identity,
    message: &Value,
    metadata: &GatewayMetadata,
) -> Result<BoundValue> {
    let message =
        serde_json::to_vec(message).map_err(|e| GatewayError::Serialization(e.to_string()))?;
    Ok(BoundValue::for_message(
        &metadata.message_id,
        &[
            recipient.as_str().as_bytes(),
            metadata.protocol_name.as_bytes(),
            metadata.created_at.to_string().as_bytes(),
            &message,
        ],
    ))
}
