//! Protocol messages and their schemas.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MessengerError;
use crate::schema::Schema;

/// Message type of a payment request.
pub const PAYMENT_REQUEST: &str = "PAYMENT_REQUEST";

/// Length of a canonical UUID string.
pub const UUID_STR_LEN: usize = 36;

/// A typed application message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    pub content: Value,
}

impl ProtocolMessage {
    pub fn new(message_type: impl Into<String>, content: Value) -> Self {
        Self {
            message_type: message_type.into(),
            content,
        }
    }

    /// Parse an inbound payload.
    pub fn from_value(value: Value) -> Result<Self, MessengerError> {
        serde_json::from_value(value).map_err(|e| MessengerError::MalformedMessage(e.to_string()))
    }
}

/// Binds a message type to the schema its content must satisfy.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageSchema {
    pub message_type: String,
    pub schema: Schema,
}

impl MessageSchema {
    pub fn new(message_type: impl Into<String>, schema: Schema) -> Self {
        Self {
            message_type: message_type.into(),
            schema,
        }
    }
}

/// Immutable `type -> schema` table.
#[derive(Debug, Clone, Default)]
pub struct ProtocolSchemas {
    by_type: HashMap<String, Schema>,
}

impl ProtocolSchemas {
    /// Build the table. A later entry for the same type wins.
    pub fn new(schemas: impl IntoIterator<Item = MessageSchema>) -> Self {
        Self {
            by_type: schemas
                .into_iter()
                .map(|s| (s.message_type, s.schema))
                .collect(),
        }
    }

    pub fn get(&self, message_type: &str) -> Option<&Schema> {
        self.by_type.get(message_type)
    }

    pub fn contains(&self, message_type: &str) -> bool {
        self.by_type.contains_key(message_type)
    }

    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }

    /// Check a message's type is known and its content matches.
    pub fn validate(&self, message: &ProtocolMessage) -> Result<(), MessengerError> {
        let schema = self
            .get(&message.message_type)
            .ok_or_else(|| MessengerError::UnknownMessageType(message.message_type.clone()))?;

        schema
            .validate(&message.content)
            .map_err(|v| MessengerError::SchemaViolation {
                message_type: message.message_type.clone(),
                path: v.path,
                reason: v.reason,
            })
    }
}

/// `{amount, assetId(36), toAddress: {addressHash, secIdentifier?}}`, closed.
pub fn payment_request_schema() -> MessageSchema {
    let to_address = Schema::object()
        .required("addressHash", Schema::string())
        .optional("secIdentifier", Schema::string());

    MessageSchema::new(
        PAYMENT_REQUEST,
        Schema::object()
            .required("amount", Schema::string())
            .required("assetId", Schema::string_len(UUID_STR_LEN))
            .required("toAddress", to_address),
    )
}
