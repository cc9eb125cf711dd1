//! Error types for the secure messaging layers.

use thiserror::Error;

use crux_net_core::{CoreError, Identity};
use crux_net_transport::{RepositoryError, TransportError};

/// Errors that can occur while sending or receiving secure packets.
#[derive(Debug, Clone, Error)]
pub enum SecureError {
    /// Recipient or claimed sender is not registered.
    #[error("no such user: {0}")]
    UnknownIdentity(Identity),

    /// The identity repository failed.
    #[error("identity lookup failed: {0}")]
    Repository(#[from] RepositoryError),

    /// Decryption or certificate failure.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The decrypted bytes are not a secure packet.
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    /// A nonce-bound certificate was presented twice.
    #[error("replayed message {message_id} from {sender}")]
    Replayed { sender: Identity, message_id: String },

    /// A certified packet is too old, or older than the sender's replay floor.
    #[error("expired message {message_id} from {sender}")]
    Expired { sender: Identity, message_id: String },

    /// The endpoint has no identity claim and cannot receive.
    #[error("endpoint is send-only")]
    SendOnly,

    /// Application payload could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl SecureError {
    /// Whether this failure is attributable to the recipient lookup.
    pub fn is_lookup(&self) -> bool {
        matches!(self, SecureError::UnknownIdentity(_) | SecureError::Repository(_))
    }

    /// Whether this failure came from the transport.
    pub fn is_transport(&self) -> bool {
        matches!(self, SecureError::Transport(_))
    }
}

/// Errors raised by the protocol messenger.
#[derive(Debug, Clone, Error)]
pub enum MessengerError {
    /// No schema is registered for this message type.
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    /// Content does not match the registered schema.
    #[error("message failed validation: {message_type} at {path}: {reason}")]
    SchemaViolation {
        message_type: String,
        path: String,
        reason: String,
    },

    /// Inbound payload is not a protocol message at all.
    #[error("malformed protocol message: {0}")]
    MalformedMessage(String),

    /// Failure in the underlying secure network.
    #[error(transparent)]
    Network(#[from] SecureError),
}

impl MessengerError {
    /// Whether the message was rejected by type or schema checks.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            MessengerError::UnknownMessageType(_)
                | MessengerError::SchemaViolation { .. }
                | MessengerError::MalformedMessage(_)
        )
    }
}

/// Result type for secure network operations.
pub type Result<T> = std::result::Result<T, SecureError>;
