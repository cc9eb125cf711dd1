//! Error types for gateway channels.

use thiserror::Error;

use crux_net_core::{CoreError, Identity};
use crux_net_transport::{RepositoryError, TransportError};

/// Errors that can occur on a gateway channel.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Recipient or claimed sender is not registered.
    #[error("no such user: {0}")]
    UnknownIdentity(Identity),

    #[error("identity lookup failed: {0}")]
    Repository(#[from] RepositoryError),

    /// Decryption or certificate failure.
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("malformed gateway packet: {0}")]
    MalformedPacket(String),

    /// The packet was addressed to a different protocol.
    #[error("protocol mismatch: expected {expected}, got {got}")]
    ProtocolMismatch { expected: String, got: String },

    /// The protocol handler rejected the message.
    #[error("message failed validation for protocol {0}")]
    InvalidMessage(String),

    /// The receiver only accepts certified packets.
    #[error("packet carries no sender certificate")]
    MissingCertificate,

    #[error("replayed message {message_id} from {sender}")]
    Replayed { sender: Identity, message_id: String },

    /// Outside the accepted age, or older than what the replay window still covers.
    #[error("expired message {message_id} from {sender}")]
    Expired { sender: Identity, message_id: String },

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
