//! Error types for the transport and repository seams.

use thiserror::Error;

/// Errors raised by a pub/sub transport.
///
/// Opaque to the secure layers, which only pass them through.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Publishing a payload failed.
    #[error("publish failed: {0}")]
    Publish(String),

    /// Subscribing to a topic failed.
    #[error("subscribe failed: {0}")]
    Subscribe(String),

    /// The connection dropped.
    #[error("transport disconnected: {0}")]
    Disconnected(String),

    /// No transport is available for the requested pair of parties.
    #[error("no transport for {0}")]
    NoRoute(String),
}

/// Errors raised by an identity repository.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    /// The backing service could not answer.
    #[error("repository unavailable: {0}")]
    Unavailable(String),

    /// The stored record is unusable.
    #[error("invalid identity record: {0}")]
    InvalidRecord(String),
}

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;
