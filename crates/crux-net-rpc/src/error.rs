//! Error types for remote key invocation.

use thiserror::Error;
use uuid::Uuid;

use crux_net_core::CoreError;
use crux_net_secure::MessengerError;

/// Errors that can occur while invoking or serving remote key operations.
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    /// The method is not one of the whitelisted key manager methods.
    #[error("invalid key manager method: {0}")]
    InvalidMethod(String),

    /// No response arrived in time. The pending entry has been removed.
    #[error("invocation {invocation_id} timed out after {after_ms}ms")]
    Timeout { invocation_id: Uuid, after_ms: u64 },

    /// The messaging channel failed while the invocation was pending.
    #[error("channel error: {0}")]
    Channel(MessengerError),

    /// The key holder answered with an error.
    #[error("remote key manager error: {0}")]
    Remote(String),

    /// The key holder refused the caller.
    #[error("invocation refused: {0}")]
    Refused(String),

    /// Nothing is pending under this id, or it is already being awaited.
    #[error("unknown invocation: {0}")]
    UnknownInvocation(Uuid),

    /// The pending entry was dropped without an answer.
    #[error("invocation cancelled")]
    Cancelled,

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("malformed result: {0}")]
    MalformedResult(String),

    /// The local key manager failed while serving a request.
    #[error(transparent)]
    Key(#[from] CoreError),

    /// Sending the request or response failed.
    #[error(transparent)]
    Messenger(#[from] MessengerError),
}

impl From<RpcError> for CoreError {
    fn from(e: RpcError) -> Self {
        match e {
            RpcError::Key(inner) => inner,
            other => CoreError::KeyManager(other.to_string()),
        }
    }
}

/// Result type for RPC operations.
pub type Result<T> = std::result::Result<T, RpcError>;
