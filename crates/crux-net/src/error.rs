//! Error types for endpoints.

use thiserror::Error;

use crux_net_rpc::RpcError;
use crux_net_secure::{MessengerError, SecureError};

/// Errors that can occur during endpoint operations.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// Secure network error.
    #[error("network error: {0}")]
    Network(#[from] SecureError),

    /// Protocol messenger error.
    #[error("messenger error: {0}")]
    Messenger(#[from] MessengerError),

    /// Remote key error.
    #[error("rpc error: {0}")]
    Rpc(#[from] RpcError),

    /// The operation needs an identity claim and this endpoint has none.
    #[error("endpoint has no identity claim")]
    SendOnly,

    /// Configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl EndpointError {
    /// Whether a send failed because the recipient could not be resolved.
    pub fn is_lookup(&self) -> bool {
        match self {
            EndpointError::Network(e) | EndpointError::Messenger(MessengerError::Network(e)) => {
                e.is_lookup()
            }
            _ => false,
        }
    }

    /// Whether a send was rejected by type or schema checks.
    pub fn is_validation(&self) -> bool {
        matches!(self, EndpointError::Messenger(e) if e.is_validation())
    }

    /// Whether a send failed in the transport.
    pub fn is_transport(&self) -> bool {
        match self {
            EndpointError::Network(e) | EndpointError::Messenger(MessengerError::Network(e)) => {
                e.is_transport()
            }
            _ => false,
        }
    }
}

/// Result type for endpoint operations.
pub type Result<T> = std::result::Result<T, EndpointError>;
