//! Error types for Crux core primitives.

use thiserror::Error;

/// Errors that can occur during identity, certificate and envelope operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid private key")]
    InvalidPrivateKey,

    /// The certificate signature or its bound value did not check out.
    #[error("could not verify sender certificate")]
    CertificateVerification,

    /// MAC mismatch or otherwise undecryptable envelope.
    #[error("decryption failed")]
    DecryptionFailed,

    #[error("encryption error: {0}")]
    EncryptionError(String),

    #[error("malformed token: {0}")]
    MalformedToken(String),

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// The key manager does not offer this capability.
    #[error("key manager does not support {0}")]
    Unsupported(&'static str),

    /// A delegated key operation failed on the far side.
    #[error("key manager failure: {0}")]
    KeyManager(String),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::DecodingError(e.to_string())
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
