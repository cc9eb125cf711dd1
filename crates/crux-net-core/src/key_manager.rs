//! The key-capability abstraction.
//!
//! A [`KeyManager`] performs private-key operations without exposing key
//! material. Callers cannot tell a local key from a remote one except by
//! latency and by the extra failure modes of the remote path.

use async_trait::async_trait;
use serde_json::Value;

use crate::crypto::{Keypair, Secp256k1PublicKey, SharedSecret};
use crate::encryption::{self, EncryptedEnvelope};
use crate::error::{CoreError, Result};
use crate::token::CompactToken;

/// Capability interface over a private key.
///
/// `derive_shared_secret` and `decrypt` are optional capabilities; the
/// default implementations report [`CoreError::Unsupported`].
#[async_trait]
pub trait KeyManager: Send + Sync {
    /// Sign a JSON payload, producing a compact `ES256K` token.
    async fn sign(&self, payload: &Value) -> Result<String>;

    /// The public half of the managed key.
    async fn public_key(&self) -> Result<Secp256k1PublicKey>;

    /// ECDH with a peer public key.
    async fn derive_shared_secret(&self, _peer: &Secp256k1PublicKey) -> Result<SharedSecret> {
        Err(CoreError::Unsupported("deriveSharedSecret"))
    }

    /// Open an ECIES envelope addressed to the managed key.
    async fn decrypt(&self, _envelope: &EncryptedEnvelope) -> Result<Vec<u8>> {
        Err(CoreError::Unsupported("decrypt"))
    }
}

/// A key manager holding its secp256k1 key in process memory.
#[derive(Debug, Clone)]
pub struct LocalKeyManager {
    keypair: Keypair,
}

impl LocalKeyManager {
    pub fn new(keypair: Keypair) -> Self {
        Self { keypair }
    }

    /// Generate a fresh random key.
    pub fn generate() -> Self {
        Self::new(Keypair::generate())
    }

    /// Create from a 32-byte private key.
    pub fn from_seed(seed: &[u8; 32]) -> Result<Self> {
        Ok(Self::new(Keypair::from_seed(seed)?))
    }

    /// Synchronous access to the public key.
    pub fn public_key_sync(&self) -> Secp256k1PublicKey {
        self.keypair.public_key()
    }
}

#[async_trait]
impl KeyManager for LocalKeyManager {
    async fn sign(&self, payload: &Value) -> Result<String> {
        CompactToken::sign(&self.keypair, payload)
    }

    async fn public_key(&self) -> Result<Secp256k1PublicKey> {
        Ok(self.keypair.public_key())
    }

    async fn derive_shared_secret(&self, peer: &Secp256k1PublicKey) -> Result<SharedSecret> {
        Ok(self.keypair.diffie_hellman(peer))
    }

    async fn decrypt(&self, envelope: &EncryptedEnvelope) -> Result<Vec<u8>> {
        encryption::open(self.keypair.secret(), envelope)
    }
}

/// A verifier-only capability: knows a public key, holds no secret.
#[derive(Debug, Clone)]
pub struct PublicKeyOnly {
    public_key: Secp256k1PublicKey,
}

impl PublicKeyOnly {
    pub fn new(public_key: Secp256k1PublicKey) -> Self {
        Self { public_key }
    }
}

#[async_trait]
impl KeyManager for PublicKeyOnly {
    async fn sign(&self, _payload: &Value) -> Result<String> {
        Err(CoreError::Unsupported("sign"))
    }

    async fn public_key(&self) -> Result<Secp256k1PublicKey> {
        Ok(self.public_key)
    }
}
