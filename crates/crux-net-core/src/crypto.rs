//! Cryptographic primitives for Crux.
//!
//! Wraps secp256k1 signing and key agreement with strong types.

use std::fmt;

use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{PublicKey, SecretKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{CoreError, Result};

/// Length of an uncompressed SEC1 point.
pub const PUBLIC_KEY_LEN: usize = 65;

/// A secp256k1 public key.
///
/// Encoded on the wire as the hex of its uncompressed SEC1 form (`04 || x || y`).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Secp256k1PublicKey(PublicKey);

impl Secp256k1PublicKey {
    /// Parse from SEC1 bytes (compressed or uncompressed).
    pub fn from_sec1_bytes(bytes: &[u8]) -> Result<Self> {
        PublicKey::from_sec1_bytes(bytes)
            .map(Self)
            .map_err(|_| CoreError::InvalidPublicKey)
    }

    /// Uncompressed SEC1 encoding.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_encoded_point(false).as_bytes().to_vec()
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|_| CoreError::InvalidPublicKey)?;
        Self::from_sec1_bytes(&bytes)
    }

    /// Verify a raw 64-byte `r || s` signature over a message.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<()> {
        let verifying_key = VerifyingKey::from_sec1_bytes(&self.to_bytes())
            .map_err(|_| CoreError::InvalidPublicKey)?;
        let sig = Signature::from_slice(signature).map_err(|_| CoreError::InvalidSignature)?;

        verifying_key
            .verify(message, &sig)
            .map_err(|_| CoreError::InvalidSignature)
    }

    pub(crate) fn as_inner(&self) -> &PublicKey {
        &self.0
    }
}

impl From<PublicKey> for Secp256k1PublicKey {
    fn from(pk: PublicKey) -> Self {
        Self(pk)
    }
}

impl fmt::Debug for Secp256k1PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secp256k1Pub({})", &self.to_hex()[..18])
    }
}

impl fmt::Display for Secp256k1PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Secp256k1PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Secp256k1PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// A 32-byte ECDH shared secret (the x coordinate of the shared point).
#[derive(Clone, PartialEq, Eq)]
pub struct SharedSecret([u8; 32]);

impl SharedSecret {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| CoreError::DecodingError(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CoreError::DecodingError("shared secret must be 32 bytes".into()))?;
        Ok(Self(arr))
    }

    pub(crate) fn derive(secret: &SecretKey, peer: &Secp256k1PublicKey) -> Self {
        let shared = k256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), peer.as_inner().as_affine());
        let mut out = [0u8; 32];
        out.copy_from_slice(shared.raw_secret_bytes());
        Self(out)
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(..)")
    }
}

/// A secp256k1 keypair.
#[derive(Clone)]
pub struct Keypair {
    secret: SecretKey,
}

impl Keypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        Self {
            secret: SecretKey::random(&mut OsRng),
        }
    }

    /// Create from a 32-byte seed.
    ///
    /// Fails if the seed is zero or not below the curve order.
    pub fn from_seed(seed: &[u8; 32]) -> Result<Self> {
        let secret = SecretKey::from_slice(seed).map_err(|_| CoreError::InvalidPrivateKey)?;
        Ok(Self { secret })
    }

    /// Get the public key.
    pub fn public_key(&self) -> Secp256k1PublicKey {
        Secp256k1PublicKey(self.secret.public_key())
    }

    /// Sign a message (ECDSA-SHA256, RFC6979 nonces, low-S). Returns `r || s`.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        let signing_key = SigningKey::from(&self.secret);
        let sig: Signature = signing_key.sign(message);
        let mut out = [0u8; 64];
        out.copy_from_slice(&sig.to_bytes());
        out
    }

    /// ECDH with a peer public key.
    pub fn diffie_hellman(&self, peer: &Secp256k1PublicKey) -> SharedSecret {
        SharedSecret::derive(&self.secret, peer)
    }

    pub(crate) fn secret(&self) -> &SecretKey {
        &self.secret
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keypair({:?})", self.public_key())
    }
}
