//! # Crux Net Core
//!
//! Pure primitives for authenticated, encrypted messaging between Crux
//! identities.
//!
//! This crate contains no transport and no storage. It is computation over
//! identities, key capabilities, certificates and ECIES envelopes.
//!
//! ## Key Types
//!
//! - [`Identity`] - Textual party handle, also the pub/sub topic suffix
//! - [`KeyManager`] - Capability over a private key (sign, decrypt, derive)
//! - [`IdentityClaim`] - Binding of an identity to a key manager
//! - [`Certificate`] - Signed proof of who sent a packet
//! - [`EncryptedEnvelope`] - ECIES output
//!
//! ## Signature scheme
//!
//! ECDSA over secp256k1 with deterministic nonces, carried in compact
//! `ES256K` tokens. See [`token`].

pub mod certificate;
pub mod crypto;
pub mod encryption;
pub mod error;
pub mod identity;
pub mod key_manager;
pub mod replay;
pub mod token;

pub use certificate::{BoundValue, Certificate, CertificateBinding, CertificateManager};
pub use crypto::{Keypair, Secp256k1PublicKey, SharedSecret};
pub use encryption::{EncryptedEnvelope, EncryptionManager};
pub use error::{CoreError, Result};
pub use identity::{Identity, IdentityClaim};
pub use key_manager::{KeyManager, LocalKeyManager, PublicKeyOnly};
pub use replay::{now_millis, Freshness, ReplayGuard};
pub use token::CompactToken;
