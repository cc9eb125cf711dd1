//! # Crux Net
//!
//! Identity-addressed secure messaging for Crux.
//!
//! ## Overview
//!
//! - **Certificates**: ES256K compact tokens proving a sender holds the key
//!   registered for its identity
//! - **Encryption**: ECIES over secp256k1 to the recipient's registered key
//! - **Secure network**: encrypted, optionally certified packets on
//!   `topic_<identity>` channels
//! - **Protocol messenger**: typed messages checked against a schema before
//!   sending and again on receipt
//! - **Remote keys**: a key manager whose private key lives on another
//!   endpoint, reached over the messenger
//! - **Gateway**: per-protocol channels with pluggable validation
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use crux_net::core::{Identity, IdentityClaim, LocalKeyManager};
//! use crux_net::transport::{MemoryBroker, MemoryIdentityRepository, SharedTransportFactory};
//! use crux_net::{Endpoint, EndpointConfig, ProtocolMessage};
//! use serde_json::json;
//!
//! async fn example() {
//!     let broker = MemoryBroker::new();
//!     let transports = Arc::new(SharedTransportFactory::new(Arc::new(broker.transport())));
//!     let repository = Arc::new(MemoryIdentityRepository::new());
//!
//!     let claim = IdentityClaim::new(Identity::new("alice"), Arc::new(LocalKeyManager::generate()));
//!     let alice = Endpoint::connect(
//!         Some(claim),
//!         repository,
//!         transports,
//!         EndpointConfig::default(),
//!         vec![],
//!     )
//!     .await
//!     .unwrap();
//!
//!     let payment = ProtocolMessage::new(
//!         "PAYMENT_REQUEST",
//!         json!({
//!             "amount": "10",
//!             "assetId": "3a5b1d0e-8f4c-4b7a-9e2d-1c6f0a9b8e7d",
//!             "toAddress": {"addressHash": "0xabc"}
//!         }),
//!     );
//!     alice.send(&payment, &Identity::new("bob")).await.unwrap();
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `crux_net::core` - Identities, keys, tokens, certificates, ECIES
//! - `crux_net::transport` - Transport and identity repository seams
//! - `crux_net::secure` - Secure network and protocol messenger
//! - `crux_net::rpc` - Remote key client, host and manager
//! - `crux_net::gateway` - Gateway channels

pub mod endpoint;
pub mod error;

// Re-export component crates
pub use crux_net_core as core;
pub use crux_net_gateway as gateway;
pub use crux_net_rpc as rpc;
pub use crux_net_secure as secure;
pub use crux_net_transport as transport;

// Re-export main types for convenience
pub use endpoint::{builtin_schemas, Endpoint, EndpointConfig};
pub use error::{EndpointError, Result};

pub use crux_net_core::{
    Certificate, CertificateBinding, CertificateManager, EncryptionManager, Identity,
    IdentityClaim, KeyManager, LocalKeyManager,
};
pub use crux_net_rpc::{HostPolicy, KeyMethod, RemoteKeyHost, RemoteKeyManager, RpcConfig};
pub use crux_net_secure::{
    MessageSchema, ProtocolMessage, ProtocolMessenger, Schema, SecureNetwork, SecureNetworkConfig,
};
