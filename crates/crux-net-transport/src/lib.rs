//! # Crux Net Transport
//!
//! The external collaborator seams of Crux networking: a topic-based
//! pub/sub [`Transport`], a [`TransportFactory`] choosing the transport for a
//! pair of parties, and an [`IdentityRepository`] resolving identities to
//! public keys.
//!
//! ## Overview
//!
//! The secure layers treat the transport as untrusted: it offers neither
//! confidentiality nor ordering nor delivery guarantees. In-memory
//! implementations ([`MemoryBroker`], [`MemoryIdentityRepository`]) are
//! provided for tests and single-process setups.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use crux_net_transport::{MemoryBroker, SharedTransportFactory};
//!
//! let broker = MemoryBroker::new();
//! let factory = SharedTransportFactory::new(Arc::new(broker.transport()));
//! ```

pub mod error;
pub mod memory;
pub mod repository;
pub mod traits;

pub use error::{RepositoryError, Result, TransportError};
pub use memory::{MemoryBroker, MemoryTransport};
pub use repository::{IdentityRecord, IdentityRepository, MemoryIdentityRepository};
pub use traits::{SharedTransportFactory, Subscriber, Transport, TransportFactory};
