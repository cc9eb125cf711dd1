//! # Crux Net Testkit
//!
//! Testing utilities for Crux networking.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: an in-memory network (broker, identity repository,
//!   transport factory) with registered parties, plus recording listeners
//!   and key managers
//! - **Generators**: proptest strategies for keys, identities, JSON payloads
//!   and protocol message content
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use crux_net_testkit::fixtures::{channel_listener, TestNetwork};
//!
//! # async fn example() {
//! let net = TestNetwork::new();
//! let alice = net.party("alice").await;
//! let bob = net.party("bob").await;
//!
//! let bob_net = net.secure_endpoint(&bob).await;
//! let (listener, mut inbox) = channel_listener();
//! bob_net.receive(listener).await.unwrap();
//!
//! net.secure_endpoint(&alice).await.send("hi", &bob.identity).await.unwrap();
//! # }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{
    channel_listener, multi_party, recv_within, CountingKeyManager, ListenerEvent, TestNetwork,
    TestParty,
};
