//! # Crux Net RPC
//!
//! Lets a party use a private key held by another endpoint as if it were
//! local.
//!
//! ## Roles
//!
//! - [`RemoteKeyClient`] - sends [`Invocation`]s and correlates the answers
//!   by invocation id, with a timeout
//! - [`RemoteKeyHost`] - runs whitelisted [`KeyMethod`]s on a local key
//!   manager and answers the caller
//! - [`RemoteKeyManager`] - a [`KeyManager`](crux_net_core::KeyManager)
//!   backed by a client
//!
//! ## Message Flow
//!
//! ```text
//! Caller                                  Key holder
//!   |--- KEY_MANAGER_REQUEST {id, method, args} --->|
//!   |                                               | run method
//!   |<-- KEY_MANAGER_RESPONSE {id, result|error} ---|
//! ```
//!
//! Both messages travel over an authenticated, encrypted
//! [`ProtocolMessenger`](crux_net_secure::ProtocolMessenger).

pub mod client;
pub mod error;
pub mod host;
pub mod invocation;
pub mod manager;
pub mod method;
pub mod pending;

#[cfg(test)]
mod test_support;

pub use client::{RemoteKeyClient, RpcConfig};
pub use error::{Result, RpcError};
pub use host::{execute, HostPolicy, RemoteKeyHost};
pub use invocation::{
    key_manager_request_schema, key_manager_response_schema, rpc_schemas, Invocation,
    InvocationResult, KEY_MANAGER_REQUEST, KEY_MANAGER_RESPONSE,
};
pub use manager::RemoteKeyManager;
pub use method::KeyMethod;
pub use pending::PendingInvocations;
