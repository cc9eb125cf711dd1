//! # Crux Net Secure
//!
//! Authenticated, encrypted point-to-point messaging between identities and
//! typed, schema-validated protocol dispatch on top of it.
//!
//! ## Layers
//!
//! - [`SecureNetwork`] - resolve recipient, certify, ECIES-encrypt, publish;
//!   and the inverse on receive
//! - [`ProtocolMessenger`] - `{type, content}` messages checked against a
//!   [`Schema`] before send and after receive
//!
//! Every inbound failure is reported through a single error channel per
//! endpoint and never reaches application message handlers.

pub mod error;
pub mod messenger;
pub mod network;
pub mod packet;
pub mod protocol;
pub mod schema;

#[cfg(test)]
mod test_support;

pub use error::{MessengerError, Result, SecureError};
pub use messenger::{error_handler_fn, handler_fn, ErrorHandler, MessageHandler, ProtocolMessenger};
pub use network::{PacketListener, SecureNetwork, SecureNetworkConfig};
pub use packet::SecurePacket;
pub use protocol::{
    payment_request_schema, MessageSchema, ProtocolMessage, ProtocolSchemas, PAYMENT_REQUEST,
    UUID_STR_LEN,
};
pub use schema::{Field, Schema, Violation};

pub use crux_net_core::ReplayGuard;
