//! # Crux Net Gateway
//!
//! A lighter packet protocol over the same certificates and transport as
//! [`crux_net_secure`]. Messages are gated by a per-protocol
//! [`ProtocolHandler`] instead of a schema table, certificates are bound to
//! the packet's `messageId`, and encryption is optional.
//!
//! A channel end is either a [`GatewaySender`] (knows a recipient) or a
//! [`GatewayReceiver`] (owns a key manager), never both.
//!
//! Packets for protocol `p` addressed to identity `i` travel on the topic
//! `gateway_<p>_<i>`.

pub mod config;
pub mod error;
pub mod handler;
pub mod packet;
pub mod receiver;
pub mod sender;

pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
pub use handler::{ProtocolHandler, SchemaHandler};
pub use packet::{GatewayMetadata, GatewayPacket};
pub use receiver::{GatewayListener, GatewayReceiver};
pub use sender::GatewaySender;
