//! Transport seam: the abstract pub/sub interface consumed by the secure layers.
//!
//! Concrete bindings (MQTT, WebSocket, ...) live outside this workspace and
//! only need to satisfy these traits. Topics follow the
//! `"topic_" + identity` convention (see [`Identity::topic`]).

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crux_net_core::Identity;

use crate::error::{Result, TransportError};

/// Receives what a transport delivers on a subscribed topic.
///
/// Implementations must be thread-safe (Send + Sync). A transport may invoke
/// these concurrently and in any order.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// A payload arrived on `topic`.
    async fn on_message(&self, topic: &str, payload: Bytes);

    /// The transport reported a failure for this subscription.
    async fn on_error(&self, error: TransportError);
}

/// Pub/sub transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publish a payload to a topic.
    ///
    /// Resolves once the transport accepted the payload; delivery is not
    /// acknowledged.
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()>;

    /// Subscribe to a topic for the lifetime of the transport.
    async fn subscribe(&self, topic: &str, subscriber: Arc<dyn Subscriber>) -> Result<()>;
}

/// Resolves which transport instance carries traffic between two parties.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// `local` is `None` for anonymous senders.
    async fn transport_for(
        &self,
        local: Option<&Identity>,
        remote: &Identity,
    ) -> Result<Arc<dyn Transport>>;
}

/// A factory that hands out the same transport for every pair.
#[derive(Clone)]
pub struct SharedTransportFactory {
    transport: Arc<dyn Transport>,
}

impl SharedTransportFactory {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl TransportFactory for SharedTransportFactory {
    async fn transport_for(
        &self,
        _local: Option<&Identity>,
        _remote: &Identity,
    ) -> Result<Arc<dyn Transport>> {
        Ok(Arc::clone(&self.transport))
    }
}
