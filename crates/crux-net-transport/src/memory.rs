//! In-memory pub/sub broker.
//!
//! Used by tests and single-process deployments. Each publish fans out to
//! every subscriber of the topic on its own task, so delivery order is not
//! guaranteed, exactly like a real broker.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use crate::error::{Result, TransportError};
use crate::traits::{Subscriber, Transport};

/// Shared state for the in-memory broker.
pub struct MemoryBroker {
    /// Subscribers per topic.
    topics: RwLock<HashMap<String, Vec<Arc<dyn Subscriber>>>>,
    /// Number of accepted publishes.
    published: AtomicUsize,
    /// When set, every publish is rejected.
    reject_publishes: AtomicBool,
}

impl MemoryBroker {
    /// Create a new broker.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create a transport connected to this broker.
    pub fn transport(self: &Arc<Self>) -> MemoryTransport {
        MemoryTransport {
            broker: Arc::clone(self),
        }
    }

    /// Number of publishes accepted so far.
    pub fn published_count(&self) -> usize {
        self.published.load(Ordering::SeqCst)
    }

    /// Make every subsequent publish fail (or succeed again).
    pub fn reject_publishes(&self, reject: bool) {
        self.reject_publishes.store(reject, Ordering::SeqCst);
    }

    /// Number of subscribers on `topic`.
    pub async fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .await
            .get(topic)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Report a transport failure to every subscriber of `topic`.
    pub async fn inject_error(&self, topic: &str, error: TransportError) {
        for subscriber in self.subscribers(topic).await {
            let error = error.clone();
            tokio::spawn(async move { subscriber.on_error(error).await });
        }
    }

    async fn subscribers(&self, topic: &str) -> Vec<Arc<dyn Subscriber>> {
        self.topics
            .read()
            .await
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            published: AtomicUsize::new(0),
            reject_publishes: AtomicBool::new(false),
        }
    }
}

/// In-memory transport implementation.
#[derive(Clone)]
pub struct MemoryTransport {
    broker: Arc<MemoryBroker>,
}

impl MemoryTransport {
    pub fn broker(&self) -> &Arc<MemoryBroker> {
        &self.broker
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()> {
        if self.broker.reject_publishes.load(Ordering::SeqCst) {
            return Err(TransportError::Publish("broker rejected publish".into()));
        }
        self.broker.published.fetch_add(1, Ordering::SeqCst);

        let subscribers = self.broker.subscribers(topic).await;
        tracing::trace!(topic, fanout = subscribers.len(), "memory publish");

        for subscriber in subscribers {
            let topic = topic.to_owned();
            let payload = payload.clone();
            tokio::spawn(async move { subscriber.on_message(&topic, payload).await });
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str, subscriber: Arc<dyn Subscriber>) -> Result<()> {
        self.broker
            .topics
            .write()
            .await
            .entry(topic.to_owned())
            .or_default()
            .push(subscriber);
        Ok(())
    }
}
