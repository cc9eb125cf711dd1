//! The receive-only end of a gateway channel.
//!
//! Checks, in order:
//!
//! 1. decrypt if the payload is an ECIES envelope, else take it as plaintext
//! 2. parse the packet
//! 3. `protocolName` matches the handler
//! 4. the handler accepts the message
//! 5. if certified: sender is registered, the certificate is bound to
//!    `messageId` together with this receiver, the protocol, `createdAt` and
//!    the message, and the id is fresh for that sender
//! 6. if uncertified: allowed unless certificates are required

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use tokio::sync::{Mutex, OnceCell, RwLock};

use crux_net_core::{
    CertificateManager, EncryptedEnvelope, EncryptionManager, Freshness, Identity, IdentityClaim,
    ReplayGuard,
};
use crux_net_transport::{IdentityRepository, Subscriber, TransportError, TransportFactory};

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::handler::ProtocolHandler;
use crate::packet::{certificate_binding, GatewayMetadata, GatewayPacket};

/// Receives what a gateway receiver accepts or rejects.
#[async_trait]
pub trait GatewayListener: Send + Sync {
    async fn on_packet(&self, message: Value, metadata: GatewayMetadata, sender: Option<Identity>);

    async fn on_error(&self, error: &GatewayError);
}

/// Receives gateway packets of one protocol addressed to one identity.
#[derive(Clone)]
pub struct GatewayReceiver {
    inner: Arc<ReceiverInner>,
}

struct ReceiverInner {
    claim: IdentityClaim,
    handler: Arc<dyn ProtocolHandler>,
    repository: Arc<dyn IdentityRepository>,
    transports: Arc<dyn TransportFactory>,
    config: GatewayConfig,
    listeners: RwLock<Vec<Arc<dyn GatewayListener>>>,
    subscription: OnceCell<()>,
    replay: Mutex<ReplayGuard>,
}

impl GatewayReceiver {
    /// The claim's key manager decrypts encrypted packets.
    pub fn new(
        claim: IdentityClaim,
        handler: Arc<dyn ProtocolHandler>,
        repository: Arc<dyn IdentityRepository>,
        transports: Arc<dyn TransportFactory>,
        config: GatewayConfig,
    ) -> Self {
        let replay = ReplayGuard::new(config.replay_window).with_max_age(config.max_age_ms);
        Self {
            inner: Arc::new(ReceiverInner {
                claim,
                handler,
                repository,
                transports,
                config,
                listeners: RwLock::new(Vec::new()),
                subscription: OnceCell::new(),
                replay: Mutex::new(replay),
            }),
        }
    }

    pub fn identity(&self) -> &Identity {
        self.inner.claim.identity()
    }

    pub fn topic(&self) -> String {
        self.identity().gateway_topic(self.inner.handler.name())
    }

    /// Subscribe to the gateway topic. Idempotent.
    pub async fn initialize(&self) -> Result<()> {
        self.inner
            .subscription
            .get_or_try_init(|| async {
                let identity = self.identity();
                let transport = self
                    .inner
                    .transports
                    .transport_for(Some(identity), identity)
                    .await?;
                let inbound: Arc<dyn Subscriber> = Arc::new(Inbound {
                    inner: Arc::clone(&self.inner),
                });
                transport.subscribe(&self.topic(), inbound).await?;
                tracing::debug!(topic = %self.topic(), "subscribed to gateway topic");
                Ok::<(), GatewayError>(())
            })
            .await?;
        Ok(())
    }

    pub async fn receive(&self, listener: Arc<dyn GatewayListener>) -> Result<()> {
        self.initialize().await?;
        self.inner.listeners.write().await.push(listener);
        Ok(())
    }
}

impl ReceiverInner {
    async fn open(&self, payload: &[u8]) -> Result<(GatewayPacket, Option<Identity>)> {
        let plaintext = match EncryptedEnvelope::from_bytes(payload) {
            Ok(envelope) => {
                EncryptionManager::decrypt(&envelope, self.claim.key_manager().as_ref()).await?
            }
            Err(_) => payload.to_vec(),
        };
        let packet = GatewayPacket::from_bytes(&plaintext)?;

        let expected = self.handler.name();
        if packet.metadata.protocol_name != expected {
            return Err(GatewayError::ProtocolMismatch {
                expected: expected.to_owned(),
                got: packet.metadata.protocol_name,
            });
        }
        if !self.handler.validate_message(&packet.message) {
            return Err(GatewayError::InvalidMessage(expected.to_owned()));
        }

        let certificate = match packet.metadata.sender_certificate.clone() {
            Some(certificate) => certificate,
            None if self.config.require_certificate => return Err(GatewayError::MissingCertificate),
            None => return Ok((packet, None)),
        };

        let record = self
            .repository
            .get_by_identity(&certificate.claim)
            .await?
            .ok_or_else(|| GatewayError::UnknownIdentity(certificate.claim.clone()))?;
        let bound = certificate_binding(self.claim.identity(), &packet.message, &packet.metadata)?;
        CertificateManager::verify(&certificate, &record.public_key, &bound)?;

        let sender = certificate.claim;
        let message_id = packet.metadata.message_id.clone();
        let verdict = self
            .replay
            .lock()
            .await
            .check(&sender, &message_id, packet.metadata.created_at);
        match verdict {
            Freshness::Fresh => {}
            Freshness::Duplicate => return Err(GatewayError::Replayed { sender, message_id }),
            Freshness::Expired => return Err(GatewayError::Expired { sender, message_id }),
        }
        Ok((packet, Some(sender)))
    }

    async fn report(&self, error: GatewayError) {
        let listeners = self.listeners.read().await.clone();
        for listener in listeners {
            listener.on_error(&error).await;
        }
    }
}

struct Inbound {
    inner: Arc<ReceiverInner>,
}

#[async_trait]
impl Subscriber for Inbound {
    async fn on_message(&self, topic: &str, payload: Bytes) {
        match self.inner.open(&payload).await {
            Ok((packet, sender)) => {
                let listeners = self.inner.listeners.read().await.clone();
                for listener in listeners {
                    listener
                        .on_packet(packet.message.clone(), packet.metadata.clone(), sender.clone())
                        .await;
                }
            }
            Err(error) => {
                tracing::warn!(topic, error = %error, "dropping gateway packet");
                self.inner.report(error).await;
            }
        }
    }

    async fn on_error(&self, error: TransportError) {
        tracing::warn!(error = %error, "transport error on gateway topic");
        self.inner.report(GatewayError::Transport(error)).await;
    }
}
