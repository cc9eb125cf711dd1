//! The secure send/receive engine.
//!
//! Composes identity resolution, certificates and ECIES into authenticated,
//! encrypted point-to-point messaging keyed by [`Identity`].
//!
//! ## Outbound
//!
//! ```text
//! resolve recipient key -> serialize data -> certify (if claimed)
//!   -> encode SecurePacket -> ECIES to recipient -> publish "topic_<recipient>"
//! ```
//!
//! ## Inbound
//!
//! ```text
//! decrypt with own key -> parse SecurePacket -> resolve claimed sender
//!   -> verify certificate -> replay check -> deliver(data, sender)
//! ```
//!
//! With nonce binding the receiver rebuilds the bound nonce from its own
//! identity and the packet it decrypted, never from a value the sender
//! asserts. A certificate lifted onto another payload or re-encrypted to
//! another recipient fails verification.
//!
//! Every inbound failure drops the packet and is reported once through the
//! listeners' error channel. A packet reaches `on_message` at most once per
//! transport delivery and only after every check passed.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, OnceCell, RwLock};

use crux_net_core::replay::{DEFAULT_MAX_AGE_MS, DEFAULT_REPLAY_WINDOW};
use crux_net_core::{
    now_millis, BoundValue, CertificateBinding, CertificateManager, CoreError, EncryptionManager,
    Freshness, Identity, IdentityClaim, ReplayGuard,
};
use crux_net_transport::{
    IdentityRecord, IdentityRepository, Subscriber, TransportError, TransportFactory,
};

use crate::error::{Result, SecureError};
use crate::packet::SecurePacket;

/// Configuration for a secure network endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SecureNetworkConfig {
    /// What outgoing certificates are bound to, and what incoming ones must be.
    pub binding: CertificateBinding,
    /// Nonces remembered per sender. Zero disables replay checks.
    pub replay_window: usize,
    /// Oldest accepted packet age in milliseconds. Zero disables the bound.
    pub max_age_ms: u64,
}

impl Default for SecureNetworkConfig {
    fn default() -> Self {
        Self {
            binding: CertificateBinding::MessageNonce,
            replay_window: DEFAULT_REPLAY_WINDOW,
            max_age_ms: DEFAULT_MAX_AGE_MS,
        }
    }
}

/// Receives what a secure network endpoint accepts or rejects.
#[async_trait]
pub trait PacketListener: Send + Sync {
    /// A packet passed decryption and, if certified, verification.
    ///
    /// `sender` is `None` for anonymous packets.
    async fn on_message(&self, data: Value, sender: Option<Identity>);

    /// An inbound packet was dropped, or the transport failed.
    async fn on_error(&self, error: &SecureError);
}

/// Authenticated, encrypted messaging for one identity.
///
/// Cheap to clone; clones share the same subscription and listeners.
#[derive(Clone)]
pub struct SecureNetwork {
    inner: Arc<NetworkInner>,
}

struct NetworkInner {
    /// Absent for send-only endpoints.
    self_claim: Option<IdentityClaim>,
    repository: Arc<dyn IdentityRepository>,
    transports: Arc<dyn TransportFactory>,
    config: SecureNetworkConfig,
    listeners: RwLock<Vec<Arc<dyn PacketListener>>>,
    /// Set once the self topic is subscribed.
    subscription: OnceCell<()>,
    replay: Mutex<ReplayGuard>,
}

impl SecureNetwork {
    /// Create an endpoint without touching the transport.
    pub fn new(
        self_claim: Option<IdentityClaim>,
        repository: Arc<dyn IdentityRepository>,
        transports: Arc<dyn TransportFactory>,
        config: SecureNetworkConfig,
    ) -> Self {
        let replay = ReplayGuard::new(config.replay_window).with_max_age(config.max_age_ms);
        Self {
            inner: Arc::new(NetworkInner {
                self_claim,
                repository,
                transports,
                config,
                listeners: RwLock::new(Vec::new()),
                subscription: OnceCell::new(),
                replay: Mutex::new(replay),
            }),
        }
    }

    /// Create an endpoint and, if it has a claim, subscribe to its topic.
    pub async fn connect(
        self_claim: Option<IdentityClaim>,
        repository: Arc<dyn IdentityRepository>,
        transports: Arc<dyn TransportFactory>,
        config: SecureNetworkConfig,
    ) -> Result<Self> {
        let network = Self::new(self_claim, repository, transports, config);
        if network.inner.self_claim.is_some() {
            network.initialize().await?;
        }
        Ok(network)
    }

    /// The endpoint's own identity, if it has a claim.
    pub fn identity(&self) -> Option<&Identity> {
        self.inner.self_claim.as_ref().map(IdentityClaim::identity)
    }

    pub fn claim(&self) -> Option<&IdentityClaim> {
        self.inner.self_claim.as_ref()
    }

    pub fn config(&self) -> &SecureNetworkConfig {
        &self.inner.config
    }

    pub fn repository(&self) -> &Arc<dyn IdentityRepository> {
        &self.inner.repository
    }

    /// Subscribe to the self topic. Idempotent.
    pub async fn initialize(&self) -> Result<()> {
        let claim = self.inner.self_claim.as_ref().ok_or(SecureError::SendOnly)?;
        let identity = claim.identity().clone();

        self.inner
            .subscription
            .get_or_try_init(|| async {
                let transport = self
                    .inner
                    .transports
                    .transport_for(Some(&identity), &identity)
                    .await?;
                let inbound: Arc<dyn Subscriber> = Arc::new(Inbound {
                    inner: Arc::clone(&self.inner),
                });
                transport.subscribe(&identity.topic(), inbound).await?;
                tracing::debug!(identity = %identity, "subscribed to self topic");
                Ok::<(), SecureError>(())
            })
            .await?;
        Ok(())
    }

    /// Register a listener for every inbound packet on the self topic.
    pub async fn receive(&self, listener: Arc<dyn PacketListener>) -> Result<()> {
        self.initialize().await?;
        self.inner.listeners.write().await.push(listener);
        Ok(())
    }

    pub async fn listener_count(&self) -> usize {
        self.inner.listeners.read().await.len()
    }

    /// Send `data` to `recipient`.
    ///
    /// Fire-and-forget: resolves once the transport accepted the packet.
    pub async fn send<T: Serialize + ?Sized>(&self, data: &T, recipient: &Identity) -> Result<()> {
        let record = self.inner.resolve(recipient).await?;
        let data =
            serde_json::to_string(data).map_err(|e| SecureError::Serialization(e.to_string()))?;

        let packet = self.inner.seal(data, recipient).await?;
        let envelope = EncryptionManager::encrypt(&packet.to_bytes()?, &record.public_key)?;
        let payload = Bytes::from(envelope.to_bytes()?);

        let transport = self
            .inner
            .transports
            .transport_for(self.identity(), recipient)
            .await?;
        transport.publish(&recipient.topic(), payload).await?;

        tracing::debug!(
            recipient = %recipient,
            anonymous = packet.is_anonymous(),
            "secure packet sent"
        );
        Ok(())
    }
}

impl NetworkInner {
    async fn resolve(&self, identity: &Identity) -> Result<IdentityRecord> {
        self.repository
            .get_by_identity(identity)
            .await?
            .ok_or_else(|| SecureError::UnknownIdentity(identity.clone()))
    }

    /// Wrap serialized data in a packet, certified when we hold a claim.
    async fn seal(&self, data: String, recipient: &Identity) -> Result<SecurePacket> {
        let claim = match &self.self_claim {
            Some(claim) => claim,
            None => {
                return Ok(SecurePacket {
                    certificate: None,
                    data,
                    message_id: None,
                    created_at: None,
                })
            }
        };

        let (bound, message_id, created_at) = match self.config.binding {
            CertificateBinding::MessageNonce => {
                let message_id = uuid::Uuid::new_v4().to_string();
                let created_at = now_millis();
                let bound = message_binding(&message_id, created_at, recipient, &data);
                (bound, Some(message_id), Some(created_at))
            }
            CertificateBinding::Claim => (BoundValue::Claim(claim.identity().clone()), None, None),
        };
        let certificate = CertificateManager::make(claim, &bound).await?;

        Ok(SecurePacket {
            certificate: Some(certificate),
            data,
            message_id,
            created_at,
        })
    }

    /// Run every inbound check. Nothing is delivered unless this succeeds.
    async fn open(&self, payload: &[u8]) -> Result<(Value, Option<Identity>)> {
        let claim = self.self_claim.as_ref().ok_or(SecureError::SendOnly)?;

        let plaintext =
            EncryptionManager::decrypt_bytes(payload, claim.key_manager().as_ref()).await?;
        let packet = SecurePacket::from_bytes(&plaintext)?;

        let sender = match &packet.certificate {
            None => None,
            Some(certificate) => {
                let record = self.resolve(&certificate.claim).await?;
                let expected = match self.config.binding {
                    CertificateBinding::MessageNonce => {
                        let (Some(message_id), Some(created_at)) =
                            (packet.message_id.as_deref(), packet.created_at)
                        else {
                            return Err(CoreError::CertificateVerification.into());
                        };
                        message_binding(message_id, created_at, claim.identity(), &packet.data)
                    }
                    CertificateBinding::Claim => BoundValue::Claim(certificate.claim.clone()),
                };
                CertificateManager::verify(certificate, &record.public_key, &expected)?;
                Some(certificate.claim.clone())
            }
        };

        let data: Value = serde_json::from_str(&packet.data)
            .map_err(|e| SecureError::MalformedPacket(e.to_string()))?;

        // Claim-bound packets carry no nonce; the guard is inert for them.
        if let (Some(sender), Some(message_id), Some(created_at)) =
            (&sender, &packet.message_id, packet.created_at)
        {
            let verdict = self
                .replay
                .lock()
                .await
                .check(sender, message_id, created_at);
            match verdict {
                Freshness::Fresh => {}
                Freshness::Duplicate => {
                    return Err(SecureError::Replayed {
                        sender: sender.clone(),
                        message_id: message_id.clone(),
                    })
                }
                Freshness::Expired => {
                    return Err(SecureError::Expired {
                        sender: sender.clone(),
                        message_id: message_id.clone(),
                    })
                }
            }
        }
        Ok((data, sender))
    }

    async fn deliver(&self, data: Value, sender: Option<Identity>) {
        let listeners = self.listeners.read().await.clone();
        for listener in listeners {
            listener.on_message(data.clone(), sender.clone()).await;
        }
    }

    async fn report(&self, error: SecureError) {
        let listeners = self.listeners.read().await.clone();
        if listeners.is_empty() {
            tracing::debug!(error = %error, "inbound error with no listener");
        }
        for listener in listeners {
            listener.on_error(&error).await;
        }
    }
}

/// The nonce a message-bound certificate signs.
fn message_binding(
    message_id: &str,
    created_at: u64,
    recipient: &Identity,
    data: &str,
) -> BoundValue {
    BoundValue::for_message(
        message_id,
        &[
            recipient.as_str().as_bytes(),
            created_at.to_string().as_bytes(),
            data.as_bytes(),
        ],
    )
}

/// Transport-facing side of a network endpoint.
struct Inbound {
    inner: Arc<NetworkInner>,
}

#[async_trait]
impl Subscriber for Inbound {
    async fn on_message(&self, topic: &str, payload: Bytes) {
        match self.inner.open(&payload).await {
            Ok((data, sender)) => self.inner.deliver(data, sender).await,
            Err(error) => {
                tracing::warn!(topic, error = %error, "dropping inbound packet");
                self.inner.report(error).await;
            }
        }
    }

    async fn on_error(&self, error: TransportError) {
        tracing::warn!(error = %error, "transport error on self topic");
        self.inner.report(SecureError::Transport(error)).await;
    }
}
