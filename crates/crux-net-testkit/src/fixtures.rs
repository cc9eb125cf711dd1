//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crux_net_core::{
    EncryptedEnvelope, Identity, IdentityClaim, KeyManager, LocalKeyManager, Secp256k1PublicKey,
    SharedSecret,
};
use crux_net_secure::{PacketListener, SecureError, SecureNetwork, SecureNetworkConfig};
use crux_net_transport::{
    IdentityRecord, MemoryBroker, MemoryIdentityRepository, SharedTransportFactory,
};

/// A registered party: identity plus the key registered for it.
#[derive(Clone)]
pub struct TestParty {
    pub identity: Identity,
    pub key_manager: Arc<LocalKeyManager>,
}

impl TestParty {
    pub fn public_key(&self) -> Secp256k1PublicKey {
        self.key_manager.public_key_sync()
    }

    pub fn claim(&self) -> IdentityClaim {
        IdentityClaim::new(self.identity.clone(), self.key_manager.clone())
    }
}

/// An in-memory broker and identity repository shared by all parties.
pub struct TestNetwork {
    pub broker: Arc<MemoryBroker>,
    pub repository: Arc<MemoryIdentityRepository>,
    pub transports: Arc<SharedTransportFactory>,
}

impl TestNetwork {
    pub fn new() -> Self {
        let broker = MemoryBroker::new();
        let transports = Arc::new(SharedTransportFactory::new(Arc::new(broker.transport())));
        Self {
            broker,
            repository: Arc::new(MemoryIdentityRepository::new()),
            transports,
        }
    }

    /// Register a party with a random key.
    pub async fn party(&self, name: &str) -> TestParty {
        self.register(name, LocalKeyManager::generate()).await
    }

    /// Register a party with a key derived from `seed`.
    pub async fn party_with_seed(&self, name: &str, seed: [u8; 32]) -> TestParty {
        let key_manager = match LocalKeyManager::from_seed(&seed) {
            Ok(km) => km,
            Err(e) => panic!("seed {} is not a valid key: {e}", seed[0]),
        };
        self.register(name, key_manager).await
    }

    async fn register(&self, name: &str, key_manager: LocalKeyManager) -> TestParty {
        let identity = Identity::new(name);
        self.repository
            .register(IdentityRecord::new(
                identity.clone(),
                key_manager.public_key_sync(),
            ))
            .await;
        TestParty {
            identity,
            key_manager: Arc::new(key_manager),
        }
    }

    /// A party that claims `name` but signs with an unregistered key.
    pub fn impostor(&self, name: &str) -> TestParty {
        TestParty {
            identity: Identity::new(name),
            key_manager: Arc::new(LocalKeyManager::generate()),
        }
    }

    /// A connected endpoint for `party` with default config.
    pub async fn secure_endpoint(&self, party: &TestParty) -> SecureNetwork {
        self.secure_endpoint_with(party, SecureNetworkConfig::default())
            .await
    }

    pub async fn secure_endpoint_with(
        &self,
        party: &TestParty,
        config: SecureNetworkConfig,
    ) -> SecureNetwork {
        match SecureNetwork::connect(
            Some(party.claim()),
            self.repository.clone(),
            self.transports.clone(),
            config,
        )
        .await
        {
            Ok(network) => network,
            Err(e) => panic!("failed to connect {}: {e}", party.identity),
        }
    }

    /// A send-only endpoint without a claim.
    pub fn anonymous_endpoint(&self) -> SecureNetwork {
        SecureNetwork::new(
            None,
            self.repository.clone(),
            self.transports.clone(),
            SecureNetworkConfig::default(),
        )
    }
}

impl Default for TestNetwork {
    fn default() -> Self {
        Self::new()
    }
}

/// Register `count` parties with deterministic keys, named `party0`, `party1`, ...
pub async fn multi_party(net: &TestNetwork, count: usize) -> Vec<TestParty> {
    let mut parties = Vec::with_capacity(count);
    for i in 0..count {
        let mut seed = [0u8; 32];
        seed[0] = i as u8 + 1;
        parties.push(net.party_with_seed(&format!("party{i}"), seed).await);
    }
    parties
}

/// What a [`channel_listener`] observed.
#[derive(Debug)]
pub enum ListenerEvent {
    Message {
        data: Value,
        sender: Option<Identity>,
    },
    Error(SecureError),
}

struct ChannelListener(mpsc::UnboundedSender<ListenerEvent>);

#[async_trait]
impl PacketListener for ChannelListener {
    async fn on_message(&self, data: Value, sender: Option<Identity>) {
        let _ = self.0.send(ListenerEvent::Message { data, sender });
    }

    async fn on_error(&self, error: &SecureError) {
        let _ = self.0.send(ListenerEvent::Error(error.clone()));
    }
}

/// A listener that forwards everything into a channel.
pub fn channel_listener() -> (Arc<dyn PacketListener>, mpsc::UnboundedReceiver<ListenerEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(ChannelListener(tx)), rx)
}

/// Next item, or `None` if nothing arrives within `timeout`.
pub async fn recv_within<T>(rx: &mut mpsc::UnboundedReceiver<T>, timeout: Duration) -> Option<T> {
    tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()
}

/// A local key manager that counts how often each capability is used.
pub struct CountingKeyManager {
    inner: LocalKeyManager,
    signs: AtomicUsize,
    decrypts: AtomicUsize,
    derives: AtomicUsize,
}

impl CountingKeyManager {
    pub fn new(inner: LocalKeyManager) -> Self {
        Self {
            inner,
            signs: AtomicUsize::new(0),
            decrypts: AtomicUsize::new(0),
            derives: AtomicUsize::new(0),
        }
    }

    pub fn signs(&self) -> usize {
        self.signs.load(Ordering::SeqCst)
    }

    pub fn decrypts(&self) -> usize {
        self.decrypts.load(Ordering::SeqCst)
    }

    pub fn derives(&self) -> usize {
        self.derives.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyManager for CountingKeyManager {
    async fn sign(&self, payload: &Value) -> crux_net_core::Result<String> {
        self.signs.fetch_add(1, Ordering::SeqCst);
        self.inner.sign(payload).await
    }

    async fn public_key(&self) -> crux_net_core::Result<Secp256k1PublicKey> {
        self.inner.public_key().await
    }

    async fn derive_shared_secret(
        &self,
        peer: &Secp256k1PublicKey,
    ) -> crux_net_core::Result<SharedSecret> {
        self.derives.fetch_add(1, Ordering::SeqCst);
        self.inner.derive_shared_secret(peer).await
    }

    async fn decrypt(&self, envelope: &EncryptedEnvelope) -> crux_net_core::Result<Vec<u8>> {
        self.decrypts.fetch_add(1, Ordering::SeqCst);
        self.inner.decrypt(envelope).await
    }
}
