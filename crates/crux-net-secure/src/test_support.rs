//! Shared fixtures for this crate's unit tests.

use std::sync::Arc;
use std::time::Duration;

use crux_net_core::{Identity, IdentityClaim, KeyManager, LocalKeyManager};
use crux_net_transport::{
    IdentityRecord, MemoryBroker, MemoryIdentityRepository, SharedTransportFactory,
};
use tokio::sync::mpsc;

use crate::network::{SecureNetwork, SecureNetworkConfig};

pub(crate) struct Harness {
    pub broker: Arc<MemoryBroker>,
    pub repo: Arc<MemoryIdentityRepository>,
    pub factory: Arc<SharedTransportFactory>,
}

impl Harness {
    pub fn new() -> Self {
        let broker = MemoryBroker::new();
        let factory = Arc::new(SharedTransportFactory::new(Arc::new(broker.transport())));
        Self {
            broker,
            repo: Arc::new(MemoryIdentityRepository::new()),
            factory,
        }
    }

    pub async fn register(&self, name: &str) -> LocalKeyManager {
        let km = LocalKeyManager::generate();
        self.repo
            .register(IdentityRecord::new(Identity::new(name), km.public_key_sync()))
            .await;
        km
    }

    pub async fn endpoint_with_key(
        &self,
        name: &str,
        km: impl KeyManager + 'static,
        config: SecureNetworkConfig,
    ) -> SecureNetwork {
        let claim = IdentityClaim::new(Identity::new(name), Arc::new(km));
        SecureNetwork::connect(Some(claim), self.repo.clone(), self.factory.clone(), config)
            .await
            .unwrap()
    }

    /// Registered endpoint with default config.
    pub async fn endpoint(&self, name: &str) -> SecureNetwork {
        let km = self.register(name).await;
        self.endpoint_with_key(name, km, SecureNetworkConfig::default())
            .await
    }

    pub fn anonymous(&self) -> SecureNetwork {
        SecureNetwork::new(
            None,
            self.repo.clone(),
            self.factory.clone(),
            SecureNetworkConfig::default(),
        )
    }
}

pub(crate) async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("channel closed")
}

pub(crate) async fn assert_quiet<T: std::fmt::Debug>(rx: &mut mpsc::UnboundedReceiver<T>) {
    if let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await {
        panic!("unexpected event: {event:?}");
    }
}
