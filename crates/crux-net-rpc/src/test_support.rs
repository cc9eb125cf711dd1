//! Shared fixtures for this crate's unit tests.

use std::sync::Arc;
use std::time::Duration;

use crux_net_core::{Identity, IdentityClaim, LocalKeyManager};
use crux_net_secure::{ProtocolMessenger, SecureNetwork, SecureNetworkConfig};
use crux_net_transport::{
    IdentityRecord, MemoryBroker, MemoryIdentityRepository, SharedTransportFactory,
};
use tokio::sync::mpsc;

use crate::invocation::rpc_schemas;

pub(crate) struct Party {
    pub identity: Identity,
    pub key_manager: Arc<LocalKeyManager>,
    pub messenger: ProtocolMessenger,
}

pub(crate) struct Net {
    pub broker: Arc<MemoryBroker>,
    pub repo: Arc<MemoryIdentityRepository>,
    pub factory: Arc<SharedTransportFactory>,
}

impl Net {
    pub fn new() -> Self {
        let broker = MemoryBroker::new();
        let factory = Arc::new(SharedTransportFactory::new(Arc::new(broker.transport())));
        Self {
            broker,
            repo: Arc::new(MemoryIdentityRepository::new()),
            factory,
        }
    }

    /// A registered party whose messenger speaks the rpc schemas.
    pub async fn party(&self, name: &str) -> Party {
        let identity = Identity::new(name);
        let key_manager = Arc::new(LocalKeyManager::generate());
        self.repo
            .register(IdentityRecord::new(identity.clone(), key_manager.public_key_sync()))
            .await;

        let claim = IdentityClaim::new(identity.clone(), key_manager.clone());
        let network = SecureNetwork::connect(
            Some(claim),
            self.repo.clone(),
            self.factory.clone(),
            SecureNetworkConfig::default(),
        )
        .await
        .unwrap();

        Party {
            identity,
            key_manager,
            messenger: ProtocolMessenger::new(network, rpc_schemas()),
        }
    }
}

pub(crate) async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("channel closed")
}
