//! The main Endpoint struct.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crux_net_core::{Identity, IdentityClaim};
use crux_net_rpc::{
    rpc_schemas, HostPolicy, RemoteKeyClient, RemoteKeyHost, RemoteKeyManager, RpcConfig,
};
use crux_net_secure::{
    payment_request_schema, ErrorHandler, MessageHandler, MessageSchema, ProtocolMessage,
    ProtocolMessenger, SecureNetwork, SecureNetworkConfig,
};
use crux_net_transport::{IdentityRepository, TransportFactory};

use crate::error::{EndpointError, Result};

/// Configuration for an endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EndpointConfig {
    /// Certificate binding and replay window.
    pub secure: SecureNetworkConfig,
    /// Remote key client behavior.
    pub rpc: RpcConfig,
}

impl EndpointConfig {
    /// Parse from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| EndpointError::Config(e.to_string()))
    }

    /// Load from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading endpoint config {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("parsing endpoint config {}", path.display()))
    }
}

/// Schemas every endpoint understands.
pub fn builtin_schemas() -> Vec<MessageSchema> {
    let mut schemas = vec![payment_request_schema()];
    schemas.extend(rpc_schemas());
    schemas
}

/// One identity's view of the network.
///
/// Wires a [`SecureNetwork`] and a [`ProtocolMessenger`] together and hands
/// out remote key hosts and clients on the same connection.
pub struct Endpoint {
    network: SecureNetwork,
    messenger: ProtocolMessenger,
    config: EndpointConfig,
    /// Kept alive so the key host keeps serving.
    host: Mutex<Option<RemoteKeyHost>>,
    /// One client per remote key holder, sharing one network listener each.
    clients: Mutex<HashMap<Identity, RemoteKeyClient>>,
}

impl Endpoint {
    /// Connect and start dispatching.
    ///
    /// Without a claim the endpoint is send-only and sends anonymously.
    pub async fn connect(
        claim: Option<IdentityClaim>,
        repository: Arc<dyn IdentityRepository>,
        transports: Arc<dyn TransportFactory>,
        config: EndpointConfig,
        extra_schemas: Vec<MessageSchema>,
    ) -> Result<Self> {
        let receiving = claim.is_some();
        let network =
            SecureNetwork::connect(claim, repository, transports, config.secure.clone()).await?;

        let mut schemas = builtin_schemas();
        schemas.extend(extra_schemas);
        let messenger = ProtocolMessenger::new(network.clone(), schemas);
        if receiving {
            messenger.initialize().await?;
        }

        tracing::debug!(identity = ?network.identity(), "endpoint connected");
        Ok(Self {
            network,
            messenger,
            config,
            host: Mutex::new(None),
            clients: Mutex::new(HashMap::new()),
        })
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.network.identity()
    }

    pub fn network(&self) -> &SecureNetwork {
        &self.network
    }

    pub fn messenger(&self) -> &ProtocolMessenger {
        &self.messenger
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    /// Validate and send a protocol message.
    pub async fn send(&self, message: &ProtocolMessage, recipient: &Identity) -> Result<()> {
        Ok(self.messenger.send(message, recipient).await?)
    }

    pub async fn on(&self, message_type: &str, handler: Arc<dyn MessageHandler>) {
        self.messenger.on(message_type, handler).await
    }

    pub async fn on_error(&self, handler: Arc<dyn ErrorHandler>) {
        self.messenger.on_error(handler).await
    }

    /// Serve this endpoint's key manager to remote callers.
    ///
    /// Replaces any previous policy.
    pub async fn host_keys(&self, policy: HostPolicy) -> Result<RemoteKeyHost> {
        let claim = self.network.claim().ok_or(EndpointError::SendOnly)?;
        let host =
            RemoteKeyHost::serve(self.messenger.clone(), claim.key_manager().clone(), policy)
                .await?;
        *self.host.lock().await = Some(host.clone());
        tracing::debug!(identity = %claim.identity(), "hosting keys");
        Ok(host)
    }

    /// A key manager backed by the key held at `remote`.
    ///
    /// The first call per remote opens a correlation table over this
    /// connection; later calls share it.
    pub async fn remote_key_manager(&self, remote: Identity) -> Result<RemoteKeyManager> {
        if self.network.claim().is_none() {
            return Err(EndpointError::SendOnly);
        }

        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(&remote) {
            return Ok(RemoteKeyManager::new(client.clone()));
        }

        let messenger = ProtocolMessenger::new(self.network.clone(), rpc_schemas());
        let client =
            RemoteKeyClient::connect(messenger, remote.clone(), self.config.rpc.clone()).await?;
        tracing::debug!(remote = %remote, "remote key client connected");
        clients.insert(remote, client.clone());
        Ok(RemoteKeyManager::new(client))
    }
}
