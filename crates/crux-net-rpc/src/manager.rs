//! A [`KeyManager`] whose private key lives on another endpoint.

use async_trait::async_trait;
use serde_json::Value;

use crux_net_core::{
    CoreError, EncryptedEnvelope, Identity, KeyManager, Secp256k1PublicKey, SharedSecret,
};

use crate::client::RemoteKeyClient;
use crate::error::RpcError;
use crate::method::KeyMethod;

/// Forwards every key operation to a remote holder.
///
/// Behaves like a local key manager apart from latency and the possibility
/// of remote or transport failures, which surface as
/// [`CoreError::KeyManager`].
#[derive(Clone)]
pub struct RemoteKeyManager {
    client: RemoteKeyClient,
}

impl RemoteKeyManager {
    pub fn new(client: RemoteKeyClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &RemoteKeyClient {
        &self.client
    }

    pub fn remote(&self) -> &Identity {
        self.client.remote()
    }

    async fn call_str(&self, method: KeyMethod, args: Vec<Value>) -> Result<String, RpcError> {
        match self.client.call(method, args).await? {
            Value::String(s) => Ok(s),
            other => Err(RpcError::MalformedResult(format!(
                "{method} returned {other}, expected a string"
            ))),
        }
    }
}

#[async_trait]
impl KeyManager for RemoteKeyManager {
    async fn sign(&self, payload: &Value) -> crux_net_core::Result<String> {
        Ok(self.call_str(KeyMethod::Sign, vec![payload.clone()]).await?)
    }

    async fn public_key(&self) -> crux_net_core::Result<Secp256k1PublicKey> {
        let hex = self.call_str(KeyMethod::GetPublicKey, vec![]).await?;
        Secp256k1PublicKey::from_hex(&hex)
    }

    async fn derive_shared_secret(
        &self,
        peer: &Secp256k1PublicKey,
    ) -> crux_net_core::Result<SharedSecret> {
        let hex = self
            .call_str(KeyMethod::DeriveSharedSecret, vec![Value::String(peer.to_hex())])
            .await?;
        SharedSecret::from_hex(&hex)
    }

    async fn decrypt(&self, envelope: &EncryptedEnvelope) -> crux_net_core::Result<Vec<u8>> {
        let args = vec![serde_json::to_value(envelope)
            .map_err(|e| CoreError::EncodingError(e.to_string()))?];
        let hex = self.call_str(KeyMethod::Decrypt, args).await?;
        hex::decode(hex).map_err(|e| CoreError::DecodingError(e.to_string()))
    }
}
