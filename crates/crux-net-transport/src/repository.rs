//! Identity repository seam.
//!
//! Name resolution and registration live outside this workspace. The secure
//! layers only need to map an [`Identity`] to its registered public key.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crux_net_core::{Identity, Secp256k1PublicKey};

use crate::error::RepositoryError;

/// What the repository knows about an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRecord {
    pub identity: Identity,
    pub public_key: Secp256k1PublicKey,
    /// Addresses registered for this identity, opaque to this layer.
    #[serde(default)]
    pub addresses: Vec<String>,
}

impl IdentityRecord {
    pub fn new(identity: Identity, public_key: Secp256k1PublicKey) -> Self {
        Self {
            identity,
            public_key,
            addresses: Vec::new(),
        }
    }
}

/// Resolves identities to their public keys.
#[async_trait]
pub trait IdentityRepository: Send + Sync {
    /// Look up an identity. `Ok(None)` means it is not registered.
    async fn get_by_identity(
        &self,
        identity: &Identity,
    ) -> Result<Option<IdentityRecord>, RepositoryError>;

    /// Check whether an identity is registered.
    async fn exists(&self, identity: &Identity) -> Result<bool, RepositoryError> {
        Ok(self.get_by_identity(identity).await?.is_some())
    }
}

/// In-memory repository for tests and fixed deployments.
#[derive(Default)]
pub struct MemoryIdentityRepository {
    records: RwLock<HashMap<Identity, IdentityRecord>>,
}

impl MemoryIdentityRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a record.
    pub async fn register(&self, record: IdentityRecord) {
        self.records
            .write()
            .await
            .insert(record.identity.clone(), record);
    }

    /// Forget an identity. Returns the removed record, if any.
    pub async fn remove(&self, identity: &Identity) -> Option<IdentityRecord> {
        self.records.write().await.remove(identity)
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl IdentityRepository for MemoryIdentityRepository {
    async fn get_by_identity(
        &self,
        identity: &Identity,
    ) -> Result<Option<IdentityRecord>, RepositoryError> {
        Ok(self.records.read().await.get(identity).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crux_net_core::LocalKeyManager;

    #[tokio::test]
    async fn test_register_and_lookup() {
        let repo = MemoryIdentityRepository::new();
        let alice = Identity::new("alice");
        let pk = LocalKeyManager::generate().public_key_sync();

        assert!(!repo.exists(&alice).await.unwrap());
        repo.register(IdentityRecord::new(alice.clone(), pk)).await;

        let record = repo.get_by_identity(&alice).await.unwrap().unwrap();
        assert_eq!(record.public_key, pk);
        assert!(repo.exists(&alice).await.unwrap());
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn test_remove() {
        let repo = MemoryIdentityRepository::new();
        let alice = Identity::new("alice");
        let pk = LocalKeyManager::generate().public_key_sync();
        repo.register(IdentityRecord::new(alice.clone(), pk)).await;

        assert!(repo.remove(&alice).await.is_some());
        assert!(repo.get_by_identity(&alice).await.unwrap().is_none());
        assert!(repo.is_empty().await);
    }

    #[test]
    fn test_record_json_shape() {
        let pk = LocalKeyManager::generate().public_key_sync();
        let record = IdentityRecord::new(Identity::new("alice"), pk);
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["identity"], "alice");
        assert_eq!(value["publicKey"], pk.to_hex());
        let back: IdentityRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }
}
