//! The invocation correlation table.
//!
//! Maps an invocation id to a single-use channel. An entry is inserted when
//! the request is sent and removed exactly once: when the matching response
//! arrives, when its deadline passes, or when the channel fails. The deadline
//! runs whether or not anyone ever waits on the entry.
//!
//! Both halves of the channel are stored at insert time, so a response that
//! races ahead of the waiter is not lost.

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::{Result, RpcError};

type Outcome = Result<Value>;

/// Concurrent `invocationId -> pending response` table.
#[derive(Debug, Default)]
pub struct PendingInvocations {
    senders: DashMap<Uuid, oneshot::Sender<Outcome>>,
    receivers: DashMap<Uuid, oneshot::Receiver<Outcome>>,
}

impl PendingInvocations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a slot for `id`.
    pub fn register(&self, id: Uuid) {
        let (tx, rx) = oneshot::channel();
        self.senders.insert(id, tx);
        self.receivers.insert(id, rx);
    }

    /// Hand the waiting half to the caller. Only succeeds once per id.
    pub fn take_receiver(&self, id: &Uuid) -> Option<oneshot::Receiver<Outcome>> {
        self.receivers.remove(id).map(|(_, rx)| rx)
    }

    /// Deliver the outcome for `id`.
    ///
    /// Returns `false` if nothing is pending under that id.
    pub fn resolve(&self, id: &Uuid, outcome: Outcome) -> bool {
        match self.senders.remove(id) {
            // The waiter may have given up already; that is not an error.
            Some((_, tx)) => {
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Drop every trace of `id`.
    pub fn remove(&self, id: &Uuid) {
        self.senders.remove(id);
        self.receivers.remove(id);
    }

    /// Give up on `id`. A waiter that already took its receiver gets `error`;
    /// an unclaimed slot is dropped. Returns `false` if `id` was settled.
    pub fn expire(&self, id: &Uuid, error: RpcError) -> bool {
        self.receivers.remove(id);
        self.resolve(id, Err(error))
    }

    /// Fail everything still pending with `error`. Returns how many.
    pub fn fail_all(&self, error: &RpcError) -> usize {
        let ids: Vec<Uuid> = self.senders.iter().map(|entry| *entry.key()).collect();
        ids.iter()
            .filter(|id| self.resolve(id, Err(error.clone())))
            .count()
    }

    /// Number of invocations still awaiting a response.
    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.senders.contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_resolve_before_wait() {
        let pending = PendingInvocations::new();
        let id = Uuid::new_v4();
        pending.register(id);

        assert!(pending.resolve(&id, Ok(json!(1))));
        let rx = pending.take_receiver(&id).unwrap();
        assert_eq!(rx.await.unwrap().unwrap(), json!(1));
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_is_single_shot() {
        let pending = PendingInvocations::new();
        let id = Uuid::new_v4();
        pending.register(id);

        assert!(pending.resolve(&id, Ok(json!("first"))));
        assert!(!pending.resolve(&id, Ok(json!("second"))));
        assert!(pending.take_receiver(&id).is_some());
        assert!(pending.take_receiver(&id).is_none());
    }

    #[tokio::test]
    async fn test_expire_unclaimed_slot() {
        let pending = PendingInvocations::new();
        let id = Uuid::new_v4();
        pending.register(id);

        assert!(pending.expire(&id, RpcError::Cancelled));
        assert!(pending.is_empty());
        assert!(pending.take_receiver(&id).is_none());
        assert!(!pending.expire(&id, RpcError::Cancelled));
    }

    #[tokio::test]
    async fn test_expire_wakes_waiter() {
        let pending = PendingInvocations::new();
        let id = Uuid::new_v4();
        pending.register(id);
        let rx = pending.take_receiver(&id).unwrap();

        assert!(pending.expire(&id, RpcError::Cancelled));
        assert!(matches!(rx.await.unwrap(), Err(RpcError::Cancelled)));
    }

    #[test]
    fn test_unknown_id_ignored() {
        let pending = PendingInvocations::new();
        assert!(!pending.resolve(&Uuid::new_v4(), Ok(json!(null))));
    }

    #[tokio::test]
    async fn test_fail_all() {
        let pending = PendingInvocations::new();
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            pending.register(*id);
        }

        assert_eq!(pending.fail_all(&RpcError::Cancelled), 3);
        assert!(pending.is_empty());
        for id in &ids {
            let outcome = pending.take_receiver(id).unwrap().await.unwrap();
            assert!(matches!(outcome, Err(RpcError::Cancelled)));
        }
    }

    #[tokio::test]
    async fn test_concurrent_resolution_out_of_order() {
        let pending = std::sync::Arc::new(PendingInvocations::new());
        let ids: Vec<Uuid> = (0..32).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            pending.register(*id);
        }

        let mut tasks = Vec::new();
        for (i, id) in ids.iter().enumerate().rev() {
            let pending = pending.clone();
            let id = *id;
            tasks.push(tokio::spawn(async move {
                pending.resolve(&id, Ok(json!(i)));
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        for (i, id) in ids.iter().enumerate() {
            let value = pending.take_receiver(id).unwrap().await.unwrap().unwrap();
            assert_eq!(value, json!(i));
        }
    }
}
