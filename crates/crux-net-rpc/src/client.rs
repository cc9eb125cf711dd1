//! The caller side of remote key invocation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crux_net_core::Identity;
use crux_net_secure::{ErrorHandler, MessageHandler, MessengerError, ProtocolMessenger};

use crate::error::{Result, RpcError};
use crate::invocation::{Invocation, InvocationResult, KEY_MANAGER_RESPONSE};
use crate::method::KeyMethod;
use crate::pending::PendingInvocations;

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RpcConfig {
    /// How long to wait for a response, in milliseconds.
    pub invocation_timeout_ms: u64,
    /// Fail every pending invocation when the channel reports an error.
    ///
    /// Channel errors cannot be tied to an invocation id.
    pub fail_pending_on_channel_error: bool,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            invocation_timeout_ms: 30_000,
            fail_pending_on_channel_error: true,
        }
    }
}

impl RpcConfig {
    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_millis(self.invocation_timeout_ms)
    }
}

/// Sends invocations to one remote key holder and correlates the answers.
#[derive(Clone)]
pub struct RemoteKeyClient {
    messenger: ProtocolMessenger,
    remote: Identity,
    pending: Arc<PendingInvocations>,
    config: RpcConfig,
}

impl RemoteKeyClient {
    /// Attach to `messenger` and start listening for responses from `remote`.
    ///
    /// The messenger must know the remote key protocol schemas. This takes
    /// over its response handler and its error handler.
    pub async fn connect(
        messenger: ProtocolMessenger,
        remote: Identity,
        config: RpcConfig,
    ) -> Result<Self> {
        let pending = Arc::new(PendingInvocations::new());

        messenger
            .on(
                KEY_MANAGER_RESPONSE,
                Arc::new(ResponseHandler {
                    pending: Arc::clone(&pending),
                    remote: remote.clone(),
                }),
            )
            .await;
        messenger
            .on_error(Arc::new(ChannelErrorHandler {
                pending: Arc::clone(&pending),
                fail_pending: config.fail_pending_on_channel_error,
            }))
            .await;
        messenger.initialize().await?;

        Ok(Self {
            messenger,
            remote,
            pending,
            config,
        })
    }

    pub fn remote(&self) -> &Identity {
        &self.remote
    }

    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    /// Invocations sent but not yet answered.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Send an invocation and return its id without waiting.
    pub async fn invoke(&self, method: KeyMethod, args: Vec<Value>) -> Result<Uuid> {
        let invocation = Invocation::new(method, args);
        let id = invocation.invocation_id;
        let message = invocation.to_message()?;

        self.pending.register(id);
        if let Err(e) = self.messenger.send(&message, &self.remote).await {
            self.pending.remove(&id);
            return Err(e.into());
        }

        self.schedule_expiry(id);

        tracing::debug!(invocation_id = %id, method = %method, remote = %self.remote, "invocation sent");
        Ok(id)
    }

    /// Settle `id` as timed out once its deadline passes, awaited or not.
    fn schedule_expiry(&self, id: Uuid) {
        let pending = Arc::clone(&self.pending);
        let remote = self.remote.clone();
        let after_ms = self.config.invocation_timeout_ms;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(after_ms)).await;
            let error = RpcError::Timeout {
                invocation_id: id,
                after_ms,
            };
            if pending.expire(&id, error) {
                tracing::warn!(invocation_id = %id, remote = %remote, "invocation timed out");
            }
        });
    }

    /// Like [`invoke`](Self::invoke) with the method given by wire name.
    pub async fn invoke_named(&self, method: &str, args: Vec<Value>) -> Result<Uuid> {
        self.invoke(method.parse()?, args).await
    }

    /// Wait for the response to `id`.
    ///
    /// The deadline of [`RpcConfig::invocation_timeout_ms`] starts at
    /// [`invoke`](Self::invoke). Each id can be awaited once; an id whose
    /// deadline passed before anyone waited is unknown.
    pub async fn listen_to_invocation(&self, id: Uuid) -> Result<Value> {
        let rx = self
            .pending
            .take_receiver(&id)
            .ok_or(RpcError::UnknownInvocation(id))?;

        match tokio::time::timeout(self.config.invocation_timeout(), rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(RpcError::Cancelled),
            Err(_) => {
                self.pending.remove(&id);
                Err(RpcError::Timeout {
                    invocation_id: id,
                    after_ms: self.config.invocation_timeout_ms,
                })
            }
        }
    }

    /// Invoke and wait.
    pub async fn call(&self, method: KeyMethod, args: Vec<Value>) -> Result<Value> {
        let id = self.invoke(method, args).await?;
        self.listen_to_invocation(id).await
    }
}

struct ResponseHandler {
    pending: Arc<PendingInvocations>,
    remote: Identity,
}

#[async_trait]
impl MessageHandler for ResponseHandler {
    async fn handle(&self, content: Value, sender: Option<Identity>) {
        if sender.as_ref() != Some(&self.remote) {
            tracing::warn!(sender = ?sender, expected = %self.remote, "ignoring response from unexpected sender");
            return;
        }

        let response = match InvocationResult::from_content(content) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring malformed response");
                return;
            }
        };

        let id = response.invocation_id;
        if !self.pending.resolve(&id, response.into_outcome()) {
            tracing::debug!(invocation_id = %id, "response for unknown invocation");
        }
    }
}

struct ChannelErrorHandler {
    pending: Arc<PendingInvocations>,
    fail_pending: bool,
}

#[async_trait]
impl ErrorHandler for ChannelErrorHandler {
    async fn handle_error(&self, error: &MessengerError) {
        // Validation failures concern one foreign message, not our channel.
        if error.is_validation() || !self.fail_pending {
            tracing::debug!(error = %error, "rpc channel error");
            return;
        }
        let failed = self.pending.fail_all(&RpcError::Channel(error.clone()));
        tracing::warn!(error = %error, failed, "rpc channel error failed pending invocations");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crux_net_secure::handler_fn;
    use serde_json::json;
    use tokio::sync::mpsc;

    use crate::invocation::KEY_MANAGER_REQUEST;
    use crate::test_support::{next, Net, Party};

    fn fast() -> RpcConfig {
        RpcConfig {
            invocation_timeout_ms: 150,
            ..Default::default()
        }
    }

    /// Collects raw requests arriving at `party` without answering them.
    async fn silent_host(party: &Party) -> mpsc::UnboundedReceiver<Invocation> {
        let (tx, rx) = mpsc::unbounded_channel();
        party
            .messenger
            .on(
                KEY_MANAGER_REQUEST,
                handler_fn(move |content, _sender| {
                    let tx = tx.clone();
                    async move {
                        let _ = tx.send(serde_json::from_value(content).unwrap());
                    }
                }),
            )
            .await;
        party.messenger.initialize().await.unwrap();
        rx
    }

    async fn respond(from: &Party, to: &Identity, result: InvocationResult) {
        from.messenger
            .send(&result.to_message().unwrap(), to)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_out_of_order_responses_correlate() {
        let net = Net::new();
        let caller = net.party("carol").await;
        let holder = net.party("bob").await;
        let mut requests = silent_host(&holder).await;
        let client = RemoteKeyClient::connect(caller.messenger.clone(), holder.identity.clone(), RpcConfig::default())
            .await
            .unwrap();

        let first = client.invoke(KeyMethod::GetPublicKey, vec![]).await.unwrap();
        let second = client.invoke(KeyMethod::Sign, vec![json!("x")]).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(client.pending_count(), 2);

        let a = next(&mut requests).await;
        let b = next(&mut requests).await;
        let mut seen = vec![a.invocation_id, b.invocation_id];
        seen.sort();
        let mut expected = vec![first, second];
        expected.sort();
        assert_eq!(seen, expected);

        // Answer the second request first.
        respond(&holder, &caller.identity, InvocationResult::success(second, json!("second"))).await;
        respond(&holder, &caller.identity, InvocationResult::success(first, json!("first"))).await;

        assert_eq!(client.listen_to_invocation(second).await.unwrap(), json!("second"));
        assert_eq!(client.listen_to_invocation(first).await.unwrap(), json!("first"));
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_timeout_removes_pending_entry() {
        let net = Net::new();
        let caller = net.party("carol").await;
        let holder = net.party("bob").await;
        let _requests = silent_host(&holder).await;
        let client = RemoteKeyClient::connect(caller.messenger.clone(), holder.identity.clone(), fast())
            .await
            .unwrap();

        let id = client.invoke(KeyMethod::GetPublicKey, vec![]).await.unwrap();
        let err = client.listen_to_invocation(id).await.unwrap_err();

        assert!(matches!(err, RpcError::Timeout { invocation_id, after_ms: 150 } if invocation_id == id));
        assert_eq!(client.pending_count(), 0);

        // A late answer is ignored.
        respond(&holder, &caller.identity, InvocationResult::success(id, json!("late"))).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_unawaited_invocation_expires() {
        let net = Net::new();
        let caller = net.party("carol").await;
        let holder = net.party("bob").await;
        let mut requests = silent_host(&holder).await;
        let client = RemoteKeyClient::connect(caller.messenger.clone(), holder.identity.clone(), fast())
            .await
            .unwrap();

        let ids = [
            client.invoke(KeyMethod::GetPublicKey, vec![]).await.unwrap(),
            client.invoke(KeyMethod::Sign, vec![json!("x")]).await.unwrap(),
        ];
        next(&mut requests).await;
        next(&mut requests).await;
        assert_eq!(client.pending_count(), 2);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(client.pending_count(), 0);
        for id in ids {
            assert!(matches!(
                client.listen_to_invocation(id).await,
                Err(RpcError::UnknownInvocation(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_response_from_wrong_sender_ignored() {
        let net = Net::new();
        let caller = net.party("carol").await;
        let holder = net.party("bob").await;
        let mallory = net.party("mallory").await;
        let mut requests = silent_host(&holder).await;
        let client = RemoteKeyClient::connect(caller.messenger.clone(), holder.identity.clone(), fast())
            .await
            .unwrap();

        let id = client.invoke(KeyMethod::GetPublicKey, vec![]).await.unwrap();
        next(&mut requests).await;
        respond(&mallory, &caller.identity, InvocationResult::success(id, json!("forged"))).await;

        assert!(matches!(
            client.listen_to_invocation(id).await,
            Err(RpcError::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn test_channel_error_fails_pending() {
        let net = Net::new();
        let caller = net.party("carol").await;
        let holder = net.party("bob").await;
        let mut requests = silent_host(&holder).await;
        let client = RemoteKeyClient::connect(caller.messenger.clone(), holder.identity.clone(), RpcConfig::default())
            .await
            .unwrap();

        let id = client.invoke(KeyMethod::GetPublicKey, vec![]).await.unwrap();
        next(&mut requests).await;
        net.broker
            .inject_error(
                "topic_carol",
                crux_net_transport::TransportError::Disconnected("gone".into()),
            )
            .await;

        assert!(matches!(
            client.listen_to_invocation(id).await,
            Err(RpcError::Channel(_))
        ));
    }

    #[tokio::test]
    async fn test_channel_error_ignored_when_disabled() {
        let net = Net::new();
        let caller = net.party("carol").await;
        let holder = net.party("bob").await;
        let mut requests = silent_host(&holder).await;
        let config = RpcConfig {
            fail_pending_on_channel_error: false,
            ..fast()
        };
        let client = RemoteKeyClient::connect(caller.messenger.clone(), holder.identity.clone(), config)
            .await
            .unwrap();

        let id = client.invoke(KeyMethod::GetPublicKey, vec![]).await.unwrap();
        next(&mut requests).await;
        net.broker
            .inject_error(
                "topic_carol",
                crux_net_transport::TransportError::Disconnected("gone".into()),
            )
            .await;

        assert!(matches!(
            client.listen_to_invocation(id).await,
            Err(RpcError::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_method_never_sent() {
        let net = Net::new();
        let caller = net.party("carol").await;
        let holder = net.party("bob").await;
        let client = RemoteKeyClient::connect(caller.messenger.clone(), holder.identity.clone(), RpcConfig::default())
            .await
            .unwrap();

        let err = client.invoke_named("exportPrivateKey", vec![]).await.unwrap_err();
        assert!(matches!(err, RpcError::InvalidMethod(_)));
        assert_eq!(net.broker.published_count(), 0);
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_remote_fails_invoke_and_cleans_up() {
        let net = Net::new();
        let caller = net.party("carol").await;
        let client = RemoteKeyClient::connect(caller.messenger.clone(), Identity::new("nobody"), RpcConfig::default())
            .await
            .unwrap();

        assert!(matches!(
            client.invoke(KeyMethod::GetPublicKey, vec![]).await,
            Err(RpcError::Messenger(_))
        ));
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_each_invocation_awaited_once() {
        let net = Net::new();
        let caller = net.party("carol").await;
        let holder = net.party("bob").await;
        let _requests = silent_host(&holder).await;
        let client = RemoteKeyClient::connect(caller.messenger.clone(), holder.identity.clone(), RpcConfig::default())
            .await
            .unwrap();

        let id = client.invoke(KeyMethod::GetPublicKey, vec![]).await.unwrap();
        respond(&holder, &caller.identity, InvocationResult::success(id, json!("pk"))).await;
        assert_eq!(client.listen_to_invocation(id).await.unwrap(), json!("pk"));
        assert!(matches!(
            client.listen_to_invocation(id).await,
            Err(RpcError::UnknownInvocation(_))
        ));
    }
}
