//! The key holder side of remote key invocation.
//!
//! A host answers every invocation it accepts or refuses, so callers fail
//! fast instead of waiting out their timeout. The only requests that get no
//! answer are the ones with nowhere to send it: anonymous senders and
//! requests without a usable invocation id.

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use crux_net_core::{EncryptedEnvelope, Identity, KeyManager, Secp256k1PublicKey};
use crux_net_secure::{MessageHandler, ProtocolMessenger};

use crate::error::{Result, RpcError};
use crate::invocation::{InvocationResult, KEY_MANAGER_REQUEST};
use crate::method::KeyMethod;

/// Which authenticated callers a host serves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HostPolicy {
    /// Any certified sender.
    #[default]
    AllowAll,
    /// Only these identities.
    AllowList(HashSet<Identity>),
}

impl HostPolicy {
    pub fn allow_list<I>(identities: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Identity>,
    {
        HostPolicy::AllowList(identities.into_iter().map(Into::into).collect())
    }

    pub fn permits(&self, caller: &Identity) -> bool {
        match self {
            HostPolicy::AllowAll => true,
            HostPolicy::AllowList(allowed) => allowed.contains(caller),
        }
    }
}

/// Serves a local key manager to remote callers.
///
/// Serving stops when the last clone is dropped.
#[derive(Clone)]
pub struct RemoteKeyHost {
    inner: Arc<HostInner>,
}

struct HostInner {
    messenger: ProtocolMessenger,
    key_manager: Arc<dyn KeyManager>,
    policy: HostPolicy,
}

impl RemoteKeyHost {
    /// Register on `messenger` and start serving `key_manager`.
    pub async fn serve(
        messenger: ProtocolMessenger,
        key_manager: Arc<dyn KeyManager>,
        policy: HostPolicy,
    ) -> Result<Self> {
        let inner = Arc::new(HostInner {
            messenger,
            key_manager,
            policy,
        });

        inner
            .messenger
            .on(
                KEY_MANAGER_REQUEST,
                Arc::new(RequestHandler {
                    host: Arc::downgrade(&inner),
                }),
            )
            .await;
        inner.messenger.initialize().await?;

        Ok(Self { inner })
    }

    pub fn policy(&self) -> &HostPolicy {
        &self.inner.policy
    }

    /// Handle one raw request from `sender`.
    ///
    /// Returns the error the caller was answered with, if any.
    pub async fn process(&self, request: Value, sender: Option<Identity>) -> Result<()> {
        self.inner.process(request, sender).await
    }
}

impl HostInner {
    async fn process(&self, request: Value, sender: Option<Identity>) -> Result<()> {
        let id = request
            .get("invocationId")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| RpcError::MalformedRequest("missing invocationId".into()))?;

        let caller = match sender {
            Some(caller) => caller,
            None => {
                tracing::warn!(invocation_id = %id, "refusing anonymous invocation");
                return Err(RpcError::Refused("anonymous caller".into()));
            }
        };

        let outcome = self.run(&request, &caller).await;
        let response = match &outcome {
            Ok(value) => InvocationResult::success(id, value.clone()),
            Err(e) => {
                tracing::warn!(invocation_id = %id, caller = %caller, error = %e, "invocation failed");
                InvocationResult::failure(id, e.to_string())
            }
        };

        self.messenger
            .send(&response.to_message()?, &caller)
            .await?;
        outcome.map(|_| ())
    }

    async fn run(&self, request: &Value, caller: &Identity) -> Result<Value> {
        let method: KeyMethod = match request.get("method") {
            Some(Value::String(name)) => name.parse()?,
            Some(other) => return Err(RpcError::InvalidMethod(other.to_string())),
            None => return Err(RpcError::InvalidMethod("missing method".into())),
        };

        if !self.policy.permits(caller) {
            return Err(RpcError::Refused(format!("{caller} may not use this key")));
        }

        let args = match request.get("args") {
            Some(Value::Array(args)) => args.as_slice(),
            None => &[],
            Some(_) => return Err(RpcError::InvalidArguments("args must be an array".into())),
        };

        tracing::debug!(method = %method, caller = %caller, "serving invocation");
        execute(self.key_manager.as_ref(), method, args).await
    }
}

/// Run `method` on a key manager with wire-encoded arguments.
pub async fn execute(key_manager: &dyn KeyManager, method: KeyMethod, args: &[Value]) -> Result<Value> {
    if args.len() < method.arity() {
        return Err(RpcError::InvalidArguments(format!(
            "{method} takes {} argument(s), got {}",
            method.arity(),
            args.len()
        )));
    }

    match method {
        KeyMethod::Sign => {
            let token = key_manager.sign(&args[0]).await?;
            Ok(Value::String(token))
        }
        KeyMethod::GetPublicKey => {
            let public_key = key_manager.public_key().await?;
            Ok(Value::String(public_key.to_hex()))
        }
        KeyMethod::DeriveSharedSecret => {
            let peer = args[0]
                .as_str()
                .ok_or_else(|| RpcError::InvalidArguments("public key must be hex".into()))
                .and_then(|s| Ok(Secp256k1PublicKey::from_hex(s)?))?;
            let secret = key_manager.derive_shared_secret(&peer).await?;
            Ok(Value::String(secret.to_hex()))
        }
        KeyMethod::Decrypt => {
            let envelope: EncryptedEnvelope = serde_json::from_value(args[0].clone())
                .map_err(|e| RpcError::InvalidArguments(e.to_string()))?;
            let plaintext = key_manager.decrypt(&envelope).await?;
            Ok(json!(hex::encode(plaintext)))
        }
    }
}

struct RequestHandler {
    host: Weak<HostInner>,
}

#[async_trait]
impl MessageHandler for RequestHandler {
    async fn handle(&self, content: Value, sender: Option<Identity>) {
        let host = match self.host.upgrade() {
            Some(host) => host,
            None => {
                tracing::debug!("key host dropped; ignoring invocation");
                return;
            }
        };
        if let Err(e) = host.process(content, sender).await {
            tracing::debug!(error = %e, "invocation not served");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crux_net_core::{CompactToken, CoreError, EncryptionManager, LocalKeyManager, PublicKeyOnly};
    use crux_net_secure::handler_fn;
    use tokio::sync::mpsc;

    use crate::invocation::KEY_MANAGER_RESPONSE;
    use crate::test_support::{next, Net, Party};

    /// Collects responses arriving at `party`.
    async fn responses(party: &Party) -> mpsc::UnboundedReceiver<InvocationResult> {
        let (tx, rx) = mpsc::unbounded_channel();
        party
            .messenger
            .on(
                KEY_MANAGER_RESPONSE,
                handler_fn(move |content, _sender| {
                    let tx = tx.clone();
                    async move {
                        let _ = tx.send(InvocationResult::from_content(content).unwrap());
                    }
                }),
            )
            .await;
        party.messenger.initialize().await.unwrap();
        rx
    }

    fn request(method: &str, args: Value) -> (Uuid, Value) {
        let id = Uuid::new_v4();
        (
            id,
            json!({"invocationId": id.to_string(), "method": method, "args": args}),
        )
    }

    #[tokio::test]
    async fn test_execute_each_method() {
        let km = LocalKeyManager::generate();
        let pk = km.public_key_sync();

        let token = execute(&km, KeyMethod::Sign, &[json!({"messageId": "n"})])
            .await
            .unwrap();
        let payload = CompactToken::verify(token.as_str().unwrap(), &pk).unwrap();
        assert_eq!(payload, json!({"messageId": "n"}));

        let hex_pk = execute(&km, KeyMethod::GetPublicKey, &[]).await.unwrap();
        assert_eq!(hex_pk, json!(pk.to_hex()));

        let peer = LocalKeyManager::generate();
        let secret = execute(
            &km,
            KeyMethod::DeriveSharedSecret,
            &[json!(peer.public_key_sync().to_hex())],
        )
        .await
        .unwrap();
        let expected = peer.derive_shared_secret(&pk).await.unwrap();
        assert_eq!(secret, json!(expected.to_hex()));

        let envelope = EncryptionManager::encrypt(b"secret", &pk).unwrap();
        let plaintext = execute(
            &km,
            KeyMethod::Decrypt,
            &[serde_json::to_value(&envelope).unwrap()],
        )
        .await
        .unwrap();
        assert_eq!(plaintext, json!(hex::encode(b"secret")));
    }

    #[tokio::test]
    async fn test_execute_rejects_bad_arguments() {
        let km = LocalKeyManager::generate();
        assert!(matches!(
            execute(&km, KeyMethod::Sign, &[]).await,
            Err(RpcError::InvalidArguments(_))
        ));
        assert!(matches!(
            execute(&km, KeyMethod::DeriveSharedSecret, &[json!(42)]).await,
            Err(RpcError::InvalidArguments(_))
        ));
        assert!(matches!(
            execute(&km, KeyMethod::DeriveSharedSecret, &[json!("zz")]).await,
            Err(RpcError::Key(_))
        ));
    }

    #[tokio::test]
    async fn test_unsupported_capability_surfaces_as_key_error() {
        let km = PublicKeyOnly::new(LocalKeyManager::generate().public_key_sync());
        assert!(matches!(
            execute(&km, KeyMethod::Sign, &[json!("x")]).await,
            Err(RpcError::Key(CoreError::Unsupported(_)))
        ));
    }

    #[tokio::test]
    async fn test_disallowed_method_answered_with_error() {
        let net = Net::new();
        let holder = net.party("bob").await;
        let caller = net.party("carol").await;
        let mut answers = responses(&caller).await;
        let host = RemoteKeyHost::serve(
            holder.messenger.clone(),
            holder.key_manager.clone(),
            HostPolicy::AllowAll,
        )
        .await
        .unwrap();

        let (id, raw) = request("exportPrivateKey", json!([]));
        let err = host.process(raw, Some(caller.identity.clone())).await.unwrap_err();
        assert!(matches!(err, RpcError::InvalidMethod(_)));

        let answer = next(&mut answers).await;
        assert_eq!(answer.invocation_id, id);
        assert!(answer.result.is_none());
        assert!(answer
            .error
            .unwrap()
            .starts_with("invalid key manager method"));
    }

    #[tokio::test]
    async fn test_missing_or_non_string_method_named_in_error() {
        let net = Net::new();
        let holder = net.party("bob").await;
        let caller = net.party("carol").await;
        let mut answers = responses(&caller).await;
        let host = RemoteKeyHost::serve(
            holder.messenger.clone(),
            holder.key_manager.clone(),
            HostPolicy::AllowAll,
        )
        .await
        .unwrap();

        let id = Uuid::new_v4();
        let err = host
            .process(json!({"invocationId": id.to_string(), "args": []}), Some(caller.identity.clone()))
            .await
            .unwrap_err();
        assert!(matches!(&err, RpcError::InvalidMethod(m) if m == "missing method"));
        let answer = next(&mut answers).await;
        assert_eq!(answer.invocation_id, id);
        assert_eq!(
            answer.error.as_deref(),
            Some("invalid key manager method: missing method")
        );

        let (_, mut raw) = request("sign", json!([]));
        raw["method"] = json!(7);
        let err = host.process(raw, Some(caller.identity.clone())).await.unwrap_err();
        assert!(matches!(&err, RpcError::InvalidMethod(m) if m == "7"));
        assert_eq!(
            next(&mut answers).await.error.as_deref(),
            Some("invalid key manager method: 7")
        );
    }

    #[tokio::test]
    async fn test_anonymous_caller_refused_silently() {
        let net = Net::new();
        let holder = net.party("bob").await;
        let host = RemoteKeyHost::serve(
            holder.messenger.clone(),
            holder.key_manager.clone(),
            HostPolicy::AllowAll,
        )
        .await
        .unwrap();

        let (_, raw) = request("getPublicKey", json!([]));
        assert!(matches!(
            host.process(raw, None).await,
            Err(RpcError::Refused(_))
        ));
        assert_eq!(net.broker.published_count(), 0);
    }

    #[tokio::test]
    async fn test_allow_list_enforced() {
        let net = Net::new();
        let holder = net.party("bob").await;
        let trusted = net.party("carol").await;
        let stranger = net.party("mallory").await;
        let mut trusted_answers = responses(&trusted).await;
        let mut stranger_answers = responses(&stranger).await;
        let host = RemoteKeyHost::serve(
            holder.messenger.clone(),
            holder.key_manager.clone(),
            HostPolicy::allow_list(["carol"]),
        )
        .await
        .unwrap();

        let (_, raw) = request("getPublicKey", json!([]));
        host.process(raw.clone(), Some(trusted.identity.clone()))
            .await
            .unwrap();
        let answer = next(&mut trusted_answers).await;
        assert_eq!(
            answer.result,
            Some(json!(holder.key_manager.public_key_sync().to_hex()))
        );

        assert!(matches!(
            host.process(raw, Some(stranger.identity.clone())).await,
            Err(RpcError::Refused(_))
        ));
        let answer = next(&mut stranger_answers).await;
        assert!(answer.result.is_none());
        assert!(answer.error.is_some());
    }

    #[tokio::test]
    async fn test_request_without_id_dropped() {
        let net = Net::new();
        let holder = net.party("bob").await;
        let host = RemoteKeyHost::serve(
            holder.messenger.clone(),
            holder.key_manager.clone(),
            HostPolicy::AllowAll,
        )
        .await
        .unwrap();

        assert!(matches!(
            host.process(json!({"method": "sign", "args": []}), Some(Identity::new("carol")))
                .await,
            Err(RpcError::MalformedRequest(_))
        ));
        assert_eq!(net.broker.published_count(), 0);
    }
}
