//! Typed, schema-validated dispatch over a [`SecureNetwork`].
//!
//! Every message is checked against the schema registered for its type
//! twice: before it leaves (an invalid message never reaches the transport)
//! and again on arrival, so a peer cannot bypass validation. Inbound
//! failures go to one messenger-level error handler, never to per-type
//! handlers.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{OnceCell, RwLock};

use crux_net_core::Identity;

use crate::error::{MessengerError, SecureError};
use crate::network::{PacketListener, SecureNetwork};
use crate::protocol::{MessageSchema, ProtocolMessage, ProtocolSchemas};

/// Handles the content of one message type.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, content: Value, sender: Option<Identity>);
}

/// Receives every inbound failure of a messenger.
#[async_trait]
pub trait ErrorHandler: Send + Sync {
    async fn handle_error(&self, error: &MessengerError);
}

/// Closure-backed [`MessageHandler`].
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(Value, Option<Identity>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle(&self, content: Value, sender: Option<Identity>) {
        (self.0)(content, sender).await
    }
}

/// Wrap an async closure as a message handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn MessageHandler>
where
    F: Fn(Value, Option<Identity>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Closure-backed [`ErrorHandler`].
pub struct FnErrorHandler<F>(F);

#[async_trait]
impl<F> ErrorHandler for FnErrorHandler<F>
where
    F: Fn(&MessengerError) + Send + Sync + 'static,
{
    async fn handle_error(&self, error: &MessengerError) {
        (self.0)(error)
    }
}

/// Wrap a synchronous closure as an error handler.
pub fn error_handler_fn<F>(f: F) -> Arc<dyn ErrorHandler>
where
    F: Fn(&MessengerError) + Send + Sync + 'static,
{
    Arc::new(FnErrorHandler(f))
}

/// Schema-validated message dispatch for one endpoint.
///
/// Cheap to clone.
#[derive(Clone)]
pub struct ProtocolMessenger {
    inner: Arc<MessengerInner>,
}

struct MessengerInner {
    network: SecureNetwork,
    schemas: ProtocolSchemas,
    handlers: RwLock<HashMap<String, Arc<dyn MessageHandler>>>,
    error_handler: RwLock<Option<Arc<dyn ErrorHandler>>>,
    initialized: OnceCell<()>,
}

impl ProtocolMessenger {
    pub fn new(network: SecureNetwork, schemas: impl IntoIterator<Item = MessageSchema>) -> Self {
        Self {
            inner: Arc::new(MessengerInner {
                network,
                schemas: ProtocolSchemas::new(schemas),
                handlers: RwLock::new(HashMap::new()),
                error_handler: RwLock::new(None),
                initialized: OnceCell::new(),
            }),
        }
    }

    pub fn network(&self) -> &SecureNetwork {
        &self.inner.network
    }

    pub fn schemas(&self) -> &ProtocolSchemas {
        &self.inner.schemas
    }

    /// Check type and content without sending.
    pub fn validate(&self, message: &ProtocolMessage) -> Result<(), MessengerError> {
        self.inner.schemas.validate(message)
    }

    /// Validate, then send the whole message to `recipient`.
    ///
    /// Validation failures return before any lookup or transport call.
    pub async fn send(
        &self,
        message: &ProtocolMessage,
        recipient: &Identity,
    ) -> Result<(), MessengerError> {
        self.validate(message)?;
        self.inner.network.send(message, recipient).await?;
        tracing::debug!(
            message_type = %message.message_type,
            recipient = %recipient,
            "protocol message sent"
        );
        Ok(())
    }

    /// Register the handler for `message_type`, replacing any previous one.
    pub async fn on(&self, message_type: impl Into<String>, handler: Arc<dyn MessageHandler>) {
        let message_type = message_type.into();
        if !self.inner.schemas.contains(&message_type) {
            tracing::warn!(message_type = %message_type, "handler registered for unknown message type");
        }
        self.inner
            .handlers
            .write()
            .await
            .insert(message_type, handler);
    }

    /// Set the messenger-level error handler, replacing any previous one.
    pub async fn on_error(&self, handler: Arc<dyn ErrorHandler>) {
        *self.inner.error_handler.write().await = Some(handler);
    }

    /// Start dispatching inbound messages. Idempotent.
    pub async fn initialize(&self) -> Result<(), MessengerError> {
        self.inner
            .initialized
            .get_or_try_init(|| async {
                let listener: Arc<dyn PacketListener> = Arc::new(Dispatch {
                    inner: Arc::clone(&self.inner),
                });
                self.inner.network.receive(listener).await
            })
            .await?;
        Ok(())
    }
}

impl MessengerInner {
    async fn report(&self, error: MessengerError) {
        let handler = self.error_handler.read().await.clone();
        match handler {
            Some(handler) => handler.handle_error(&error).await,
            None => tracing::warn!(error = %error, "unhandled messenger error"),
        }
    }
}

struct Dispatch {
    inner: Arc<MessengerInner>,
}

#[async_trait]
impl PacketListener for Dispatch {
    async fn on_message(&self, data: Value, sender: Option<Identity>) {
        let checked = ProtocolMessage::from_value(data)
            .and_then(|message| self.inner.schemas.validate(&message).map(|_| message));

        let message = match checked {
            Ok(message) => message,
            Err(error) => {
                tracing::warn!(sender = ?sender, error = %error, "rejecting inbound protocol message");
                self.inner.report(error).await;
                return;
            }
        };

        let handler = self
            .inner
            .handlers
            .read()
            .await
            .get(&message.message_type)
            .cloned();
        match handler {
            Some(handler) => handler.handle(message.content, sender).await,
            None => {
                tracing::debug!(message_type = %message.message_type, "no handler for message type")
            }
        }
    }

    async fn on_error(&self, error: &SecureError) {
        self.inner
            .report(MessengerError::Network(error.clone()))
            .await;
    }
}
