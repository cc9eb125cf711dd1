//! The send-only end of a gateway channel.

use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;

use crux_net_core::{now_millis, CertificateManager, EncryptionManager, Identity, IdentityClaim};
use crux_net_transport::{IdentityRepository, TransportFactory};

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::handler::ProtocolHandler;
use crate::packet::{certificate_binding, GatewayMetadata, GatewayPacket};

/// Sends gateway packets of one protocol to one recipient.
///
/// Packets are certified when a claim is supplied and encrypted when
/// [`GatewayConfig::encrypt`] is set.
pub struct GatewaySender {
    claim: Option<IdentityClaim>,
    recipient: Identity,
    handler: Arc<dyn ProtocolHandler>,
    repository: Arc<dyn IdentityRepository>,
    transports: Arc<dyn TransportFactory>,
    config: GatewayConfig,
}

impl GatewaySender {
    pub fn new(
        claim: Option<IdentityClaim>,
        recipient: Identity,
        handler: Arc<dyn ProtocolHandler>,
        repository: Arc<dyn IdentityRepository>,
        transports: Arc<dyn TransportFactory>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            claim,
            recipient,
            handler,
            repository,
            transports,
            config,
        }
    }

    pub fn recipient(&self) -> &Identity {
        &self.recipient
    }

    /// Send with a fresh message id. Returns the id.
    pub async fn send(&self, message: Value) -> Result<String> {
        let message_id = uuid::Uuid::new_v4().to_string();
        self.send_with_id(message, message_id.clone()).await?;
        Ok(message_id)
    }

    /// Send with a caller-supplied message id.
    pub async fn send_with_id(&self, message: Value, message_id: String) -> Result<()> {
        let protocol = self.handler.name().to_owned();
        if !self.handler.validate_message(&message) {
            return Err(GatewayError::InvalidMessage(protocol));
        }

        let mut packet = GatewayPacket {
            message,
            metadata: GatewayMetadata {
                message_id,
                created_at: now_millis(),
                protocol_name: protocol.clone(),
                sender_certificate: None,
            },
        };
        if let Some(claim) = &self.claim {
            let bound = certificate_binding(&self.recipient, &packet.message, &packet.metadata)?;
            packet.metadata.sender_certificate = Some(CertificateManager::make(claim, &bound).await?);
        }

        let mut payload = packet.to_bytes()?;
        if self.config.encrypt {
            let record = self
                .repository
                .get_by_identity(&self.recipient)
                .await?
                .ok_or_else(|| GatewayError::UnknownIdentity(self.recipient.clone()))?;
            payload = EncryptionManager::encrypt(&payload, &record.public_key)?.to_bytes()?;
        }

        let from = self.claim.as_ref().map(IdentityClaim::identity);
        let transport = self.transports.transport_for(from, &self.recipient).await?;
        transport
            .publish(&self.recipient.gateway_topic(&protocol), Bytes::from(payload))
            .await?;

        tracing::debug!(
            protocol = %protocol,
            recipient = %self.recipient,
            message_id = %packet.metadata.message_id,
            encrypted = self.config.encrypt,
            "gateway packet sent"
        );
        Ok(())
    }
}
