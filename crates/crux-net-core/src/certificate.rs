//! Sender certificates.
//!
//! A [`Certificate`] proves that the sender of one packet controls the
//! private key registered for the identity it claims. The proof is a compact
//! token signed by that key over a *bound value* the verifier can
//! reconstruct on its own.
//!
//! Two binding strategies exist:
//!
//! - [`CertificateBinding::MessageNonce`]: the token payload is
//!   `{"messageId": <nonce>}` where the nonce travels with the packet. Paired
//!   with a replay guard this stops a captured certificate from being reused.
//! - [`CertificateBinding::Claim`]: the token payload is the claimed identity
//!   string. A captured certificate stays valid for any packet from that
//!   sender, so this mode is only safe when the session already prevents
//!   replay.
//!
//! A deployment picks exactly one strategy; a verifier never falls back to
//! the other.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::crypto::Secp256k1PublicKey;
use crate::error::{CoreError, Result};
use crate::identity::{Identity, IdentityClaim};
use crate::token::CompactToken;

/// A signed assertion attached to exactly one outgoing packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    /// The identity the sender claims.
    pub claim: Identity,
    /// Compact token signed by the claimed identity's key.
    pub proof: String,
}

/// Which value a certificate's proof is bound to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CertificateBinding {
    /// Bind to a per-message nonce.
    #[default]
    MessageNonce,
    /// Bind to the claim string itself (replayable).
    Claim,
}

/// The value a proof is computed over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundValue {
    MessageId(String),
    Claim(Identity),
}

impl BoundValue {
    /// Token payload for this bound value.
    pub fn to_payload(&self) -> Value {
        match self {
            BoundValue::MessageId(id) => json!({ "messageId": id }),
            BoundValue::Claim(identity) => Value::String(identity.as_str().to_owned()),
        }
    }

    /// Recover a bound value from a verified token payload.
    pub fn from_payload(payload: &Value) -> Option<Self> {
        match payload {
            Value::String(s) => Some(BoundValue::Claim(Identity::new(s.clone()))),
            Value::Object(map) if map.len() == 1 => map
                .get("messageId")
                .and_then(Value::as_str)
                .map(|id| BoundValue::MessageId(id.to_owned())),
            _ => None,
        }
    }

    /// A nonce bound to the context a message travels in.
    ///
    /// The signed nonce is `<message_id>.<hex digest>` where the digest is
    /// SHA-256 over the length-prefixed `parts`, typically the recipient,
    /// creation time and payload. A verifier rebuilds it from what it
    /// actually received, so the certificate does not verify for any other
    /// recipient or payload.
    pub fn for_message(message_id: &str, parts: &[&[u8]]) -> Self {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part);
        }
        BoundValue::MessageId(format!("{message_id}.{}", hex::encode(hasher.finalize())))
    }

    pub fn binding(&self) -> CertificateBinding {
        match self {
            BoundValue::MessageId(_) => CertificateBinding::MessageNonce,
            BoundValue::Claim(_) => CertificateBinding::Claim,
        }
    }
}

/// Issues and checks certificates.
pub struct CertificateManager;

impl CertificateManager {
    /// Sign `bound` with the claim's key manager.
    pub async fn make(claim: &IdentityClaim, bound: &BoundValue) -> Result<Certificate> {
        let proof = claim.key_manager().sign(&bound.to_payload()).await?;
        Ok(Certificate {
            claim: claim.identity().clone(),
            proof,
        })
    }

    /// Certificate bound to the claim string itself.
    pub async fn make_for_claim(claim: &IdentityClaim) -> Result<Certificate> {
        Self::make(claim, &BoundValue::Claim(claim.identity().clone())).await
    }

    /// Check the signature against `sender_key` and that the signed payload is
    /// exactly `expected`.
    ///
    /// Any failure is [`CoreError::CertificateVerification`].
    pub fn verify(
        certificate: &Certificate,
        sender_key: &Secp256k1PublicKey,
        expected: &BoundValue,
    ) -> Result<()> {
        if let BoundValue::Claim(identity) = expected {
            if identity != &certificate.claim {
                tracing::debug!(claim = %certificate.claim, "certificate claim mismatch");
                return Err(CoreError::CertificateVerification);
            }
        }

        let payload = CompactToken::verify(&certificate.proof, sender_key).map_err(|e| {
            tracing::debug!(claim = %certificate.claim, error = %e, "certificate signature rejected");
            CoreError::CertificateVerification
        })?;

        if payload != expected.to_payload() {
            tracing::debug!(claim = %certificate.claim, "certificate bound value mismatch");
            return Err(CoreError::CertificateVerification);
        }
        Ok(())
    }

    /// Verify the signature and return the bound value it carries.
    ///
    /// A claim-bound certificate is only accepted when the signed string
    /// equals the certificate's own claim.
    pub fn verify_and_extract(
        certificate: &Certificate,
        sender_key: &Secp256k1PublicKey,
    ) -> Result<BoundValue> {
        let payload = CompactToken::verify(&certificate.proof, sender_key)
            .map_err(|_| CoreError::CertificateVerification)?;

        match BoundValue::from_payload(&payload) {
            Some(BoundValue::Claim(identity)) if identity == certificate.claim => {
                Ok(BoundValue::Claim(identity))
            }
            Some(bound @ BoundValue::MessageId(_)) => Ok(bound),
            _ => Err(CoreError::CertificateVerification),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_manager::LocalKeyManager;
    use std::sync::Arc;

    fn claim(name: &str) -> (IdentityClaim, Secp256k1PublicKey) {
        let km = LocalKeyManager::generate();
        let pk = km.public_key_sync();
        (IdentityClaim::new(Identity::new(name), Arc::new(km)), pk)
    }

    #[tokio::test]
    async fn test_nonce_certificate_verifies() {
        let (alice, pk) = claim("alice");
        let bound = BoundValue::MessageId("nonce-1".into());
        let cert = CertificateManager::make(&alice, &bound).await.unwrap();

        assert_eq!(cert.claim, Identity::new("alice"));
        CertificateManager::verify(&cert, &pk, &bound).unwrap();
    }

    #[tokio::test]
    async fn test_claim_certificate_verifies() {
        let (alice, pk) = claim("alice");
        let cert = CertificateManager::make_for_claim(&alice).await.unwrap();
        CertificateManager::verify(&cert, &pk, &BoundValue::Claim(Identity::new("alice"))).unwrap();
    }

    #[tokio::test]
    async fn test_changed_bound_value_fails() {
        let (alice, pk) = claim("alice");
        let cert = CertificateManager::make(&alice, &BoundValue::MessageId("n1".into()))
            .await
            .unwrap();

        assert!(matches!(
            CertificateManager::verify(&cert, &pk, &BoundValue::MessageId("n2".into())),
            Err(CoreError::CertificateVerification)
        ));
    }

    #[tokio::test]
    async fn test_changed_claim_fails() {
        let (alice, pk) = claim("alice");
        let mut cert = CertificateManager::make_for_claim(&alice).await.unwrap();
        cert.claim = Identity::new("mallory");

        assert!(CertificateManager::verify(&cert, &pk, &BoundValue::Claim(Identity::new("mallory"))).is_err());
        assert!(CertificateManager::verify(&cert, &pk, &BoundValue::Claim(Identity::new("alice"))).is_err());
    }

    #[tokio::test]
    async fn test_changed_proof_fails() {
        let (alice, pk) = claim("alice");
        let bound = BoundValue::MessageId("n1".into());
        let mut cert = CertificateManager::make(&alice, &bound).await.unwrap();
        cert.proof.push('A');

        assert!(CertificateManager::verify(&cert, &pk, &bound).is_err());
    }

    #[tokio::test]
    async fn test_wrong_public_key_fails() {
        let (alice, _) = claim("alice");
        let (_, other_pk) = claim("carol");
        let bound = BoundValue::MessageId("n1".into());
        let cert = CertificateManager::make(&alice, &bound).await.unwrap();

        assert!(CertificateManager::verify(&cert, &other_pk, &bound).is_err());
    }

    #[tokio::test]
    async fn test_strategies_do_not_mix() {
        let (alice, pk) = claim("alice");
        let cert = CertificateManager::make_for_claim(&alice).await.unwrap();

        assert!(CertificateManager::verify(&cert, &pk, &BoundValue::MessageId("alice".into())).is_err());
    }

    #[tokio::test]
    async fn test_verify_and_extract() {
        let (alice, pk) = claim("alice");

        let cert = CertificateManager::make(&alice, &BoundValue::MessageId("m-7".into()))
            .await
            .unwrap();
        assert_eq!(
            CertificateManager::verify_and_extract(&cert, &pk).unwrap(),
            BoundValue::MessageId("m-7".into())
        );

        let mut claim_cert = CertificateManager::make_for_claim(&alice).await.unwrap();
        assert_eq!(
            CertificateManager::verify_and_extract(&claim_cert, &pk).unwrap(),
            BoundValue::Claim(Identity::new("alice"))
        );

        claim_cert.claim = Identity::new("bob");
        assert!(CertificateManager::verify_and_extract(&claim_cert, &pk).is_err());
    }

    #[test]
    fn test_certificate_wire_shape() {
        let cert = Certificate {
            claim: Identity::new("alice"),
            proof: "a.b.c".into(),
        };
        assert_eq!(
            serde_json::to_value(&cert).unwrap(),
            json!({"claim": "alice", "proof": "a.b.c"})
        );
    }

    #[tokio::test]
    async fn test_message_bound_nonce_covers_context() {
        let (alice, pk) = claim("alice");
        let bound = BoundValue::for_message("m-1", &[b"bob", b"1700000000000", b"\"pay 5\""]);
        let cert = CertificateManager::make(&alice, &bound).await.unwrap();
        CertificateManager::verify(&cert, &pk, &bound).unwrap();

        let other_recipient =
            BoundValue::for_message("m-1", &[b"carol", b"1700000000000", b"\"pay 5\""]);
        let other_data =
            BoundValue::for_message("m-1", &[b"bob", b"1700000000000", b"\"pay 500\""]);
        assert!(CertificateManager::verify(&cert, &pk, &other_recipient).is_err());
        assert!(CertificateManager::verify(&cert, &pk, &other_data).is_err());
    }

    #[test]
    fn test_message_binding_is_length_prefixed() {
        assert_ne!(
            BoundValue::for_message("m", &[b"ab", b"c"]),
            BoundValue::for_message("m", &[b"a", b"bc"])
        );
        match BoundValue::for_message("m-1", &[b"x"]) {
            BoundValue::MessageId(nonce) => assert!(nonce.starts_with("m-1.")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
