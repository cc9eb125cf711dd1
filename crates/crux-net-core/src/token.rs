//! Compact signed tokens (JWS compact serialization, `ES256K`).
//!
//! A token is three base64url segments: `header.payload.signature`. The
//! signature is ECDSA-secp256k1 over SHA-256 of `header.payload`, encoded as
//! the 64-byte `r || s` form.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::crypto::{Keypair, Secp256k1PublicKey};
use crate::error::{CoreError, Result};

/// The only algorithm accepted.
pub const ALG_ES256K: &str = "ES256K";

#[derive(Debug, Serialize, Deserialize)]
struct TokenHeader {
    alg: String,
    typ: String,
}

/// Signs and verifies compact tokens.
pub struct CompactToken;

impl CompactToken {
    /// Sign a JSON payload with `keypair`, producing a compact token.
    pub fn sign(keypair: &Keypair, payload: &Value) -> Result<String> {
        let header = TokenHeader {
            alg: ALG_ES256K.into(),
            typ: "JWT".into(),
        };
        let header_json =
            serde_json::to_vec(&header).map_err(|e| CoreError::EncodingError(e.to_string()))?;
        let payload_json =
            serde_json::to_vec(payload).map_err(|e| CoreError::EncodingError(e.to_string()))?;

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header_json),
            URL_SAFE_NO_PAD.encode(payload_json)
        );
        let signature = keypair.sign(signing_input.as_bytes());

        Ok(format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature)))
    }

    /// Verify `token` against `public_key` and return its payload.
    pub fn verify(token: &str, public_key: &Secp256k1PublicKey) -> Result<Value> {
        let mut parts = token.split('.');
        let (header_b64, payload_b64, sig_b64) = match (parts.next(), parts.next(), parts.next()) {
            (Some(h), Some(p), Some(s)) => (h, p, s),
            _ => return Err(CoreError::MalformedToken("expected three segments".into())),
        };
        if parts.next().is_some() {
            return Err(CoreError::MalformedToken("expected three segments".into()));
        }

        let header: TokenHeader = serde_json::from_slice(&decode_segment(header_b64)?)
            .map_err(|e| CoreError::MalformedToken(e.to_string()))?;
        if header.alg != ALG_ES256K {
            return Err(CoreError::MalformedToken(format!(
                "unsupported alg {}",
                header.alg
            )));
        }

        let signature = decode_segment(sig_b64)?;
        let signing_input_len = header_b64.len() + 1 + payload_b64.len();
        public_key.verify(&token.as_bytes()[..signing_input_len], &signature)?;

        serde_json::from_slice(&decode_segment(payload_b64)?)
            .map_err(|e| CoreError::MalformedToken(e.to_string()))
    }

    /// Decode the payload without checking the signature.
    ///
    /// Only for diagnostics; never trust the result.
    pub fn peek_payload(token: &str) -> Result<Value> {
        let payload_b64 = token
            .split('.')
            .nth(1)
            .ok_or_else(|| CoreError::MalformedToken("missing payload segment".into()))?;
        serde_json::from_slice(&decode_segment(payload_b64)?)
            .map_err(|e| CoreError::MalformedToken(e.to_string()))
    }
}

fn decode_segment(segment: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| CoreError::MalformedToken(e.to_string()))
}
