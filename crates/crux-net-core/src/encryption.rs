//! ECIES envelopes over secp256k1.
//!
//! Layout is compatible with the widely deployed `eccrypto` scheme:
//!
//! 1. ephemeral keypair `e`, shared point `S = e * recipient`
//! 2. `SHA-512(S.x)` split into `enc_key` (first 32 bytes) and `mac_key`
//! 3. `ciphertext = AES-256-CBC(enc_key, iv, PKCS#7(plaintext))`
//! 4. `mac = HMAC-SHA256(mac_key, iv || ephemPublicKey || ciphertext)`
//!
//! The envelope is serialized as JSON with hex fields.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use k256::SecretKey;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};

use crate::crypto::{Keypair, Secp256k1PublicKey, SharedSecret};
use crate::error::{CoreError, Result};
use crate::key_manager::KeyManager;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// IV length for AES-CBC.
pub const IV_LEN: usize = 16;

/// Self-describing ECIES output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    #[serde(with = "hex::serde")]
    pub iv: Vec<u8>,

    /// Uncompressed SEC1 ephemeral public key.
    #[serde(rename = "ephemPublicKey", with = "hex::serde")]
    pub ephem_public_key: Vec<u8>,

    #[serde(with = "hex::serde")]
    pub ciphertext: Vec<u8>,

    #[serde(with = "hex::serde")]
    pub mac: Vec<u8>,
}

impl EncryptedEnvelope {
    /// Serialize to JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| CoreError::EncodingError(e.to_string()))
    }

    /// Parse from JSON bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| CoreError::MalformedEnvelope(e.to_string()))
    }
}

/// Stateless ECIES encrypt/decrypt.
pub struct EncryptionManager;

impl EncryptionManager {
    /// Encrypt `plaintext` to `recipient`.
    pub fn encrypt(plaintext: &[u8], recipient: &Secp256k1PublicKey) -> Result<EncryptedEnvelope> {
        let ephemeral = Keypair::generate();
        let ephem_public_key = ephemeral.public_key().to_bytes();
        let shared = ephemeral.diffie_hellman(recipient);
        let (enc_key, mac_key) = derive_keys(&shared);

        let mut iv = vec![0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);

        let ciphertext = Aes256CbcEnc::new_from_slices(&enc_key, &iv)
            .map_err(|e| CoreError::EncryptionError(e.to_string()))?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let mac = compute_mac(&mac_key, &iv, &ephem_public_key, &ciphertext)?;

        Ok(EncryptedEnvelope {
            iv,
            ephem_public_key,
            ciphertext,
            mac,
        })
    }

    /// Decrypt through a key manager that encapsulates the recipient key.
    pub async fn decrypt(envelope: &EncryptedEnvelope, key_manager: &dyn KeyManager) -> Result<Vec<u8>> {
        key_manager.decrypt(envelope).await
    }

    /// Parse and decrypt serialized envelope bytes.
    ///
    /// Anything that does not parse as an envelope is reported as
    /// [`CoreError::DecryptionFailed`]: to the receiver it is foreign ciphertext.
    pub async fn decrypt_bytes(bytes: &[u8], key_manager: &dyn KeyManager) -> Result<Vec<u8>> {
        let envelope =
            EncryptedEnvelope::from_bytes(bytes).map_err(|_| CoreError::DecryptionFailed)?;
        Self::decrypt(&envelope, key_manager).await
    }
}

/// Open an envelope with a raw secret key.
pub(crate) fn open(secret: &SecretKey, envelope: &EncryptedEnvelope) -> Result<Vec<u8>> {
    let ephemeral = Secp256k1PublicKey::from_sec1_bytes(&envelope.ephem_public_key)
        .map_err(|_| CoreError::DecryptionFailed)?;
    let shared = SharedSecret::derive(secret, &ephemeral);
    let (enc_key, mac_key) = derive_keys(&shared);

    let mut mac = <HmacSha256 as Mac>::new_from_slice(&mac_key)
        .map_err(|_| CoreError::DecryptionFailed)?;
    mac.update(&envelope.iv);
    mac.update(&envelope.ephem_public_key);
    mac.update(&envelope.ciphertext);
    mac.verify_slice(&envelope.mac)
        .map_err(|_| CoreError::DecryptionFailed)?;

    Aes256CbcDec::new_from_slices(&enc_key, &envelope.iv)
        .map_err(|_| CoreError::DecryptionFailed)?
        .decrypt_padded_vec_mut::<Pkcs7>(&envelope.ciphertext)
        .map_err(|_| CoreError::DecryptionFailed)
}

fn derive_keys(shared: &SharedSecret) -> ([u8; 32], [u8; 32]) {
    let hash = Sha512::digest(shared.as_bytes());
    let mut enc_key = [0u8; 32];
    let mut mac_key = [0u8; 32];
    enc_key.copy_from_slice(&hash[..32]);
    mac_key.copy_from_slice(&hash[32..]);
    (enc_key, mac_key)
}

fn compute_mac(mac_key: &[u8], iv: &[u8], ephem: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(mac_key)
        .map_err(|e| CoreError::EncryptionError(e.to_string()))?;
    mac.update(iv);
    mac.update(ephem);
    mac.update(ciphertext);
    Ok(mac.finalize().into_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_manager::{LocalKeyManager, PublicKeyOnly};
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_encrypt_decrypt_roundtrip() {
        let km = LocalKeyManager::generate();
        let envelope = EncryptionManager::encrypt(b"HelloWorld", &km.public_key_sync()).unwrap();

        assert_eq!(envelope.iv.len(), IV_LEN);
        assert_eq!(envelope.ephem_public_key.len(), 65);
        assert_eq!(envelope.mac.len(), 32);

        let plaintext = EncryptionManager::decrypt(&envelope, &km).await.unwrap();
        assert_eq!(plaintext, b"HelloWorld");
    }

    #[tokio::test]
    async fn test_wrong_recipient_is_decryption_failure() {
        let intended = LocalKeyManager::generate();
        let other = LocalKeyManager::generate();
        let envelope = EncryptionManager::encrypt(b"secret", &intended.public_key_sync()).unwrap();

        assert!(matches!(
            EncryptionManager::decrypt(&envelope, &other).await,
            Err(CoreError::DecryptionFailed)
        ));
    }

    #[tokio::test]
    async fn test_tampered_ciphertext_fails_mac() {
        let km = LocalKeyManager::generate();
        let mut envelope = EncryptionManager::encrypt(b"secret", &km.public_key_sync()).unwrap();
        envelope.ciphertext[0] ^= 0x01;

        assert!(matches!(
            EncryptionManager::decrypt(&envelope, &km).await,
            Err(CoreError::DecryptionFailed)
        ));
    }

    #[tokio::test]
    async fn test_garbage_bytes_are_decryption_failure() {
        let km = LocalKeyManager::generate();
        assert!(matches!(
            EncryptionManager::decrypt_bytes(b"definitely not an envelope", &km).await,
            Err(CoreError::DecryptionFailed)
        ));
    }

    #[tokio::test]
    async fn test_verifier_only_cannot_decrypt() {
        let km = LocalKeyManager::generate();
        let envelope = EncryptionManager::encrypt(b"x", &km.public_key_sync()).unwrap();
        let verifier = PublicKeyOnly::new(km.public_key_sync());

        assert!(matches!(
            EncryptionManager::decrypt(&envelope, &verifier).await,
            Err(CoreError::Unsupported("decrypt"))
        ));
    }

    #[test]
    fn test_envelope_json_shape() {
        let km = LocalKeyManager::generate();
        let envelope = EncryptionManager::encrypt(b"x", &km.public_key_sync()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&envelope.to_bytes().unwrap()).unwrap();

        for field in ["iv", "ephemPublicKey", "ciphertext", "mac"] {
            assert!(value[field].is_string(), "missing {field}");
        }
        let recovered = EncryptedEnvelope::from_bytes(&envelope.to_bytes().unwrap()).unwrap();
        assert_eq!(recovered, envelope);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_roundtrip(plaintext in prop::collection::vec(any::<u8>(), 0..512)) {
            let keypair = Keypair::generate();
            let envelope = EncryptionManager::encrypt(&plaintext, &keypair.public_key()).unwrap();
            let opened = open(keypair.secret(), &envelope).unwrap();
            prop_assert_eq!(opened, plaintext);
        }
    }
}
