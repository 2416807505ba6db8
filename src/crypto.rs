//! Secret vault codec using AES-256-GCM
//!
//! Provider credential bundles are encrypted field by field before they are
//! persisted. Every field gets a fresh random nonce and is bound to its
//! provider and field name through additional authenticated data (AAD), so a
//! ciphertext copied into another column or another provider's bundle fails
//! to decrypt.
//!
//! Stored envelope (base64 encoded):
//!
//! ```text
//! | version (1) | key id (1) | nonce (12) | ciphertext + tag (n + 16) |
//! ```
//!
//! The key id lets the vault keep retired master keys around for decryption
//! while new ciphertexts are written under the active key.

#![allow(deprecated)]

use std::collections::HashMap;
use std::fmt;

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
};
use base64::{Engine as _, engine::general_purpose};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::models::ProviderTag;

type HmacSha256 = Hmac<Sha256>;

const ENVELOPE_VERSION: u8 = 0x01;
const HEADER_LEN: usize = 2;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const MIN_ENVELOPE_LEN: usize = HEADER_LEN + NONCE_LEN + TAG_LEN;
const KEY_LEN: usize = 32;

/// Purpose label mixed into key derivation so the vault key is never the
/// same bytes as any other key derived from the same external secret.
const KEY_DERIVATION_LABEL: &[u8] = b"provisioning/secret-vault/v1";

/// Vault error types
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("invalid master key: {0}")]
    InvalidKey(String),
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    /// Malformed envelope, unknown key, or failed tag verification.
    /// Never recovered from by treating the stored value as plaintext.
    #[error("integrity check failed: {0}")]
    Integrity(String),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

/// Secure wrapper for encryption keys with zeroization
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ZeroizingKey([u8; KEY_LEN]);

/// Type alias for crypto keys
pub type CryptoKey = ZeroizingKey;

impl fmt::Debug for ZeroizingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CryptoKey([REDACTED])")
    }
}

impl CryptoKey {
    /// Create a new crypto key from exactly 32 raw bytes
    pub fn new(bytes: Vec<u8>) -> Result<Self, VaultError> {
        let array: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| VaultError::InvalidKey("expected 32 bytes".to_string()))?;
        Ok(ZeroizingKey(array))
    }

    /// Derive the vault key from an external secret of any length.
    ///
    /// HMAC-SHA256 keyed with the vault purpose label: deterministic, always
    /// 32 bytes, and neither truncates long secrets nor repeats short ones.
    pub fn derive(secret: &str) -> Result<Self, VaultError> {
        if secret.trim().is_empty() {
            return Err(VaultError::InvalidKey("master key is empty".to_string()));
        }

        let mut mac = <HmacSha256 as Mac>::new_from_slice(KEY_DERIVATION_LABEL)
            .map_err(|e| VaultError::InvalidKey(e.to_string()))?;
        mac.update(secret.as_bytes());
        let mut derived = mac.finalize().into_bytes();

        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&derived);
        derived.as_mut_slice().zeroize();
        Ok(ZeroizingKey(key))
    }

    /// Get the key as bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Encrypt bytes into a raw envelope under `key_id`
pub fn encrypt_bytes(
    key: &CryptoKey,
    key_id: u8,
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, VaultError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    // Fresh nonce per call
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let mut ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| VaultError::EncryptionFailed(e.to_string()))?;

    let mut envelope = Vec::with_capacity(HEADER_LEN + NONCE_LEN + ciphertext.len());
    envelope.push(ENVELOPE_VERSION);
    envelope.push(key_id);
    envelope.extend_from_slice(&nonce);
    envelope.append(&mut ciphertext);

    Ok(envelope)
}

/// Read the key id from a raw envelope without decrypting it
pub fn envelope_key_id(envelope: &[u8]) -> Result<u8, VaultError> {
    if envelope.len() < MIN_ENVELOPE_LEN {
        return Err(VaultError::Integrity("envelope too short".to_string()));
    }
    if envelope[0] != ENVELOPE_VERSION {
        return Err(VaultError::Integrity(format!(
            "unsupported envelope version {:#04x}",
            envelope[0]
        )));
    }
    Ok(envelope[1])
}

/// Decrypt a raw envelope with `key`; the caller picks the key by key id
pub fn decrypt_bytes(key: &CryptoKey, aad: &[u8], envelope: &[u8]) -> Result<Vec<u8>, VaultError> {
    envelope_key_id(envelope)?;

    let nonce = Nonce::from_slice(&envelope[HEADER_LEN..HEADER_LEN + NONCE_LEN]);
    let ciphertext = &envelope[HEADER_LEN + NONCE_LEN..];

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    cipher
        .decrypt(
            nonce,
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| VaultError::Integrity("authentication tag mismatch".to_string()))
}

/// Plaintext credential set for one provider.
///
/// Lives only for the request that decrypted it and is wiped on drop.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct PlainSecretBundle {
    pub client_id: String,
    pub client_secret: String,
    pub signing_secret: String,
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default)]
    pub user_token: Option<String>,
}

impl fmt::Debug for PlainSecretBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlainSecretBundle")
            .field("client_id", &"[REDACTED]")
            .field("client_secret", &"[REDACTED]")
            .field("signing_secret", &"[REDACTED]")
            .field("bot_token", &self.bot_token.as_ref().map(|_| "[REDACTED]"))
            .field("user_token", &self.user_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl PlainSecretBundle {
    /// Reject bundles with a blank required field
    pub fn validate(&self) -> Result<(), VaultError> {
        if self.client_id.trim().is_empty() {
            return Err(VaultError::MissingField("client_id"));
        }
        if self.client_secret.trim().is_empty() {
            return Err(VaultError::MissingField("client_secret"));
        }
        if self.signing_secret.trim().is_empty() {
            return Err(VaultError::MissingField("signing_secret"));
        }
        Ok(())
    }
}

/// Encrypted credential set, one base64 envelope per field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherBundle {
    pub client_id: String,
    pub client_secret: String,
    pub signing_secret: String,
    pub bot_token: Option<String>,
    pub user_token: Option<String>,
}

impl CipherBundle {
    fn fields(&self) -> impl Iterator<Item = &str> {
        [
            Some(self.client_id.as_str()),
            Some(self.client_secret.as_str()),
            Some(self.signing_secret.as_str()),
            self.bot_token.as_deref(),
            self.user_token.as_deref(),
        ]
        .into_iter()
        .flatten()
    }
}

fn field_aad(provider: ProviderTag, field: &str) -> String {
    format!("{}|{}", provider.as_str(), field)
}

/// Keyring holding the active master key and any retired ones
#[derive(Debug, Clone)]
pub struct Vault {
    active_key_id: u8,
    keys: HashMap<u8, CryptoKey>,
}

impl Vault {
    pub fn new(active_key_id: u8, active_key: CryptoKey) -> Self {
        let mut keys = HashMap::new();
        keys.insert(active_key_id, active_key);
        Self {
            active_key_id,
            keys,
        }
    }

    /// Keep a retired key for decrypting envelopes written before rotation.
    /// The active key is never replaced.
    pub fn with_retired_key(mut self, key_id: u8, key: CryptoKey) -> Self {
        if key_id != self.active_key_id {
            self.keys.insert(key_id, key);
        }
        self
    }

    pub fn active_key_id(&self) -> u8 {
        self.active_key_id
    }

    fn active_key(&self) -> Result<&CryptoKey, VaultError> {
        self.keys
            .get(&self.active_key_id)
            .ok_or_else(|| VaultError::InvalidKey("active key missing from keyring".to_string()))
    }

    pub fn encrypt_field(&self, aad: &str, plaintext: &str) -> Result<String, VaultError> {
        let envelope = encrypt_bytes(
            self.active_key()?,
            self.active_key_id,
            aad.as_bytes(),
            plaintext.as_bytes(),
        )?;
        Ok(general_purpose::STANDARD.encode(envelope))
    }

    pub fn decrypt_field(&self, aad: &str, stored: &str) -> Result<String, VaultError> {
        let envelope = general_purpose::STANDARD
            .decode(stored)
            .map_err(|_| VaultError::Integrity("envelope is not valid base64".to_string()))?;
        let key_id = envelope_key_id(&envelope)?;
        let key = self
            .keys
            .get(&key_id)
            .ok_or_else(|| VaultError::Integrity(format!("unknown key id {}", key_id)))?;

        let mut plaintext = decrypt_bytes(key, aad.as_bytes(), &envelope)?;
        let decoded = String::from_utf8(plaintext.clone())
            .map_err(|_| VaultError::Integrity("plaintext is not valid UTF-8".to_string()));
        plaintext.zeroize();
        decoded
    }

    /// Key id a stored field was written under
    pub fn stored_key_id(stored: &str) -> Result<u8, VaultError> {
        let envelope = general_purpose::STANDARD
            .decode(stored)
            .map_err(|_| VaultError::Integrity("envelope is not valid base64".to_string()))?;
        envelope_key_id(&envelope)
    }

    pub fn encrypt_bundle(
        &self,
        provider: ProviderTag,
        plain: &PlainSecretBundle,
    ) -> Result<CipherBundle, VaultError> {
        plain.validate()?;

        let encrypt = |field: &str, value: &str| {
            self.encrypt_field(&field_aad(provider, field), value)
        };

        Ok(CipherBundle {
            client_id: encrypt("client_id", &plain.client_id)?,
            client_secret: encrypt("client_secret", &plain.client_secret)?,
            signing_secret: encrypt("signing_secret", &plain.signing_secret)?,
            bot_token: plain
                .bot_token
                .as_deref()
                .map(|token| encrypt("bot_token", token))
                .transpose()?,
            user_token: plain
                .user_token
                .as_deref()
                .map(|token| encrypt("user_token", token))
                .transpose()?,
        })
    }

    pub fn decrypt_bundle(
        &self,
        provider: ProviderTag,
        cipher: &CipherBundle,
    ) -> Result<PlainSecretBundle, VaultError> {
        let decrypt = |field: &str, value: &str| {
            self.decrypt_field(&field_aad(provider, field), value)
        };

        Ok(PlainSecretBundle {
            client_id: decrypt("client_id", &cipher.client_id)?,
            client_secret: decrypt("client_secret", &cipher.client_secret)?,
            signing_secret: decrypt("signing_secret", &cipher.signing_secret)?,
            bot_token: cipher
                .bot_token
                .as_deref()
                .map(|token| decrypt("bot_token", token))
                .transpose()?,
            user_token: cipher
                .user_token
                .as_deref()
                .map(|token| decrypt("user_token", token))
                .transpose()?,
        })
    }

    /// True when every field of `cipher` is already under the active key
    pub fn is_current(&self, cipher: &CipherBundle) -> Result<bool, VaultError> {
        for field in cipher.fields() {
            if Self::stored_key_id(field)? != self.active_key_id {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
