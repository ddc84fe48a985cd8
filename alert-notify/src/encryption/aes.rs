//! AES-256-GCM implementation of [`SecretsEncryption`].
//!
//! Payload layout: `salt (8) || nonce (12) || ciphertext+tag`. The key is
//! `SHA-256(salt || secret)`, so every payload carries its own key material
//! and rotating the salt never requires a schema change.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use async_trait::async_trait;
use rand::random;
use sha2::{Digest, Sha256};

use super::{SecretKey, SecretMap, SecretsEncryption};
use crate::{Error, Result};

const SALT_LEN: usize = 8;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Default secure settings encryption.
#[derive(Debug, Clone, Copy, Default)]
pub struct AesGcmEncryption;

impl AesGcmEncryption {
    pub fn new() -> Self {
        Self
    }

    fn cipher(salt: &[u8], key: &SecretKey) -> Result<Aes256Gcm> {
        let mut hasher = Sha256::new();
        hasher.update(salt);
        hasher.update(key.expose().as_bytes());
        let digest = hasher.finalize();

        Aes256Gcm::new_from_slice(digest.as_slice())
            .map_err(|_| Error::encryption("invalid derived key length"))
    }
}

#[async_trait]
impl SecretsEncryption for AesGcmEncryption {
    async fn encrypt_map(&self, secrets: &SecretMap, key: &SecretKey) -> Result<Vec<u8>> {
        let plaintext = serde_json::to_vec(secrets)?;
        let salt = random::<[u8; SALT_LEN]>();
        let nonce = random::<[u8; NONCE_LEN]>();

        let ciphertext = Self::cipher(&salt, key)?
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
            .map_err(|_| Error::encryption("AES-GCM encryption failed"))?;

        let mut payload = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(&salt);
        payload.extend_from_slice(&nonce);
        payload.extend_from_slice(&ciphertext);
        Ok(payload)
    }

    async fn decrypt_map(&self, payload: &[u8], key: &SecretKey) -> Result<SecretMap> {
        if payload.len() < SALT_LEN + NONCE_LEN + TAG_LEN {
            return Err(Error::encryption(format!(
                "secure settings payload too short ({} bytes)",
                payload.len()
            )));
        }

        let (salt, rest) = payload.split_at(SALT_LEN);
        let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

        let plaintext = Self::cipher(salt, key)?
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| Error::encryption("failed to decrypt secure settings"))?;

        serde_json::from_slice(&plaintext)
            .map_err(|e| Error::encryption(format!("malformed secure settings: {}", e)))
    }
}
