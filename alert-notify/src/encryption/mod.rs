//! Secure settings encryption.
//!
//! Channel secrets (tokens, credentialed URLs) are persisted only as
//! ciphertext. The [`SecretsEncryption`] trait is the seam to the encryption
//! primitive, [`SecureSettingsCodec`] binds it to the process secret key and
//! implements the merge used by updates, and [`SecretsAccessor`] is the
//! read-only view of decrypted values handed to notifier constructors.

mod aes;

pub use aes::AesGcmEncryption;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::{Error, Result};

/// Decrypted secure settings, keyed by field name.
pub type SecretMap = HashMap<String, String>;

/// Process-wide secret key. Its `Debug` output never contains the key.
#[derive(Clone)]
pub struct SecretKey(String);

impl SecretKey {
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(Error::config("secret key must not be empty"));
        }
        Ok(Self(key))
    }

    /// Raw key material, for encryption implementations only.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

/// Encryption primitive for secret maps.
#[async_trait]
pub trait SecretsEncryption: Send + Sync {
    /// Encrypt a secret map. Output need not be deterministic.
    async fn encrypt_map(&self, secrets: &SecretMap, key: &SecretKey) -> Result<Vec<u8>>;

    /// Decrypt a payload produced by [`encrypt_map`](Self::encrypt_map).
    async fn decrypt_map(&self, payload: &[u8], key: &SecretKey) -> Result<SecretMap>;

    /// Decrypt a single field; `None` when the field is absent.
    async fn decrypt_field(
        &self,
        payload: &[u8],
        key: &SecretKey,
        field: &str,
    ) -> Result<Option<String>> {
        let mut secrets = self.decrypt_map(payload, key).await?;
        Ok(secrets.remove(field))
    }
}

/// Read access to decrypted secure settings of one channel.
pub trait SecretsAccessor: Send + Sync {
    /// Decrypted value of `field`, if the channel has one.
    fn secure_value(&self, field: &str) -> Option<String>;

    /// Decrypted value of `field` when present and non-empty, otherwise `fallback`.
    fn value_or(&self, field: &str, fallback: &str) -> String {
        self.secure_value(field)
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| fallback.to_string())
    }
}

/// [`SecretsAccessor`] backed by an already-decrypted map.
#[derive(Clone, Default)]
pub struct DecryptedSecrets(SecretMap);

impl DecryptedSecrets {
    pub fn new(secrets: SecretMap) -> Self {
        Self(secrets)
    }

}

impl fmt::Debug for DecryptedSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.0.keys().collect();
        keys.sort();
        f.debug_struct("DecryptedSecrets")
            .field("keys", &keys)
            .finish()
    }
}

impl SecretsAccessor for DecryptedSecrets {
    fn secure_value(&self, field: &str) -> Option<String> {
        self.0.get(field).cloned()
    }
}

/// Secure settings codec: the encryption primitive bound to the secret key.
#[derive(Clone)]
pub struct SecureSettingsCodec {
    encryption: Arc<dyn SecretsEncryption>,
    key: SecretKey,
}

impl SecureSettingsCodec {
    pub fn new(encryption: Arc<dyn SecretsEncryption>, key: SecretKey) -> Self {
        Self { encryption, key }
    }

    pub async fn encrypt(&self, secrets: &SecretMap) -> Result<Vec<u8>> {
        self.encryption.encrypt_map(secrets, &self.key).await
    }

    /// Decrypt stored secure settings. Absent or empty ciphertext is an empty map.
    pub async fn decrypt(&self, payload: Option<&[u8]>) -> Result<SecretMap> {
        match payload {
            Some(bytes) if !bytes.is_empty() => self.encryption.decrypt_map(bytes, &self.key).await,
            _ => Ok(SecretMap::new()),
        }
    }

    pub async fn decrypt_field(&self, payload: Option<&[u8]>, field: &str) -> Result<Option<String>> {
        match payload {
            Some(bytes) if !bytes.is_empty() => {
                self.encryption.decrypt_field(bytes, &self.key, field).await
            }
            _ => Ok(None),
        }
    }

    /// Overlay `overlay` on the stored secrets and re-encrypt the union.
    ///
    /// Keys in `overlay` win; stored keys it omits are kept unchanged.
    pub async fn merge(
        &self,
        existing: Option<&[u8]>,
        overlay: &SecretMap,
    ) -> Result<(DecryptedSecrets, Vec<u8>)> {
        let mut merged = self.decrypt(existing).await?;
        merged.extend(overlay.iter().map(|(k, v)| (k.clone(), v.clone())));
        let ciphertext = self.encrypt(&merged).await?;
        Ok((DecryptedSecrets::new(merged), ciphertext))
    }
}

impl fmt::Debug for SecureSettingsCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureSettingsCodec")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> SecureSettingsCodec {
        SecureSettingsCodec::new(
            Arc::new(AesGcmEncryption::new()),
            SecretKey::new("test-secret").unwrap(),
        )
    }

    fn secrets(pairs: &[(&str, &str)]) -> SecretMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_empty_secret_key_rejected() {
        assert!(SecretKey::new("").is_err());
        assert_eq!(
            format!("{:?}", SecretKey::new("hunter2").unwrap()),
            "SecretKey(<redacted>)"
        );
    }

    #[tokio::test]
    async fn test_merge_keeps_omitted_keys() {
        let codec = codec();
        let stored = codec.encrypt(&secrets(&[("a", "1"), ("b", "2")])).await.unwrap();

        let (merged, ciphertext) = codec
            .merge(Some(stored.as_slice()), &secrets(&[("b", "3"), ("c", "4")]))
            .await
            .unwrap();

        let expected = secrets(&[("a", "1"), ("b", "3"), ("c", "4")]);
        for (field, value) in &expected {
            assert_eq!(merged.secure_value(field).as_ref(), Some(value));
        }
        assert_eq!(codec.decrypt(Some(ciphertext.as_slice())).await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_merge_without_existing_ciphertext() {
        let codec = codec();
        let (merged, _) = codec.merge(None, &secrets(&[("token", "t")])).await.unwrap();
        assert_eq!(merged.secure_value("token").as_deref(), Some("t"));
    }

    #[tokio::test]
    async fn test_decrypt_field() {
        let codec = codec();
        let stored = codec.encrypt(&secrets(&[("password", "pw")])).await.unwrap();
        assert_eq!(
            codec.decrypt_field(Some(stored.as_slice()), "password").await.unwrap().as_deref(),
            Some("pw")
        );
        assert_eq!(codec.decrypt_field(Some(stored.as_slice()), "missing").await.unwrap(), None);
        assert_eq!(codec.decrypt_field(None, "password").await.unwrap(), None);
    }

    #[test]
    fn test_accessor_fallback() {
        let accessor = DecryptedSecrets::new(secrets(&[("url", "https://secret"), ("blank", "")]));
        assert_eq!(accessor.value_or("url", "https://plain"), "https://secret");
        assert_eq!(accessor.value_or("blank", "fallback"), "fallback");
        assert_eq!(accessor.value_or("missing", "fallback"), "fallback");
    }

    #[test]
    fn test_decrypted_secrets_debug_hides_values() {
        let accessor = DecryptedSecrets::new(secrets(&[("token", "super-secret")]));
        let debug = format!("{:?}", accessor);
        assert!(debug.contains("token"));
        assert!(!debug.contains("super-secret"));
    }
}
