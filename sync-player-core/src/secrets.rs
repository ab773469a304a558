//! At-rest encryption for the admin fingerprint (spec §3, §6.2).
//!
//! The admin fingerprint is a short secret the first admin claim binds to a
//! room; it is persisted to disk and must not be recoverable from the store
//! file alone. Encryption follows the same authenticated, versioned envelope
//! the room store uses for other sensitive fields: a key-version byte, a
//! random 96-bit nonce, and the AES-256-GCM ciphertext, base64-encoded and
//! tagged with an `enc:` prefix so legacy plaintext entries can still be read.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use base64::Engine;

use crate::error::{Error, Result};

const NONCE_SIZE: usize = 12;
const ENCRYPTED_PREFIX: &str = "enc:";
const KEY_VERSION: u8 = 0x01;

/// Encrypts and decrypts admin fingerprints at rest.
#[derive(Clone)]
pub struct FingerprintCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for FingerprintCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FingerprintCipher")
            .field("cipher", &"[REDACTED]")
            .finish()
    }
}

impl FingerprintCipher {
    /// Builds a cipher from a 32-byte key.
    pub fn new(key_bytes: &[u8]) -> Result<Self> {
        if key_bytes.len() != 32 {
            return Err(Error::Internal(format!(
                "encryption key must be exactly 32 bytes, got {}",
                key_bytes.len()
            )));
        }
        let key = Key::<Aes256Gcm>::from_slice(key_bytes);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Builds a cipher from a 64-character hex-encoded key.
    pub fn from_hex_key(hex_key: &str) -> Result<Self> {
        let key_bytes =
            hex::decode(hex_key).map_err(|e| Error::Internal(format!("invalid hex key: {e}")))?;
        Self::new(&key_bytes)
    }

    /// Loads the key from `SYNC_ENCRYPTION_KEY` (hex), or generates a random
    /// one for this process's lifetime if unset. A generated key means
    /// fingerprints written this run become unreadable after restart —
    /// callers should warn when `source()` reports `KeySource::Generated`.
    pub fn from_env() -> (Self, KeySource) {
        match std::env::var("SYNC_ENCRYPTION_KEY") {
            Ok(hex_key) => match Self::from_hex_key(&hex_key) {
                Ok(cipher) => (cipher, KeySource::Environment),
                Err(_) => (Self::generate(), KeySource::Generated),
            },
            Err(_) => (Self::generate(), KeySource::Generated),
        }
    }

    fn generate() -> Self {
        let mut key_bytes = [0u8; 32];
        OsRng.fill_bytes(&mut key_bytes);
        Self::new(&key_bytes).expect("32-byte key is always valid")
    }

    /// Encrypts a fingerprint string, returning `enc:<base64 envelope>`.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| Error::Internal(format!("fingerprint encryption failed: {e}")))?;

        let mut combined = Vec::with_capacity(1 + NONCE_SIZE + ciphertext.len());
        combined.push(KEY_VERSION);
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        let encoded = base64::engine::general_purpose::STANDARD.encode(&combined);
        Ok(format!("{ENCRYPTED_PREFIX}{encoded}"))
    }

    /// Decrypts a value produced by [`encrypt`](Self::encrypt). Plaintext
    /// values without the `enc:` prefix are returned unchanged, to tolerate
    /// store files written before encryption was enabled.
    pub fn decrypt(&self, stored: &str) -> Result<String> {
        let Some(encoded) = stored.strip_prefix(ENCRYPTED_PREFIX) else {
            return Ok(stored.to_string());
        };

        let combined = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| Error::Internal(format!("invalid base64 in stored fingerprint: {e}")))?;

        if combined.len() < 1 + NONCE_SIZE {
            return Err(Error::Internal("stored fingerprint too short".to_string()));
        }

        let version = combined[0];
        if version != KEY_VERSION {
            return Err(Error::Internal(format!(
                "unsupported fingerprint encryption version: {version}"
            )));
        }

        let (nonce_bytes, ciphertext) = combined[1..].split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| Error::Internal("fingerprint decryption failed".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|e| Error::Internal(format!("decrypted fingerprint is not valid utf-8: {e}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Environment,
    Generated,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> Vec<u8> {
        (0u8..32).collect()
    }

    #[test]
    fn round_trips_a_fingerprint() {
        let cipher = FingerprintCipher::new(&test_key()).unwrap();
        let encrypted = cipher.encrypt("device-fingerprint-abc123").unwrap();
        assert!(encrypted.starts_with("enc:"));
        assert_eq!(cipher.decrypt(&encrypted).unwrap(), "device-fingerprint-abc123");
    }

    #[test]
    fn tolerates_legacy_plaintext() {
        let cipher = FingerprintCipher::new(&test_key()).unwrap();
        assert_eq!(cipher.decrypt("legacy-plain-value").unwrap(), "legacy-plain-value");
    }

    #[test]
    fn rejects_tampered_ciphertext() {
        let cipher = FingerprintCipher::new(&test_key()).unwrap();
        let mut encrypted = cipher.encrypt("secret").unwrap();
        encrypted.push('x');
        assert!(cipher.decrypt(&encrypted).is_err());
    }

    #[test]
    fn rejects_wrong_key_length() {
        assert!(FingerprintCipher::new(&[0u8; 16]).is_err());
    }
}
