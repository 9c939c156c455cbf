//! Payload encryption for state blobs
//!
//! Payloads are encrypted with AES-256-GCM before they touch disk. Key
//! material comes from the caller (resolved from an environment variable or
//! secret file by the CLI); this module never generates or persists keys.

use crate::error::{Result, StoreError};
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

const NONCE_LEN: usize = 12;

/// AES-256-GCM cipher for state payloads
#[derive(Clone)]
pub struct Cipher {
    key: Key<Aes256Gcm>,
}

impl Cipher {
    /// Create a cipher from raw 32-byte key material
    pub fn new(key_bytes: [u8; 32]) -> Self {
        Self {
            key: *Key::<Aes256Gcm>::from_slice(&key_bytes),
        }
    }

    /// Create a cipher from base64-encoded key material
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| StoreError::Crypto(format!("key material is not valid base64: {}", e)))?;
        let key_bytes: [u8; 32] = bytes.try_into().map_err(|_| {
            StoreError::Crypto("key material must decode to exactly 32 bytes".to_string())
        })?;
        Ok(Self::new(key_bytes))
    }

    /// Encrypt a payload, returning base64(nonce || ciphertext)
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String> {
        let cipher = Aes256Gcm::new(&self.key);
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| StoreError::Crypto(format!("encryption failed: {}", e)))?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce);
        combined.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(combined))
    }

    /// Decrypt base64(nonce || ciphertext) back into the payload
    pub fn decrypt(&self, encoded: &str) -> Result<Vec<u8>> {
        let combined = BASE64
            .decode(encoded)
            .map_err(|e| StoreError::Crypto(format!("ciphertext is not valid base64: {}", e)))?;
        if combined.len() < NONCE_LEN {
            return Err(StoreError::Crypto("ciphertext is truncated".to_string()));
        }

        let (nonce, ciphertext) = combined.split_at(NONCE_LEN);
        let cipher = Aes256Gcm::new(&self.key);
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| StoreError::Crypto(format!("decryption failed: {}", e)))
    }
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material
        f.debug_struct("Cipher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let cipher = Cipher::new([7u8; 32]);
        let encrypted = cipher.encrypt(b"ingress: 443").unwrap();
        assert_ne!(encrypted.as_bytes(), b"ingress: 443");
        assert_eq!(cipher.decrypt(&encrypted).unwrap(), b"ingress: 443");
    }

    #[test]
    fn test_wrong_key_fails() {
        let cipher = Cipher::new([7u8; 32]);
        let other = Cipher::new([8u8; 32]);
        let encrypted = cipher.encrypt(b"secret").unwrap();
        assert!(other.decrypt(&encrypted).is_err());
    }

    #[test]
    fn test_from_base64_rejects_short_key() {
        let result = Cipher::from_base64("c2hvcnQ=");
        assert!(matches!(result, Err(StoreError::Crypto(_))));
    }
}
