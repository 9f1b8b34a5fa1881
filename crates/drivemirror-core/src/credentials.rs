//! At-rest encryption for OAuth credentials
//!
//! Stored values have the form `<hex-nonce>:<hex-ciphertext>` (AES-256-GCM,
//! 12-byte random nonce). The key is the SHA-256 digest of the server secret.
//! A stored value without a `:` separator predates encryption and is returned
//! unchanged by [`CredentialCipher::decrypt`].

use std::fmt;

use aes_gcm::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use sha2::{Digest, Sha256};
use thiserror::Error;

const NONCE_LEN: usize = 12;

/// Errors from encrypting or decrypting stored credentials
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The secret used to derive the key is empty
    #[error("Credential secret must not be empty")]
    EmptySecret,

    /// The stored value is not valid hex or has a bad nonce length
    #[error("Malformed encrypted value: {0}")]
    Malformed(String),

    /// Authentication tag mismatch (wrong key or tampered value)
    #[error("Decryption failed")]
    DecryptionFailed,

    /// The cipher refused to encrypt
    #[error("Encryption failed")]
    EncryptionFailed,
}

/// Symmetric cipher for credentials stored in the database
#[derive(Clone)]
pub struct CredentialCipher {
    key: [u8; 32],
}

impl CredentialCipher {
    /// Derives the cipher key from a server secret
    ///
    /// # Errors
    /// Returns `CryptoError::EmptySecret` if the secret is empty
    pub fn from_secret(secret: &str) -> Result<Self, CryptoError> {
        if secret.is_empty() {
            return Err(CryptoError::EmptySecret);
        }
        let digest = Sha256::digest(secret.as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        Ok(Self { key })
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key))
    }

    /// Encrypts a plaintext credential into its stored form
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher()
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::EncryptionFailed)?;

        Ok(format!(
            "{}:{}",
            hex::encode(nonce_bytes),
            hex::encode(ciphertext)
        ))
    }

    /// Decrypts a stored credential
    ///
    /// Values without a `:` separator are legacy plaintext and pass through.
    pub fn decrypt(&self, stored: &str) -> Result<String, CryptoError> {
        let Some((nonce_hex, ct_hex)) = stored.split_once(':') else {
            return Ok(stored.to_string());
        };

        let nonce_bytes =
            hex::decode(nonce_hex).map_err(|e| CryptoError::Malformed(e.to_string()))?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(CryptoError::Malformed(format!(
                "nonce must be {NONCE_LEN} bytes, got {}",
                nonce_bytes.len()
            )));
        }
        let ciphertext =
            hex::decode(ct_hex).map_err(|e| CryptoError::Malformed(e.to_string()))?;

        let plaintext = self
            .cipher()
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|_| CryptoError::DecryptionFailed)?;

        String::from_utf8(plaintext).map_err(|e| CryptoError::Malformed(e.to_string()))
    }

    /// Encrypts an optional value, keeping `None` as `None`
    pub fn encrypt_opt(&self, plaintext: Option<&str>) -> Result<Option<String>, CryptoError> {
        plaintext.map(|p| self.encrypt(p)).transpose()
    }

    /// Decrypts an optional value, keeping `None` as `None`
    pub fn decrypt_opt(&self, stored: Option<&str>) -> Result<Option<String>, CryptoError> {
        stored.map(|s| self.decrypt(s)).transpose()
    }
}

impl fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialCipher")
            .field("key", &"[REDACTED]")
            .finish()
    }
}
