// ABOUTME: AES-256-GCM encryption service keyed by the master encryption key
// ABOUTME: Produces base64 nonce||ciphertext||tag payloads with a fresh random nonce per call
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::hashing;
use crate::constants::env_vars;
use crate::errors::{AppError, AppResult};
use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::{engine::general_purpose, Engine as _};
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::env;
use std::fmt;
use zeroize::Zeroizing;

/// AES-256 key size in bytes
pub const KEY_SIZE: usize = 32;
/// GCM nonce size in bytes
pub const NONCE_SIZE: usize = 12;
/// GCM authentication tag size in bytes
pub const TAG_SIZE: usize = 16;

/// Authenticated symmetric encryption for every secret the stores persist
///
/// Constructed once at startup from the master key and shared by reference.
/// The raw key bytes are zeroized as soon as the cipher is initialized.
pub struct EncryptionService {
    cipher: Aes256Gcm,
}

impl EncryptionService {
    /// Create the service from raw key bytes
    ///
    /// # Errors
    ///
    /// Returns `ConfigInvalid` if the key is not exactly 32 bytes
    pub fn from_bytes(key: &[u8]) -> AppResult<Self> {
        if key.len() != KEY_SIZE {
            return Err(AppError::config_invalid(format!(
                "Master encryption key must be exactly {KEY_SIZE} bytes, got {} bytes",
                key.len()
            )));
        }

        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| AppError::config_invalid(format!("Invalid master key: {e}")))?;

        Ok(Self { cipher })
    }

    /// Create the service from a base64-encoded key
    ///
    /// # Errors
    ///
    /// Returns `ConfigInvalid` if the value is not base64 or does not decode to 32 bytes
    pub fn from_base64_key(encoded_key: &str) -> AppResult<Self> {
        let key_bytes = Zeroizing::new(
            general_purpose::STANDARD
                .decode(encoded_key.trim())
                .map_err(|e| {
                    AppError::config_invalid(format!(
                        "Invalid base64 encoding in {}: {e}",
                        env_vars::MASTER_ENCRYPTION_KEY
                    ))
                })?,
        );

        Self::from_bytes(&key_bytes)
    }

    /// Load the master key from `PIERRE_MASTER_ENCRYPTION_KEY`
    ///
    /// There is no development fallback: a store must never start in an undefined
    /// security state.
    ///
    /// # Errors
    ///
    /// Returns `ConfigMissing` if the variable is unset, `ConfigInvalid` if it is malformed
    pub fn from_env() -> AppResult<Self> {
        let encoded = env::var(env_vars::MASTER_ENCRYPTION_KEY).map_err(|_| {
            AppError::config_missing(format!(
                "{} must be set to a base64-encoded 32-byte key",
                env_vars::MASTER_ENCRYPTION_KEY
            ))
        })?;
        Self::from_base64_key(&encoded)
    }

    /// Generate a fresh random master key, base64-encoded
    #[must_use]
    pub fn generate_key_base64() -> String {
        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        rand::thread_rng().fill_bytes(&mut *key);
        general_purpose::STANDARD.encode(&*key)
    }

    /// Encrypt plaintext into an opaque payload
    ///
    /// # Errors
    ///
    /// Returns `InternalError` if the cipher rejects the input
    pub fn encrypt(&self, plaintext: &str) -> AppResult<String> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| AppError::internal(format!("Encryption failed: {e}")))?;

        let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(general_purpose::STANDARD.encode(combined))
    }

    /// Decrypt a payload produced by [`Self::encrypt`]
    ///
    /// # Errors
    ///
    /// Returns `DecryptionFailed` for malformed payloads, tampered tags and payloads
    /// encrypted under a different key
    pub fn decrypt(&self, payload: &str) -> AppResult<String> {
        let combined = general_purpose::STANDARD
            .decode(payload)
            .map_err(|e| AppError::decryption(format!("Payload is not valid base64: {e}")))?;

        if combined.len() < NONCE_SIZE + TAG_SIZE {
            return Err(AppError::decryption("Payload too short"));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| AppError::decryption("Authentication tag mismatch"))?;

        String::from_utf8(plaintext)
            .map_err(|_| AppError::decryption("Decrypted payload is not valid UTF-8"))
    }

    /// Serialize a value to JSON and encrypt it
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or encryption fails
    pub fn encrypt_json<T: Serialize>(&self, value: &T) -> AppResult<String> {
        let json = Zeroizing::new(serde_json::to_string(value)?);
        self.encrypt(&json)
    }

    /// Decrypt a payload and deserialize the JSON inside it
    ///
    /// # Errors
    ///
    /// Returns `DecryptionFailed` if authentication fails, `SerializationError` if the
    /// plaintext is not the expected JSON shape
    pub fn decrypt_json<T: DeserializeOwned>(&self, payload: &str) -> AppResult<T> {
        let json = Zeroizing::new(self.decrypt(payload)?);
        Ok(serde_json::from_str(&json)?)
    }

    /// Deterministic, non-reversible storage identifier for a secret value
    #[must_use]
    pub fn hash_key(&self, value: &str) -> String {
        hashing::hash_key(value)
    }
}

impl fmt::Debug for EncryptionService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionService")
            .field("cipher", &"AES-256-GCM")
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_layout() {
        let service = EncryptionService::from_bytes(&[7u8; KEY_SIZE]).unwrap();
        let payload = service.encrypt("abc").unwrap();
        let raw = general_purpose::STANDARD.decode(payload).unwrap();
        assert_eq!(raw.len(), NONCE_SIZE + 3 + TAG_SIZE);
    }

    #[test]
    fn test_truncated_payload_is_decryption_failure() {
        let service = EncryptionService::from_bytes(&[7u8; KEY_SIZE]).unwrap();
        let short = general_purpose::STANDARD.encode([0u8; 8]);
        let err = service.decrypt(&short).unwrap_err();
        assert!(err.is_decryption_failure());
    }

    #[test]
    fn test_generated_key_round_trips_through_constructor() {
        let encoded = EncryptionService::generate_key_base64();
        assert!(EncryptionService::from_base64_key(&encoded).is_ok());
    }
}
