// ABOUTME: OAuth token store abstraction with encrypted records and an encrypted refresh-token index
// ABOUTME: Pluggable backends (in-memory, file, Redis) keyed only by hashed token values
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

/// File-backed token store
pub mod file;
/// In-memory token store
pub mod memory;
/// Redis token store
pub mod redis;
/// Deterministic provider dispatch for refresh-token grants
pub mod refresh;

pub use file::FileTokenStore;
pub use memory::InMemoryTokenStore;
pub use redis::RedisTokenStore;
pub use refresh::{ProviderTokenRefresher, RefreshedTokens, TokenRefreshService};

use crate::crypto::{hash_key, EncryptionService};
use crate::errors::AppResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identity of the user an access token was issued to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    /// Subject identifier at the provider
    pub sub: String,
    /// Email address, if the provider shared one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Display name, if the provider shared one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Provider that authenticated the user
    pub provider: String,
}

/// Everything known about an issued access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredTokenInfo {
    /// The access token value itself
    pub access_token: String,
    /// Refresh token issued alongside, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// OpenID Connect ID token, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    /// Provider that owns the token (drives refresh dispatch)
    pub provider: String,
    /// Granted scopes
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Expiry in epoch milliseconds
    pub expires_at: i64,
    /// Authenticated user
    pub user_info: UserInfo,
}

impl StoredTokenInfo {
    /// Whether the token is past its expiry at `now_ms`
    #[must_use]
    pub const fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at
    }
}

/// Result of a refresh-token lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshLookup {
    /// Access token the refresh token is linked to
    pub access_token: String,
    /// Its stored metadata
    pub info: StoredTokenInfo,
}

/// Persistence contract for OAuth access tokens
///
/// Implementations never use a raw token as a storage key and never store
/// token metadata unencrypted.
///
/// # Examples
///
/// ```rust,no_run
/// use pierre_auth_store::crypto::EncryptionService;
/// use pierre_auth_store::oauth_tokens::{InMemoryTokenStore, StoredTokenInfo, TokenStore, UserInfo};
/// use std::sync::Arc;
/// # async fn example() -> Result<(), pierre_auth_store::errors::AppError> {
/// let encryption = Arc::new(EncryptionService::from_env()?);
/// let store = InMemoryTokenStore::new(encryption);
///
/// let info = StoredTokenInfo {
///     access_token: "at-123".to_owned(),
///     refresh_token: Some("rt-456".to_owned()),
///     id_token: None,
///     provider: "google".to_owned(),
///     scopes: vec!["openid".to_owned()],
///     expires_at: chrono::Utc::now().timestamp_millis() + 3_600_000,
///     user_info: UserInfo {
///         sub: "user-1".to_owned(),
///         email: None,
///         name: None,
///         provider: "google".to_owned(),
///     },
/// };
/// store.store_token("at-123", &info).await?;
///
/// let found = store.find_by_refresh_token("rt-456").await?;
/// assert_eq!(found.map(|lookup| lookup.access_token).as_deref(), Some("at-123"));
/// # Ok(())
/// # }
/// ```
#[async_trait::async_trait]
pub trait TokenStore: Send + Sync {
    /// Store `info` under the hashed access token and index its refresh token
    ///
    /// # Errors
    ///
    /// Returns an error if encryption or the backend write fails
    async fn store_token(&self, access_token: &str, info: &StoredTokenInfo) -> AppResult<()>;

    /// Fetch a token's metadata; `None` if absent or past `expires_at`
    ///
    /// # Errors
    ///
    /// Returns `DecryptionFailed` for a corrupted record, or a backend error
    async fn get_token(&self, access_token: &str) -> AppResult<Option<StoredTokenInfo>>;

    /// Resolve a refresh token to its access token and metadata
    ///
    /// # Errors
    ///
    /// Returns `DecryptionFailed` if the index entry is corrupted, or a backend error
    async fn find_by_refresh_token(&self, refresh_token: &str) -> AppResult<Option<RefreshLookup>>;

    /// Remove a token record (and its refresh index entry where the backend can find it)
    ///
    /// # Errors
    ///
    /// Returns an error if the backend delete fails
    async fn delete_token(&self, access_token: &str) -> AppResult<()>;

    /// Remove expired records, returning how many were removed
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails
    async fn cleanup(&self) -> AppResult<usize>;

    /// Verify the backend is reachable
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unavailable
    async fn health_check(&self) -> AppResult<()>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

/// Encrypted token record shared by every backend
///
/// `expires_at` is kept in the clear so expired records can be swept without
/// decrypting them; `refresh_key` is the hashed refresh token, never the raw value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EncryptedTokenRecord {
    pub payload: String,
    pub expires_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_key: Option<String>,
}

impl EncryptedTokenRecord {
    pub(crate) fn seal(encryption: &EncryptionService, info: &StoredTokenInfo) -> AppResult<Self> {
        Ok(Self {
            payload: encryption.encrypt_json(info)?,
            expires_at: info.expires_at,
            refresh_key: info.refresh_token.as_deref().map(hash_key),
        })
    }

    pub(crate) fn open(
        &self,
        encryption: &EncryptionService,
        now_ms: i64,
    ) -> AppResult<Option<StoredTokenInfo>> {
        if now_ms >= self.expires_at {
            return Ok(None);
        }
        encryption.decrypt_json(&self.payload).map(Some)
    }
}

/// Token records plus refresh index, as held by the in-process backends
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TokenTables {
    #[serde(default)]
    pub tokens: HashMap<String, EncryptedTokenRecord>,
    /// Hashed refresh token -> encrypted access token
    #[serde(default)]
    pub refresh_index: HashMap<String, String>,
}

impl TokenTables {
    pub(crate) fn insert(
        &mut self,
        encryption: &EncryptionService,
        access_token: &str,
        info: &StoredTokenInfo,
    ) -> AppResult<()> {
        let record = EncryptedTokenRecord::seal(encryption, info)?;
        let index_entry = match record.refresh_key {
            Some(ref refresh_key) => Some((refresh_key.clone(), encryption.encrypt(access_token)?)),
            None => None,
        };

        if let Some(previous) = self.tokens.insert(hash_key(access_token), record) {
            if let Some(stale) = previous.refresh_key {
                self.unlink_refresh(encryption, &stale, access_token);
            }
        }
        if let Some((refresh_key, encrypted_access)) = index_entry {
            self.refresh_index.insert(refresh_key, encrypted_access);
        }
        Ok(())
    }

    pub(crate) fn get(
        &self,
        encryption: &EncryptionService,
        access_token: &str,
        now_ms: i64,
    ) -> AppResult<Option<StoredTokenInfo>> {
        self.tokens
            .get(&hash_key(access_token))
            .map_or(Ok(None), |record| record.open(encryption, now_ms))
    }

    pub(crate) fn find_by_refresh(
        &self,
        encryption: &EncryptionService,
        refresh_token: &str,
        now_ms: i64,
    ) -> AppResult<Option<RefreshLookup>> {
        let Some(encrypted_access) = self.refresh_index.get(&hash_key(refresh_token)) else {
            return Ok(None);
        };
        let access_token = encryption.decrypt(encrypted_access)?;
        Ok(self
            .get(encryption, &access_token, now_ms)?
            .map(|info| RefreshLookup { access_token, info }))
    }

    pub(crate) fn remove(&mut self, encryption: &EncryptionService, access_token: &str) -> bool {
        let Some(record) = self.tokens.remove(&hash_key(access_token)) else {
            return false;
        };
        if let Some(refresh_key) = record.refresh_key {
            self.unlink_refresh(encryption, &refresh_key, access_token);
        }
        true
    }

    pub(crate) fn purge_expired(&mut self, encryption: &EncryptionService, now_ms: i64) -> usize {
        let expired: Vec<String> = self
            .tokens
            .iter()
            .filter(|(_, record)| now_ms >= record.expires_at)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            if let Some(refresh_key) = self.tokens.remove(key).and_then(|r| r.refresh_key) {
                let still_linked = self
                    .refresh_index
                    .get(&refresh_key)
                    .and_then(|entry| encryption.decrypt(entry).ok())
                    .is_some_and(|access| self.tokens.contains_key(&hash_key(&access)));
                if !still_linked {
                    self.refresh_index.remove(&refresh_key);
                }
            }
        }
        expired.len()
    }

    /// Drop an index entry only if it still points at `access_token`
    ///
    /// A refresh that keeps the same refresh token re-links the index to the new
    /// access token before the old one is deleted.
    fn unlink_refresh(&mut self, encryption: &EncryptionService, refresh_key: &str, access_token: &str) {
        let owned_by_token = self
            .refresh_index
            .get(refresh_key)
            .is_some_and(|entry| encryption.decrypt(entry).map_or(true, |linked| linked == access_token));
        if owned_by_token {
            self.refresh_index.remove(refresh_key);
        }
    }
}
