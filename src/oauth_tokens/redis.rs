// ABOUTME: Redis OAuth token store for multi-instance deployments
// ABOUTME: Records and refresh index entries are written together in one MULTI with a native TTL
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::{EncryptedTokenRecord, RefreshLookup, StoredTokenInfo, TokenStore};
use crate::constants::keys::{OAUTH_REFRESH_PREFIX, OAUTH_TOKEN_PREFIX};
use crate::crypto::{hash_key, storage_key, EncryptionService};
use crate::errors::AppResult;
use crate::persistence::now_millis;
use crate::persistence::redis::{ping, ttl_secs_until};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::Arc;

/// Redis token store
///
/// Keys: `pierre:oauth:token:<sha256(access)>` holds the encrypted record and
/// `pierre:oauth:refresh:<sha256(refresh)>` holds the encrypted access token.
/// Both expire with the token, so `cleanup` has nothing to do.
#[derive(Clone)]
pub struct RedisTokenStore {
    manager: ConnectionManager,
    encryption: Arc<EncryptionService>,
}

impl RedisTokenStore {
    /// Wrap an established connection
    #[must_use]
    pub const fn new(manager: ConnectionManager, encryption: Arc<EncryptionService>) -> Self {
        Self {
            manager,
            encryption,
        }
    }

    async fn load_record(&self, access_token: &str) -> AppResult<Option<EncryptedTokenRecord>> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn
            .get(storage_key(OAUTH_TOKEN_PREFIX, access_token))
            .await?;
        raw.map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(Into::into)
    }

    /// Index key for `refresh_key` if the entry still points at `access_token`
    async fn owned_index_key(
        &self,
        refresh_key: &str,
        access_token: &str,
    ) -> AppResult<Option<String>> {
        let index_key = format!("{OAUTH_REFRESH_PREFIX}{refresh_key}");
        let mut conn = self.manager.clone();
        let linked: Option<String> = conn.get(&index_key).await?;
        // The index may already point at a successor token issued for the same refresh token
        let owned_by_token = linked.is_some_and(|entry| {
            self.encryption
                .decrypt(&entry)
                .map_or(true, |linked_access| linked_access == access_token)
        });
        Ok(owned_by_token.then_some(index_key))
    }
}

#[async_trait::async_trait]
impl TokenStore for RedisTokenStore {
    async fn store_token(&self, access_token: &str, info: &StoredTokenInfo) -> AppResult<()> {
        let record = EncryptedTokenRecord::seal(&self.encryption, info)?;
        let ttl = ttl_secs_until(info.expires_at, now_millis());
        let record_json = serde_json::to_string(&record)?;

        let stale_index_key = match self.load_record(access_token).await? {
            Some(previous) => match previous.refresh_key {
                Some(previous_key) if record.refresh_key.as_ref() != Some(&previous_key) => {
                    self.owned_index_key(&previous_key, access_token).await?
                }
                _ => None,
            },
            None => None,
        };

        let mut pipe = redis::pipe();
        pipe.atomic()
            .set_ex(storage_key(OAUTH_TOKEN_PREFIX, access_token), record_json, ttl)
            .ignore();
        if let Some(stale_index_key) = stale_index_key {
            pipe.del(stale_index_key).ignore();
        }
        if let Some(refresh_key) = record.refresh_key.as_deref() {
            let encrypted_access = self.encryption.encrypt(access_token)?;
            pipe.set_ex(
                format!("{OAUTH_REFRESH_PREFIX}{refresh_key}"),
                encrypted_access,
                ttl,
            )
            .ignore();
        }

        let mut conn = self.manager.clone();
        let () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn get_token(&self, access_token: &str) -> AppResult<Option<StoredTokenInfo>> {
        match self.load_record(access_token).await? {
            Some(record) => record.open(&self.encryption, now_millis()),
            None => Ok(None),
        }
    }

    async fn find_by_refresh_token(&self, refresh_token: &str) -> AppResult<Option<RefreshLookup>> {
        let refresh_key = hash_key(refresh_token);
        let mut conn = self.manager.clone();
        let encrypted_access: Option<String> = conn
            .get(format!("{OAUTH_REFRESH_PREFIX}{refresh_key}"))
            .await?;
        let Some(encrypted_access) = encrypted_access else {
            return Ok(None);
        };

        let access_token = self.encryption.decrypt(&encrypted_access)?;
        let Some(record) = self.load_record(&access_token).await? else {
            return Ok(None);
        };
        // The token may have been stored again with a different refresh token since
        if record.refresh_key.as_deref() != Some(refresh_key.as_str()) {
            return Ok(None);
        }
        Ok(record
            .open(&self.encryption, now_millis())?
            .map(|info| RefreshLookup { access_token, info }))
    }

    async fn delete_token(&self, access_token: &str) -> AppResult<()> {
        let refresh_key = self
            .load_record(access_token)
            .await?
            .and_then(|record| record.refresh_key);

        let mut keys = vec![storage_key(OAUTH_TOKEN_PREFIX, access_token)];
        if let Some(refresh_key) = refresh_key {
            keys.extend(self.owned_index_key(&refresh_key, access_token).await?);
        }

        let mut conn = self.manager.clone();
        let _: usize = conn.del(keys).await?;
        Ok(())
    }

    async fn cleanup(&self) -> AppResult<usize> {
        Ok(0)
    }

    async fn health_check(&self) -> AppResult<()> {
        ping(&self.manager).await
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
