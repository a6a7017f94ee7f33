// ABOUTME: Redis initial access token store shared across server instances
// ABOUTME: Usage is an INCR counter so the ceiling holds even when instances race on one token
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::{
    sort_listing, CreateTokenOptions, InitialAccessToken, InitialAccessTokenStore, ListOptions,
    TokenRejection, ValidationResult,
};
use crate::constants::keys::{
    IAT_INDEX, IAT_LAST_USED_PREFIX, IAT_LOOKUP_PREFIX, IAT_RECORD_PREFIX, IAT_USAGE_PREFIX,
};
use crate::crypto::{storage_key, EncryptionService};
use crate::errors::AppResult;
use crate::persistence::now_secs;
use crate::persistence::redis::ping;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::Arc;
use tracing::{debug, info};

/// Redis initial access token store
///
/// Keys per token id:
/// - `pierre:iat:record:<id>`: encrypted static fields (description, expiry, revocation)
/// - `pierre:iat:usage:<id>`: usage counter
/// - `pierre:iat:last_used:<id>`: epoch seconds of the last successful use
/// - `pierre:iat:lookup:<sha256(token)>`: id for lookups by value
///
/// plus the `pierre:iat:index` set of all ids.
#[derive(Clone)]
pub struct RedisInitialAccessTokenStore {
    manager: ConnectionManager,
    encryption: Arc<EncryptionService>,
}

impl RedisInitialAccessTokenStore {
    /// Wrap an established connection
    #[must_use]
    pub const fn new(manager: ConnectionManager, encryption: Arc<EncryptionService>) -> Self {
        Self {
            manager,
            encryption,
        }
    }

    fn record_key(id: &str) -> String {
        format!("{IAT_RECORD_PREFIX}{id}")
    }

    fn usage_key(id: &str) -> String {
        format!("{IAT_USAGE_PREFIX}{id}")
    }

    fn last_used_key(id: &str) -> String {
        format!("{IAT_LAST_USED_PREFIX}{id}")
    }

    async fn load(&self, id: &str) -> AppResult<Option<InitialAccessToken>> {
        let mut conn = self.manager.clone();
        let (payload, usage, last_used): (Option<String>, Option<u64>, Option<i64>) = redis::pipe()
            .get(Self::record_key(id))
            .get(Self::usage_key(id))
            .get(Self::last_used_key(id))
            .query_async(&mut conn)
            .await?;

        let Some(payload) = payload else {
            return Ok(None);
        };
        let mut token: InitialAccessToken = self.encryption.decrypt_json(&payload)?;
        token.usage_count = usage.unwrap_or(0);
        token.last_used_at = last_used;
        Ok(Some(token))
    }

    async fn resolve_id(&self, token: &str) -> AppResult<Option<String>> {
        let mut conn = self.manager.clone();
        Ok(conn.get(storage_key(IAT_LOOKUP_PREFIX, token)).await?)
    }

    /// Overwrite the record with `SET XX`; `false` if it was removed since it was loaded
    async fn replace_record(&self, token: &InitialAccessToken) -> AppResult<bool> {
        let payload = self.encryption.encrypt_json(token)?;
        let mut conn = self.manager.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(Self::record_key(&token.id))
            .arg(payload)
            .arg("XX")
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn all_tokens(&self) -> AppResult<Vec<InitialAccessToken>> {
        let mut conn = self.manager.clone();
        let ids: Vec<String> = conn.smembers(IAT_INDEX).await?;
        let mut tokens = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(token) = self.load(&id).await? {
                tokens.push(token);
            }
        }
        Ok(tokens)
    }

    async fn remove(&self, token: &InitialAccessToken) -> AppResult<()> {
        let mut conn = self.manager.clone();
        let () = redis::pipe()
            .atomic()
            .del(Self::record_key(&token.id))
            .ignore()
            .del(Self::usage_key(&token.id))
            .ignore()
            .del(Self::last_used_key(&token.id))
            .ignore()
            .del(storage_key(IAT_LOOKUP_PREFIX, &token.token))
            .ignore()
            .srem(IAT_INDEX, &token.id)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl InitialAccessTokenStore for RedisInitialAccessTokenStore {
    async fn create_token(&self, options: &CreateTokenOptions) -> AppResult<InitialAccessToken> {
        let token = InitialAccessToken::issue(options, now_secs());
        let payload = self.encryption.encrypt_json(&token)?;

        let mut conn = self.manager.clone();
        let () = redis::pipe()
            .atomic()
            .set(Self::record_key(&token.id), payload)
            .ignore()
            .set(Self::usage_key(&token.id), 0)
            .ignore()
            .set(storage_key(IAT_LOOKUP_PREFIX, &token.token), &token.id)
            .ignore()
            .sadd(IAT_INDEX, &token.id)
            .ignore()
            .query_async(&mut conn)
            .await?;

        info!(token_id = %token.id, "Created initial access token");
        Ok(token)
    }

    async fn validate_and_use_token(&self, token: &str) -> AppResult<ValidationResult> {
        let Some(id) = self.resolve_id(token).await? else {
            return Ok(ValidationResult::rejected(TokenRejection::NotFound, None));
        };
        let Some(mut record) = self.load(&id).await? else {
            return Ok(ValidationResult::rejected(TokenRejection::NotFound, None));
        };

        let now = now_secs();
        if let Some(reason) = record.rejection_at(now) {
            return Ok(ValidationResult::rejected(reason, Some(record)));
        }

        // Each INCR hands out a distinct count, so at most `max_uses` callers ever see one in range
        let mut conn = self.manager.clone();
        let claimed: u64 = conn.incr(Self::usage_key(&id), 1).await?;
        if record.max_uses.is_some_and(|max| claimed > max) {
            let _: i64 = conn.decr(Self::usage_key(&id), 1).await?;
            record.usage_count = claimed - 1;
            return Ok(ValidationResult::rejected(
                TokenRejection::UsageLimitExceeded,
                Some(record),
            ));
        }

        let () = conn.set(Self::last_used_key(&id), now).await?;
        record.usage_count = claimed;
        record.last_used_at = Some(now);
        Ok(ValidationResult::accepted(record))
    }

    async fn get_token(&self, id: &str) -> AppResult<Option<InitialAccessToken>> {
        self.load(id).await
    }

    async fn get_token_by_value(&self, token: &str) -> AppResult<Option<InitialAccessToken>> {
        match self.resolve_id(token).await? {
            Some(id) => self.load(&id).await,
            None => Ok(None),
        }
    }

    async fn list_tokens(&self, options: &ListOptions) -> AppResult<Vec<InitialAccessToken>> {
        let now = now_secs();
        let mut tokens: Vec<InitialAccessToken> = self
            .all_tokens()
            .await?
            .into_iter()
            .filter(|token| token.is_listed(options, now))
            .collect();
        sort_listing(&mut tokens);
        Ok(tokens)
    }

    async fn revoke_token(&self, id: &str) -> AppResult<bool> {
        let Some(mut token) = self.load(id).await? else {
            return Ok(false);
        };
        token.revoked = true;
        if !self.replace_record(&token).await? {
            debug!(token_id = %id, "Token removed before revocation was written");
            return Ok(false);
        }
        info!(token_id = %id, "Revoked initial access token");
        Ok(true)
    }

    async fn delete_token(&self, id: &str) -> AppResult<bool> {
        let Some(token) = self.load(id).await? else {
            return Ok(false);
        };
        self.remove(&token).await?;
        Ok(true)
    }

    async fn cleanup(&self) -> AppResult<usize> {
        let now = now_secs();
        let mut removed = 0;
        for token in self.all_tokens().await? {
            if token.should_cleanup(now) {
                self.remove(&token).await?;
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(store = "initial_access", backend = "redis", count = removed, "Removed unusable tokens");
        }
        Ok(removed)
    }

    async fn health_check(&self) -> AppResult<()> {
        ping(&self.manager).await
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
