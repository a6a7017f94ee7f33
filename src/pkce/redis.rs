// ABOUTME: Redis PKCE store with native TTL and GETDEL-based consumption
// ABOUTME: GETDEL is one server-side command, so racing callers on other instances cannot both win
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::{PkceData, PkceStore};
use crate::constants::defaults::MIN_REDIS_TTL_SECS;
use crate::constants::keys::PKCE_PREFIX;
use crate::crypto::{storage_key, EncryptionService};
use crate::errors::AppResult;
use crate::persistence::redis::ping;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;

/// Redis PKCE store; values are encrypted since they carry the code verifier
#[derive(Clone)]
pub struct RedisPkceStore {
    manager: ConnectionManager,
    encryption: Arc<EncryptionService>,
}

impl RedisPkceStore {
    /// Wrap an established connection
    #[must_use]
    pub const fn new(manager: ConnectionManager, encryption: Arc<EncryptionService>) -> Self {
        Self {
            manager,
            encryption,
        }
    }

    fn key(code: &str) -> String {
        storage_key(PKCE_PREFIX, code)
    }

    fn open(&self, payload: Option<String>) -> AppResult<Option<PkceData>> {
        payload
            .map(|payload| self.encryption.decrypt_json(&payload))
            .transpose()
    }
}

#[async_trait::async_trait]
impl PkceStore for RedisPkceStore {
    async fn store_code_verifier(&self, code: &str, data: &PkceData, ttl: Duration) -> AppResult<()> {
        let mut conn = self.manager.clone();
        if ttl.is_zero() {
            // Already expired; drop any earlier state under the same code
            let _: usize = conn.del(Self::key(code)).await?;
            return Ok(());
        }

        let payload = self.encryption.encrypt_json(data)?;
        let ttl_secs = u64::try_from(ttl.as_millis().div_ceil(1000)).unwrap_or(u64::MAX);
        let () = conn
            .set_ex(Self::key(code), payload, ttl_secs.max(MIN_REDIS_TTL_SECS))
            .await?;
        Ok(())
    }

    async fn get_code_verifier(&self, code: &str) -> AppResult<Option<PkceData>> {
        let mut conn = self.manager.clone();
        let payload: Option<String> = conn.get(Self::key(code)).await?;
        self.open(payload)
    }

    async fn get_and_delete_code_verifier(&self, code: &str) -> AppResult<Option<PkceData>> {
        let mut conn = self.manager.clone();
        let payload: Option<String> = conn.get_del(Self::key(code)).await?;
        self.open(payload)
    }

    async fn has_code_verifier(&self, code: &str) -> AppResult<bool> {
        let mut conn = self.manager.clone();
        Ok(conn.exists(Self::key(code)).await?)
    }

    async fn delete_code_verifier(&self, code: &str) -> AppResult<bool> {
        let mut conn = self.manager.clone();
        let removed: usize = conn.del(Self::key(code)).await?;
        Ok(removed > 0)
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
