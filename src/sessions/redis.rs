// ABOUTME: Redis secondary session tier shared by every server instance
// ABOUTME: Encrypted metadata under hashed session keys, expiring natively at the session's expiresAt
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::{McpSessionMetadata, SessionBackend};
use crate::constants::keys::SESSION_PREFIX;
use crate::crypto::{storage_key, EncryptionService};
use crate::errors::AppResult;
use crate::persistence::now_millis;
use crate::persistence::redis::{ping, ttl_secs_until};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::Arc;

/// Secondary session tier in Redis
#[derive(Clone)]
pub struct RedisSessionBackend {
    manager: ConnectionManager,
    encryption: Arc<EncryptionService>,
}

impl RedisSessionBackend {
    /// Wrap an established connection
    #[must_use]
    pub const fn new(manager: ConnectionManager, encryption: Arc<EncryptionService>) -> Self {
        Self {
            manager,
            encryption,
        }
    }

    fn key(session_id: &str) -> String {
        storage_key(SESSION_PREFIX, session_id)
    }
}

#[async_trait::async_trait]
impl SessionBackend for RedisSessionBackend {
    async fn put(&self, session: &McpSessionMetadata) -> AppResult<()> {
        let payload = self.encryption.encrypt_json(session)?;
        let ttl = ttl_secs_until(session.expires_at, now_millis());
        let mut conn = self.manager.clone();
        let () = conn
            .set_ex(Self::key(&session.session_id), payload, ttl)
            .await?;
        Ok(())
    }

    async fn fetch(&self, session_id: &str) -> AppResult<Option<McpSessionMetadata>> {
        let mut conn = self.manager.clone();
        let payload: Option<String> = conn.get(Self::key(session_id)).await?;
        payload
            .map(|payload| self.encryption.decrypt_json(&payload))
            .transpose()
    }

    async fn remove(&self, session_id: &str) -> AppResult<bool> {
        let mut conn = self.manager.clone();
        let removed: usize = conn.del(Self::key(session_id)).await?;
        Ok(removed > 0)
    }

    async fn purge_expired(&self, _now_ms: i64) -> AppResult<usize> {
        Ok(0)
    }

    async fn health_check(&self) -> AppResult<()> {
        ping(&self.manager).await
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
