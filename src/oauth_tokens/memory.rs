// ABOUTME: In-memory OAuth token store for single-instance deployments and tests
// ABOUTME: Encrypted records and refresh index live behind one lock so both update together
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use super::{RefreshLookup, StoredTokenInfo, TokenStore, TokenTables};
use crate::crypto::EncryptionService;
use crate::errors::AppResult;
use crate::persistence::now_millis;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// In-memory token store
///
/// Records are still encrypted so a heap dump exposes no more than the other backends would.
#[derive(Clone)]
pub struct InMemoryTokenStore {
    tables: Arc<RwLock<TokenTables>>,
    encryption: Arc<EncryptionService>,
}

impl InMemoryTokenStore {
    /// Create an empty store
    #[must_use]
    pub fn new(encryption: Arc<EncryptionService>) -> Self {
        Self {
            tables: Arc::new(RwLock::new(TokenTables::default())),
            encryption,
        }
    }
}

#[async_trait::async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn store_token(&self, access_token: &str, info: &StoredTokenInfo) -> AppResult<()> {
        self.tables
            .write()
            .await
            .insert(&self.encryption, access_token, info)
    }

    async fn get_token(&self, access_token: &str) -> AppResult<Option<StoredTokenInfo>> {
        self.tables
            .read()
            .await
            .get(&self.encryption, access_token, now_millis())
    }

    async fn find_by_refresh_token(&self, refresh_token: &str) -> AppResult<Option<RefreshLookup>> {
        self.tables
            .read()
            .await
            .find_by_refresh(&self.encryption, refresh_token, now_millis())
    }

    async fn delete_token(&self, access_token: &str) -> AppResult<()> {
        self.tables
            .write()
            .await
            .remove(&self.encryption, access_token);
        Ok(())
    }

    async fn cleanup(&self) -> AppResult<usize> {
        let removed = self
            .tables
            .write()
            .await
            .purge_expired(&self.encryption, now_millis());
        if removed > 0 {
            debug!(store = "oauth_tokens", backend = "memory", count = removed, "Removed expired tokens");
        }
        Ok(removed)
    }

    async fn health_check(&self) -> AppResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
