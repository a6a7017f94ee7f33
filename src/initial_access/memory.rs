// ABOUTME: In-memory initial access token store
// ABOUTME: One mutex serializes validate-and-use so usage ceilings hold under concurrency
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::{
    CreateTokenOptions, InitialAccessToken, InitialAccessTokenStore, ListOptions, TokenLedger,
    ValidationResult,
};
use crate::errors::AppResult;
use crate::persistence::now_secs;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// In-memory initial access token store
#[derive(Clone, Default)]
pub struct InMemoryInitialAccessTokenStore {
    ledger: Arc<Mutex<TokenLedger>>,
}

impl InMemoryInitialAccessTokenStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl InitialAccessTokenStore for InMemoryInitialAccessTokenStore {
    async fn create_token(&self, options: &CreateTokenOptions) -> AppResult<InitialAccessToken> {
        let token = InitialAccessToken::issue(options, now_secs());
        self.ledger.lock().await.insert(token.clone());
        info!(token_id = %token.id, "Created initial access token");
        Ok(token)
    }

    async fn validate_and_use_token(&self, token: &str) -> AppResult<ValidationResult> {
        Ok(self.ledger.lock().await.validate_and_use(token, now_secs()))
    }

    async fn get_token(&self, id: &str) -> AppResult<Option<InitialAccessToken>> {
        Ok(self.ledger.lock().await.get(id).cloned())
    }

    async fn get_token_by_value(&self, token: &str) -> AppResult<Option<InitialAccessToken>> {
        Ok(self.ledger.lock().await.get_by_value(token).cloned())
    }

    async fn list_tokens(&self, options: &ListOptions) -> AppResult<Vec<InitialAccessToken>> {
        Ok(self.ledger.lock().await.list(options, now_secs()))
    }

    async fn revoke_token(&self, id: &str) -> AppResult<bool> {
        Ok(self.ledger.lock().await.revoke(id))
    }

    async fn delete_token(&self, id: &str) -> AppResult<bool> {
        Ok(self.ledger.lock().await.remove(id))
    }

    async fn cleanup(&self) -> AppResult<usize> {
        let removed = self.ledger.lock().await.purge(now_secs());
        if removed > 0 {
            debug!(store = "initial_access", backend = "memory", count = removed, "Removed unusable tokens");
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
