// ABOUTME: Refresh-token grant dispatch resolved from the stored token's provider
// ABOUTME: One registered refresher per provider; the stored record decides which one runs
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::{RefreshLookup, StoredTokenInfo, TokenStore};
use crate::errors::{AppError, AppResult};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Tokens returned by a provider's refresh endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshedTokens {
    /// New access token
    pub access_token: String,
    /// Rotated refresh token; `None` keeps the current one
    pub refresh_token: Option<String>,
    /// New ID token, if the provider issued one
    pub id_token: Option<String>,
    /// New expiry in epoch milliseconds
    pub expires_at: i64,
    /// Narrowed or widened scopes; `None` keeps the current ones
    pub scopes: Option<Vec<String>>,
}

/// Provider-specific refresh call
///
/// The network exchange lives with the provider integration; this crate only
/// decides which refresher owns a token and persists the outcome.
#[async_trait::async_trait]
pub trait ProviderTokenRefresher: Send + Sync {
    /// Provider name matched against `StoredTokenInfo::provider`
    fn provider(&self) -> &str;

    /// Exchange `refresh_token` for new tokens
    ///
    /// # Errors
    ///
    /// Returns an error if the provider rejects the grant or is unreachable
    async fn refresh(
        &self,
        refresh_token: &str,
        current: &StoredTokenInfo,
    ) -> AppResult<RefreshedTokens>;
}

/// Routes refresh grants to the refresher registered for the token's provider
pub struct TokenRefreshService {
    store: Arc<dyn TokenStore>,
    refreshers: HashMap<String, Arc<dyn ProviderTokenRefresher>>,
}

impl TokenRefreshService {
    /// Create a service with no refreshers registered
    #[must_use]
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self {
            store,
            refreshers: HashMap::new(),
        }
    }

    /// Register a refresher, replacing any previous one for the same provider
    #[must_use]
    pub fn with_refresher(mut self, refresher: Arc<dyn ProviderTokenRefresher>) -> Self {
        self.refreshers
            .insert(refresher.provider().to_owned(), refresher);
        self
    }

    /// Providers that can currently be refreshed
    #[must_use]
    pub fn providers(&self) -> Vec<&str> {
        let mut providers: Vec<&str> = self.refreshers.keys().map(String::as_str).collect();
        providers.sort_unstable();
        providers
    }

    /// Refresh the token linked to `refresh_token`
    ///
    /// Returns `None` if the refresh token is unknown or its access token has expired
    /// out of the store. On success the new record is stored before the old access
    /// token is deleted, so a failure in between never loses the session.
    ///
    /// # Errors
    ///
    /// Returns `ConfigInvalid` if no refresher is registered for the token's provider,
    /// or any error from the refresher or the store
    pub async fn refresh(&self, refresh_token: &str) -> AppResult<Option<RefreshLookup>> {
        let Some(current) = self.store.find_by_refresh_token(refresh_token).await? else {
            return Ok(None);
        };

        let provider = current.info.provider.as_str();
        let refresher = self.refreshers.get(provider).ok_or_else(|| {
            AppError::config_invalid(format!("No token refresher registered for provider '{provider}'"))
        })?;

        let refreshed = refresher.refresh(refresh_token, &current.info).await?;

        let info = StoredTokenInfo {
            access_token: refreshed.access_token.clone(),
            refresh_token: refreshed
                .refresh_token
                .or_else(|| current.info.refresh_token.clone()),
            id_token: refreshed.id_token.or_else(|| current.info.id_token.clone()),
            provider: current.info.provider.clone(),
            scopes: refreshed
                .scopes
                .unwrap_or_else(|| current.info.scopes.clone()),
            expires_at: refreshed.expires_at,
            user_info: current.info.user_info.clone(),
        };

        self.store.store_token(&info.access_token, &info).await?;
        if info.access_token != current.access_token {
            self.store.delete_token(&current.access_token).await?;
        }

        info!(provider = %info.provider, "Refreshed OAuth token");

        Ok(Some(RefreshLookup {
            access_token: info.access_token.clone(),
            info,
        }))
    }
}
