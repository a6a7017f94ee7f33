// ABOUTME: Integration tests for OAuth token stores and the refresh dispatch service
// ABOUTME: Exercises memory and file backends through the TokenStore trait
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use anyhow::Result;
use pierre_auth_store::constants::files;
use pierre_auth_store::errors::{AppResult, ErrorCode};
use pierre_auth_store::oauth_tokens::{
    FileTokenStore, InMemoryTokenStore, ProviderTokenRefresher, RefreshedTokens, StoredTokenInfo,
    TokenRefreshService, TokenStore,
};
use pierre_auth_store::persistence::now_millis;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

const HOUR_MS: i64 = 3_600_000;

fn memory_store() -> Arc<dyn TokenStore> {
    Arc::new(InMemoryTokenStore::new(common::test_encryption()))
}

/// Behavior every backend must share
async fn assert_store_contract(store: &dyn TokenStore) -> Result<()> {
    let info = common::token_info("access-1", Some("refresh-1"), "strava", HOUR_MS);
    store.store_token("access-1", &info).await?;

    assert_eq!(store.get_token("access-1").await?, Some(info.clone()));

    let lookup = store
        .find_by_refresh_token("refresh-1")
        .await?
        .expect("refresh index entry");
    assert_eq!(lookup.access_token, "access-1");
    assert_eq!(lookup.info, info);

    assert!(store.get_token("unknown").await?.is_none());
    assert!(store.find_by_refresh_token("unknown").await?.is_none());

    store.delete_token("access-1").await?;
    assert!(store.get_token("access-1").await?.is_none());
    assert!(store.find_by_refresh_token("refresh-1").await?.is_none());

    // Deleting twice is not an error
    store.delete_token("access-1").await?;

    Ok(())
}

#[tokio::test]
async fn test_memory_store_contract() -> Result<()> {
    let store = memory_store();
    assert_eq!(store.backend_name(), "memory");
    store.health_check().await?;
    assert_store_contract(store.as_ref()).await
}

#[tokio::test]
async fn test_file_store_contract() -> Result<()> {
    let dir = TempDir::new()?;
    let store = FileTokenStore::open(dir.path(), common::test_encryption()).await?;
    assert_eq!(store.backend_name(), "file");
    store.health_check().await?;
    assert_store_contract(&store).await
}

#[tokio::test]
async fn test_expired_token_is_invisible_and_swept() -> Result<()> {
    let store = memory_store();
    let expired = common::token_info("old", Some("old-refresh"), "strava", -1_000);
    let live = common::token_info("new", Some("new-refresh"), "strava", HOUR_MS);
    store.store_token("old", &expired).await?;
    store.store_token("new", &live).await?;

    assert!(store.get_token("old").await?.is_none());
    assert!(store.find_by_refresh_token("old-refresh").await?.is_none());

    assert_eq!(store.cleanup().await?, 1);
    assert_eq!(store.cleanup().await?, 0);
    assert!(store.get_token("new").await?.is_some());

    Ok(())
}

#[tokio::test]
async fn test_replacing_token_moves_refresh_index() -> Result<()> {
    let store = memory_store();
    store
        .store_token("access", &common::token_info("access", Some("r1"), "strava", HOUR_MS))
        .await?;
    store
        .store_token("access", &common::token_info("access", Some("r2"), "strava", HOUR_MS))
        .await?;

    assert!(store.find_by_refresh_token("r1").await?.is_none());
    assert_eq!(
        store.find_by_refresh_token("r2").await?.map(|l| l.access_token),
        Some("access".to_owned())
    );

    Ok(())
}

#[tokio::test]
async fn test_file_store_survives_reopen_without_plaintext() -> Result<()> {
    let dir = TempDir::new()?;
    let encryption = common::test_encryption();

    {
        let store = FileTokenStore::open(dir.path(), Arc::clone(&encryption)).await?;
        let info = common::token_info("secret-access", Some("secret-refresh"), "fitbit", HOUR_MS);
        store.store_token("secret-access", &info).await?;
    }

    let raw = tokio::fs::read_to_string(dir.path().join(files::OAUTH_TOKENS)).await?;
    assert!(!raw.contains("secret-access"));
    assert!(!raw.contains("secret-refresh"));
    assert!(!raw.contains("athlete@example.com"));

    let reopened = FileTokenStore::open(dir.path(), Arc::clone(&encryption)).await?;
    let info = reopened.get_token("secret-access").await?.expect("persisted token");
    assert_eq!(info.provider, "fitbit");
    assert_eq!(
        reopened
            .find_by_refresh_token("secret-refresh")
            .await?
            .map(|l| l.access_token),
        Some("secret-access".to_owned())
    );

    Ok(())
}

#[tokio::test]
async fn test_file_store_with_wrong_key_fails_to_read() -> Result<()> {
    let dir = TempDir::new()?;
    {
        let store = FileTokenStore::open(dir.path(), common::test_encryption()).await?;
        let info = common::token_info("a", None, "strava", HOUR_MS);
        store.store_token("a", &info).await?;
    }

    let other_key = FileTokenStore::open(dir.path(), common::test_encryption()).await?;
    let err = other_key.get_token("a").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::DecryptionFailed);

    Ok(())
}

struct MockRefresher {
    provider: &'static str,
    rotate_refresh_token: bool,
    calls: AtomicUsize,
}

impl MockRefresher {
    fn new(provider: &'static str, rotate_refresh_token: bool) -> Arc<Self> {
        Arc::new(Self {
            provider,
            rotate_refresh_token,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait::async_trait]
impl ProviderTokenRefresher for MockRefresher {
    fn provider(&self) -> &str {
        self.provider
    }

    async fn refresh(
        &self,
        refresh_token: &str,
        current: &StoredTokenInfo,
    ) -> AppResult<RefreshedTokens> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(RefreshedTokens {
            access_token: format!("{}-v{call}", current.access_token),
            refresh_token: self
                .rotate_refresh_token
                .then(|| format!("{refresh_token}-v{call}")),
            id_token: None,
            expires_at: now_millis() + HOUR_MS,
            scopes: None,
        })
    }
}

#[tokio::test]
async fn test_refresh_with_rotation() -> Result<()> {
    let store = memory_store();
    store
        .store_token("access", &common::token_info("access", Some("refresh"), "strava", HOUR_MS))
        .await?;

    let refresher = MockRefresher::new("strava", true);
    let service = TokenRefreshService::new(Arc::clone(&store)).with_refresher(refresher.clone());

    let refreshed = service.refresh("refresh").await?.expect("refreshed");
    assert_eq!(refreshed.access_token, "access-v1");
    assert_eq!(refreshed.info.refresh_token.as_deref(), Some("refresh-v1"));
    assert_eq!(refreshed.info.scopes, vec!["activity:read".to_owned()]);
    assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);

    assert!(store.get_token("access").await?.is_none());
    assert!(store.find_by_refresh_token("refresh").await?.is_none());
    assert_eq!(
        store
            .find_by_refresh_token("refresh-v1")
            .await?
            .map(|l| l.access_token),
        Some("access-v1".to_owned())
    );

    Ok(())
}

#[tokio::test]
async fn test_refresh_keeping_refresh_token_relinks_index() -> Result<()> {
    let store = memory_store();
    store
        .store_token("access", &common::token_info("access", Some("refresh"), "strava", HOUR_MS))
        .await?;

    let service = TokenRefreshService::new(Arc::clone(&store))
        .with_refresher(MockRefresher::new("strava", false));

    let refreshed = service.refresh("refresh").await?.expect("refreshed");
    assert_eq!(refreshed.info.refresh_token.as_deref(), Some("refresh"));

    // Old access token is gone but the refresh token still resolves to the new one
    assert!(store.get_token("access").await?.is_none());
    let lookup = store.find_by_refresh_token("refresh").await?.expect("relinked");
    assert_eq!(lookup.access_token, "access-v1");

    // And it can be refreshed again
    let again = service.refresh("refresh").await?.expect("second refresh");
    assert_eq!(again.access_token, "access-v1-v2");

    Ok(())
}

#[tokio::test]
async fn test_refresh_unknown_token_and_unregistered_provider() -> Result<()> {
    let store = memory_store();
    store
        .store_token("access", &common::token_info("access", Some("refresh"), "garmin", HOUR_MS))
        .await?;

    let service = TokenRefreshService::new(Arc::clone(&store))
        .with_refresher(MockRefresher::new("strava", true))
        .with_refresher(MockRefresher::new("fitbit", true));
    assert_eq!(service.providers(), vec!["fitbit", "strava"]);

    assert!(service.refresh("never-issued").await?.is_none());

    let err = service.refresh("refresh").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::ConfigInvalid);
    // Nothing was changed
    assert!(store.get_token("access").await?.is_some());

    Ok(())
}
