// ABOUTME: Integration tests for the PKCE store
// ABOUTME: Verifies TTL handling and exactly-once consumption under concurrent redemption
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use anyhow::Result;
use pierre_auth_store::pkce::{InMemoryPkceStore, PkceData, PkceStore};
use std::sync::Arc;
use std::time::Duration;

const TEN_MINUTES: Duration = Duration::from_secs(600);

fn pkce_data(verifier: &str) -> PkceData {
    PkceData {
        code_challenge: Some("E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM".to_owned()),
        redirect_uri: Some("http://localhost:8080/callback".to_owned()),
        ..PkceData::new(verifier, "state-xyz")
    }
}

#[tokio::test]
async fn test_store_get_and_consume() -> Result<()> {
    let store = InMemoryPkceStore::new();
    let data = pkce_data("verifier-1");

    store.store_code_verifier("code-1", &data, TEN_MINUTES).await?;
    assert!(store.has_code_verifier("code-1").await?);

    // Peeking does not consume
    assert_eq!(store.get_code_verifier("code-1").await?, Some(data.clone()));
    assert_eq!(store.get_code_verifier("code-1").await?, Some(data.clone()));

    assert_eq!(store.get_and_delete_code_verifier("code-1").await?, Some(data));
    assert!(store.get_and_delete_code_verifier("code-1").await?.is_none());
    assert!(!store.has_code_verifier("code-1").await?);

    Ok(())
}

#[tokio::test]
async fn test_delete_reports_presence() -> Result<()> {
    let store = InMemoryPkceStore::new();
    store
        .store_code_verifier("code", &pkce_data("v"), TEN_MINUTES)
        .await?;

    assert!(store.delete_code_verifier("code").await?);
    assert!(!store.delete_code_verifier("code").await?);
    assert!(store.get_code_verifier("code").await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_restoring_overwrites_previous_state() -> Result<()> {
    let store = InMemoryPkceStore::new();
    store
        .store_code_verifier("code", &pkce_data("first"), TEN_MINUTES)
        .await?;
    store
        .store_code_verifier("code", &pkce_data("second"), TEN_MINUTES)
        .await?;

    let consumed = store.get_and_delete_code_verifier("code").await?.expect("state");
    assert_eq!(consumed.code_verifier, "second");

    Ok(())
}

#[tokio::test]
async fn test_expired_state_is_gone() -> Result<()> {
    let store = InMemoryPkceStore::new();
    store
        .store_code_verifier("short", &pkce_data("v"), Duration::from_millis(20))
        .await?;
    store
        .store_code_verifier("long", &pkce_data("v"), TEN_MINUTES)
        .await?;

    tokio::time::sleep(Duration::from_millis(40)).await;

    assert!(!store.has_code_verifier("short").await?);
    assert!(store.get_code_verifier("short").await?.is_none());
    assert_eq!(store.cleanup().await?, 1);
    assert!(store.has_code_verifier("long").await?);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_consumption_succeeds_exactly_once() -> Result<()> {
    const CONTENDERS: usize = 32;

    for round in 0..10 {
        let store = Arc::new(InMemoryPkceStore::new());
        let code = format!("code-{round}");
        store
            .store_code_verifier(&code, &pkce_data("verifier"), TEN_MINUTES)
            .await?;

        let mut handles = Vec::with_capacity(CONTENDERS);
        for _ in 0..CONTENDERS {
            let store = Arc::clone(&store);
            let code = code.clone();
            handles.push(tokio::spawn(async move {
                store.get_and_delete_code_verifier(&code).await
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await??.is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1, "round {round}: exactly one redemption may succeed");
    }

    Ok(())
}

#[tokio::test]
async fn test_trait_object_usage() -> Result<()> {
    let store: Arc<dyn PkceStore> = Arc::new(InMemoryPkceStore::new());
    assert_eq!(store.backend_name(), "memory");
    store.health_check().await?;

    store
        .store_code_verifier("code", &PkceData::new("v", "s"), TEN_MINUTES)
        .await?;
    let data = store.get_and_delete_code_verifier("code").await?.expect("state");
    assert_eq!(data.state, "s");
    assert!(data.created_at > 0);

    Ok(())
}
