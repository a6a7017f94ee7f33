// ABOUTME: Integration tests for the tiered session metadata store
// ABOUTME: Exercises primary-only mode and the file secondary tier across simulated restarts
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use anyhow::Result;
use pierre_auth_store::constants::files;
use pierre_auth_store::errors::{AppError, AppResult};
use pierre_auth_store::sessions::{
    FileSessionBackend, McpSessionMetadata, SessionBackend, SessionMetadataStore,
    TieredSessionStore,
};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Mutex;

const HOUR_MS: i64 = 3_600_000;

fn capacity(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap()
}

#[tokio::test]
async fn test_primary_only_store_and_get() -> Result<()> {
    let store = TieredSessionStore::in_memory(capacity(16));
    assert!(!store.has_secondary());
    assert_eq!(store.backend_name(), "memory");

    let session = common::session("s-1", HOUR_MS);
    store.store_session(&session).await?;
    assert_eq!(store.get_session("s-1").await?, Some(session));
    assert_eq!(store.session_count().await, 1);

    assert!(store.delete_session("s-1").await?);
    assert!(!store.delete_session("s-1").await?);
    assert!(store.get_session("s-1").await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_cold_start_reads_through_secondary() -> Result<()> {
    let dir = TempDir::new()?;
    let encryption = common::test_encryption();

    {
        let backend = FileSessionBackend::open(dir.path(), Arc::clone(&encryption)).await?;
        let store = TieredSessionStore::with_secondary(capacity(16), Arc::new(backend));
        store.store_session(&common::session("survivor", HOUR_MS)).await?;
        store.dispose().await;
    }

    let raw = tokio::fs::read_to_string(dir.path().join(files::SESSIONS)).await?;
    assert!(!raw.contains("client-1"), "session metadata is encrypted at rest");

    // A fresh process: empty primary tier, same secondary file
    let backend = FileSessionBackend::open(dir.path(), Arc::clone(&encryption)).await?;
    let store = TieredSessionStore::with_secondary(capacity(16), Arc::new(backend));
    assert_eq!(store.session_count().await, 0);

    let restored = store.get_session("survivor").await?.expect("read-through");
    assert_eq!(restored.session_id, "survivor");
    assert_eq!(
        restored.auth_info.map(|a| a.client_id),
        Some("client-1".to_owned())
    );
    // Repopulated into the primary tier
    assert_eq!(store.session_count().await, 1);

    Ok(())
}

#[tokio::test]
async fn test_writes_go_through_to_secondary() -> Result<()> {
    let dir = TempDir::new()?;
    let backend = Arc::new(FileSessionBackend::open(dir.path(), common::test_encryption()).await?);
    let store = TieredSessionStore::with_secondary(capacity(16), backend.clone());
    assert_eq!(store.backend_name(), "file");

    store.store_session(&common::session("s-1", HOUR_MS)).await?;
    assert!(backend.fetch("s-1").await?.is_some());

    store.clear_primary_tier().await;
    assert!(store.get_session("s-1").await?.is_some());

    assert!(store.delete_session("s-1").await?);
    assert!(backend.fetch("s-1").await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_expired_sessions_are_never_returned() -> Result<()> {
    let dir = TempDir::new()?;
    let backend = Arc::new(FileSessionBackend::open(dir.path(), common::test_encryption()).await?);
    let store = TieredSessionStore::with_secondary(capacity(16), backend.clone());

    store.store_session(&common::session("stale", -1_000)).await?;
    store.store_session(&common::session("fresh", HOUR_MS)).await?;

    assert!(store.get_session("stale").await?.is_none());
    assert_eq!(store.session_count().await, 1);

    // Expired rows left in the secondary are pruned by cleanup
    backend.put(&common::session("stale-2", -1_000)).await?;
    assert!(store.cleanup().await? >= 1);
    assert!(backend.fetch("stale-2").await?.is_none());
    assert!(backend.fetch("fresh").await?.is_some());

    Ok(())
}

/// Secondary tier that can be switched off to simulate an outage, or slowed down
#[derive(Default)]
struct FlakyBackend {
    down: AtomicBool,
    slow_puts: AtomicBool,
    rows: Mutex<Vec<McpSessionMetadata>>,
}

impl FlakyBackend {
    fn check(&self) -> AppResult<()> {
        if self.down.load(Ordering::SeqCst) {
            Err(AppError::storage("secondary tier unavailable"))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl SessionBackend for FlakyBackend {
    async fn put(&self, session: &McpSessionMetadata) -> AppResult<()> {
        if self.slow_puts.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        self.check()?;
        let mut rows = self.rows.lock().await;
        rows.retain(|row| row.session_id != session.session_id);
        rows.push(session.clone());
        Ok(())
    }

    async fn fetch(&self, session_id: &str) -> AppResult<Option<McpSessionMetadata>> {
        self.check()?;
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .find(|row| row.session_id == session_id)
            .cloned())
    }

    async fn remove(&self, session_id: &str) -> AppResult<bool> {
        self.check()?;
        let mut rows = self.rows.lock().await;
        let before = rows.len();
        rows.retain(|row| row.session_id != session_id);
        Ok(rows.len() != before)
    }

    async fn purge_expired(&self, now_ms: i64) -> AppResult<usize> {
        self.check()?;
        let mut rows = self.rows.lock().await;
        let before = rows.len();
        rows.retain(|row| !row.is_expired_at(now_ms));
        Ok(before - rows.len())
    }

    async fn health_check(&self) -> AppResult<()> {
        self.check()
    }

    fn backend_name(&self) -> &'static str {
        "flaky"
    }
}

#[tokio::test]
async fn test_secondary_outage_does_not_fail_writes() -> Result<()> {
    let backend = Arc::new(FlakyBackend::default());
    let store = TieredSessionStore::with_secondary(capacity(16), backend.clone());

    backend.down.store(true, Ordering::SeqCst);
    store.store_session(&common::session("during-outage", HOUR_MS)).await?;
    assert!(store.get_session("during-outage").await?.is_some());
    assert!(store.health_check().await.is_err());

    // Reconciliation flushes the primary-only entry once the tier is back
    backend.down.store(false, Ordering::SeqCst);
    store.reconcile().await;
    assert!(backend.fetch("during-outage").await?.is_some());

    Ok(())
}

#[tokio::test]
async fn test_evicted_unpersisted_session_is_flushed() -> Result<()> {
    let backend = Arc::new(FlakyBackend::default());
    let store = TieredSessionStore::with_secondary(capacity(2), backend.clone());

    backend.down.store(true, Ordering::SeqCst);
    store.store_session(&common::session("oldest", HOUR_MS)).await?;
    backend.down.store(false, Ordering::SeqCst);

    store.store_session(&common::session("second", HOUR_MS)).await?;
    store.store_session(&common::session("third", HOUR_MS)).await?;

    // "oldest" fell out of the primary tier but was written on eviction
    assert_eq!(store.session_count().await, 2);
    assert!(backend.fetch("oldest").await?.is_some());
    assert!(store.get_session("oldest").await?.is_some());

    Ok(())
}

#[tokio::test]
async fn test_dispose_flushes_and_stops_reconciler() -> Result<()> {
    let backend = Arc::new(FlakyBackend::default());
    let store = TieredSessionStore::with_secondary(capacity(16), backend.clone());
    store.start_reconciliation(Duration::from_secs(3600)).await;

    backend.down.store(true, Ordering::SeqCst);
    store.store_session(&common::session("pending", HOUR_MS)).await?;
    backend.down.store(false, Ordering::SeqCst);

    store.dispose().await;
    assert!(backend.fetch("pending").await?.is_some());
    assert_eq!(store.session_count().await, 0);

    // Idempotent
    store.dispose().await;

    Ok(())
}

#[tokio::test]
async fn test_delete_during_reconciliation_flush_stays_deleted() -> Result<()> {
    let backend = Arc::new(FlakyBackend::default());
    let store = Arc::new(TieredSessionStore::with_secondary(capacity(16), backend.clone()));

    backend.down.store(true, Ordering::SeqCst);
    store.store_session(&common::session("s", HOUR_MS)).await?;
    backend.down.store(false, Ordering::SeqCst);
    backend.slow_puts.store(true, Ordering::SeqCst);

    let reconciling = {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.reconcile().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(store.delete_session("s").await?);
    reconciling.await?;

    assert!(store.get_session("s").await?.is_none());
    assert!(backend.fetch("s").await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_delete_during_write_through_stays_deleted() -> Result<()> {
    let backend = Arc::new(FlakyBackend::default());
    let store = Arc::new(TieredSessionStore::with_secondary(capacity(16), backend.clone()));
    backend.slow_puts.store(true, Ordering::SeqCst);

    let writing = {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.store_session(&common::session("s", HOUR_MS)).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(store.delete_session("s").await?);
    writing.await??;

    assert!(store.get_session("s").await?.is_none());
    assert!(backend.fetch("s").await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_evicted_session_survives_outage_until_reconciled() -> Result<()> {
    let backend = Arc::new(FlakyBackend::default());
    let store = TieredSessionStore::with_secondary(capacity(1), backend.clone());

    backend.down.store(true, Ordering::SeqCst);
    store.store_session(&common::session("first", HOUR_MS)).await?;
    store.store_session(&common::session("second", HOUR_MS)).await?;

    // Pushed out of the primary tier while the secondary was down, still readable
    assert!(store.get_session("first").await?.is_some());

    backend.down.store(false, Ordering::SeqCst);
    store.reconcile().await;
    assert!(backend.fetch("first").await?.is_some());
    assert!(backend.fetch("second").await?.is_some());

    Ok(())
}
