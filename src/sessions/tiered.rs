// ABOUTME: Tiered session store with a bounded LRU primary tier and optional durable secondary
// ABOUTME: Write-through and read-through on the request path; periodic flush and prune in the background
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use super::{McpSessionMetadata, SessionBackend, SessionMetadataStore};
use crate::cleanup::CleanupHandle;
use crate::errors::AppResult;
use crate::persistence::now_millis;
use dashmap::DashMap;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
struct CachedSession {
    metadata: McpSessionMetadata,
    /// Whether the secondary tier holds this exact version
    persisted: bool,
}

/// Session returned by a read-through, plus the id of any entry it pushed out of the primary tier
type ReadThrough = (Option<McpSessionMetadata>, Option<String>);

struct TieredInner {
    primary: RwLock<LruCache<String, CachedSession>>,
    secondary: Option<Arc<dyn SessionBackend>>,
    /// Never-persisted entries pushed out of the primary tier, waiting for a secondary write
    evicted: DashMap<String, McpSessionMetadata>,
    /// Per-session locks; every secondary write or delete for an id runs under its lock
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl TieredInner {
    fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.entry(session_id.to_owned()).or_default().value())
    }

    fn release_session_lock(&self, session_id: &str, lock: Arc<Mutex<()>>) {
        drop(lock);
        self.locks
            .remove_if(session_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Best-effort secondary write; failures are logged and reported as `false`
    async fn write_secondary(&self, session: &McpSessionMetadata) -> bool {
        let Some(secondary) = &self.secondary else {
            return true;
        };
        match secondary.put(session).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    session_id = %session.session_id,
                    backend = secondary.backend_name(),
                    "Secondary session write failed: {}",
                    e
                );
                false
            }
        }
    }

    async fn remove_secondary(&self, session_id: &str) -> bool {
        let Some(secondary) = &self.secondary else {
            return false;
        };
        match secondary.remove(session_id).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(
                    session_id = %session_id,
                    backend = secondary.backend_name(),
                    "Secondary session delete failed: {}",
                    e
                );
                false
            }
        }
    }

    async fn mark_persisted(&self, session: &McpSessionMetadata) {
        let mut primary = self.primary.write().await;
        if let Some(entry) = primary.peek_mut(&session.session_id) {
            if entry.metadata == *session {
                entry.persisted = true;
            }
        }
    }

    /// Insert into the primary tier, holding the lock for `session`'s id
    ///
    /// A never-persisted entry pushed out by the insert is parked in `evicted`;
    /// its id is returned so the caller can flush it once that lock is released.
    async fn insert_primary(&self, session: McpSessionMetadata, persisted: bool) -> Option<String> {
        let session_id = session.session_id.clone();
        let mut primary = self.primary.write().await;
        self.evicted.remove(&session_id);
        let evicted = primary.push(
            session_id.clone(),
            CachedSession {
                metadata: session,
                persisted,
            },
        );

        // `push` also hands back the previous value for the same key, which is not an eviction
        let (evicted_id, entry) = evicted?;
        if evicted_id == session_id
            || entry.persisted
            || self.secondary.is_none()
            || entry.metadata.is_expired_at(now_millis())
        {
            return None;
        }
        self.evicted.insert(evicted_id.clone(), entry.metadata);
        Some(evicted_id)
    }

    /// Write the pending version of one session, holding the lock for its id
    async fn flush_locked(&self, session_id: &str) -> bool {
        let in_primary = self
            .primary
            .read()
            .await
            .peek(session_id)
            .filter(|entry| !entry.persisted)
            .map(|entry| entry.metadata.clone());
        let (session, parked) = match in_primary {
            Some(session) => (session, false),
            None => match self.evicted.get(session_id).map(|entry| entry.value().clone()) {
                Some(session) => (session, true),
                None => return false,
            },
        };

        if session.is_expired_at(now_millis()) || !self.write_secondary(&session).await {
            return false;
        }
        if parked {
            debug!(session_id = %session_id, "Flushed evicted session to secondary tier");
            self.evicted.remove(session_id);
        } else {
            self.mark_persisted(&session).await;
        }
        true
    }

    async fn flush_session(&self, session_id: &str) -> bool {
        let lock = self.session_lock(session_id);
        let flushed = {
            let _guard = lock.lock().await;
            self.flush_locked(session_id).await
        };
        self.release_session_lock(session_id, lock);
        flushed
    }

    async fn flush_evicted(&self, evicted: Option<String>) {
        if let Some(session_id) = evicted {
            self.flush_session(&session_id).await;
        }
    }

    /// Load from the secondary tier into the primary, holding the lock for `session_id`
    async fn read_through(
        &self,
        secondary: &Arc<dyn SessionBackend>,
        session_id: &str,
        now: i64,
    ) -> AppResult<ReadThrough> {
        // A write may have landed while the lock was being acquired
        if let Some(entry) = self.primary.write().await.get(session_id) {
            if !entry.metadata.is_expired_at(now) {
                return Ok((Some(entry.metadata.clone()), None));
            }
        }

        match secondary.fetch(session_id).await? {
            Some(session) if !session.is_expired_at(now) => {
                let evicted = self.insert_primary(session.clone(), true).await;
                Ok((Some(session), evicted))
            }
            Some(_) => {
                self.remove_secondary(session_id).await;
                Ok((None, None))
            }
            None => Ok((None, None)),
        }
    }

    fn prune_primary(primary: &mut LruCache<String, CachedSession>, now_ms: i64) -> usize {
        let expired: Vec<String> = primary
            .iter()
            .filter(|(_, entry)| entry.metadata.is_expired_at(now_ms))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            primary.pop(id);
        }
        expired.len()
    }

    async fn cleanup(&self) -> AppResult<usize> {
        let now = now_millis();
        let primary_removed = Self::prune_primary(&mut *self.primary.write().await, now);

        let parked_before = self.evicted.len();
        self.evicted.retain(|_, session| !session.is_expired_at(now));
        let parked_removed = parked_before.saturating_sub(self.evicted.len());

        let secondary_removed = match &self.secondary {
            Some(secondary) => secondary.purge_expired(now).await?,
            None => 0,
        };
        Ok(primary_removed + parked_removed + secondary_removed)
    }

    /// Write every primary-only entry to the secondary tier
    async fn flush_unpersisted(&self) -> usize {
        if self.secondary.is_none() {
            return 0;
        }

        let mut pending: Vec<String> = self
            .primary
            .read()
            .await
            .iter()
            .filter(|(_, entry)| !entry.persisted)
            .map(|(id, _)| id.clone())
            .collect();
        pending.extend(self.evicted.iter().map(|entry| entry.key().clone()));

        let mut flushed = 0;
        for session_id in &pending {
            if self.flush_session(session_id).await {
                flushed += 1;
            }
        }
        flushed
    }

    async fn reconcile(&self) {
        let flushed = self.flush_unpersisted().await;
        match self.cleanup().await {
            Ok(pruned) => {
                if flushed > 0 || pruned > 0 {
                    debug!(flushed, pruned, "Session tiers reconciled");
                }
            }
            Err(e) => warn!("Session reconciliation prune failed: {}", e),
        }
    }
}

/// Session store with an in-process LRU primary tier and an optional secondary tier
///
/// Writes, deletes and reconciliation flushes for one session id are serialized,
/// so a delete is never followed by a stale write that brings the session back.
pub struct TieredSessionStore {
    inner: Arc<TieredInner>,
    reconciler: Mutex<Option<CleanupHandle>>,
}

impl TieredSessionStore {
    /// Primary-only store without background reconciliation
    #[must_use]
    pub fn in_memory(capacity: NonZeroUsize) -> Self {
        Self::build(capacity, None)
    }

    /// Store backed by `secondary`, without background reconciliation
    #[must_use]
    pub fn with_secondary(capacity: NonZeroUsize, secondary: Arc<dyn SessionBackend>) -> Self {
        Self::build(capacity, Some(secondary))
    }

    fn build(capacity: NonZeroUsize, secondary: Option<Arc<dyn SessionBackend>>) -> Self {
        Self {
            inner: Arc::new(TieredInner {
                primary: RwLock::new(LruCache::new(capacity)),
                secondary,
                evicted: DashMap::new(),
                locks: DashMap::new(),
            }),
            reconciler: Mutex::new(None),
        }
    }

    /// Start periodic reconciliation every `period`; replaces a running reconciler
    pub async fn start_reconciliation(&self, period: Duration) {
        let inner = Arc::clone(&self.inner);
        let handle = CleanupHandle::spawn("session_reconciliation", period, move || {
            let inner = Arc::clone(&inner);
            async move { inner.reconcile().await }
        });

        if let Some(mut previous) = self.reconciler.lock().await.replace(handle) {
            previous.stop().await;
        }
    }

    /// Run one reconciliation pass now
    pub async fn reconcile(&self) {
        self.inner.reconcile().await;
    }

    /// Drop every primary-tier entry without touching the secondary tier
    pub async fn clear_primary_tier(&self) {
        self.inner.primary.write().await.clear();
    }

    /// Whether a secondary tier is configured
    #[must_use]
    pub fn has_secondary(&self) -> bool {
        self.inner.secondary.is_some()
    }
}

#[async_trait::async_trait]
impl SessionMetadataStore for TieredSessionStore {
    async fn store_session(&self, session: &McpSessionMetadata) -> AppResult<()> {
        let lock = self.inner.session_lock(&session.session_id);
        let evicted = {
            let _guard = lock.lock().await;
            let evicted = self.inner.insert_primary(session.clone(), false).await;
            if self.inner.write_secondary(session).await {
                self.inner.mark_persisted(session).await;
            }
            evicted
        };
        self.inner.release_session_lock(&session.session_id, lock);

        self.inner.flush_evicted(evicted).await;
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> AppResult<Option<McpSessionMetadata>> {
        let now = now_millis();

        {
            let mut primary = self.inner.primary.write().await;
            if let Some(entry) = primary.get(session_id) {
                if !entry.metadata.is_expired_at(now) {
                    return Ok(Some(entry.metadata.clone()));
                }
                primary.pop(session_id);
            }
        }

        let parked = self
            .inner
            .evicted
            .get(session_id)
            .map(|entry| entry.value().clone());
        if let Some(session) = parked {
            if !session.is_expired_at(now) {
                return Ok(Some(session));
            }
        }

        let Some(secondary) = &self.inner.secondary else {
            return Ok(None);
        };

        let lock = self.inner.session_lock(session_id);
        let outcome = {
            let _guard = lock.lock().await;
            self.inner.read_through(secondary, session_id, now).await
        };
        self.inner.release_session_lock(session_id, lock);

        let (session, evicted) = outcome?;
        self.inner.flush_evicted(evicted).await;
        Ok(session)
    }

    async fn delete_session(&self, session_id: &str) -> AppResult<bool> {
        let lock = self.inner.session_lock(session_id);
        let outcome = {
            let _guard = lock.lock().await;
            let in_primary = self.inner.primary.write().await.pop(session_id).is_some();
            let parked = self.inner.evicted.remove(session_id).is_some();
            match &self.inner.secondary {
                Some(secondary) => secondary
                    .remove(session_id)
                    .await
                    .map(|in_secondary| in_primary || parked || in_secondary),
                None => Ok(in_primary || parked),
            }
        };
        self.inner.release_session_lock(session_id, lock);
        outcome
    }

    async fn cleanup(&self) -> AppResult<usize> {
        self.inner.cleanup().await
    }

    async fn session_count(&self) -> usize {
        let now = now_millis();
        self.inner
            .primary
            .read()
            .await
            .iter()
            .filter(|(_, entry)| !entry.metadata.is_expired_at(now))
            .count()
    }

    async fn dispose(&self) {
        let reconciler = self.reconciler.lock().await.take();
        if let Some(mut handle) = reconciler {
            handle.stop().await;
        }
        self.inner.flush_unpersisted().await;
        self.inner.primary.write().await.clear();
        self.inner.evicted.clear();
    }

    async fn health_check(&self) -> AppResult<()> {
        match &self.inner.secondary {
            Some(secondary) => secondary.health_check().await,
            None => Ok(()),
        }
    }

    fn backend_name(&self) -> &'static str {
        self.inner
            .secondary
            .as_ref()
            .map_or("memory", |secondary| secondary.backend_name())
    }
}
