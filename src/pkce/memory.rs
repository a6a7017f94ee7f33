// ABOUTME: In-memory PKCE store on a sharded concurrent map
// ABOUTME: Consumption removes the entry under the shard lock, making it exactly-once
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::{PkceData, PkceStore};
use crate::constants::keys::PKCE_PREFIX;
use crate::crypto::storage_key;
use crate::errors::AppResult;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
struct PkceEntry {
    data: PkceData,
    expires_at: Instant,
}

impl PkceEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-memory PKCE store
#[derive(Clone, Default)]
pub struct InMemoryPkceStore {
    entries: Arc<DashMap<String, PkceEntry>>,
}

impl InMemoryPkceStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn key(code: &str) -> String {
        storage_key(PKCE_PREFIX, code)
    }
}

#[async_trait::async_trait]
impl PkceStore for InMemoryPkceStore {
    async fn store_code_verifier(&self, code: &str, data: &PkceData, ttl: Duration) -> AppResult<()> {
        self.entries.insert(
            Self::key(code),
            PkceEntry {
                data: data.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get_code_verifier(&self, code: &str) -> AppResult<Option<PkceData>> {
        Ok(self
            .entries
            .get(&Self::key(code))
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.data.clone()))
    }

    async fn get_and_delete_code_verifier(&self, code: &str) -> AppResult<Option<PkceData>> {
        Ok(self
            .entries
            .remove(&Self::key(code))
            .filter(|(_, entry)| !entry.is_expired())
            .map(|(_, entry)| entry.data))
    }

    async fn has_code_verifier(&self, code: &str) -> AppResult<bool> {
        Ok(self
            .entries
            .get(&Self::key(code))
            .is_some_and(|entry| !entry.is_expired()))
    }

    async fn delete_code_verifier(&self, code: &str) -> AppResult<bool> {
        Ok(self.entries.remove(&Self::key(code)).is_some())
    }

    async fn cleanup(&self) -> AppResult<usize> {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(store = "pkce", backend = "memory", count = removed, "Removed expired PKCE state");
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
