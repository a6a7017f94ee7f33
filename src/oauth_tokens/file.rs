// ABOUTME: File-backed OAuth token store persisting encrypted records to a JSON document
// ABOUTME: Every mutation is staged on a copy and only committed in memory once the file write succeeds
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::{RefreshLookup, StoredTokenInfo, TokenStore, TokenTables};
use crate::constants::files;
use crate::crypto::EncryptionService;
use crate::errors::AppResult;
use crate::persistence::{now_millis, JsonDocumentFile};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Token store persisted to `oauth-tokens.json` in the store directory
pub struct FileTokenStore {
    document: JsonDocumentFile,
    tables: Mutex<TokenTables>,
    encryption: Arc<EncryptionService>,
}

impl FileTokenStore {
    /// Open (or create on first write) the token document in `dir`
    ///
    /// # Errors
    ///
    /// Returns an error if an existing document cannot be read or parsed
    pub async fn open(dir: &Path, encryption: Arc<EncryptionService>) -> AppResult<Self> {
        let document = JsonDocumentFile::new(dir, files::OAUTH_TOKENS);
        let tables: TokenTables = document.load().await?.unwrap_or_default();
        info!(
            path = %document.path().display(),
            count = tables.tokens.len(),
            "Loaded OAuth token store"
        );

        Ok(Self {
            document,
            tables: Mutex::new(tables),
            encryption,
        })
    }

    async fn commit<F>(&self, mutate: F) -> AppResult<usize>
    where
        F: FnOnce(&mut TokenTables) -> AppResult<usize> + Send,
    {
        let mut tables = self.tables.lock().await;
        let mut staged = tables.clone();
        let changed = mutate(&mut staged)?;
        if changed > 0 {
            self.document.save(&staged).await?;
            *tables = staged;
        }
        Ok(changed)
    }
}

#[async_trait::async_trait]
impl TokenStore for FileTokenStore {
    async fn store_token(&self, access_token: &str, info: &StoredTokenInfo) -> AppResult<()> {
        let encryption = &self.encryption;
        self.commit(|tables| {
            tables.insert(encryption, access_token, info)?;
            Ok(1)
        })
        .await
        .map(|_| ())
    }

    async fn get_token(&self, access_token: &str) -> AppResult<Option<StoredTokenInfo>> {
        self.tables
            .lock()
            .await
            .get(&self.encryption, access_token, now_millis())
    }

    async fn find_by_refresh_token(&self, refresh_token: &str) -> AppResult<Option<RefreshLookup>> {
        self.tables
            .lock()
            .await
            .find_by_refresh(&self.encryption, refresh_token, now_millis())
    }

    async fn delete_token(&self, access_token: &str) -> AppResult<()> {
        let encryption = &self.encryption;
        self.commit(|tables| Ok(usize::from(tables.remove(encryption, access_token))))
            .await
            .map(|_| ())
    }

    async fn cleanup(&self) -> AppResult<usize> {
        let now = now_millis();
        let encryption = &self.encryption;
        let removed = self
            .commit(|tables| Ok(tables.purge_expired(encryption, now)))
            .await?;
        if removed > 0 {
            debug!(store = "oauth_tokens", backend = "file", count = removed, "Removed expired tokens");
        }
        Ok(removed)
    }

    async fn health_check(&self) -> AppResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}
