// ABOUTME: File-backed initial access token store with encrypted records
// ABOUTME: Mutations are staged, written atomically, then committed under one mutex
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::{
    CreateTokenOptions, InitialAccessToken, InitialAccessTokenStore, ListOptions, TokenLedger,
    ValidationResult,
};
use crate::constants::files;
use crate::crypto::EncryptionService;
use crate::errors::AppResult;
use crate::persistence::{now_secs, JsonDocumentFile};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// On-disk body: token id -> encrypted record
#[derive(Debug, Default, Serialize, Deserialize)]
struct TokenDocument {
    #[serde(default)]
    tokens: BTreeMap<String, String>,
}

/// Initial access token store persisted to `initial-access-tokens.json`
pub struct FileInitialAccessTokenStore {
    document: JsonDocumentFile,
    ledger: Mutex<TokenLedger>,
    encryption: Arc<EncryptionService>,
}

impl FileInitialAccessTokenStore {
    /// Open (or create on first write) the token document in `dir`
    ///
    /// # Errors
    ///
    /// Returns an error if an existing document cannot be read, parsed or decrypted
    pub async fn open(dir: &Path, encryption: Arc<EncryptionService>) -> AppResult<Self> {
        let document = JsonDocumentFile::new(dir, files::INITIAL_ACCESS_TOKENS);
        let body: TokenDocument = document.load().await?.unwrap_or_default();

        let records = body
            .tokens
            .values()
            .map(|payload| encryption.decrypt_json::<InitialAccessToken>(payload))
            .collect::<AppResult<Vec<_>>>()?;
        let ledger = TokenLedger::from_records(records);

        info!(
            path = %document.path().display(),
            count = ledger.len(),
            "Loaded initial access token store"
        );

        Ok(Self {
            document,
            ledger: Mutex::new(ledger),
            encryption,
        })
    }

    async fn persist(&self, ledger: &TokenLedger) -> AppResult<()> {
        let tokens = ledger
            .records()
            .map(|record| Ok((record.id.clone(), self.encryption.encrypt_json(record)?)))
            .collect::<AppResult<BTreeMap<_, _>>>()?;
        self.document.save(&TokenDocument { tokens }).await
    }

    async fn commit<T, F>(&self, mutate: F) -> AppResult<T>
    where
        F: FnOnce(&mut TokenLedger) -> (T, bool) + Send,
        T: Send,
    {
        let mut ledger = self.ledger.lock().await;
        let mut staged = ledger.clone();
        let (outcome, changed) = mutate(&mut staged);
        if changed {
            self.persist(&staged).await?;
            *ledger = staged;
        }
        Ok(outcome)
    }
}

#[async_trait::async_trait]
impl InitialAccessTokenStore for FileInitialAccessTokenStore {
    async fn create_token(&self, options: &CreateTokenOptions) -> AppResult<InitialAccessToken> {
        let token = InitialAccessToken::issue(options, now_secs());
        let record = token.clone();
        self.commit(move |ledger| {
            ledger.insert(record);
            ((), true)
        })
        .await?;
        info!(token_id = %token.id, "Created initial access token");
        Ok(token)
    }

    async fn validate_and_use_token(&self, token: &str) -> AppResult<ValidationResult> {
        let now = now_secs();
        self.commit(|ledger| {
            let result = ledger.validate_and_use(token, now);
            let changed = result.valid;
            (result, changed)
        })
        .await
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
        self.commit(|ledger| {
            let revoked = ledger.revoke(id);
            (revoked, revoked)
        })
        .await
    }

    async fn delete_token(&self, id: &str) -> AppResult<bool> {
        self.commit(|ledger| {
            let removed = ledger.remove(id);
            (removed, removed)
        })
        .await
    }

    async fn cleanup(&self) -> AppResult<usize> {
        let now = now_secs();
        let removed = self
            .commit(|ledger| {
                let removed = ledger.purge(now);
                (removed, removed > 0)
            })
            .await?;
        if removed > 0 {
            debug!(store = "initial_access", backend = "file", count = removed, "Removed unusable tokens");
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
