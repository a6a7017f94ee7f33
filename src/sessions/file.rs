// ABOUTME: File-backed secondary session tier persisting encrypted session metadata
// ABOUTME: Survives restarts of a single instance; every change rewrites sessions.json atomically
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::{McpSessionMetadata, SessionBackend};
use crate::constants::files;
use crate::crypto::EncryptionService;
use crate::errors::AppResult;
use crate::persistence::JsonDocumentFile;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// On-disk body: session id -> encrypted metadata
#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionDocument {
    #[serde(default)]
    sessions: BTreeMap<String, String>,
}

/// Secondary session tier stored in `sessions.json`
pub struct FileSessionBackend {
    document: JsonDocumentFile,
    sessions: Mutex<BTreeMap<String, McpSessionMetadata>>,
    encryption: Arc<EncryptionService>,
}

impl FileSessionBackend {
    /// Open (or create on first write) the session document in `dir`
    ///
    /// # Errors
    ///
    /// Returns an error if an existing document cannot be read, parsed or decrypted
    pub async fn open(dir: &Path, encryption: Arc<EncryptionService>) -> AppResult<Self> {
        let document = JsonDocumentFile::new(dir, files::SESSIONS);
        let body: SessionDocument = document.load().await?.unwrap_or_default();

        let mut sessions = BTreeMap::new();
        for (id, payload) in body.sessions {
            sessions.insert(id, encryption.decrypt_json::<McpSessionMetadata>(&payload)?);
        }

        info!(
            path = %document.path().display(),
            count = sessions.len(),
            "Loaded session metadata file"
        );

        Ok(Self {
            document,
            sessions: Mutex::new(sessions),
            encryption,
        })
    }

    async fn persist(&self, sessions: &BTreeMap<String, McpSessionMetadata>) -> AppResult<()> {
        let sealed = sessions
            .iter()
            .map(|(id, session)| Ok((id.clone(), self.encryption.encrypt_json(session)?)))
            .collect::<AppResult<BTreeMap<_, _>>>()?;
        self.document.save(&SessionDocument { sessions: sealed }).await
    }
}

#[async_trait::async_trait]
impl SessionBackend for FileSessionBackend {
    async fn put(&self, session: &McpSessionMetadata) -> AppResult<()> {
        let mut sessions = self.sessions.lock().await;
        let mut staged = sessions.clone();
        staged.insert(session.session_id.clone(), session.clone());
        self.persist(&staged).await?;
        *sessions = staged;
        Ok(())
    }

    async fn fetch(&self, session_id: &str) -> AppResult<Option<McpSessionMetadata>> {
        Ok(self.sessions.lock().await.get(session_id).cloned())
    }

    async fn remove(&self, session_id: &str) -> AppResult<bool> {
        let mut sessions = self.sessions.lock().await;
        if !sessions.contains_key(session_id) {
            return Ok(false);
        }
        let mut staged = sessions.clone();
        staged.remove(session_id);
        self.persist(&staged).await?;
        *sessions = staged;
        Ok(true)
    }

    async fn purge_expired(&self, now_ms: i64) -> AppResult<usize> {
        let mut sessions = self.sessions.lock().await;
        let mut staged = sessions.clone();
        staged.retain(|_, session| !session.is_expired_at(now_ms));
        let removed = sessions.len() - staged.len();
        if removed > 0 {
            self.persist(&staged).await?;
            *sessions = staged;
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
