// ABOUTME: Versioned JSON document storage with atomic replace and single-generation backup
// ABOUTME: Writes go to a temp file, the live file is copied to .backup, then the temp file is renamed
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use crate::constants::defaults::FILE_FORMAT_VERSION;
use crate::errors::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// On-disk envelope: `{ "version": 1, "updatedAt": "...", ...body }`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedDocument<T> {
    /// File format version
    pub version: u32,
    /// Time of the last successful write
    pub updated_at: DateTime<Utc>,
    /// Store-specific content, flattened into the top-level object
    #[serde(flatten)]
    pub body: T,
}

/// A single JSON document owned by one store instance
#[derive(Debug, Clone)]
pub struct JsonDocumentFile {
    path: PathBuf,
}

impl JsonDocumentFile {
    /// Document `file_name` inside `dir`
    #[must_use]
    pub fn new(dir: &Path, file_name: &str) -> Self {
        Self {
            path: dir.join(file_name),
        }
    }

    /// Path of the live document
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the previous generation kept alongside the live document
    #[must_use]
    pub fn backup_path(&self) -> PathBuf {
        Self::with_suffix(&self.path, ".backup")
    }

    fn temp_path(&self) -> PathBuf {
        Self::with_suffix(&self.path, &format!(".{}.tmp", uuid::Uuid::new_v4().simple()))
    }

    fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
        let mut raw = path.as_os_str().to_owned();
        raw.push(suffix);
        PathBuf::from(raw)
    }

    /// Load the document body, or `None` if the file does not exist yet
    ///
    /// # Errors
    ///
    /// Returns `StorageError` for I/O failures or an unsupported version and
    /// `SerializationError` if the JSON does not match the expected shape
    pub async fn load<T: DeserializeOwned>(&self) -> AppResult<Option<T>> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AppError::storage(format!(
                    "Failed to read {}: {e}",
                    self.path.display()
                ))
                .with_source(e))
            }
        };

        let document: PersistedDocument<T> = serde_json::from_str(&contents)?;
        if document.version != FILE_FORMAT_VERSION {
            return Err(AppError::storage(format!(
                "Unsupported format version {} in {} (expected {FILE_FORMAT_VERSION})",
                document.version,
                self.path.display()
            )));
        }

        Ok(Some(document.body))
    }

    /// Atomically replace the document with `body`
    ///
    /// A failure to back up the existing file aborts the write and leaves the
    /// live file untouched. A missing live file is not a backup failure.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if any filesystem step fails
    pub async fn save<T: Serialize>(&self, body: &T) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    AppError::storage(format!(
                        "Failed to prepare store directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }

        let document = PersistedDocument {
            version: FILE_FORMAT_VERSION,
            updated_at: Utc::now(),
            body,
        };
        let payload = serde_json::to_vec_pretty(&document)?;

        let temp_path = self.temp_path();
        if let Err(e) = Self::write_synced(&temp_path, &payload).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e);
        }

        match fs::copy(&self.path, self.backup_path()).await {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No existing document to back up");
            }
            Err(e) => {
                let _ = fs::remove_file(&temp_path).await;
                return Err(AppError::storage(format!(
                    "Failed to back up {}: {e}",
                    self.path.display()
                ))
                .with_source(e));
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            AppError::storage(format!(
                "Failed to finalize {}: {e}",
                self.path.display()
            ))
            .with_source(e)
        })
    }

    async fn write_synced(path: &Path, payload: &[u8]) -> AppResult<()> {
        let mut file = fs::File::create(path).await.map_err(|e| {
            AppError::storage(format!("Failed to create {}: {e}", path.display()))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
        }

        file.write_all(payload).await?;
        file.sync_all().await?;
        Ok(())
    }
}
