// ABOUTME: Store factory selecting and wiring backends from configuration
// ABOUTME: Builds one bundle of stores at startup that collaborators share by reference
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use crate::cleanup::{spawn_cleanup_task, CleanupHandle, CleanupTarget};
use crate::config::{StoreBackend, StoreConfig};
use crate::crypto::EncryptionService;
use crate::errors::{AppError, AppResult};
use crate::initial_access::{
    FileInitialAccessTokenStore, InMemoryInitialAccessTokenStore, InitialAccessTokenStore,
    RedisInitialAccessTokenStore,
};
use crate::oauth_tokens::{FileTokenStore, InMemoryTokenStore, RedisTokenStore, TokenStore};
use crate::persistence::redis::connect;
use crate::pkce::{InMemoryPkceStore, PkceStore, RedisPkceStore};
use crate::sessions::{
    FileSessionBackend, RedisSessionBackend, SessionMetadataStore, TieredSessionStore,
};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

/// Every store the server needs, built once at startup
///
/// Cloning the `Arc`s out of the bundle is how collaborators receive their store.
pub struct Stores {
    /// Backend shared by all store kinds
    pub backend: StoreBackend,
    /// Encryption service shared by all stores
    pub encryption: Arc<EncryptionService>,
    /// OAuth token store
    pub tokens: Arc<dyn TokenStore>,
    /// PKCE store
    pub pkce: Arc<dyn PkceStore>,
    /// Initial access token store
    pub initial_access: Arc<dyn InitialAccessTokenStore>,
    /// Session metadata store
    pub sessions: Arc<dyn SessionMetadataStore>,
    pkce_ttl: Duration,
    cleanup: Mutex<Option<CleanupHandle>>,
}

impl Stores {
    /// Configured default lifetime for PKCE state
    #[must_use]
    pub const fn pkce_ttl(&self) -> Duration {
        self.pkce_ttl
    }

    /// Whether the periodic store sweep is running
    pub async fn cleanup_running(&self) -> bool {
        self.cleanup
            .lock()
            .await
            .as_ref()
            .is_some_and(CleanupHandle::is_running)
    }

    /// Check every store's backend
    ///
    /// # Errors
    ///
    /// Returns the first backend failure
    pub async fn health_check(&self) -> AppResult<()> {
        self.tokens.health_check().await?;
        self.pkce.health_check().await?;
        self.initial_access.health_check().await?;
        self.sessions.health_check().await
    }

    /// Stop background tasks and dispose the session store; safe to call repeatedly
    pub async fn dispose(&self) {
        let cleanup = self.cleanup.lock().await.take();
        if let Some(mut handle) = cleanup {
            handle.stop().await;
        }
        self.sessions.dispose().await;
        info!(backend = %self.backend, "Stores disposed");
    }
}

/// Builds [`Stores`] for the configured backend
pub struct StoreFactory;

impl StoreFactory {
    /// Load configuration from the environment and build the stores
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a missing or invalid key, backend or URL,
    /// or a storage error if a backend cannot be opened
    pub async fn from_env() -> AppResult<Stores> {
        Self::build(&StoreConfig::from_env()?).await
    }

    /// Build every store for `config.backend`
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` is inconsistent, or a storage error
    /// if a file document cannot be loaded or Redis cannot be reached
    pub async fn build(config: &StoreConfig) -> AppResult<Stores> {
        config.validate()?;
        let capacity = NonZeroUsize::new(config.session_cache_max_entries).ok_or_else(|| {
            AppError::config_invalid("Session cache capacity must be greater than zero")
        })?;
        let encryption = Arc::clone(&config.encryption);

        let (tokens, pkce, initial_access, sessions): (
            Arc<dyn TokenStore>,
            Arc<dyn PkceStore>,
            Arc<dyn InitialAccessTokenStore>,
            TieredSessionStore,
        ) = match config.backend {
            StoreBackend::Memory => (
                Arc::new(InMemoryTokenStore::new(Arc::clone(&encryption))),
                Arc::new(InMemoryPkceStore::new()),
                Arc::new(InMemoryInitialAccessTokenStore::new()),
                TieredSessionStore::in_memory(capacity),
            ),
            StoreBackend::File => {
                let dir = config.store_dir.as_path();
                info!(
                    path = %dir.display(),
                    "PKCE state is short-lived and stays in memory with the file backend"
                );
                let secondary =
                    Arc::new(FileSessionBackend::open(dir, Arc::clone(&encryption)).await?);
                (
                    Arc::new(FileTokenStore::open(dir, Arc::clone(&encryption)).await?),
                    Arc::new(InMemoryPkceStore::new()),
                    Arc::new(
                        FileInitialAccessTokenStore::open(dir, Arc::clone(&encryption)).await?,
                    ),
                    TieredSessionStore::with_secondary(capacity, secondary),
                )
            }
            StoreBackend::Redis => {
                let url = config.redis_url.as_deref().ok_or_else(|| {
                    AppError::config_missing("REDIS_URL is required for the Redis backend")
                })?;
                let manager = connect(url, &config.redis_connection).await?;
                let secondary = Arc::new(RedisSessionBackend::new(
                    manager.clone(),
                    Arc::clone(&encryption),
                ));
                (
                    Arc::new(RedisTokenStore::new(manager.clone(), Arc::clone(&encryption))),
                    Arc::new(RedisPkceStore::new(manager.clone(), Arc::clone(&encryption))),
                    Arc::new(RedisInitialAccessTokenStore::new(
                        manager,
                        Arc::clone(&encryption),
                    )),
                    TieredSessionStore::with_secondary(capacity, secondary),
                )
            }
        };

        let cleanup = if config.enable_background_tasks {
            sessions
                .start_reconciliation(config.session_cleanup_interval)
                .await;
            Some(Self::start_store_cleanup(
                config,
                &tokens,
                &pkce,
                &initial_access,
            ))
        } else {
            None
        };

        info!(
            backend = %config.backend,
            tokens = tokens.backend_name(),
            pkce = pkce.backend_name(),
            initial_access = initial_access.backend_name(),
            sessions = sessions.backend_name(),
            background_tasks = config.enable_background_tasks,
            "Credential and session stores initialized"
        );

        Ok(Stores {
            backend: config.backend,
            encryption,
            tokens,
            pkce,
            initial_access,
            sessions: Arc::new(sessions),
            pkce_ttl: config.pkce_ttl,
            cleanup: Mutex::new(cleanup),
        })
    }

    /// Redis expires keys natively; the in-process backends need a sweeper
    fn start_store_cleanup(
        config: &StoreConfig,
        tokens: &Arc<dyn TokenStore>,
        pkce: &Arc<dyn PkceStore>,
        initial_access: &Arc<dyn InitialAccessTokenStore>,
    ) -> CleanupHandle {
        let mut targets = vec![CleanupTarget::InitialAccess(Arc::clone(initial_access))];
        if config.backend != StoreBackend::Redis {
            targets.push(CleanupTarget::Tokens(Arc::clone(tokens)));
            targets.push(CleanupTarget::Pkce(Arc::clone(pkce)));
        }
        spawn_cleanup_task(targets, config.store_cleanup_interval)
    }
}
