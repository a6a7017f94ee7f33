// ABOUTME: Background cleanup tasks with explicit shutdown handles
// ABOUTME: Periodically sweeps stores whose backends have no native expiry
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use crate::initial_access::InitialAccessTokenStore;
use crate::oauth_tokens::TokenStore;
use crate::pkce::PkceStore;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Handle to a periodic background task
///
/// `stop` signals shutdown and waits for the task to finish; dropping the handle
/// only signals.
pub struct CleanupHandle {
    name: &'static str,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl CleanupHandle {
    /// Run `tick` every `period`, starting one period from now
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let handle = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => tick().await,
                    _ = shutdown_rx.recv() => {
                        debug!(task = name, "Background task received shutdown signal");
                        break;
                    }
                }
            }
        });

        Self {
            name,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Whether the task has not been stopped yet
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Stop the task and wait for it; later calls do nothing
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(task = self.name, "Background task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for CleanupHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.try_send(());
        }
    }
}

/// A store swept by the periodic cleanup task
#[derive(Clone)]
pub enum CleanupTarget {
    /// OAuth token store
    Tokens(Arc<dyn TokenStore>),
    /// PKCE store
    Pkce(Arc<dyn PkceStore>),
    /// Initial access token store
    InitialAccess(Arc<dyn InitialAccessTokenStore>),
}

impl CleanupTarget {
    const fn store_name(&self) -> &'static str {
        match self {
            Self::Tokens(_) => "oauth_tokens",
            Self::Pkce(_) => "pkce",
            Self::InitialAccess(_) => "initial_access",
        }
    }

    async fn sweep(&self) -> crate::errors::AppResult<usize> {
        match self {
            Self::Tokens(store) => store.cleanup().await,
            Self::Pkce(store) => store.cleanup().await,
            Self::InitialAccess(store) => store.cleanup().await,
        }
    }
}

/// Sweep every target once, logging failures; returns the total removed
pub async fn run_cleanup_once(targets: &[CleanupTarget]) -> usize {
    let mut total = 0;
    for target in targets {
        match target.sweep().await {
            Ok(removed) => total += removed,
            Err(e) => warn!(store = target.store_name(), "Store cleanup failed: {}", e),
        }
    }
    if total > 0 {
        debug!(count = total, "Periodic store cleanup removed entries");
    }
    total
}

/// Start sweeping `targets` every `period`
#[must_use]
pub fn spawn_cleanup_task(targets: Vec<CleanupTarget>, period: Duration) -> CleanupHandle {
    let targets = Arc::new(targets);
    CleanupHandle::spawn("store_cleanup", period, move || {
        let targets = Arc::clone(&targets);
        async move {
            run_cleanup_once(&targets).await;
        }
    })
}
