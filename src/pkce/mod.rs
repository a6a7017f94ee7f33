// ABOUTME: PKCE session store correlating authorization codes with their code verifiers
// ABOUTME: Consumption is a single atomic read-and-delete so a code can never be redeemed twice
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

/// In-memory PKCE store
pub mod memory;
/// Redis PKCE store
pub mod redis;

pub use memory::InMemoryPkceStore;
pub use redis::RedisPkceStore;

use crate::errors::AppResult;
use crate::persistence::now_millis;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Authorization state held between the authorize redirect and the callback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PkceData {
    /// PKCE code verifier sent with the token exchange
    pub code_verifier: String,
    /// OAuth `state` parameter tying the callback to the request
    pub state: String,
    /// S256 challenge derived from the verifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge: Option<String>,
    /// Redirect URI used in the authorization request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    /// Creation time in epoch milliseconds
    pub created_at: i64,
}

impl PkceData {
    /// New state with only the verifier and `state` set
    #[must_use]
    pub fn new(code_verifier: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            code_verifier: code_verifier.into(),
            state: state.into(),
            code_challenge: None,
            redirect_uri: None,
            created_at: now_millis(),
        }
    }
}

/// Persistence contract for PKCE state
#[async_trait::async_trait]
pub trait PkceStore: Send + Sync {
    /// Associate `code` with `data` for `ttl`
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails
    async fn store_code_verifier(&self, code: &str, data: &PkceData, ttl: Duration) -> AppResult<()>;

    /// Non-destructive read for diagnostics; never use it to redeem a code
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails
    async fn get_code_verifier(&self, code: &str) -> AppResult<Option<PkceData>>;

    /// Atomically read and invalidate the state for `code`
    ///
    /// Among concurrent callers for the same code exactly one receives the data.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend operation fails
    async fn get_and_delete_code_verifier(&self, code: &str) -> AppResult<Option<PkceData>>;

    /// Whether unexpired state exists for `code`
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails
    async fn has_code_verifier(&self, code: &str) -> AppResult<bool>;

    /// Remove the state for `code`; `false` if there was none
    ///
    /// # Errors
    ///
    /// Returns an error if the backend delete fails
    async fn delete_code_verifier(&self, code: &str) -> AppResult<bool>;

    /// Remove expired state, returning how many entries were removed
    ///
    /// # Errors
    ///
    /// Returns an error if the backend operation fails
    async fn cleanup(&self) -> AppResult<usize>;

    /// Verify the backend is reachable
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unavailable
    async fn health_check(&self) -> AppResult<()>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}
