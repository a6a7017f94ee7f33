// ABOUTME: MCP session metadata storage with a bounded primary tier and optional durable secondary
// ABOUTME: Only serializable session descriptors are stored; transports are rebuilt by the caller
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

/// File-backed secondary tier
pub mod file;
/// Redis secondary tier
pub mod redis;
/// Primary LRU tier with write-through, read-through and periodic reconciliation
pub mod tiered;

pub use file::FileSessionBackend;
pub use redis::RedisSessionBackend;
pub use tiered::TieredSessionStore;

use crate::errors::AppResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Authorization context attached to a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionAuthInfo {
    /// OAuth client that opened the session
    pub client_id: String,
    /// Scopes granted to the session
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Authenticated user, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Expiry of the underlying credential in epoch milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

/// A replayable event recorded for stream resumption
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvent {
    /// Event identifier used as the resumption cursor
    pub event_id: String,
    /// Stream the event was sent on
    pub stream_id: String,
    /// Time the event was recorded, epoch milliseconds
    pub timestamp: i64,
    /// JSON-RPC message payload
    pub message: Value,
}

/// Lightweight, serializable protocol session descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpSessionMetadata {
    /// Session identifier
    pub session_id: String,
    /// Authorization context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_info: Option<SessionAuthInfo>,
    /// Creation time in epoch milliseconds
    pub created_at: i64,
    /// Fixed expiry in epoch milliseconds; re-store the session to extend it
    pub expires_at: i64,
    /// Arbitrary caller metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    /// Events retained for resumption
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<SessionEvent>>,
}

impl McpSessionMetadata {
    /// Whether the session is past its expiry at `now_ms`
    #[must_use]
    pub const fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at
    }
}

/// Session metadata store consumed by the protocol-session handler
#[async_trait::async_trait]
pub trait SessionMetadataStore: Send + Sync {
    /// Create or replace a session
    ///
    /// # Errors
    ///
    /// Returns an error only if the primary tier rejects the write
    async fn store_session(&self, session: &McpSessionMetadata) -> AppResult<()>;

    /// Fetch an unexpired session
    ///
    /// # Errors
    ///
    /// Returns an error if the secondary tier read fails on a primary miss
    async fn get_session(&self, session_id: &str) -> AppResult<Option<McpSessionMetadata>>;

    /// Remove a session from every tier; `false` if it was not found anywhere
    ///
    /// # Errors
    ///
    /// Returns an error if the secondary tier delete fails
    async fn delete_session(&self, session_id: &str) -> AppResult<bool>;

    /// Prune expired sessions, returning how many entries were removed across tiers
    ///
    /// # Errors
    ///
    /// Returns an error if the secondary tier sweep fails
    async fn cleanup(&self) -> AppResult<usize>;

    /// Number of unexpired sessions in the primary tier
    async fn session_count(&self) -> usize;

    /// Stop background reconciliation and clear the primary tier; safe to call repeatedly
    async fn dispose(&self);

    /// Verify the secondary tier is reachable
    ///
    /// # Errors
    ///
    /// Returns an error if the secondary tier is unavailable
    async fn health_check(&self) -> AppResult<()>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

/// Durable tier behind the primary cache
#[async_trait::async_trait]
pub trait SessionBackend: Send + Sync {
    /// Write a session
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails
    async fn put(&self, session: &McpSessionMetadata) -> AppResult<()>;

    /// Read a session, expired or not
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails
    async fn fetch(&self, session_id: &str) -> AppResult<Option<McpSessionMetadata>>;

    /// Remove a session; `false` if absent
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails
    async fn remove(&self, session_id: &str) -> AppResult<bool>;

    /// Remove sessions expired at `now_ms`
    ///
    /// # Errors
    ///
    /// Returns an error if the sweep fails
    async fn purge_expired(&self, now_ms: i64) -> AppResult<usize>;

    /// Verify the tier is reachable
    ///
    /// # Errors
    ///
    /// Returns an error if the tier is unavailable
    async fn health_check(&self) -> AppResult<()>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}
