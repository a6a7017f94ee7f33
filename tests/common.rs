// ABOUTME: Shared test utilities for store integration tests
// ABOUTME: Provides quiet logging, encryption services and fixture builders
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence
#![allow(
    dead_code,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::unwrap_used,
    clippy::expect_used
)]
//! Shared test utilities for `pierre_auth_store`

use pierre_auth_store::crypto::EncryptionService;
use pierre_auth_store::oauth_tokens::{StoredTokenInfo, UserInfo};
use pierre_auth_store::persistence::now_millis;
use pierre_auth_store::sessions::{McpSessionMetadata, SessionAuthInfo};
use std::sync::{Arc, Once};

static INIT_LOGGER: Once = Once::new();

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let log_level = match std::env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => tracing::Level::TRACE,
            Ok("DEBUG") => tracing::Level::DEBUG,
            Ok("INFO") => tracing::Level::INFO,
            _ => tracing::Level::WARN,
        };

        tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .init();
    });
}

/// Encryption service with a freshly generated key
pub fn test_encryption() -> Arc<EncryptionService> {
    init_test_logging();
    let key = EncryptionService::generate_key_base64();
    Arc::new(EncryptionService::from_base64_key(&key).expect("generated key is valid"))
}

/// Token metadata for `provider` expiring `ttl_ms` from now (negative for already expired)
pub fn token_info(
    access_token: &str,
    refresh_token: Option<&str>,
    provider: &str,
    ttl_ms: i64,
) -> StoredTokenInfo {
    StoredTokenInfo {
        access_token: access_token.to_owned(),
        refresh_token: refresh_token.map(str::to_owned),
        id_token: None,
        provider: provider.to_owned(),
        scopes: vec!["activity:read".to_owned()],
        expires_at: now_millis() + ttl_ms,
        user_info: UserInfo {
            sub: "athlete-42".to_owned(),
            email: Some("athlete@example.com".to_owned()),
            name: Some("Test Athlete".to_owned()),
            provider: provider.to_owned(),
        },
    }
}

/// Session metadata expiring `ttl_ms` from now (negative for already expired)
pub fn session(session_id: &str, ttl_ms: i64) -> McpSessionMetadata {
    let now = now_millis();
    McpSessionMetadata {
        session_id: session_id.to_owned(),
        auth_info: Some(SessionAuthInfo {
            client_id: "client-1".to_owned(),
            scopes: vec!["mcp:read".to_owned()],
            user_id: Some("user-1".to_owned()),
            expires_at: Some(now + ttl_ms),
        }),
        created_at: now,
        expires_at: now + ttl_ms,
        metadata: Some(serde_json::json!({ "transport": "streamable-http" })),
        events: None,
    }
}
