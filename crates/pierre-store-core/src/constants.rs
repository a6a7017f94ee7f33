// ABOUTME: Store constants for key namespaces, default lifetimes and environment variable names
// ABOUTME: Shared by the memory, file and Redis backends so every backend agrees on defaults
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

/// Distributed-store key namespaces. Every suffix is a `hash_key` digest or an opaque id.
pub mod keys {
    /// OAuth token primary records
    pub const OAUTH_TOKEN_PREFIX: &str = "pierre:oauth:token:";

    /// Refresh-token index entries
    pub const OAUTH_REFRESH_PREFIX: &str = "pierre:oauth:refresh:";

    /// PKCE code verifier entries
    pub const PKCE_PREFIX: &str = "pierre:pkce:";

    /// MCP session metadata
    pub const SESSION_PREFIX: &str = "pierre:session:";

    /// Initial access token records keyed by id
    pub const IAT_RECORD_PREFIX: &str = "pierre:iat:record:";

    /// Initial access token lookup (hashed token value -> id)
    pub const IAT_LOOKUP_PREFIX: &str = "pierre:iat:lookup:";

    /// Initial access token usage counters
    pub const IAT_USAGE_PREFIX: &str = "pierre:iat:usage:";

    /// Initial access token last-used timestamps
    pub const IAT_LAST_USED_PREFIX: &str = "pierre:iat:last_used:";

    /// Set of all initial access token ids
    pub const IAT_INDEX: &str = "pierre:iat:index";
}

/// Default lifetimes and intervals
pub mod defaults {
    /// PKCE verifier lifetime (10 minutes)
    pub const PKCE_TTL_SECS: u64 = 600;

    /// Session reconciliation interval (5 minutes)
    pub const SESSION_CLEANUP_INTERVAL_SECS: u64 = 300;

    /// Token/initial-access cleanup interval for non-TTL backends (5 minutes)
    pub const STORE_CLEANUP_INTERVAL_SECS: u64 = 300;

    /// Primary session tier capacity
    pub const SESSION_CACHE_MAX_ENTRIES: usize = 10_000;

    /// Minimum Redis TTL for records that are already expired at write time
    pub const MIN_REDIS_TTL_SECS: u64 = 1;

    /// Directory for file-backed stores
    pub const STORE_DIR: &str = "./data";

    /// Persisted document format version
    pub const FILE_FORMAT_VERSION: u32 = 1;

    /// Random bytes in a generated initial access token value
    pub const INITIAL_ACCESS_TOKEN_BYTES: usize = 32;
}

/// Redis connection defaults
pub mod redis {
    /// Connection timeout in seconds
    pub const CONNECTION_TIMEOUT_SECS: u64 = 5;

    /// Response timeout in seconds
    pub const RESPONSE_TIMEOUT_SECS: u64 = 3;

    /// Reconnection retries after a dropped connection
    pub const RECONNECTION_RETRIES: usize = 6;

    /// Exponential backoff base
    pub const RETRY_EXPONENT_BASE: u64 = 2;

    /// Maximum delay between retries in milliseconds
    pub const MAX_RETRY_DELAY_MS: u64 = 5_000;

    /// Retries for the initial connection at startup
    pub const INITIAL_CONNECTION_RETRIES: u32 = 3;

    /// First retry delay in milliseconds (doubles each attempt)
    pub const INITIAL_RETRY_DELAY_MS: u64 = 500;
}

/// File names used by file-backed stores inside the store directory
pub mod files {
    /// OAuth token document
    pub const OAUTH_TOKENS: &str = "oauth-tokens.json";

    /// Initial access token document
    pub const INITIAL_ACCESS_TOKENS: &str = "initial-access-tokens.json";

    /// Session metadata document
    pub const SESSIONS: &str = "sessions.json";
}

/// Environment variable names
pub mod env_vars {
    /// Base64-encoded 32-byte master encryption key
    pub const MASTER_ENCRYPTION_KEY: &str = "PIERRE_MASTER_ENCRYPTION_KEY";

    /// Backend selector (memory, file, redis)
    pub const STORE_BACKEND: &str = "PIERRE_STORE_BACKEND";

    /// Directory for file-backed stores
    pub const STORE_DIR: &str = "PIERRE_STORE_DIR";

    /// Redis connection URL
    pub const REDIS_URL: &str = "REDIS_URL";

    /// PKCE verifier lifetime override
    pub const PKCE_TTL_SECS: &str = "PKCE_TTL_SECS";

    /// Session reconciliation interval override
    pub const SESSION_CLEANUP_INTERVAL_SECS: &str = "SESSION_CLEANUP_INTERVAL_SECS";

    /// Primary session tier capacity override
    pub const SESSION_CACHE_MAX_ENTRIES: &str = "SESSION_CACHE_MAX_ENTRIES";

    /// Cleanup interval override for non-TTL backends
    pub const STORE_CLEANUP_INTERVAL_SECS: &str = "STORE_CLEANUP_INTERVAL_SECS";
}
