// ABOUTME: Environment configuration for store backend selection and connection tuning
// ABOUTME: Validates the master key and backend URL up front so misconfiguration is fatal at startup
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Environment-based configuration for the credential and session stores

use crate::constants::{defaults, env_vars, redis};
use crate::crypto::EncryptionService;
use crate::errors::{AppError, AppResult};
use ::redis::IntoConnectionInfo;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Storage backend selected for every store kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    /// In-process maps; state is lost on restart
    #[default]
    Memory,
    /// JSON documents in a local directory
    File,
    /// Shared Redis instance for multi-instance deployments
    Redis,
}

impl StoreBackend {
    /// Lowercase name used in configuration and logs
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::File => "file",
            Self::Redis => "redis",
        }
    }
}

impl FromStr for StoreBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "" => Ok(Self::Memory),
            "file" => Ok(Self::File),
            "redis" => Ok(Self::Redis),
            other => Err(AppError::config_invalid(format!(
                "Unknown {} value '{other}' (expected memory, file or redis)",
                env_vars::STORE_BACKEND
            ))),
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Redis connection and retry configuration
#[derive(Debug, Clone)]
pub struct RedisConnectionConfig {
    /// Connection timeout in seconds
    pub connection_timeout_secs: u64,
    /// Response/command timeout in seconds
    pub response_timeout_secs: u64,
    /// Number of reconnection retries after connection drop
    pub reconnection_retries: usize,
    /// Exponential backoff base for retry delays
    pub retry_exponent_base: u64,
    /// Maximum retry delay in milliseconds
    pub max_retry_delay_ms: u64,
    /// Number of retries for initial connection at startup
    pub initial_connection_retries: u32,
    /// Initial retry delay in milliseconds (doubles with exponential backoff)
    pub initial_retry_delay_ms: u64,
}

impl Default for RedisConnectionConfig {
    fn default() -> Self {
        Self {
            connection_timeout_secs: redis::CONNECTION_TIMEOUT_SECS,
            response_timeout_secs: redis::RESPONSE_TIMEOUT_SECS,
            reconnection_retries: redis::RECONNECTION_RETRIES,
            retry_exponent_base: redis::RETRY_EXPONENT_BASE,
            max_retry_delay_ms: redis::MAX_RETRY_DELAY_MS,
            initial_connection_retries: redis::INITIAL_CONNECTION_RETRIES,
            initial_retry_delay_ms: redis::INITIAL_RETRY_DELAY_MS,
        }
    }
}

impl RedisConnectionConfig {
    /// Load Redis connection configuration from environment
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            connection_timeout_secs: env_or("REDIS_CONNECTION_TIMEOUT_SECS", redis::CONNECTION_TIMEOUT_SECS),
            response_timeout_secs: env_or("REDIS_RESPONSE_TIMEOUT_SECS", redis::RESPONSE_TIMEOUT_SECS),
            reconnection_retries: env_or("REDIS_RECONNECTION_RETRIES", redis::RECONNECTION_RETRIES),
            retry_exponent_base: env_or("REDIS_RETRY_EXPONENT_BASE", redis::RETRY_EXPONENT_BASE),
            max_retry_delay_ms: env_or("REDIS_MAX_RETRY_DELAY_MS", redis::MAX_RETRY_DELAY_MS),
            initial_connection_retries: env_or(
                "REDIS_INITIAL_CONNECTION_RETRIES",
                redis::INITIAL_CONNECTION_RETRIES,
            ),
            initial_retry_delay_ms: env_or(
                "REDIS_INITIAL_RETRY_DELAY_MS",
                redis::INITIAL_RETRY_DELAY_MS,
            ),
        }
    }
}

/// Complete store configuration, validated at load time
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Encryption service built from the master key
    pub encryption: Arc<EncryptionService>,
    /// Backend used by every store kind
    pub backend: StoreBackend,
    /// Directory holding the file-backed documents
    pub store_dir: PathBuf,
    /// Redis connection URL (required for the Redis backend)
    pub redis_url: Option<String>,
    /// Redis connection and retry configuration
    pub redis_connection: RedisConnectionConfig,
    /// Default PKCE verifier lifetime
    pub pkce_ttl: Duration,
    /// Session reconciliation interval
    pub session_cleanup_interval: Duration,
    /// Capacity of the primary session tier
    pub session_cache_max_entries: usize,
    /// Cleanup interval for token and initial-access stores without native expiry
    pub store_cleanup_interval: Duration,
    /// Start background timers (disabled in tests to keep them deterministic)
    pub enable_background_tasks: bool,
}

impl StoreConfig {
    /// Load and validate the store configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns a fatal configuration error if the master key is missing or not 32 bytes,
    /// the backend name is unknown, or the Redis backend lacks a valid URL
    pub fn from_env() -> AppResult<Self> {
        let encryption = Arc::new(EncryptionService::from_env()?);

        let backend = env::var(env_vars::STORE_BACKEND)
            .map_or(Ok(StoreBackend::default()), |value| value.parse())?;

        let redis_url = env::var(env_vars::REDIS_URL).ok();

        let config = Self {
            encryption,
            backend,
            store_dir: env::var(env_vars::STORE_DIR)
                .map_or_else(|_| PathBuf::from(defaults::STORE_DIR), PathBuf::from),
            redis_url,
            redis_connection: RedisConnectionConfig::from_env(),
            pkce_ttl: Duration::from_secs(env_or(env_vars::PKCE_TTL_SECS, defaults::PKCE_TTL_SECS)),
            session_cleanup_interval: Duration::from_secs(env_or(
                env_vars::SESSION_CLEANUP_INTERVAL_SECS,
                defaults::SESSION_CLEANUP_INTERVAL_SECS,
            )),
            session_cache_max_entries: env_or(
                env_vars::SESSION_CACHE_MAX_ENTRIES,
                defaults::SESSION_CACHE_MAX_ENTRIES,
            ),
            store_cleanup_interval: Duration::from_secs(env_or(
                env_vars::STORE_CLEANUP_INTERVAL_SECS,
                defaults::STORE_CLEANUP_INTERVAL_SECS,
            )),
            enable_background_tasks: true,
        };

        config.validate()?;
        Ok(config)
    }

    /// In-memory configuration with a random master key and no background timers
    #[must_use]
    pub fn for_testing(encryption: Arc<EncryptionService>) -> Self {
        Self {
            encryption,
            backend: StoreBackend::Memory,
            store_dir: PathBuf::from(defaults::STORE_DIR),
            redis_url: None,
            redis_connection: RedisConnectionConfig::default(),
            pkce_ttl: Duration::from_secs(defaults::PKCE_TTL_SECS),
            session_cleanup_interval: Duration::from_secs(defaults::SESSION_CLEANUP_INTERVAL_SECS),
            session_cache_max_entries: defaults::SESSION_CACHE_MAX_ENTRIES,
            store_cleanup_interval: Duration::from_secs(defaults::STORE_CLEANUP_INTERVAL_SECS),
            enable_background_tasks: false,
        }
    }

    /// Check cross-field constraints
    ///
    /// # Errors
    ///
    /// Returns `ConfigMissing` when the Redis backend has no URL and `ConfigInvalid`
    /// when the URL cannot be parsed or a capacity, TTL or interval is zero
    pub fn validate(&self) -> AppResult<()> {
        if self.backend == StoreBackend::Redis {
            let url = self.redis_url.as_deref().ok_or_else(|| {
                AppError::config_missing(format!(
                    "{} is required when {}=redis",
                    env_vars::REDIS_URL,
                    env_vars::STORE_BACKEND
                ))
            })?;
            url.into_connection_info()
                .map_err(|e| AppError::config_invalid(format!("Invalid Redis URL: {e}")))?;
        }

        if self.session_cache_max_entries == 0 {
            return Err(AppError::config_invalid(format!(
                "{} must be greater than zero",
                env_vars::SESSION_CACHE_MAX_ENTRIES
            )));
        }

        for (name, value) in [
            (env_vars::PKCE_TTL_SECS, self.pkce_ttl),
            (env_vars::SESSION_CLEANUP_INTERVAL_SECS, self.session_cleanup_interval),
            (env_vars::STORE_CLEANUP_INTERVAL_SECS, self.store_cleanup_interval),
        ] {
            if value.is_zero() {
                return Err(AppError::config_invalid(format!(
                    "{name} must be greater than zero"
                )));
            }
        }

        Ok(())
    }
}

/// Read and parse an environment variable, falling back to `default` when unset or unparsable
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
