// ABOUTME: Redis connection setup shared by every Redis-backed store
// ABOUTME: Builds a ConnectionManager with timeouts, reconnection and startup retry with backoff
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use crate::config::RedisConnectionConfig;
use crate::constants::defaults::MIN_REDIS_TTL_SECS;
use crate::errors::{AppError, AppResult};
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use std::time::Duration;
use tracing::{info, warn};

/// Open a managed Redis connection, retrying the initial connect with exponential backoff
///
/// # Errors
///
/// Returns `ConfigInvalid` if the URL cannot be parsed and `StorageError` if every
/// connection attempt fails
pub async fn connect(
    redis_url: &str,
    conn_config: &RedisConnectionConfig,
) -> AppResult<ConnectionManager> {
    let client = redis::Client::open(redis_url)
        .map_err(|e| AppError::config_invalid(format!("Invalid Redis URL: {e}")))?;

    info!(
        "Connecting to Redis (timeout={}s, response_timeout={}s, retries={})",
        conn_config.connection_timeout_secs,
        conn_config.response_timeout_secs,
        conn_config.initial_connection_retries
    );

    let manager_config = ConnectionManagerConfig::new()
        .set_connection_timeout(Duration::from_secs(conn_config.connection_timeout_secs))
        .set_response_timeout(Duration::from_secs(conn_config.response_timeout_secs))
        .set_number_of_retries(conn_config.reconnection_retries)
        .set_exponent_base(conn_config.retry_exponent_base)
        .set_max_delay(conn_config.max_retry_delay_ms);

    let max_retries = conn_config.initial_connection_retries;
    let max_delay_ms = conn_config.max_retry_delay_ms;
    let mut delay_ms = conn_config.initial_retry_delay_ms;
    let mut last_error = None;

    for attempt in 0..=max_retries {
        match ConnectionManager::new_with_config(client.clone(), manager_config.clone()).await {
            Ok(manager) => {
                if attempt > 0 {
                    info!("Redis connection established after {} retries", attempt);
                }
                return Ok(manager);
            }
            Err(e) => {
                if attempt < max_retries {
                    warn!(
                        "Redis connection attempt {}/{} failed, retrying in {}ms: {}",
                        attempt + 1,
                        max_retries + 1,
                        delay_ms,
                        e
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    delay_ms = (delay_ms * 2).min(max_delay_ms);
                }
                last_error = Some(e);
            }
        }
    }

    Err(AppError::storage(format!(
        "Failed to connect to Redis after {} attempts: {}",
        max_retries + 1,
        last_error.map_or_else(|| "unknown error".to_owned(), |e| e.to_string())
    )))
}

/// Issue `PING` and expect `PONG`
///
/// # Errors
///
/// Returns `StorageError` if Redis is unreachable or answers unexpectedly
pub async fn ping(manager: &ConnectionManager) -> AppResult<()> {
    let mut conn = manager.clone();
    let reply: String = redis::cmd("PING").query_async(&mut conn).await?;
    if reply == "PONG" {
        Ok(())
    } else {
        Err(AppError::storage(format!("Unexpected PING reply: {reply}")))
    }
}

/// Seconds until `expires_at_ms`, rounded up and never below the minimum TTL
#[must_use]
pub fn ttl_secs_until(expires_at_ms: i64, now_ms: i64) -> u64 {
    let remaining_ms = expires_at_ms.saturating_sub(now_ms);
    if remaining_ms <= 0 {
        return MIN_REDIS_TTL_SECS;
    }
    let secs = (remaining_ms as u64).div_ceil(1000);
    secs.max(MIN_REDIS_TTL_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_rounds_up() {
        assert_eq!(ttl_secs_until(10_001, 0), 11);
        assert_eq!(ttl_secs_until(10_000, 0), 10);
    }

    #[test]
    fn test_ttl_floor_for_expired_records() {
        assert_eq!(ttl_secs_until(0, 5_000), MIN_REDIS_TTL_SECS);
        assert_eq!(ttl_secs_until(5_000, 5_000), MIN_REDIS_TTL_SECS);
    }
}
