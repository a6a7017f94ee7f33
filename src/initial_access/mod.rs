// ABOUTME: Initial access tokens gating dynamic client registration
// ABOUTME: Shared lifecycle predicates so validation, listing and cleanup agree on every backend
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

/// File-backed initial access token store
pub mod file;
/// In-memory initial access token store
pub mod memory;
/// Redis initial access token store
pub mod redis;

pub use file::FileInitialAccessTokenStore;
pub use memory::InMemoryInitialAccessTokenStore;
pub use redis::RedisInitialAccessTokenStore;

use crate::constants::defaults::INITIAL_ACCESS_TOKEN_BYTES;
use crate::crypto::hash_key;
use crate::errors::AppResult;
use base64::{engine::general_purpose, Engine as _};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A bootstrap credential for client registration
///
/// Timestamps are epoch seconds; `expires_at == 0` means the token never expires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialAccessToken {
    /// Opaque identifier used by administrators
    pub id: String,
    /// Secret value presented by registering clients
    pub token: String,
    /// Free-form description
    pub description: String,
    /// Creation time
    pub created_at: i64,
    /// Expiry time, or 0 for never
    pub expires_at: i64,
    /// Successful validations so far
    pub usage_count: u64,
    /// Usage ceiling, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_uses: Option<u64>,
    /// Whether an administrator revoked the token
    #[serde(default)]
    pub revoked: bool,
    /// Time of the last successful validation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<i64>,
}

impl InitialAccessToken {
    /// Build a fresh token from creation options
    #[must_use]
    pub fn issue(options: &CreateTokenOptions, now_secs: i64) -> Self {
        let expires_at = options
            .expires_in_secs
            .map_or(0, |secs| now_secs.saturating_add(i64::try_from(secs).unwrap_or(i64::MAX)));

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            token: generate_token_value(),
            description: options.description.clone(),
            created_at: now_secs,
            expires_at,
            usage_count: 0,
            max_uses: options.max_uses,
            revoked: false,
            last_used_at: None,
        }
    }

    /// Whether the token has a finite expiry that has passed
    #[must_use]
    pub const fn is_expired_at(&self, now_secs: i64) -> bool {
        self.expires_at != 0 && now_secs >= self.expires_at
    }

    /// Whether the usage ceiling has been reached
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.max_uses.is_some_and(|max| self.usage_count >= max)
    }

    /// First reason the token cannot be used, checked as revoked, expired, then exhausted
    #[must_use]
    pub fn rejection_at(&self, now_secs: i64) -> Option<TokenRejection> {
        if self.revoked {
            Some(TokenRejection::Revoked)
        } else if self.is_expired_at(now_secs) {
            Some(TokenRejection::Expired)
        } else if self.is_exhausted() {
            Some(TokenRejection::UsageLimitExceeded)
        } else {
            None
        }
    }

    /// Whether `cleanup` may remove the token; the same test validation applies
    #[must_use]
    pub fn should_cleanup(&self, now_secs: i64) -> bool {
        self.rejection_at(now_secs).is_some()
    }

    /// Whether the token appears in a listing with `options`
    #[must_use]
    pub const fn is_listed(&self, options: &ListOptions, now_secs: i64) -> bool {
        (options.include_revoked || !self.revoked)
            && (options.include_expired || !self.is_expired_at(now_secs))
    }
}

/// Parameters for issuing a token
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTokenOptions {
    /// Free-form description
    pub description: String,
    /// Lifetime in seconds; `None` never expires
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in_secs: Option<u64>,
    /// Usage ceiling; `None` is unlimited
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_uses: Option<u64>,
}

/// Listing filters; both flags default to excluding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Include revoked tokens
    pub include_revoked: bool,
    /// Include expired tokens
    pub include_expired: bool,
}

/// Machine-readable reason a token was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenRejection {
    /// No token with that value exists
    #[serde(rename = "not found")]
    NotFound,
    /// The token was revoked
    #[serde(rename = "revoked")]
    Revoked,
    /// The token is past its expiry
    #[serde(rename = "expired")]
    Expired,
    /// The usage ceiling has been reached
    #[serde(rename = "usage limit exceeded")]
    UsageLimitExceeded,
}

impl TokenRejection {
    /// Reason string for audit logs
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not found",
            Self::Revoked => "revoked",
            Self::Expired => "expired",
            Self::UsageLimitExceeded => "usage limit exceeded",
        }
    }
}

impl fmt::Display for TokenRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of `validate_and_use_token`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Whether the token was accepted (and its usage recorded)
    pub valid: bool,
    /// The token as it stands after the attempt, when it exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<InitialAccessToken>,
    /// Why the token was refused
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<TokenRejection>,
}

impl ValidationResult {
    /// Accepted, with the updated token
    #[must_use]
    pub const fn accepted(token: InitialAccessToken) -> Self {
        Self {
            valid: true,
            token: Some(token),
            reason: None,
        }
    }

    /// Refused for `reason`
    #[must_use]
    pub const fn rejected(reason: TokenRejection, token: Option<InitialAccessToken>) -> Self {
        Self {
            valid: false,
            token,
            reason: Some(reason),
        }
    }
}

/// Random URL-safe token value
#[must_use]
pub fn generate_token_value() -> String {
    let mut bytes = [0u8; INITIAL_ACCESS_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Persistence contract for initial access tokens
#[async_trait::async_trait]
pub trait InitialAccessTokenStore: Send + Sync {
    /// Issue and persist a new token
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails
    async fn create_token(&self, options: &CreateTokenOptions) -> AppResult<InitialAccessToken>;

    /// Validate a presented value and, if usable, atomically record one use
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails; refusals are reported in the result
    async fn validate_and_use_token(&self, token: &str) -> AppResult<ValidationResult>;

    /// Look up by id without side effects
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails
    async fn get_token(&self, id: &str) -> AppResult<Option<InitialAccessToken>>;

    /// Look up by secret value without side effects
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails
    async fn get_token_by_value(&self, token: &str) -> AppResult<Option<InitialAccessToken>>;

    /// List tokens passing `options`, oldest first
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails
    async fn list_tokens(&self, options: &ListOptions) -> AppResult<Vec<InitialAccessToken>>;

    /// Revoke a token; `false` if the id does not exist
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails
    async fn revoke_token(&self, id: &str) -> AppResult<bool>;

    /// Delete a token; `false` if the id does not exist
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails
    async fn delete_token(&self, id: &str) -> AppResult<bool>;

    /// Remove revoked, expired and exhausted tokens, returning how many were removed
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails
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

/// Sort a listing oldest first, with the id as a tiebreaker
pub(crate) fn sort_listing(tokens: &mut [InitialAccessToken]) {
    tokens.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
}

/// Token table held by the in-process backends
#[derive(Debug, Clone, Default)]
pub(crate) struct TokenLedger {
    records: HashMap<String, InitialAccessToken>,
    /// Hashed token value -> id
    by_value: HashMap<String, String>,
}

impl TokenLedger {
    pub(crate) fn from_records(records: impl IntoIterator<Item = InitialAccessToken>) -> Self {
        let mut ledger = Self::default();
        for record in records {
            ledger.insert(record);
        }
        ledger
    }

    pub(crate) fn records(&self) -> impl Iterator<Item = &InitialAccessToken> {
        self.records.values()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn insert(&mut self, record: InitialAccessToken) {
        self.by_value.insert(hash_key(&record.token), record.id.clone());
        self.records.insert(record.id.clone(), record);
    }

    pub(crate) fn get(&self, id: &str) -> Option<&InitialAccessToken> {
        self.records.get(id)
    }

    pub(crate) fn get_by_value(&self, token: &str) -> Option<&InitialAccessToken> {
        self.by_value
            .get(&hash_key(token))
            .and_then(|id| self.records.get(id))
    }

    pub(crate) fn validate_and_use(&mut self, token: &str, now_secs: i64) -> ValidationResult {
        let Some(record) = self
            .by_value
            .get(&hash_key(token))
            .and_then(|id| self.records.get_mut(id))
        else {
            return ValidationResult::rejected(TokenRejection::NotFound, None);
        };

        if let Some(reason) = record.rejection_at(now_secs) {
            return ValidationResult::rejected(reason, Some(record.clone()));
        }

        record.usage_count += 1;
        record.last_used_at = Some(now_secs);
        ValidationResult::accepted(record.clone())
    }

    pub(crate) fn list(&self, options: &ListOptions, now_secs: i64) -> Vec<InitialAccessToken> {
        let mut listed: Vec<InitialAccessToken> = self
            .records
            .values()
            .filter(|record| record.is_listed(options, now_secs))
            .cloned()
            .collect();
        sort_listing(&mut listed);
        listed
    }

    pub(crate) fn revoke(&mut self, id: &str) -> bool {
        self.records.get_mut(id).is_some_and(|record| {
            record.revoked = true;
            true
        })
    }

    pub(crate) fn remove(&mut self, id: &str) -> bool {
        let Some(record) = self.records.remove(id) else {
            return false;
        };
        self.by_value.remove(&hash_key(&record.token));
        true
    }

    pub(crate) fn purge(&mut self, now_secs: i64) -> usize {
        let doomed: Vec<String> = self
            .records
            .values()
            .filter(|record| record.should_cleanup(now_secs))
            .map(|record| record.id.clone())
            .collect();
        for id in &doomed {
            self.remove(id);
        }
        doomed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(expires_at: i64, max_uses: Option<u64>, usage_count: u64, revoked: bool) -> InitialAccessToken {
        InitialAccessToken {
            id: "id".into(),
            token: "secret".into(),
            description: String::new(),
            created_at: 0,
            expires_at,
            usage_count,
            max_uses,
            revoked,
            last_used_at: None,
        }
    }

    #[test]
    fn test_rejection_order() {
        assert_eq!(
            token(10, Some(1), 1, true).rejection_at(100),
            Some(TokenRejection::Revoked)
        );
        assert_eq!(
            token(10, Some(1), 1, false).rejection_at(100),
            Some(TokenRejection::Expired)
        );
        assert_eq!(
            token(0, Some(1), 1, false).rejection_at(100),
            Some(TokenRejection::UsageLimitExceeded)
        );
        assert_eq!(token(0, None, 50, false).rejection_at(100), None);
    }

    #[test]
    fn test_cleanup_agrees_with_validation() {
        let cases = [
            token(10, None, 0, false),
            token(0, Some(2), 2, false),
            token(0, None, 0, true),
            token(0, None, 0, false),
            token(1_000, Some(3), 1, false),
        ];
        for case in &cases {
            assert_eq!(case.should_cleanup(100), case.rejection_at(100).is_some());
        }
    }

    #[test]
    fn test_listing_filter() {
        let defaults = ListOptions::default();
        assert!(token(0, None, 0, false).is_listed(&defaults, 100));
        assert!(!token(0, None, 0, true).is_listed(&defaults, 100));
        assert!(!token(10, None, 0, false).is_listed(&defaults, 100));

        let everything = ListOptions {
            include_revoked: true,
            include_expired: true,
        };
        assert!(token(10, None, 0, true).is_listed(&everything, 100));
    }

    #[test]
    fn test_rejection_strings() {
        assert_eq!(TokenRejection::UsageLimitExceeded.to_string(), "usage limit exceeded");
        assert_eq!(
            serde_json::to_string(&TokenRejection::NotFound).unwrap(),
            "\"not found\""
        );
    }

    #[test]
    fn test_generated_values_are_unique_and_url_safe() {
        let a = generate_token_value();
        let b = generate_token_value();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
