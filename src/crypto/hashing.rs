// ABOUTME: One-way key hashing used to build storage identifiers from secret token values
// ABOUTME: Keeps raw secrets out of Redis keys, file documents and log lines
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use sha2::{Digest, Sha256};

/// SHA-256 of the value, lowercase hex (64 characters)
#[must_use]
pub fn hash_key(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

/// Namespaced storage key: `prefix` followed by [`hash_key`] of the value
#[must_use]
pub fn storage_key(prefix: &str, value: &str) -> String {
    format!("{prefix}{}", hash_key(value))
}
