// ABOUTME: Shared persistence plumbing used by every file and Redis store backend
// ABOUTME: Atomic JSON document files, Redis connection setup and wall-clock helpers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

/// Versioned JSON documents written with temp-file + backup + rename
pub mod file;
/// Redis connection management with startup retry
pub mod redis;

pub use file::{JsonDocumentFile, PersistedDocument};

use chrono::Utc;

/// Current wall-clock time in epoch milliseconds
#[must_use]
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Current wall-clock time in epoch seconds
#[must_use]
pub fn now_secs() -> i64 {
    Utc::now().timestamp()
}
