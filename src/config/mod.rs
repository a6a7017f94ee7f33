// ABOUTME: Configuration module for store backend selection and tuning
// ABOUTME: Environment-only configuration, validated once at process startup
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

/// Environment variable parsing and validation
pub mod environment;

pub use environment::{RedisConnectionConfig, StoreBackend, StoreConfig};
