// ABOUTME: Cryptography module providing authenticated encryption and key hashing
// ABOUTME: Centralizes every cryptographic operation used by the store backends
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Cryptographic utilities for the credential stores

/// AES-256-GCM encryption keyed by the master key
pub mod encryption;
/// One-way hashing for storage identifiers
pub mod hashing;

pub use encryption::EncryptionService;
pub use hashing::{hash_key, storage_key};
