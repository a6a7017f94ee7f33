// ABOUTME: Core types and constants for the Pierre credential and session stores
// ABOUTME: Foundation crate with the error taxonomy and shared store constants
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![deny(unsafe_code)]

//! # Pierre Store Core
//!
//! Foundation crate for the credential and session persistence layer. It holds
//! the pieces every backend agrees on and changes rarely:
//!
//! - **errors**: `AppError`, `ErrorCode` and the `AppResult` alias
//! - **constants**: key namespaces, default lifetimes and environment variable names

/// Unified error handling with machine-readable error codes
pub mod errors;

/// Store constants organized by concern
pub mod constants;
