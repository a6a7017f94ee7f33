// ABOUTME: Main library entry point for Pierre credential and session persistence
// ABOUTME: Encrypted OAuth tokens, PKCE state, initial access tokens and MCP session metadata
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![deny(unsafe_code)]

//! # Pierre Auth Store
//!
//! The persistence layer behind Pierre's OAuth and MCP session handling. Every
//! store kind has one trait and interchangeable in-memory, file and Redis
//! backends, selected once at startup by [`factory::StoreFactory`].
//!
//! ## Guarantees
//!
//! - **Encrypted at rest**: token metadata, refresh index entries, initial access
//!   tokens and session metadata are sealed with AES-256-GCM
//! - **Hashed keys**: raw secrets never appear in storage keys
//! - **Exactly-once consumption**: PKCE state is redeemed with a single atomic
//!   read-and-delete, and initial access token usage ceilings hold under races
//! - **Topology independence**: the same semantics whether state lives in-process,
//!   in a local file, or in Redis shared by many instances
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use pierre_auth_store::errors::AppResult;
//! use pierre_auth_store::factory::StoreFactory;
//! use pierre_auth_store::pkce::PkceData;
//!
//! #[tokio::main]
//! async fn main() -> AppResult<()> {
//!     let stores = StoreFactory::from_env().await?;
//!
//!     stores
//!         .pkce
//!         .store_code_verifier("code-1", &PkceData::new("verifier", "state"), stores.pkce_ttl())
//!         .await?;
//!     let consumed = stores.pkce.get_and_delete_code_verifier("code-1").await?;
//!     assert!(consumed.is_some());
//!
//!     stores.dispose().await;
//!     Ok(())
//! }
//! ```

/// Error types and constants shared with the foundation crate
pub use pierre_store_core::{constants, errors};

/// Background cleanup tasks and their shutdown handles
pub mod cleanup;
/// Environment configuration
pub mod config;
/// Encryption service and key hashing
pub mod crypto;
/// Backend selection and wiring
pub mod factory;
/// Initial access token store
pub mod initial_access;
/// Structured logging setup
pub mod logging;
/// OAuth token store and refresh dispatch
pub mod oauth_tokens;
/// Shared file and Redis persistence helpers
pub mod persistence;
/// PKCE session store
pub mod pkce;
/// Tiered MCP session metadata store
pub mod sessions;
