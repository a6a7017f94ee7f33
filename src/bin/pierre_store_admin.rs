// ABOUTME: Pierre store admin - operator CLI for master keys and initial access tokens
// ABOUTME: Runs against whichever backend PIERRE_STORE_BACKEND selects
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence
//!
//! Usage:
//! ```bash
//! # Generate a fresh master encryption key
//! pierre-store-admin generate-key
//!
//! # Issue a registration token valid for 7 days and 10 registrations
//! pierre-store-admin iat create --description "partner onboarding" --expires-days 7 --max-uses 10
//!
//! # List tokens, including revoked and expired ones
//! pierre-store-admin iat list --include-revoked --include-expired
//!
//! # Revoke, delete, or sweep tokens
//! pierre-store-admin iat revoke 4f1c...
//! pierre-store-admin iat delete 4f1c...
//! pierre-store-admin iat cleanup
//!
//! # Check every backend
//! pierre-store-admin health
//! ```

use anyhow::{bail, Context, Result};
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use pierre_auth_store::config::StoreConfig;
use pierre_auth_store::crypto::EncryptionService;
use pierre_auth_store::factory::{StoreFactory, Stores};
use pierre_auth_store::initial_access::{CreateTokenOptions, InitialAccessToken, ListOptions};
use pierre_auth_store::logging::LoggingConfig;
use tracing::info;

const SECONDS_PER_DAY: u64 = 86_400;

#[derive(Parser)]
#[command(
    name = "pierre-store-admin",
    about = "Pierre credential store administration",
    long_about = "Operator tool for generating master keys and managing initial access tokens in the configured store backend."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
}

#[non_exhaustive]
#[derive(Subcommand)]
enum Command {
    /// Print a new base64 master encryption key
    GenerateKey,

    /// Initial access token management
    Iat {
        #[command(subcommand)]
        action: IatCommand,
    },

    /// Check connectivity of every store backend
    Health,
}

#[non_exhaustive]
#[derive(Subcommand)]
enum IatCommand {
    /// Issue a new initial access token
    Create {
        /// What the token is for
        #[arg(long)]
        description: String,

        /// Lifetime in days (omit for a token that never expires)
        #[arg(long)]
        expires_days: Option<u64>,

        /// Maximum number of registrations (omit for unlimited)
        #[arg(long)]
        max_uses: Option<u64>,
    },

    /// List initial access tokens
    List {
        /// Include revoked tokens
        #[arg(long)]
        include_revoked: bool,

        /// Include expired tokens
        #[arg(long)]
        include_expired: bool,
    },

    /// Revoke a token by id
    Revoke {
        /// Token ID to revoke
        token_id: String,
    },

    /// Delete a token by id
    Delete {
        /// Token ID to delete
        token_id: String,
    },

    /// Remove revoked, expired and exhausted tokens
    Cleanup,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut logging = LoggingConfig::from_env();
    if cli.verbose {
        "debug".clone_into(&mut logging.level);
    }
    logging.init()?;

    match cli.command {
        Command::GenerateKey => {
            println!("{}", EncryptionService::generate_key_base64());
            Ok(())
        }
        Command::Iat { action } => {
            let stores = open_stores().await?;
            let outcome = run_iat(&stores, action).await;
            stores.dispose().await;
            outcome
        }
        Command::Health => {
            let stores = open_stores().await?;
            let outcome = stores.health_check().await;
            stores.dispose().await;
            outcome.context("Store health check failed")?;
            println!("All stores healthy ({} backend)", stores.backend);
            Ok(())
        }
    }
}

async fn open_stores() -> Result<Stores> {
    let mut config = StoreConfig::from_env().context("Invalid store configuration")?;
    // One-shot commands never run long enough to need the sweepers
    config.enable_background_tasks = false;
    info!(backend = %config.backend, "Opening stores");
    Ok(StoreFactory::build(&config).await?)
}

async fn run_iat(stores: &Stores, action: IatCommand) -> Result<()> {
    let store = &stores.initial_access;

    match action {
        IatCommand::Create {
            description,
            expires_days,
            max_uses,
        } => {
            if max_uses == Some(0) {
                bail!("--max-uses must be at least 1");
            }
            let options = CreateTokenOptions {
                description,
                expires_in_secs: expires_days.map(|days| days.saturating_mul(SECONDS_PER_DAY)),
                max_uses,
            };
            let token = store.create_token(&options).await?;
            println!("Created initial access token {}", token.id);
            println!("Token (shown once): {}", token.token);
            println!("Expires: {}", format_timestamp(token.expires_at));
        }
        IatCommand::List {
            include_revoked,
            include_expired,
        } => {
            let tokens = store
                .list_tokens(&ListOptions {
                    include_revoked,
                    include_expired,
                })
                .await?;
            if tokens.is_empty() {
                println!("No initial access tokens");
            }
            for token in &tokens {
                print_token(token);
            }
        }
        IatCommand::Revoke { token_id } => {
            if store.revoke_token(&token_id).await? {
                println!("Revoked {token_id}");
            } else {
                bail!("No initial access token with id {token_id}");
            }
        }
        IatCommand::Delete { token_id } => {
            if store.delete_token(&token_id).await? {
                println!("Deleted {token_id}");
            } else {
                bail!("No initial access token with id {token_id}");
            }
        }
        IatCommand::Cleanup => {
            let removed = store.cleanup().await?;
            println!("Removed {removed} unusable token(s)");
        }
    }

    Ok(())
}

fn print_token(token: &InitialAccessToken) {
    let uses = token
        .max_uses
        .map_or_else(|| format!("{}", token.usage_count), |max| format!("{}/{max}", token.usage_count));
    println!(
        "{}  uses={}  expires={}  revoked={}  {}",
        token.id,
        uses,
        format_timestamp(token.expires_at),
        token.revoked,
        token.description
    );
}

fn format_timestamp(epoch_secs: i64) -> String {
    if epoch_secs == 0 {
        return "never".to_owned();
    }
    Utc.timestamp_opt(epoch_secs, 0)
        .single()
        .map_or_else(|| epoch_secs.to_string(), |ts| ts.to_rfc3339())
}
