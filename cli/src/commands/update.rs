// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Database Update Command
//!
//! Implements `cloudledger update`, which applies the core crate's embedded
//! migrations so the PostgreSQL schema matches the binary.
//!
//! # Usage
//!
//! ```bash
//! # Apply all pending migrations
//! cloudledger update
//!
//! # Preview migrations without applying
//! cloudledger update --dry-run
//! ```
//!
//! # Environment
//!
//! The database URL comes from `spec.storage.database_url` or
//! `CLOUDLEDGER_DATABASE_URL`.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use sqlx::postgres::PgPoolOptions;
use std::path::PathBuf;
use tracing::{debug, info};

use cloudledger_core::domain::catalog_config::CatalogConfigManifest;
use cloudledger_core::infrastructure::db::MIGRATOR;

#[derive(Args)]
pub struct UpdateCommand {
    /// Perform a dry run without applying changes
    #[arg(long)]
    dry_run: bool,
}

pub async fn execute(cmd: UpdateCommand, config_path: Option<PathBuf>) -> Result<()> {
    println!("{}", "cloudledger update".bold().green());

    let config = CatalogConfigManifest::load_or_default(config_path).context("Failed to load configuration")?;
    let database_url = config
        .spec
        .storage
        .database_url
        .context("No database URL configured. Set spec.storage.database_url or CLOUDLEDGER_DATABASE_URL.")?;

    println!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&database_url)
        .await
        .context("Failed to connect to database")?;

    let applied_count = match sqlx::query("SELECT version FROM _sqlx_migrations WHERE success")
        .fetch_all(&pool)
        .await
    {
        Ok(rows) => rows.len(),
        Err(err) if is_undefined_table(&err) => {
            debug!("Migration table not found; treating database as empty");
            0
        }
        Err(err) => return Err(err).context("Failed to read migration status"),
    };

    let total_migrations = MIGRATOR.iter().count();
    println!(
        "Migration status: {} applied, {} total available.",
        applied_count, total_migrations
    );

    if applied_count >= total_migrations {
        println!("{}", "✓ Database is up to date.".green());
        return Ok(());
    }

    if cmd.dry_run {
        println!("Pending migrations found (Dry Run):");
        for migration in MIGRATOR.iter().skip(applied_count) {
            println!(" - {} {}", migration.version, migration.description);
        }
        println!("Skipping application due to --dry-run");
        return Ok(());
    }

    println!("Applying pending migrations...");
    MIGRATOR.run(&pool).await.context("Failed to apply migrations")?;
    info!(applied = total_migrations - applied_count, "Migrations applied");
    println!("{}", "✓ Database updated successfully.".green());

    Ok(())
}

/// SQLSTATE 42P01: the migration table does not exist before the first run.
fn is_undefined_table(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("42P01"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_missing_table_counts_as_empty() {
        assert!(!is_undefined_table(&sqlx::Error::RowNotFound));
        assert!(!is_undefined_table(&sqlx::Error::PoolTimedOut));
        assert!(!is_undefined_table(&sqlx::Error::Protocol("connection reset".into())));
    }
}
