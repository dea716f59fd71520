// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Audit ledger commands
//!
//! Commands: history, verify

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;
use tracing::error;

use cloudledger_core::application::{ChainScope, LifecycleError};
use cloudledger_core::domain::resource::ResourceId;

use super::load_services;

#[derive(Subcommand)]
pub enum AuditCommand {
    /// Show the change records of one resource
    History {
        #[arg(value_name = "RESOURCE_ID")]
        id: String,

        /// Print full records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Recompute and check hash chains
    Verify {
        /// Only this resource's chain (default: every chain)
        #[arg(long, value_name = "RESOURCE_ID")]
        resource: Option<String>,
    },
}

pub async fn handle_command(command: AuditCommand, config_path: Option<PathBuf>) -> Result<()> {
    let services = load_services(config_path).await?;
    let audit = services.audit;

    match command {
        AuditCommand::History { id, json } => {
            let records = audit.history(&ResourceId::new(id)).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
                return Ok(());
            }

            println!("{:<5} {:<8} {:<28} {:<16} {}", "SEQ", "OP", "TIMESTAMP", "ACTOR", "BLOCK HASH");
            for record in records {
                println!(
                    "{:<5} {:<8} {:<28} {:<16} {}",
                    record.sequence,
                    record.operation.as_str(),
                    record.timestamp.to_rfc3339(),
                    record.actor,
                    record.block_hash.to_hex().dimmed()
                );
            }
        }
        AuditCommand::Verify { resource } => {
            let scope = match resource {
                Some(id) => ChainScope::Resource(ResourceId::new(id)),
                None => ChainScope::Global,
            };

            match audit.verify_chain(scope).await {
                Ok(report) => println!(
                    "{}",
                    format!(
                        "✓ {} chain(s) intact, {} record(s) verified",
                        report.chains, report.records
                    )
                    .green()
                ),
                Err(LifecycleError::ChainBroken(err)) => {
                    error!(error = %err, "Audit chain verification failed");
                    eprintln!("{}", format!("✗ {}", err).red());
                    std::process::exit(2);
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    Ok(())
}
