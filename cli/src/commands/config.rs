// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use cloudledger_core::domain::catalog_config::{CatalogConfigManifest, StorageBackendKind};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path
        #[arg(short, long, default_value = "./cloudledger-config.yaml")]
        output: PathBuf,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths),
        ConfigCommand::Validate { file } => validate(file.or(config_override)),
        ConfigCommand::Generate { output } => generate(output),
    }
}

fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = CatalogConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        match &config_override {
            Some(path) => println!("  1. --config flag: {}", path.display()),
            None => println!("  1. --config flag: {}", "(not set)".dimmed()),
        }
        for (i, path) in CatalogConfigManifest::search_paths().iter().enumerate() {
            let marker = if path.exists() { "found".green() } else { "missing".dimmed() };
            println!("  {}. {} ({})", i + 2, path.display(), marker);
        }
        println!();
    }

    let spec = &config.spec;
    println!("{}", "Current configuration:".bold());
    println!("  Name: {}", config.metadata.name);
    println!();

    println!("{}", "Storage:".bold());
    println!("  Backend: {:?}", spec.storage.backend);
    if spec.storage.backend == StorageBackendKind::Postgres {
        println!(
            "  Database: {}",
            spec.storage.database_url.as_deref().map(redact_url).unwrap_or_else(|| "(not set)".to_string())
        );
        println!("  Max connections: {}", spec.storage.max_connections);
    }
    println!("  Deletion: {:?}", spec.storage.deletion);
    println!();

    println!("{}", "Embedding:".bold());
    println!("  Provider: {:?}", spec.embedding.provider);
    if let Some(endpoint) = &spec.embedding.endpoint {
        println!("  Endpoint: {}", endpoint);
    }
    if let Some(model) = &spec.embedding.model {
        println!("  Model: {}", model);
    }
    println!("  Dimensions: {}", spec.embedding.dimensions);
    println!("  On failure: {:?}", spec.embedding.on_failure);
    println!();

    println!("{}", "Search:".bold());
    println!("  Max results: {}", spec.search.max_results);
    println!(
        "  Page size: {} (max {})",
        spec.search.default_page_size, spec.search.max_page_size
    );
    println!("  Operation timeout: {}s", spec.lifecycle.operation_timeout_seconds);
    println!();

    println!("{}", "Schemas:".bold());
    if spec.schemas.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for schema in &spec.schemas {
        println!(
            "  {}/{}: {} required, {} typed",
            schema.provider,
            schema.resource_type.bold(),
            schema.required_fields.len(),
            schema.field_kinds.len()
        );
    }

    Ok(())
}

fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = CatalogConfigManifest::load_or_default(config_path).context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());
    Ok(())
}

fn generate(output: PathBuf) -> Result<()> {
    let sample = include_str!("../../templates/config-minimal.yaml");

    std::fs::write(&output, sample).with_context(|| format!("Failed to write config to {:?}", output))?;

    println!("{}", format!("✓ Configuration generated: {}", output.display()).green());
    Ok(())
}

/// Hide the password component of a connection URL.
fn redact_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    match rest.split_once('@') {
        Some((credentials, host)) => {
            let user = credentials.split(':').next().unwrap_or_default();
            format!("{}://{}:***@{}", scheme, user, host)
        }
        None => url.to_string(),
    }
}
