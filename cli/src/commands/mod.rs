// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the cloudledger CLI

pub mod audit;
pub mod config;
pub mod resource;
pub mod update;

pub use self::audit::AuditCommand;
pub use self::config::ConfigCommand;
pub use self::resource::ResourceCommand;
pub use self::update::UpdateCommand;

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;

use cloudledger_core::application::{build_services, CatalogServices};
use cloudledger_core::domain::catalog_config::CatalogConfigManifest;

/// Load configuration and wire the catalog services.
pub async fn load_services(config_path: Option<PathBuf>) -> Result<CatalogServices> {
    let manifest = CatalogConfigManifest::load_or_default(config_path).context("Failed to load configuration")?;
    info!(catalog = %manifest.metadata.name, "Configuration loaded");
    build_services(&manifest).await
}
