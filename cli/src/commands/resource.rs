// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Catalog resource commands
//!
//! Commands: create, get, list, search, update, delete, revectorize

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::{Path, PathBuf};

use cloudledger_core::application::RequestContext;
use cloudledger_core::domain::repository::{ListQuery, Pagination, ResourceFilter, SortOrder};
use cloudledger_core::domain::resource::{ResourceId, ResourceInput, ResourcePatch, ResourceView};
use cloudledger_core::domain::similarity::{SimilarResource, SimilarityQuery};

use super::load_services;

const DEFAULT_ACTOR: &str = "cli";

#[derive(Subcommand)]
pub enum ResourceCommand {
    /// Create resources from a JSON file (one object or an array)
    Create {
        #[arg(short, long, value_name = "FILE")]
        file: PathBuf,

        /// Actor recorded in the audit ledger
        #[arg(long, env = "CLOUDLEDGER_ACTOR", default_value = DEFAULT_ACTOR)]
        actor: String,
    },

    /// Show one resource (JSON)
    Get {
        #[arg(value_name = "RESOURCE_ID")]
        id: String,
    },

    /// List live resources
    List {
        #[command(flatten)]
        filter: FilterArgs,

        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Page size (0 uses the configured default)
        #[arg(long, default_value_t = 0)]
        limit: usize,

        #[arg(long, value_enum, default_value_t = OrderArg::CreatedDesc)]
        order: OrderArg,
    },

    /// Find resources similar to another resource or a raw vector
    Search {
        /// Resource whose embedding is the query
        #[arg(long, value_name = "RESOURCE_ID", conflicts_with = "vector", required_unless_present = "vector")]
        like: Option<String>,

        /// Query vector as a JSON array of numbers
        #[arg(long, value_name = "JSON")]
        vector: Option<String>,

        /// Number of results
        #[arg(short, default_value_t = 10)]
        k: usize,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Apply a JSON patch file to a resource
    Update {
        #[arg(value_name = "RESOURCE_ID")]
        id: String,

        #[arg(short, long, value_name = "FILE")]
        file: PathBuf,

        #[arg(long, env = "CLOUDLEDGER_ACTOR", default_value = DEFAULT_ACTOR)]
        actor: String,
    },

    /// Delete a resource (its audit chain is kept)
    Delete {
        #[arg(value_name = "RESOURCE_ID")]
        id: String,

        #[arg(long, env = "CLOUDLEDGER_ACTOR", default_value = DEFAULT_ACTOR)]
        actor: String,
    },

    /// Regenerate embeddings
    Revectorize {
        #[arg(value_name = "RESOURCE_ID", conflicts_with = "pending", required_unless_present = "pending")]
        id: Option<String>,

        /// Retry up to N unvectorized resources instead
        #[arg(long, value_name = "N")]
        pending: Option<usize>,

        #[arg(long, env = "CLOUDLEDGER_ACTOR", default_value = DEFAULT_ACTOR)]
        actor: String,
    },
}

#[derive(Args, Default)]
pub struct FilterArgs {
    #[arg(long)]
    provider: Option<String>,

    #[arg(long = "type", value_name = "TYPE")]
    resource_type: Option<String>,

    #[arg(long)]
    region: Option<String>,

    /// Required tag, repeatable
    #[arg(long = "tag", value_name = "KEY=VALUE", value_parser = parse_tag)]
    tags: Vec<(String, String)>,
}

impl FilterArgs {
    fn into_filter(self) -> ResourceFilter {
        ResourceFilter {
            provider: self.provider,
            resource_type: self.resource_type,
            region: self.region,
            tags: self.tags.into_iter().collect(),
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OrderArg {
    CreatedDesc,
    CreatedAsc,
    UpdatedDesc,
}

impl From<OrderArg> for SortOrder {
    fn from(order: OrderArg) -> Self {
        match order {
            OrderArg::CreatedDesc => SortOrder::CreatedAtDesc,
            OrderArg::CreatedAsc => SortOrder::CreatedAtAsc,
            OrderArg::UpdatedDesc => SortOrder::UpdatedAtDesc,
        }
    }
}

pub fn parse_tag(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

/// Accepts a single input object or an array of them.
pub fn parse_inputs(json: &str) -> Result<Vec<ResourceInput>> {
    let value: serde_json::Value = serde_json::from_str(json).context("Input is not valid JSON")?;
    let inputs = if value.is_array() {
        serde_json::from_value(value)?
    } else {
        vec![serde_json::from_value(value)?]
    };
    Ok(inputs)
}

pub fn parse_vector(json: &str) -> Result<Vec<f32>> {
    let vector: Vec<f32> = serde_json::from_str(json).context("--vector must be a JSON array of numbers")?;
    if vector.is_empty() {
        bail!("--vector must not be empty");
    }
    Ok(vector)
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))
}

pub async fn handle_command(command: ResourceCommand, config_path: Option<PathBuf>) -> Result<()> {
    let services = load_services(config_path).await?;
    let lifecycle = services.lifecycle;

    match command {
        ResourceCommand::Create { file, actor } => {
            let ctx = RequestContext::new(actor);
            let inputs = parse_inputs(&read_file(&file)?)?;
            for input in inputs {
                let view = lifecycle.create_resource(&ctx, input).await.context("Create failed")?;
                let marker = if view.vectorized { "" } else { " (unvectorized)" };
                println!("{}", format!("✓ Created {}{}", view.id, marker).green());
            }
        }
        ResourceCommand::Get { id } => {
            let view = lifecycle
                .get_resource(&RequestContext::new(DEFAULT_ACTOR), &ResourceId::new(id))
                .await?;
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        ResourceCommand::List {
            filter,
            offset,
            limit,
            order,
        } => {
            let query = ListQuery {
                filter: filter.into_filter(),
                pagination: Some(Pagination::new(offset, limit)),
                order: order.into(),
            };
            let views = lifecycle.list_resources(&RequestContext::new(DEFAULT_ACTOR), query).await?;
            print_resources(&views);
        }
        ResourceCommand::Search { like, vector, k, filter } => {
            let query = match (like, vector) {
                (Some(id), _) => SimilarityQuery::Resource(ResourceId::new(id)),
                (None, Some(raw)) => SimilarityQuery::Vector(parse_vector(&raw)?),
                (None, None) => bail!("Either --like or --vector is required"),
            };
            let results = lifecycle
                .search_similar(&RequestContext::new(DEFAULT_ACTOR), query, k, filter.into_filter())
                .await?;
            print_matches(&results);
        }
        ResourceCommand::Update { id, file, actor } => {
            let patch: ResourcePatch =
                serde_json::from_str(&read_file(&file)?).context("Patch file is not a valid resource patch")?;
            let view = lifecycle
                .update_resource(&RequestContext::new(actor), &ResourceId::new(id), patch)
                .await?;
            println!("{}", format!("✓ Updated {}", view.id).green());
        }
        ResourceCommand::Delete { id, actor } => {
            let id = ResourceId::new(id);
            lifecycle.delete_resource(&RequestContext::new(actor), &id).await?;
            println!("{}", format!("✓ Deleted {}", id).green());
        }
        ResourceCommand::Revectorize { id, pending, actor } => {
            let ctx = RequestContext::new(actor);
            match (id, pending) {
                (Some(id), _) => {
                    let view = lifecycle.revectorize_resource(&ctx, &ResourceId::new(id)).await?;
                    println!("{}", format!("✓ Revectorized {}", view.id).green());
                }
                (None, Some(limit)) => {
                    let done = lifecycle.revectorize_pending(&ctx, limit).await?;
                    println!("{}", format!("✓ Revectorized {} resource(s)", done.len()).green());
                    for id in done {
                        println!("  - {}", id);
                    }
                }
                (None, None) => bail!("Either RESOURCE_ID or --pending is required"),
            }
        }
    }

    Ok(())
}

fn print_resources(views: &[ResourceView]) {
    if views.is_empty() {
        println!("{}", "No resources found".yellow());
        return;
    }

    println!("{:<38} {:<10} {:<16} {:<14} {}", "ID", "PROVIDER", "TYPE", "REGION", "STATE");
    for view in views {
        println!(
            "{:<38} {:<10} {:<16} {:<14} {}",
            view.id.as_str().bold(),
            view.provider,
            view.resource_type,
            view.region,
            view.state.as_str()
        );
    }
}

fn print_matches(results: &[SimilarResource]) {
    if results.is_empty() {
        println!("{}", "No similar resources found".yellow());
        return;
    }

    println!("{:<10} {:<38} {:<10} {:<16} {}", "DISTANCE", "ID", "PROVIDER", "TYPE", "NAME");
    for result in results {
        let view = &result.resource;
        println!(
            "{:<10.4} {:<38} {:<10} {:<16} {}",
            result.distance,
            view.id.as_str().bold(),
            view.provider,
            view.resource_type,
            view.name
        );
    }
}
