// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Repository Factory - Application Layer
//!
//! Creates concrete store and embedder implementations from the catalog
//! configuration, keeping the domain layer free of infrastructure choices.
//!
//! - Domain layer: defines the port traits
//! - Application layer: picks implementations (this module)
//! - Infrastructure layer: provides the implementations
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Wire the lifecycle and audit services from configuration

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::application::audit_trail::AuditTrailService;
use crate::application::lifecycle::{LifecycleSettings, ResourceLifecycleService, StandardResourceLifecycleService};
use crate::domain::catalog_config::{CatalogConfigManifest, EmbeddingConfig, EmbeddingProviderKind};
use crate::domain::embedding::EmbeddingPort;
use crate::domain::repository::{ChangeLogRepository, ResourceStore, StorageBackend};
use crate::infrastructure::db::Database;
use crate::infrastructure::embedding::{FeatureHashEmbedder, OllamaEmbedder};
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::repositories::{InMemoryResourceStore, PostgresResourceStore};

/// Store handles for one backend: the write/search port and the ledger
/// read port are the same underlying store.
pub struct StoreHandles {
    pub store: Arc<dyn ResourceStore>,
    pub ledger: Arc<dyn ChangeLogRepository>,
}

/// Creates the resource store for the configured backend
pub async fn create_resource_store(backend: &StorageBackend, dimensions: usize) -> anyhow::Result<StoreHandles> {
    match backend {
        StorageBackend::InMemory => {
            let store = Arc::new(InMemoryResourceStore::new(dimensions));
            Ok(StoreHandles {
                store: store.clone(),
                ledger: store,
            })
        }
        StorageBackend::PostgreSQL(config) => {
            let db = Database::new(config).await?;
            let store = PostgresResourceStore::connect(db.get_pool().clone(), dimensions)
                .await
                .context("PostgreSQL store is not ready (run `cloudledger update` to apply migrations)")?;
            let store = Arc::new(store);
            Ok(StoreHandles {
                store: store.clone(),
                ledger: store,
            })
        }
    }
}

/// Creates the embedding adapter for the configured provider
pub fn create_embedder(config: &EmbeddingConfig) -> anyhow::Result<Arc<dyn EmbeddingPort>> {
    match config.provider {
        EmbeddingProviderKind::FeatureHash => Ok(Arc::new(FeatureHashEmbedder::new(config.dimensions))),
        EmbeddingProviderKind::Ollama => {
            let endpoint = config
                .endpoint
                .clone()
                .context("spec.embedding.endpoint is required for the ollama provider")?;
            let model = config
                .model
                .clone()
                .context("spec.embedding.model is required for the ollama provider")?;
            let embedder = OllamaEmbedder::new(endpoint, model, Duration::from_secs(config.timeout_seconds))?;
            Ok(Arc::new(embedder))
        }
    }
}

/// Fully wired services of one catalog instance.
pub struct CatalogServices {
    pub lifecycle: Arc<dyn ResourceLifecycleService>,
    pub audit: AuditTrailService,
    pub event_bus: EventBus,
}

pub async fn build_services(manifest: &CatalogConfigManifest) -> anyhow::Result<CatalogServices> {
    manifest.validate().context("Invalid catalog configuration")?;

    let backend = manifest.spec.storage.backend()?;
    let handles = create_resource_store(&backend, manifest.spec.embedding.dimensions).await?;
    let embedder = create_embedder(&manifest.spec.embedding)?;
    let event_bus = EventBus::with_default_capacity();

    let lifecycle = StandardResourceLifecycleService::new(
        Arc::new(manifest.schema_registry()),
        handles.store,
        embedder,
        event_bus.clone(),
        LifecycleSettings::from_manifest(manifest),
    );

    info!(
        backend = ?manifest.spec.storage.backend,
        embedding = ?manifest.spec.embedding.provider,
        dimensions = manifest.spec.embedding.dimensions,
        schemas = manifest.spec.schemas.len(),
        "Catalog services initialised"
    );

    Ok(CatalogServices {
        lifecycle: Arc::new(lifecycle),
        audit: AuditTrailService::new(handles.ledger),
        event_bus,
    })
}
