// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for the resource catalog, following the DDD
//! Repository pattern: interfaces defined in the domain layer, implemented
//! in `crate::infrastructure::repositories`.
//!
//! | Trait | Purpose | Implementations |
//! |-------|---------|----------------|
//! | `ResourceStore` | resources + vectors, reads and nearest-neighbour search | `InMemoryResourceStore`, `PostgresResourceStore` |
//! | `ResourceTransaction` | one atomic write unit for one resource | (returned by `ResourceStore::begin`) |
//! | `ChangeLogRepository` | read side of the audit ledger | same two stores |
//!
//! ## Write Path
//!
//! All writes go through a [`ResourceTransaction`]. Opening one acquires the
//! serialization point of its resource id and holds it until commit or drop,
//! so two writers on the same resource can never read the same chain head.
//! Resource row, vector and change record are committed together; dropping
//! a transaction without committing discards everything it staged.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::audit::{ChainHead, ChangeRecord};
use crate::domain::resource::{Resource, ResourceId};

/// Storage backend enum for pluggable persistence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    InMemory,
    PostgreSQL(PostgresConfig),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgresConfig {
    pub connection_string: String,
    pub max_connections: u32,
}

/// Whether deleted resources are removed or kept as tombstones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletionPolicy {
    #[default]
    Physical,
    Logical,
}

/// Conjunctive filter; `None` / empty means "any".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Every listed tag must be present with exactly this value
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl ResourceFilter {
    pub fn provider(provider: impl Into<String>) -> Self {
        Self {
            provider: Some(provider.into()),
            ..Default::default()
        }
    }

    pub fn with_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn matches(&self, resource: &Resource) -> bool {
        self.provider.as_deref().is_none_or(|p| p == resource.provider)
            && self.resource_type.as_deref().is_none_or(|t| t == resource.resource_type)
            && self.region.as_deref().is_none_or(|r| r == resource.region)
            && self
                .tags
                .iter()
                .all(|(key, value)| resource.tags.get(key) == Some(value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub offset: usize,
    pub limit: usize,
}

impl Pagination {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    CreatedAtDesc,
    CreatedAtAsc,
    UpdatedAtDesc,
}

/// `ListResources` request. Ties in the sort key are broken by id ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub filter: ResourceFilter,
    /// `None` uses the configured default page size
    pub pagination: Option<Pagination>,
    pub order: SortOrder,
}

#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Fixed vector dimensionality of this store.
    fn dimensions(&self) -> usize;

    /// Find a resource by id, including logically deleted rows.
    async fn find_by_id(&self, id: &ResourceId) -> Result<Option<Resource>, RepositoryError>;

    /// Live resources matching `filter`, ordered and paginated.
    async fn query(
        &self,
        filter: &ResourceFilter,
        pagination: Pagination,
        order: SortOrder,
    ) -> Result<Vec<Resource>, RepositoryError>;

    /// The `k` live, vectorized resources matching `filter` closest to
    /// `vector`. The filter and `exclude` are applied before ranking.
    async fn nearest_neighbors(
        &self,
        vector: &[f32],
        k: usize,
        filter: &ResourceFilter,
        exclude: Option<&ResourceId>,
    ) -> Result<Vec<(Resource, f32)>, RepositoryError>;

    /// Live resources still waiting for an embedding, oldest first.
    async fn find_unvectorized(&self, limit: usize) -> Result<Vec<Resource>, RepositoryError>;

    /// Open the write unit for one resource, waiting for its serialization
    /// point.
    async fn begin(&self, id: &ResourceId) -> Result<Box<dyn ResourceTransaction>, RepositoryError>;
}

/// Atomic write unit scoped to a single resource id.
#[async_trait]
pub trait ResourceTransaction: Send {
    /// Current row (staged writes included), deleted rows included.
    async fn current(&mut self) -> Result<Option<Resource>, RepositoryError>;

    /// Tail of the resource's audit chain (staged appends included).
    async fn chain_head(&mut self) -> Result<Option<ChainHead>, RepositoryError>;

    /// Stage an insert-or-replace of the resource row and its vector.
    async fn put(&mut self, resource: &Resource) -> Result<(), RepositoryError>;

    /// Stage physical removal of the resource row.
    async fn remove(&mut self) -> Result<(), RepositoryError>;

    /// Stage a sealed change record. Rejected with `ChainConflict` unless it
    /// links to the current chain head.
    async fn append(&mut self, record: &ChangeRecord) -> Result<(), RepositoryError>;

    /// Make every staged write durable at once.
    async fn commit(self: Box<Self>) -> Result<(), RepositoryError>;
}

/// Read side of the audit ledger.
#[async_trait]
pub trait ChangeLogRepository: Send + Sync {
    /// Records of one resource's chain in chain order.
    async fn find_by_resource(&self, id: &ResourceId) -> Result<Vec<ChangeRecord>, RepositoryError>;

    /// Every resource id that has a chain, sorted.
    async fn chain_ids(&self) -> Result<Vec<ResourceId>, RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Vector dimension mismatch: store expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Audit chain conflict: {0}")]
    ChainConflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl RepositoryError {
    /// Store unavailability is transient; constraint violations are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, RepositoryError::Database(_))
    }
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            sqlx::Error::Database(db) if db.is_unique_violation() || db.is_check_violation() => {
                RepositoryError::Conflict(db.to_string())
            }
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::resource::{utc_now, ResourceInput};

    #[test]
    fn test_filter_matches_all_conditions() {
        let resource = Resource::from_input(
            ResourceInput::new("vm", "aws")
                .with_id("r1")
                .with_region("eu-west-1")
                .with_tag("env", "prod")
                .with_tag("team", "core"),
            "t",
            utc_now(),
        );

        assert!(ResourceFilter::default().matches(&resource));
        assert!(ResourceFilter::provider("aws").with_type("vm").with_tag("env", "prod").matches(&resource));
        assert!(!ResourceFilter::provider("gcp").matches(&resource));
        assert!(!ResourceFilter::provider("aws").with_region("us-east-1").matches(&resource));
        assert!(!ResourceFilter::default().with_tag("env", "dev").matches(&resource));
    }
}
