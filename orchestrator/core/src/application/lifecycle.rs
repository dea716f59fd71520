// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Resource Lifecycle Service
//!
//! Orchestrates every resource mutation as one all-or-nothing unit:
//!
//! ```text
//! validate -> embed -> begin(id) -> put + append(record) -> commit -> publish event
//! ```
//!
//! The store transaction holds the resource's serialization point from
//! `begin` until commit or drop, so appends to one chain never fork. Any
//! error, and any deadline expiry, drops the transaction before commit and
//! leaves no resource row, vector or change record behind.
//!
//! Deletes append their `delete` record before removing or tombstoning the
//! row; if the append fails the resource is untouched.

use async_trait::async_trait;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::domain::audit::{AuditChain, ChangeOperation, ChangeRecord, IntegrityError, PendingChange};
use crate::domain::catalog_config::{CatalogConfigManifest, SearchConfig};
use crate::domain::embedding::{check_vector, EmbeddingError, EmbeddingFailurePolicy, EmbeddingPort};
use crate::domain::events::ResourceEvent;
use crate::domain::repository::{
    DeletionPolicy, ListQuery, Pagination, RepositoryError, ResourceFilter, ResourceStore, ResourceTransaction,
};
use crate::domain::resource::{utc_now, Resource, ResourceId, ResourceInput, ResourcePatch, ResourceView};
use crate::domain::schema::SchemaRegistry;
use crate::domain::similarity::{SimilarResource, SimilarityQuery};
use crate::domain::validation::{validate, ValidationError};
use crate::infrastructure::event_bus::EventBus;

/// Caller identity and deadline carried by every operation.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Recorded as `actor` on change records and `modified_by` on resources
    pub actor: String,
    /// `None` falls back to the configured operation timeout
    pub deadline: Option<Instant>,
}

impl RequestContext {
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// A timeout too large to represent as an instant leaves no deadline.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }
}

/// Transport-independent error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Embedding,
    Persistence,
    NotFound,
    Integrity,
    Timeout,
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),

    #[error("embedding failed: {0}")]
    EmbeddingFailed(#[from] EmbeddingError),

    #[error("persistence failed: {0}")]
    PersistenceFailed(#[from] RepositoryError),

    #[error("resource {0} not found")]
    NotFound(ResourceId),

    #[error(transparent)]
    ChainBroken(#[from] IntegrityError),

    #[error("operation '{operation}' exceeded its deadline")]
    DeadlineExceeded { operation: &'static str },
}

impl LifecycleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ValidationFailed(_) => ErrorKind::Validation,
            Self::EmbeddingFailed(_) => ErrorKind::Embedding,
            Self::PersistenceFailed(_) => ErrorKind::Persistence,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::ChainBroken(_) => ErrorKind::Integrity,
            Self::DeadlineExceeded { .. } => ErrorKind::Timeout,
        }
    }

    /// Whether the same call may succeed if the caller tries again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::EmbeddingFailed(e) => e.is_retryable(),
            Self::PersistenceFailed(e) => e.is_transient(),
            Self::DeadlineExceeded { .. } => true,
            Self::ValidationFailed(_) | Self::NotFound(_) | Self::ChainBroken(_) => false,
        }
    }

    fn invalid_argument(parameter: &'static str, reason: impl Into<String>) -> Self {
        Self::ValidationFailed(ValidationError::InvalidArgument {
            parameter,
            reason: reason.into(),
        })
    }
}

#[async_trait]
pub trait ResourceLifecycleService: Send + Sync {
    async fn create_resource(&self, ctx: &RequestContext, input: ResourceInput) -> Result<ResourceView, LifecycleError>;

    async fn update_resource(
        &self,
        ctx: &RequestContext,
        id: &ResourceId,
        patch: ResourcePatch,
    ) -> Result<ResourceView, LifecycleError>;

    async fn delete_resource(&self, ctx: &RequestContext, id: &ResourceId) -> Result<(), LifecycleError>;

    async fn get_resource(&self, ctx: &RequestContext, id: &ResourceId) -> Result<ResourceView, LifecycleError>;

    async fn list_resources(&self, ctx: &RequestContext, query: ListQuery) -> Result<Vec<ResourceView>, LifecycleError>;

    async fn search_similar(
        &self,
        ctx: &RequestContext,
        query: SimilarityQuery,
        k: usize,
        filter: ResourceFilter,
    ) -> Result<Vec<SimilarResource>, LifecycleError>;

    /// Regenerate the embedding of one live resource.
    async fn revectorize_resource(&self, ctx: &RequestContext, id: &ResourceId) -> Result<ResourceView, LifecycleError>;

    /// Retry the embedding of up to `limit` unvectorized resources, oldest
    /// first. Returns the ids that are now vectorized.
    async fn revectorize_pending(&self, ctx: &RequestContext, limit: usize) -> Result<Vec<ResourceId>, LifecycleError>;
}

/// Policies the service applies, usually taken from the catalog manifest.
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub deletion: DeletionPolicy,
    pub on_embedding_failure: EmbeddingFailurePolicy,
    pub search: SearchConfig,
    pub operation_timeout: Duration,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self::from_manifest(&CatalogConfigManifest::default())
    }
}

impl LifecycleSettings {
    pub fn from_manifest(manifest: &CatalogConfigManifest) -> Self {
        Self {
            deletion: manifest.spec.storage.deletion,
            on_embedding_failure: manifest.spec.embedding.on_failure,
            search: manifest.spec.search,
            operation_timeout: manifest.spec.lifecycle.operation_timeout(),
        }
    }
}

pub struct StandardResourceLifecycleService {
    schemas: Arc<SchemaRegistry>,
    store: Arc<dyn ResourceStore>,
    embedder: Arc<dyn EmbeddingPort>,
    event_bus: EventBus,
    settings: LifecycleSettings,
}

impl StandardResourceLifecycleService {
    pub fn new(
        schemas: Arc<SchemaRegistry>,
        store: Arc<dyn ResourceStore>,
        embedder: Arc<dyn EmbeddingPort>,
        event_bus: EventBus,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            schemas,
            store,
            embedder,
            event_bus,
            settings,
        }
    }

    /// Run `fut` under the caller's deadline. Expiry drops the future, and
    /// with it any open transaction, before it can commit.
    async fn within<T>(
        &self,
        ctx: &RequestContext,
        operation: &'static str,
        fut: impl Future<Output = Result<T, LifecycleError>>,
    ) -> Result<T, LifecycleError> {
        let deadline = ctx
            .deadline
            .or_else(|| Instant::now().checked_add(self.settings.operation_timeout));

        let outcome = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, fut).await,
            None => Ok(fut.await),
        };

        match outcome {
            Ok(result) => {
                if let Err(err) = &result {
                    debug!(operation, error = %err, "Operation failed");
                }
                result
            }
            Err(_) => {
                warn!(operation, actor = %ctx.actor, "Operation exceeded its deadline; rolled back");
                Err(LifecycleError::DeadlineExceeded { operation })
            }
        }
    }

    async fn generate_vector(&self, resource: &Resource) -> Result<Vec<f32>, EmbeddingError> {
        let (content, metadata) = resource.embedding_input();
        let vector = self.embedder.generate_vector(&content, &metadata).await?;
        check_vector(&vector)?;
        Ok(vector)
    }

    /// Attach a fresh embedding, or apply the failure policy. Returns whether
    /// the resource ended up vectorized.
    async fn embed(&self, resource: &mut Resource) -> Result<bool, LifecycleError> {
        match self.generate_vector(resource).await {
            Ok(vector) => {
                resource.attach_vector(vector);
                Ok(true)
            }
            Err(err) => match self.settings.on_embedding_failure {
                EmbeddingFailurePolicy::Abort => {
                    warn!(resource_id = %resource.id, error = %err, "Embedding failed; aborting mutation");
                    Err(LifecycleError::EmbeddingFailed(err))
                }
                EmbeddingFailurePolicy::MarkUnvectorized => {
                    warn!(resource_id = %resource.id, error = %err, "Embedding failed; persisting as unvectorized");
                    resource.detach_vector();
                    Ok(false)
                }
            },
        }
    }

    /// Seal a change onto the transaction's chain head and stage it.
    async fn append_change(
        tx: &mut Box<dyn ResourceTransaction>,
        resource_id: &ResourceId,
        operation: ChangeOperation,
        changes: serde_json::Value,
        actor: &str,
    ) -> Result<ChangeRecord, LifecycleError> {
        let head = tx.chain_head().await?;
        let pending = PendingChange::new(resource_id.clone(), operation, changes, actor);
        let record = AuditChain::seal(pending, head, utc_now());
        tx.append(&record).await?;
        Ok(record)
    }

    async fn create_inner(&self, ctx: &RequestContext, input: ResourceInput) -> Result<ResourceView, LifecycleError> {
        let mut resource = Resource::from_input(input, &ctx.actor, utc_now());
        validate(&resource, &self.schemas)?;

        let vectorized = self.embed(&mut resource).await?;

        let mut tx = self.store.begin(&resource.id).await?;
        if let Some(existing) = tx.current().await? {
            if existing.is_live() {
                return Err(RepositoryError::Conflict(format!("resource {} already exists", resource.id)).into());
            }
            debug!(resource_id = %resource.id, "Recreating logically deleted resource");
        }

        let snapshot = resource.snapshot().map_err(RepositoryError::from)?;
        tx.put(&resource).await?;
        let record = Self::append_change(&mut tx, &resource.id, ChangeOperation::Create, snapshot, &ctx.actor).await?;
        tx.commit().await?;

        info!(
            resource_id = %resource.id,
            provider = %resource.provider,
            resource_type = %resource.resource_type,
            sequence = record.sequence,
            vectorized,
            "Resource created"
        );
        self.event_bus.publish(ResourceEvent::created(&record, vectorized));
        Ok(resource.view())
    }

    async fn update_inner(
        &self,
        ctx: &RequestContext,
        id: &ResourceId,
        patch: ResourcePatch,
    ) -> Result<ResourceView, LifecycleError> {
        let mut tx = self.store.begin(id).await?;
        let mut resource = tx
            .current()
            .await?
            .filter(Resource::is_live)
            .ok_or_else(|| LifecycleError::NotFound(id.clone()))?;

        let was_vectorized = resource.vector.is_some();
        let diff = resource.apply_patch(patch, &ctx.actor, utc_now());
        if diff.is_empty() {
            debug!(resource_id = %id, "Patch changes nothing; no record written");
            return Ok(resource.view());
        }

        validate(&resource, &self.schemas)?;

        let mut changes = diff.to_changes();
        let mut vectorized = was_vectorized;
        if diff.touches_vectorizable_fields() {
            vectorized = self.embed(&mut resource).await?;
            if vectorized != was_vectorized {
                changes["vectorized"] = json!({ "old": was_vectorized, "new": vectorized });
            }
        }

        tx.put(&resource).await?;
        let record = Self::append_change(&mut tx, id, ChangeOperation::Update, changes, &ctx.actor).await?;
        tx.commit().await?;

        let changed_fields: Vec<String> = diff.fields().map(str::to_string).collect();
        info!(
            resource_id = %id,
            sequence = record.sequence,
            fields = ?changed_fields,
            vectorized,
            "Resource updated"
        );
        self.event_bus
            .publish(ResourceEvent::updated(&record, changed_fields, vectorized));
        Ok(resource.view())
    }

    async fn delete_inner(&self, ctx: &RequestContext, id: &ResourceId) -> Result<(), LifecycleError> {
        let mut tx = self.store.begin(id).await?;
        let mut resource = tx
            .current()
            .await?
            .filter(Resource::is_live)
            .ok_or_else(|| LifecycleError::NotFound(id.clone()))?;

        // The ledger entry goes in first; a failed append leaves the row as is.
        let snapshot = resource.snapshot().map_err(RepositoryError::from)?;
        let record = Self::append_change(&mut tx, id, ChangeOperation::Delete, snapshot, &ctx.actor).await?;

        match self.settings.deletion {
            DeletionPolicy::Physical => tx.remove().await?,
            DeletionPolicy::Logical => {
                resource.mark_deleted(&ctx.actor, record.timestamp);
                resource.vector = None;
                tx.put(&resource).await?;
            }
        }
        tx.commit().await?;

        info!(resource_id = %id, sequence = record.sequence, policy = ?self.settings.deletion, "Resource deleted");
        self.event_bus.publish(ResourceEvent::deleted(&record));
        Ok(())
    }

    async fn get_inner(&self, id: &ResourceId) -> Result<ResourceView, LifecycleError> {
        self.store
            .find_by_id(id)
            .await?
            .filter(Resource::is_live)
            .map(|r| r.view())
            .ok_or_else(|| LifecycleError::NotFound(id.clone()))
    }

    fn resolve_pagination(&self, requested: Option<Pagination>) -> Pagination {
        let search = &self.settings.search;
        match requested {
            None => Pagination::new(0, search.default_page_size),
            Some(p) if p.limit == 0 => Pagination::new(p.offset, search.default_page_size),
            Some(p) => Pagination::new(p.offset, p.limit.min(search.max_page_size)),
        }
    }

    async fn list_inner(&self, query: ListQuery) -> Result<Vec<ResourceView>, LifecycleError> {
        let pagination = self.resolve_pagination(query.pagination);
        let resources = self.store.query(&query.filter, pagination, query.order).await?;
        Ok(resources.iter().map(Resource::view).collect())
    }

    async fn search_inner(
        &self,
        query: SimilarityQuery,
        k: usize,
        filter: ResourceFilter,
    ) -> Result<Vec<SimilarResource>, LifecycleError> {
        if k == 0 {
            return Err(LifecycleError::invalid_argument("k", "must be at least 1"));
        }
        let k = k.min(self.settings.search.max_results);

        let (vector, exclude) = match query {
            SimilarityQuery::Vector(vector) => {
                let expected = self.store.dimensions();
                if vector.len() != expected {
                    return Err(LifecycleError::invalid_argument(
                        "vector",
                        format!("expected {} dimensions, got {}", expected, vector.len()),
                    ));
                }
                if vector.iter().any(|v| !v.is_finite()) {
                    return Err(LifecycleError::invalid_argument("vector", "components must be finite"));
                }
                (vector, None)
            }
            SimilarityQuery::Resource(id) => {
                let resource = self
                    .store
                    .find_by_id(&id)
                    .await?
                    .filter(Resource::is_live)
                    .ok_or_else(|| LifecycleError::NotFound(id.clone()))?;
                let vector = resource.vector.ok_or_else(|| {
                    LifecycleError::invalid_argument("query", format!("resource {} has no embedding", id))
                })?;
                (vector, Some(id))
            }
        };

        let ranked = self
            .store
            .nearest_neighbors(&vector, k, &filter, exclude.as_ref())
            .await?;

        debug!(k, results = ranked.len(), "Similarity search completed");
        Ok(ranked
            .into_iter()
            .map(|(resource, distance)| SimilarResource {
                resource: resource.view(),
                distance,
            })
            .collect())
    }

    async fn revectorize_inner(&self, ctx: &RequestContext, id: &ResourceId) -> Result<ResourceView, LifecycleError> {
        let mut tx = self.store.begin(id).await?;
        let mut resource = tx
            .current()
            .await?
            .filter(Resource::is_live)
            .ok_or_else(|| LifecycleError::NotFound(id.clone()))?;

        // An explicit request reports embedding failures regardless of policy.
        let vector = self.generate_vector(&resource).await?;
        if resource.vector.as_ref() == Some(&vector) {
            debug!(resource_id = %id, "Embedding unchanged; no record written");
            return Ok(resource.view());
        }

        let was_vectorized = resource.vector.is_some();
        let now = utc_now();
        resource.attach_vector(vector);
        resource.updated_at = now;
        resource.metadata.modified_by = Some(ctx.actor.clone());

        let changes = json!({
            "vectorized": { "old": was_vectorized, "new": true },
            "embedding": "regenerated",
        });

        tx.put(&resource).await?;
        let record = Self::append_change(&mut tx, id, ChangeOperation::Update, changes, &ctx.actor).await?;
        tx.commit().await?;

        info!(resource_id = %id, sequence = record.sequence, "Resource revectorized");
        self.event_bus.publish(ResourceEvent::revectorized(&record));
        Ok(resource.view())
    }

    async fn revectorize_pending_inner(
        &self,
        ctx: &RequestContext,
        limit: usize,
    ) -> Result<Vec<ResourceId>, LifecycleError> {
        let pending = self.store.find_unvectorized(limit).await?;
        let mut done = Vec::with_capacity(pending.len());
        for resource in pending {
            match self.revectorize_inner(ctx, &resource.id).await {
                Ok(_) => done.push(resource.id),
                Err(err) => {
                    warn!(resource_id = %resource.id, error = %err, "Revectorization failed; leaving unvectorized");
                }
            }
        }
        Ok(done)
    }
}

#[async_trait]
impl ResourceLifecycleService for StandardResourceLifecycleService {
    async fn create_resource(&self, ctx: &RequestContext, input: ResourceInput) -> Result<ResourceView, LifecycleError> {
        self.within(ctx, "create_resource", self.create_inner(ctx, input)).await
    }

    async fn update_resource(
        &self,
        ctx: &RequestContext,
        id: &ResourceId,
        patch: ResourcePatch,
    ) -> Result<ResourceView, LifecycleError> {
        self.within(ctx, "update_resource", self.update_inner(ctx, id, patch)).await
    }

    async fn delete_resource(&self, ctx: &RequestContext, id: &ResourceId) -> Result<(), LifecycleError> {
        self.within(ctx, "delete_resource", self.delete_inner(ctx, id)).await
    }

    async fn get_resource(&self, ctx: &RequestContext, id: &ResourceId) -> Result<ResourceView, LifecycleError> {
        self.within(ctx, "get_resource", self.get_inner(id)).await
    }

    async fn list_resources(&self, ctx: &RequestContext, query: ListQuery) -> Result<Vec<ResourceView>, LifecycleError> {
        self.within(ctx, "list_resources", self.list_inner(query)).await
    }

    async fn search_similar(
        &self,
        ctx: &RequestContext,
        query: SimilarityQuery,
        k: usize,
        filter: ResourceFilter,
    ) -> Result<Vec<SimilarResource>, LifecycleError> {
        self.within(ctx, "search_similar", self.search_inner(query, k, filter)).await
    }

    async fn revectorize_resource(&self, ctx: &RequestContext, id: &ResourceId) -> Result<ResourceView, LifecycleError> {
        self.within(ctx, "revectorize_resource", self.revectorize_inner(ctx, id)).await
    }

    async fn revectorize_pending(&self, ctx: &RequestContext, limit: usize) -> Result<Vec<ResourceId>, LifecycleError> {
        self.within(ctx, "revectorize_pending", self.revectorize_pending_inner(ctx, limit)).await
    }
}
