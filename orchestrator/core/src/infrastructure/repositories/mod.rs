// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the store ports defined in
//! `crate::domain::repository`, following the Repository pattern from DDD.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist resources, vectors and change records
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! - **PostgresResourceStore** - PostgreSQL + pgvector, one SQL transaction
//!   per mutation, advisory lock per resource id
//! - **InMemoryResourceStore** - process-local state for tests and
//!   development; staged writes applied under one write lock at commit
//!
//! Both rank with `crate::domain::similarity` semantics, so switching
//! backends does not change search results.

pub mod postgres_resource;

pub use postgres_resource::PostgresResourceStore;

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::domain::audit::{AuditChain, BlockHash, ChainHead, ChangeRecord};
use crate::domain::repository::{
    ChangeLogRepository, Pagination, RepositoryError, ResourceFilter, ResourceStore, ResourceTransaction, SortOrder,
};
use crate::domain::resource::{LifecycleState, Resource, ResourceId};
use crate::domain::similarity;
use crate::infrastructure::locks::{KeyedGuard, KeyedMutex};

#[derive(Default)]
struct CatalogState {
    resources: HashMap<ResourceId, Resource>,
    chains: HashMap<ResourceId, Vec<ChangeRecord>>,
    block_hashes: HashSet<BlockHash>,
}

impl CatalogState {
    fn chain_head(&self, id: &ResourceId) -> Option<ChainHead> {
        self.chains.get(id).and_then(|chain| chain.last()).map(ChangeRecord::head)
    }
}

/// Sort live resources per `order`; ties always fall back to id ascending.
pub(crate) fn sort_resources(resources: &mut [Resource], order: SortOrder) {
    resources.sort_by(|a, b| {
        let primary = match order {
            SortOrder::CreatedAtDesc => b.created_at.cmp(&a.created_at),
            SortOrder::CreatedAtAsc => a.created_at.cmp(&b.created_at),
            SortOrder::UpdatedAtDesc => b.updated_at.cmp(&a.updated_at),
        };
        primary.then_with(|| a.id.cmp(&b.id))
    });
}

pub(crate) fn check_dimensions(expected: usize, vector: &[f32]) -> Result<(), RepositoryError> {
    if vector.len() != expected {
        return Err(RepositoryError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}

#[derive(Clone)]
pub struct InMemoryResourceStore {
    state: Arc<RwLock<CatalogState>>,
    locks: KeyedMutex<ResourceId>,
    dimensions: usize,
}

impl InMemoryResourceStore {
    pub fn new(dimensions: usize) -> Self {
        Self {
            state: Arc::new(RwLock::new(CatalogState::default())),
            locks: KeyedMutex::new(),
            dimensions,
        }
    }

    /// Number of stored rows, tombstones included.
    pub fn len(&self) -> usize {
        self.state.read().resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().resources.is_empty()
    }
}

#[async_trait]
impl ResourceStore for InMemoryResourceStore {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn find_by_id(&self, id: &ResourceId) -> Result<Option<Resource>, RepositoryError> {
        Ok(self.state.read().resources.get(id).cloned())
    }

    async fn query(
        &self,
        filter: &ResourceFilter,
        pagination: Pagination,
        order: SortOrder,
    ) -> Result<Vec<Resource>, RepositoryError> {
        let mut matching: Vec<Resource> = {
            let state = self.state.read();
            state
                .resources
                .values()
                .filter(|r| r.is_live() && filter.matches(r))
                .cloned()
                .collect()
        };

        sort_resources(&mut matching, order);
        Ok(matching
            .into_iter()
            .skip(pagination.offset)
            .take(pagination.limit)
            .collect())
    }

    async fn nearest_neighbors(
        &self,
        vector: &[f32],
        k: usize,
        filter: &ResourceFilter,
        exclude: Option<&ResourceId>,
    ) -> Result<Vec<(Resource, f32)>, RepositoryError> {
        check_dimensions(self.dimensions, vector)?;

        let state = self.state.read();
        let candidates = state.resources.values().filter(|r| {
            r.state == LifecycleState::Active && filter.matches(r) && exclude.is_none_or(|id| id != &r.id)
        });
        Ok(similarity::rank(candidates, vector, k))
    }

    async fn find_unvectorized(&self, limit: usize) -> Result<Vec<Resource>, RepositoryError> {
        let mut pending: Vec<Resource> = {
            let state = self.state.read();
            state
                .resources
                .values()
                .filter(|r| r.state == LifecycleState::Unvectorized)
                .cloned()
                .collect()
        };

        sort_resources(&mut pending, SortOrder::CreatedAtAsc);
        pending.truncate(limit);
        Ok(pending)
    }

    async fn begin(&self, id: &ResourceId) -> Result<Box<dyn ResourceTransaction>, RepositoryError> {
        let guard = self.locks.lock(id).await;
        Ok(Box::new(InMemoryTransaction {
            id: id.clone(),
            state: self.state.clone(),
            dimensions: self.dimensions,
            staged_row: None,
            staged_records: Vec::new(),
            _guard: guard,
        }))
    }
}

#[async_trait]
impl ChangeLogRepository for InMemoryResourceStore {
    async fn find_by_resource(&self, id: &ResourceId) -> Result<Vec<ChangeRecord>, RepositoryError> {
        Ok(self.state.read().chains.get(id).cloned().unwrap_or_default())
    }

    async fn chain_ids(&self) -> Result<Vec<ResourceId>, RepositoryError> {
        let mut ids: Vec<ResourceId> = self.state.read().chains.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

enum StagedRow {
    Put(Resource),
    Remove,
}

/// Nothing touches shared state until `commit`, which applies every staged
/// write under a single write lock without awaiting.
struct InMemoryTransaction {
    id: ResourceId,
    state: Arc<RwLock<CatalogState>>,
    dimensions: usize,
    staged_row: Option<StagedRow>,
    staged_records: Vec<ChangeRecord>,
    _guard: KeyedGuard<ResourceId>,
}

impl InMemoryTransaction {
    fn head(&self) -> Option<ChainHead> {
        match self.staged_records.last() {
            Some(record) => Some(record.head()),
            None => self.state.read().chain_head(&self.id),
        }
    }
}

#[async_trait]
impl ResourceTransaction for InMemoryTransaction {
    async fn current(&mut self) -> Result<Option<Resource>, RepositoryError> {
        Ok(match &self.staged_row {
            Some(StagedRow::Put(resource)) => Some(resource.clone()),
            Some(StagedRow::Remove) => None,
            None => self.state.read().resources.get(&self.id).cloned(),
        })
    }

    async fn chain_head(&mut self) -> Result<Option<ChainHead>, RepositoryError> {
        Ok(self.head())
    }

    async fn put(&mut self, resource: &Resource) -> Result<(), RepositoryError> {
        if resource.id != self.id {
            return Err(RepositoryError::Conflict(format!(
                "transaction for {} cannot write resource {}",
                self.id, resource.id
            )));
        }
        if let Some(vector) = &resource.vector {
            check_dimensions(self.dimensions, vector)?;
        }
        self.staged_row = Some(StagedRow::Put(resource.clone()));
        Ok(())
    }

    async fn remove(&mut self) -> Result<(), RepositoryError> {
        self.staged_row = Some(StagedRow::Remove);
        Ok(())
    }

    async fn append(&mut self, record: &ChangeRecord) -> Result<(), RepositoryError> {
        if record.resource_id != self.id {
            return Err(RepositoryError::ChainConflict(format!(
                "record for {} appended to chain of {}",
                record.resource_id, self.id
            )));
        }
        if !AuditChain::links_to(record, self.head()) {
            return Err(RepositoryError::ChainConflict(format!(
                "record {} (sequence {}) does not extend the chain of {}",
                record.id, record.sequence, self.id
            )));
        }
        let duplicate = self.state.read().block_hashes.contains(&record.block_hash)
            || self.staged_records.iter().any(|r| r.block_hash == record.block_hash);
        if duplicate {
            return Err(RepositoryError::Conflict(format!("duplicate block hash {}", record.block_hash)));
        }

        self.staged_records.push(record.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        let this = *self;
        let mut state = this.state.write();

        match this.staged_row {
            Some(StagedRow::Put(resource)) => {
                state.resources.insert(this.id.clone(), resource);
            }
            Some(StagedRow::Remove) => {
                state.resources.remove(&this.id);
            }
            None => {}
        }

        if !this.staged_records.is_empty() {
            for record in &this.staged_records {
                state.block_hashes.insert(record.block_hash);
            }
            state
                .chains
                .entry(this.id.clone())
                .or_default()
                .extend(this.staged_records);
        }

        Ok(())
    }
}
