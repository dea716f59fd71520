// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Shared fixtures for the integration suites: an in-memory catalog whose
//! store and embedder can be told to misbehave.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cloudledger_core::application::{LifecycleSettings, StandardResourceLifecycleService};
use cloudledger_core::domain::audit::{ChainHead, ChangeRecord};
use cloudledger_core::domain::embedding::{EmbeddingError, EmbeddingPort};
use cloudledger_core::domain::repository::{
    ChangeLogRepository, Pagination, RepositoryError, ResourceFilter, ResourceStore, ResourceTransaction, SortOrder,
};
use cloudledger_core::domain::resource::{Payload, Resource, ResourceId};
use cloudledger_core::domain::schema::SchemaRegistry;
use cloudledger_core::infrastructure::embedding::FeatureHashEmbedder;
use cloudledger_core::infrastructure::event_bus::EventBus;
use cloudledger_core::infrastructure::repositories::InMemoryResourceStore;

pub const DIMENSIONS: usize = 64;

/// In-memory store whose transactions can be made to fail at append or
/// commit time.
#[derive(Clone)]
pub struct FlakyStore {
    inner: InMemoryResourceStore,
    fail_append: Arc<AtomicBool>,
    fail_commit: Arc<AtomicBool>,
}

impl FlakyStore {
    pub fn new(inner: InMemoryResourceStore) -> Self {
        Self {
            inner,
            fail_append: Arc::new(AtomicBool::new(false)),
            fail_commit: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn fail_appends(&self, fail: bool) {
        self.fail_append.store(fail, Ordering::SeqCst);
    }

    pub fn fail_commits(&self, fail: bool) {
        self.fail_commit.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ResourceStore for FlakyStore {
    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    async fn find_by_id(&self, id: &ResourceId) -> Result<Option<Resource>, RepositoryError> {
        self.inner.find_by_id(id).await
    }

    async fn query(
        &self,
        filter: &ResourceFilter,
        pagination: Pagination,
        order: SortOrder,
    ) -> Result<Vec<Resource>, RepositoryError> {
        self.inner.query(filter, pagination, order).await
    }

    async fn nearest_neighbors(
        &self,
        vector: &[f32],
        k: usize,
        filter: &ResourceFilter,
        exclude: Option<&ResourceId>,
    ) -> Result<Vec<(Resource, f32)>, RepositoryError> {
        self.inner.nearest_neighbors(vector, k, filter, exclude).await
    }

    async fn find_unvectorized(&self, limit: usize) -> Result<Vec<Resource>, RepositoryError> {
        self.inner.find_unvectorized(limit).await
    }

    async fn begin(&self, id: &ResourceId) -> Result<Box<dyn ResourceTransaction>, RepositoryError> {
        let inner = self.inner.begin(id).await?;
        Ok(Box::new(FlakyTransaction {
            inner,
            fail_append: self.fail_append.load(Ordering::SeqCst),
            fail_commit: self.fail_commit.load(Ordering::SeqCst),
        }))
    }
}

struct FlakyTransaction {
    inner: Box<dyn ResourceTransaction>,
    fail_append: bool,
    fail_commit: bool,
}

#[async_trait]
impl ResourceTransaction for FlakyTransaction {
    async fn current(&mut self) -> Result<Option<Resource>, RepositoryError> {
        self.inner.current().await
    }

    async fn chain_head(&mut self) -> Result<Option<ChainHead>, RepositoryError> {
        self.inner.chain_head().await
    }

    async fn put(&mut self, resource: &Resource) -> Result<(), RepositoryError> {
        self.inner.put(resource).await
    }

    async fn remove(&mut self) -> Result<(), RepositoryError> {
        self.inner.remove().await
    }

    async fn append(&mut self, record: &ChangeRecord) -> Result<(), RepositoryError> {
        if self.fail_append {
            return Err(RepositoryError::Database("ledger unavailable".to_string()));
        }
        self.inner.append(record).await
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        if self.fail_commit {
            return Err(RepositoryError::Database("connection reset during commit".to_string()));
        }
        self.inner.commit().await
    }
}

const MODE_OK: u8 = 0;
const MODE_FAIL: u8 = 1;
const MODE_SLOW: u8 = 2;

/// Feature-hash embedder that can be switched to failing or stalling.
pub struct ControlledEmbedder {
    inner: FeatureHashEmbedder,
    mode: AtomicU8,
    delay: Duration,
}

impl ControlledEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            inner: FeatureHashEmbedder::new(dimensions),
            mode: AtomicU8::new(MODE_OK),
            delay: Duration::from_millis(500),
        }
    }

    pub fn succeed(&self) {
        self.mode.store(MODE_OK, Ordering::SeqCst);
    }

    pub fn fail(&self) {
        self.mode.store(MODE_FAIL, Ordering::SeqCst);
    }

    pub fn stall(&self) {
        self.mode.store(MODE_SLOW, Ordering::SeqCst);
    }
}

#[async_trait]
impl EmbeddingPort for ControlledEmbedder {
    async fn generate_vector(&self, content: &Payload, metadata: &Payload) -> Result<Vec<f32>, EmbeddingError> {
        match self.mode.load(Ordering::SeqCst) {
            MODE_FAIL => Err(EmbeddingError::Unavailable("embedding backend down".to_string())),
            MODE_SLOW => {
                tokio::time::sleep(self.delay).await;
                self.inner.generate_vector(content, metadata).await
            }
            _ => self.inner.generate_vector(content, metadata).await,
        }
    }
}

/// Embedder returning a caller-chosen vector for every resource.
pub struct FixedEmbedder(pub Vec<f32>);

#[async_trait]
impl EmbeddingPort for FixedEmbedder {
    async fn generate_vector(&self, _content: &Payload, _metadata: &Payload) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.0.clone())
    }
}

/// Ledger reader that hands out records after letting a closure alter
/// them, standing in for out-of-band edits to the stored chain.
pub struct TamperingLedger<F> {
    inner: InMemoryResourceStore,
    tamper: F,
}

impl<F> TamperingLedger<F>
where
    F: Fn(&mut Vec<ChangeRecord>) + Send + Sync,
{
    pub fn new(inner: InMemoryResourceStore, tamper: F) -> Self {
        Self { inner, tamper }
    }
}

#[async_trait]
impl<F> ChangeLogRepository for TamperingLedger<F>
where
    F: Fn(&mut Vec<ChangeRecord>) + Send + Sync,
{
    async fn find_by_resource(&self, id: &ResourceId) -> Result<Vec<ChangeRecord>, RepositoryError> {
        let mut records = self.inner.find_by_resource(id).await?;
        (self.tamper)(&mut records);
        Ok(records)
    }

    async fn chain_ids(&self) -> Result<Vec<ResourceId>, RepositoryError> {
        self.inner.chain_ids().await
    }
}

/// A catalog wired against a flaky in-memory store.
pub struct Harness {
    pub memory: InMemoryResourceStore,
    pub store: FlakyStore,
    pub embedder: Arc<ControlledEmbedder>,
    pub event_bus: EventBus,
    pub service: Arc<StandardResourceLifecycleService>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(LifecycleSettings::default())
    }

    pub fn with_settings(settings: LifecycleSettings) -> Self {
        Self::with_schemas(SchemaRegistry::new(), settings)
    }

    pub fn with_schemas(schemas: SchemaRegistry, settings: LifecycleSettings) -> Self {
        let memory = InMemoryResourceStore::new(DIMENSIONS);
        let store = FlakyStore::new(memory.clone());
        let embedder = Arc::new(ControlledEmbedder::new(DIMENSIONS));
        let event_bus = EventBus::new(256);
        let service = Arc::new(StandardResourceLifecycleService::new(
            Arc::new(schemas),
            Arc::new(store.clone()),
            embedder.clone(),
            event_bus.clone(),
            settings,
        ));

        Self {
            memory,
            store,
            embedder,
            event_bus,
            service,
        }
    }

    pub async fn records(&self, id: &str) -> Vec<ChangeRecord> {
        self.memory
            .find_by_resource(&ResourceId::new(id))
            .await
            .expect("ledger read")
    }
}
