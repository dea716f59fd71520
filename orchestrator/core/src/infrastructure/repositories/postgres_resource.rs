// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Postgres Resource Store
//!
//! PostgreSQL + pgvector implementation of the resource and change-log ports.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Durable resources, vectors and audit ledger
//!
//! Each [`ResourceTransaction`] is one SQL transaction that first takes
//! `pg_advisory_xact_lock` on the resource id; the lock is released by
//! commit or rollback, so concurrent writers on one resource queue up while
//! writers on other resources proceed. Vectors travel as `real[]` and are
//! cast to `vector` in SQL. Similarity search is an exact scan ordered by
//! cosine distance (`<=>`) with the filter in the same `WHERE` clause.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow, Postgres};
use sqlx::types::Json;
use sqlx::{QueryBuilder, Row};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use crate::domain::audit::{AuditChain, BlockHash, ChainHead, ChangeOperation, ChangeRecord, HASH_LENGTH};
use crate::domain::repository::{
    ChangeLogRepository, Pagination, RepositoryError, ResourceFilter, ResourceStore, ResourceTransaction, SortOrder,
};
use crate::domain::resource::{LifecycleState, Payload, Resource, ResourceId, ResourceLink, ResourceMetadata};
use crate::infrastructure::repositories::check_dimensions;

const RESOURCE_COLUMNS: &str = "id, resource_type, provider, region, name, data, tags, metadata, parent_id, \
     children, links, state, embedding::real[] AS embedding, created_at, updated_at, last_scanned_at, deleted_at";

const RECORD_COLUMNS: &str =
    "id, resource_id, sequence, operation, changes, actor, timestamp, previous_hash, block_hash";

pub struct PostgresResourceStore {
    pool: PgPool,
    dimensions: usize,
}

impl PostgresResourceStore {
    /// Wrap a migrated pool, refusing to start when the `embedding` column
    /// was created with a different dimensionality than configured.
    pub async fn connect(pool: PgPool, dimensions: usize) -> Result<Self, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT atttypmod
            FROM pg_attribute
            WHERE attrelid = 'resources'::regclass AND attname = 'embedding' AND NOT attisdropped
            "#,
        )
        .fetch_optional(&pool)
        .await?;

        let column_dimensions = match row {
            Some(row) => row.try_get::<i32, _>("atttypmod")?,
            None => return Err(RepositoryError::Database("resources.embedding column is missing".to_string())),
        };

        if column_dimensions != dimensions as i32 {
            return Err(RepositoryError::DimensionMismatch {
                expected: dimensions,
                actual: column_dimensions.max(0) as usize,
            });
        }

        info!(dimensions, "PostgreSQL resource store ready");
        Ok(Self { pool, dimensions })
    }
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &ResourceFilter) {
    if let Some(provider) = &filter.provider {
        builder.push(" AND provider = ").push_bind(provider.clone());
    }
    if let Some(resource_type) = &filter.resource_type {
        builder.push(" AND resource_type = ").push_bind(resource_type.clone());
    }
    if let Some(region) = &filter.region {
        builder.push(" AND region = ").push_bind(region.clone());
    }
    if !filter.tags.is_empty() {
        builder.push(" AND tags @> ").push_bind(Json(filter.tags.clone()));
    }
}

fn order_clause(order: SortOrder) -> &'static str {
    match order {
        SortOrder::CreatedAtDesc => " ORDER BY created_at DESC, id COLLATE \"C\" ASC",
        SortOrder::CreatedAtAsc => " ORDER BY created_at ASC, id COLLATE \"C\" ASC",
        SortOrder::UpdatedAtDesc => " ORDER BY updated_at DESC, id COLLATE \"C\" ASC",
    }
}

fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn parse_resource_row(row: &PgRow) -> Result<Resource, RepositoryError> {
    let state: String = row.try_get("state")?;
    let state = LifecycleState::parse(&state)
        .ok_or_else(|| RepositoryError::Serialization(format!("unknown lifecycle state '{}'", state)))?;

    Ok(Resource {
        id: ResourceId::new(row.try_get::<String, _>("id")?),
        resource_type: row.try_get("resource_type")?,
        provider: row.try_get("provider")?,
        region: row.try_get("region")?,
        name: row.try_get("name")?,
        data: row.try_get::<Json<Payload>, _>("data")?.0,
        tags: row.try_get::<Json<BTreeMap<String, String>>, _>("tags")?.0,
        metadata: row.try_get::<Json<ResourceMetadata>, _>("metadata")?.0,
        parent_id: row.try_get::<Option<String>, _>("parent_id")?.map(ResourceId::new),
        children: row.try_get::<Json<BTreeSet<ResourceId>>, _>("children")?.0,
        links: row.try_get::<Json<Vec<ResourceLink>>, _>("links")?.0,
        state,
        vector: row.try_get("embedding")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        last_scanned_at: row.try_get("last_scanned_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

fn parse_hash(bytes: Vec<u8>) -> Result<BlockHash, RepositoryError> {
    let bytes: [u8; HASH_LENGTH] = bytes
        .try_into()
        .map_err(|b: Vec<u8>| RepositoryError::Serialization(format!("block hash of {} bytes", b.len())))?;
    Ok(BlockHash::from_bytes(bytes))
}

fn parse_record_row(row: &PgRow) -> Result<ChangeRecord, RepositoryError> {
    let operation: String = row.try_get("operation")?;
    let operation = ChangeOperation::parse(&operation)
        .ok_or_else(|| RepositoryError::Serialization(format!("unknown operation '{}'", operation)))?;
    let sequence: i64 = row.try_get("sequence")?;

    Ok(ChangeRecord {
        id: row.try_get("id")?,
        resource_id: ResourceId::new(row.try_get::<String, _>("resource_id")?),
        sequence: u64::try_from(sequence)
            .map_err(|_| RepositoryError::Serialization(format!("negative sequence {}", sequence)))?,
        operation,
        changes: row.try_get::<Json<serde_json::Value>, _>("changes")?.0,
        actor: row.try_get("actor")?,
        timestamp: row.try_get("timestamp")?,
        previous_hash: parse_hash(row.try_get("previous_hash")?)?,
        block_hash: parse_hash(row.try_get("block_hash")?)?,
    })
}

#[async_trait]
impl ResourceStore for PostgresResourceStore {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn find_by_id(&self, id: &ResourceId) -> Result<Option<Resource>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {} FROM resources WHERE id = $1", RESOURCE_COLUMNS))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(parse_resource_row).transpose()
    }

    async fn query(
        &self,
        filter: &ResourceFilter,
        pagination: Pagination,
        order: SortOrder,
    ) -> Result<Vec<Resource>, RepositoryError> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM resources WHERE state <> 'deleted'",
            RESOURCE_COLUMNS
        ));
        push_filter(&mut builder, filter);
        builder.push(order_clause(order));
        builder.push(" LIMIT ").push_bind(to_i64(pagination.limit));
        builder.push(" OFFSET ").push_bind(to_i64(pagination.offset));

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(parse_resource_row).collect()
    }

    async fn nearest_neighbors(
        &self,
        vector: &[f32],
        k: usize,
        filter: &ResourceFilter,
        exclude: Option<&ResourceId>,
    ) -> Result<Vec<(Resource, f32)>, RepositoryError> {
        check_dimensions(self.dimensions, vector)?;

        // pgvector yields NaN for zero-norm vectors; those rank at distance 1
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {}, COALESCE(NULLIF(embedding <=> ",
            RESOURCE_COLUMNS
        ));
        builder.push_bind(vector.to_vec());
        builder.push(
            "::real[]::vector, 'NaN'::float8), 1.0)::real AS distance \
             FROM resources WHERE state = 'active' AND embedding IS NOT NULL",
        );
        push_filter(&mut builder, filter);
        if let Some(excluded) = exclude {
            builder.push(" AND id <> ").push_bind(excluded.as_str().to_string());
        }
        builder.push(" ORDER BY distance ASC, created_at DESC, id COLLATE \"C\" ASC LIMIT ");
        builder.push_bind(to_i64(k));

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| Ok((parse_resource_row(row)?, row.try_get::<f32, _>("distance")?)))
            .collect()
    }

    async fn find_unvectorized(&self, limit: usize) -> Result<Vec<Resource>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM resources WHERE state = 'unvectorized' ORDER BY created_at ASC, id COLLATE \"C\" ASC LIMIT $1",
            RESOURCE_COLUMNS
        ))
        .bind(to_i64(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(parse_resource_row).collect()
    }

    async fn begin(&self, id: &ResourceId) -> Result<Box<dyn ResourceTransaction>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?;

        debug!(resource_id = %id, "Acquired resource advisory lock");
        Ok(Box::new(PostgresTransaction {
            id: id.clone(),
            tx,
            dimensions: self.dimensions,
        }))
    }
}

#[async_trait]
impl ChangeLogRepository for PostgresResourceStore {
    async fn find_by_resource(&self, id: &ResourceId) -> Result<Vec<ChangeRecord>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM change_records WHERE resource_id = $1 ORDER BY sequence ASC",
            RECORD_COLUMNS
        ))
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(parse_record_row).collect()
    }

    async fn chain_ids(&self) -> Result<Vec<ResourceId>, RepositoryError> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT resource_id COLLATE \"C\" AS resource_id FROM change_records ORDER BY 1",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(ResourceId::new).collect())
    }
}

/// Dropping the inner `sqlx::Transaction` without commit rolls it back.
struct PostgresTransaction {
    id: ResourceId,
    tx: sqlx::Transaction<'static, Postgres>,
    dimensions: usize,
}

#[async_trait]
impl ResourceTransaction for PostgresTransaction {
    async fn current(&mut self) -> Result<Option<Resource>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {} FROM resources WHERE id = $1", RESOURCE_COLUMNS))
            .bind(self.id.as_str())
            .fetch_optional(&mut *self.tx)
            .await?;

        row.as_ref().map(parse_resource_row).transpose()
    }

    async fn chain_head(&mut self) -> Result<Option<ChainHead>, RepositoryError> {
        let row = sqlx::query(
            "SELECT sequence, block_hash FROM change_records WHERE resource_id = $1 ORDER BY sequence DESC LIMIT 1",
        )
        .bind(self.id.as_str())
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            Some(row) => {
                let sequence: i64 = row.try_get("sequence")?;
                Ok(Some(ChainHead {
                    sequence: sequence.max(0) as u64,
                    block_hash: parse_hash(row.try_get("block_hash")?)?,
                }))
            }
            None => Ok(None),
        }
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

        sqlx::query(
            r#"
            INSERT INTO resources (
                id, resource_type, provider, region, name, data, tags, metadata,
                parent_id, children, links, state, embedding,
                created_at, updated_at, last_scanned_at, deleted_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13::real[]::vector, $14, $15, $16, $17)
            ON CONFLICT (id) DO UPDATE SET
                resource_type = EXCLUDED.resource_type,
                provider = EXCLUDED.provider,
                region = EXCLUDED.region,
                name = EXCLUDED.name,
                data = EXCLUDED.data,
                tags = EXCLUDED.tags,
                metadata = EXCLUDED.metadata,
                parent_id = EXCLUDED.parent_id,
                children = EXCLUDED.children,
                links = EXCLUDED.links,
                state = EXCLUDED.state,
                embedding = EXCLUDED.embedding,
                created_at = EXCLUDED.created_at,
                updated_at = EXCLUDED.updated_at,
                last_scanned_at = EXCLUDED.last_scanned_at,
                deleted_at = EXCLUDED.deleted_at
            "#,
        )
        .bind(resource.id.as_str())
        .bind(&resource.resource_type)
        .bind(&resource.provider)
        .bind(&resource.region)
        .bind(&resource.name)
        .bind(Json(&resource.data))
        .bind(Json(&resource.tags))
        .bind(Json(&resource.metadata))
        .bind(resource.parent_id.as_ref().map(|p| p.as_str().to_string()))
        .bind(Json(&resource.children))
        .bind(Json(&resource.links))
        .bind(resource.state.as_str())
        .bind(resource.vector.clone())
        .bind(resource.created_at)
        .bind(resource.updated_at)
        .bind(resource.last_scanned_at)
        .bind(resource.deleted_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn remove(&mut self) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM resources WHERE id = $1")
            .bind(self.id.as_str())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn append(&mut self, record: &ChangeRecord) -> Result<(), RepositoryError> {
        if record.resource_id != self.id {
            return Err(RepositoryError::ChainConflict(format!(
                "record for {} appended to chain of {}",
                record.resource_id, self.id
            )));
        }
        let head = self.chain_head().await?;
        if !AuditChain::links_to(record, head) {
            return Err(RepositoryError::ChainConflict(format!(
                "record {} (sequence {}) does not extend the chain of {}",
                record.id, record.sequence, self.id
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO change_records (
                id, resource_id, sequence, operation, changes, actor, timestamp, previous_hash, block_hash
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.id)
        .bind(record.resource_id.as_str())
        .bind(i64::try_from(record.sequence).map_err(|_| RepositoryError::Conflict("sequence overflow".to_string()))?)
        .bind(record.operation.as_str())
        .bind(Json(&record.changes))
        .bind(&record.actor)
        .bind(record.timestamp)
        .bind(record.previous_hash.as_bytes().as_slice())
        .bind(record.block_hash.as_bytes().as_slice())
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        self.tx.commit().await?;
        Ok(())
    }
}
