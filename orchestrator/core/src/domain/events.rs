// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::audit::{BlockHash, ChangeRecord};
use crate::domain::resource::ResourceId;

/// Resource lifecycle events, published after the owning transaction commits.
///
/// Every event names the change record that made it durable, so observers can
/// correlate the stream with the audit ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ResourceEvent {
    ResourceCreated {
        resource_id: ResourceId,
        change_id: Uuid,
        block_hash: BlockHash,
        vectorized: bool,
        occurred_at: DateTime<Utc>,
    },
    ResourceUpdated {
        resource_id: ResourceId,
        change_id: Uuid,
        block_hash: BlockHash,
        changed_fields: Vec<String>,
        vectorized: bool,
        occurred_at: DateTime<Utc>,
    },
    ResourceDeleted {
        resource_id: ResourceId,
        change_id: Uuid,
        block_hash: BlockHash,
        occurred_at: DateTime<Utc>,
    },
    ResourceRevectorized {
        resource_id: ResourceId,
        change_id: Uuid,
        block_hash: BlockHash,
        occurred_at: DateTime<Utc>,
    },
}

impl ResourceEvent {
    pub fn created(record: &ChangeRecord, vectorized: bool) -> Self {
        Self::ResourceCreated {
            resource_id: record.resource_id.clone(),
            change_id: record.id,
            block_hash: record.block_hash,
            vectorized,
            occurred_at: record.timestamp,
        }
    }

    pub fn updated(record: &ChangeRecord, changed_fields: Vec<String>, vectorized: bool) -> Self {
        Self::ResourceUpdated {
            resource_id: record.resource_id.clone(),
            change_id: record.id,
            block_hash: record.block_hash,
            changed_fields,
            vectorized,
            occurred_at: record.timestamp,
        }
    }

    pub fn deleted(record: &ChangeRecord) -> Self {
        Self::ResourceDeleted {
            resource_id: record.resource_id.clone(),
            change_id: record.id,
            block_hash: record.block_hash,
            occurred_at: record.timestamp,
        }
    }

    pub fn revectorized(record: &ChangeRecord) -> Self {
        Self::ResourceRevectorized {
            resource_id: record.resource_id.clone(),
            change_id: record.id,
            block_hash: record.block_hash,
            occurred_at: record.timestamp,
        }
    }

    pub fn resource_id(&self) -> &ResourceId {
        match self {
            Self::ResourceCreated { resource_id, .. }
            | Self::ResourceUpdated { resource_id, .. }
            | Self::ResourceDeleted { resource_id, .. }
            | Self::ResourceRevectorized { resource_id, .. } => resource_id,
        }
    }

    pub fn change_id(&self) -> Uuid {
        match self {
            Self::ResourceCreated { change_id, .. }
            | Self::ResourceUpdated { change_id, .. }
            | Self::ResourceDeleted { change_id, .. }
            | Self::ResourceRevectorized { change_id, .. } => *change_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ResourceCreated { .. } => "resource_created",
            Self::ResourceUpdated { .. } => "resource_updated",
            Self::ResourceDeleted { .. } => "resource_deleted",
            Self::ResourceRevectorized { .. } => "resource_revectorized",
        }
    }
}
