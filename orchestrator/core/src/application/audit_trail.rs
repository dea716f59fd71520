// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Audit Trail Service
//!
//! Read side of the ledger: per-resource history and chain verification.
//! Verification recomputes every hash from the stored fields; it never
//! repairs anything, a break is always surfaced as `ChainBroken`.

use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

use crate::application::lifecycle::LifecycleError;
use crate::domain::audit::{AuditChain, ChangeRecord};
use crate::domain::repository::ChangeLogRepository;
use crate::domain::resource::ResourceId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainScope {
    Resource(ResourceId),
    /// Every chain in the ledger
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ChainReport {
    /// Number of chains walked
    pub chains: usize,
    /// Number of records verified across those chains
    pub records: usize,
}

#[derive(Clone)]
pub struct AuditTrailService {
    ledger: Arc<dyn ChangeLogRepository>,
}

impl AuditTrailService {
    pub fn new(ledger: Arc<dyn ChangeLogRepository>) -> Self {
        Self { ledger }
    }

    /// Change records of one resource in chain order. Records outlive
    /// physically deleted resources.
    pub async fn history(&self, id: &ResourceId) -> Result<Vec<ChangeRecord>, LifecycleError> {
        let records = self.ledger.find_by_resource(id).await?;
        if records.is_empty() {
            return Err(LifecycleError::NotFound(id.clone()));
        }
        Ok(records)
    }

    pub async fn verify_chain(&self, scope: ChainScope) -> Result<ChainReport, LifecycleError> {
        let ids = match scope {
            ChainScope::Resource(id) => vec![id],
            ChainScope::Global => self.ledger.chain_ids().await?,
        };

        let mut report = ChainReport::default();
        for id in ids {
            let records = self.ledger.find_by_resource(&id).await?;
            if records.is_empty() {
                return Err(LifecycleError::NotFound(id));
            }

            match AuditChain::verify(&id, &records) {
                Ok(count) => {
                    report.chains += 1;
                    report.records += count;
                }
                Err(err) => {
                    error!(resource_id = %id, index = err.index(), error = %err, "Audit chain verification failed");
                    return Err(err.into());
                }
            }
        }

        info!(chains = report.chains, records = report.records, "Audit chain verified");
        Ok(report)
    }
}
