// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

mod common;

use serde_json::json;
use std::sync::Arc;

use cloudledger_core::application::{
    AuditTrailService, ChainReport, ChainScope, ErrorKind, LifecycleError, RequestContext, ResourceLifecycleService,
};
use cloudledger_core::domain::audit::{BlockHash, BreakReason, IntegrityError};
use cloudledger_core::domain::resource::{ResourceId, ResourceInput, ResourcePatch};

use common::{Harness, TamperingLedger};

async fn seeded() -> Harness {
    let harness = Harness::new();
    let ctx = RequestContext::new("auditor");
    for id in ["r1", "r2"] {
        harness
            .service
            .create_resource(&ctx, ResourceInput::new("bucket", "gcp").with_id(id))
            .await
            .unwrap();
    }
    for size in ["10GB", "20GB", "30GB"] {
        harness
            .service
            .update_resource(&ctx, &ResourceId::new("r1"), ResourcePatch::default().set_data("size", json!(size)))
            .await
            .unwrap();
    }
    harness
        .service
        .delete_resource(&ctx, &ResourceId::new("r2"))
        .await
        .unwrap();
    harness
}

fn broken_at(err: LifecycleError) -> (usize, BreakReason) {
    match err {
        LifecycleError::ChainBroken(IntegrityError::ChainBroken { index, reason, .. }) => (index, reason),
        other => panic!("expected a broken chain, got {:?}", other),
    }
}

#[tokio::test]
async fn test_intact_chains_verify() {
    let harness = seeded().await;
    let audit = AuditTrailService::new(Arc::new(harness.memory.clone()));

    let report = audit
        .verify_chain(ChainScope::Resource(ResourceId::new("r1")))
        .await
        .unwrap();
    assert_eq!(report, ChainReport { chains: 1, records: 4 });

    let report = audit.verify_chain(ChainScope::Global).await.unwrap();
    assert_eq!(report, ChainReport { chains: 2, records: 6 });
}

#[tokio::test]
async fn test_history_survives_physical_delete() {
    let harness = seeded().await;
    let audit = AuditTrailService::new(Arc::new(harness.memory.clone()));

    let history = audit.history(&ResourceId::new("r2")).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].sequence, 1);

    let err = audit.history(&ResourceId::new("never-existed")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_tampered_changes_detected() {
    let harness = seeded().await;
    let ledger = TamperingLedger::new(harness.memory.clone(), |records| {
        if let Some(record) = records.get_mut(2) {
            record.changes["data.size"]["new"] = json!("999GB");
        }
    });
    let audit = AuditTrailService::new(Arc::new(ledger));

    let err = audit
        .verify_chain(ChainScope::Resource(ResourceId::new("r1")))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Integrity);
    assert!(!err.is_retryable());

    let (index, reason) = broken_at(err);
    assert_eq!(index, 2);
    assert!(matches!(reason, BreakReason::HashMismatch { .. }));
}

#[tokio::test]
async fn test_tampered_actor_detected() {
    let harness = seeded().await;
    let ledger = TamperingLedger::new(harness.memory.clone(), |records| {
        if let Some(record) = records.first_mut() {
            record.actor = "mallory".to_string();
        }
    });
    let audit = AuditTrailService::new(Arc::new(ledger));

    let (index, reason) = broken_at(
        audit
            .verify_chain(ChainScope::Resource(ResourceId::new("r2")))
            .await
            .unwrap_err(),
    );
    assert_eq!(index, 0);
    assert!(matches!(reason, BreakReason::HashMismatch { .. }));
}

#[tokio::test]
async fn test_relinked_record_detected() {
    let harness = seeded().await;
    let ledger = TamperingLedger::new(harness.memory.clone(), |records| {
        // Rewrite a record consistently but point it at the wrong predecessor.
        if let Some(record) = records.get_mut(3) {
            record.previous_hash = BlockHash::from_bytes([7u8; 32]);
            record.block_hash = record.compute_hash();
        }
    });
    let audit = AuditTrailService::new(Arc::new(ledger));

    let (index, reason) = broken_at(
        audit
            .verify_chain(ChainScope::Resource(ResourceId::new("r1")))
            .await
            .unwrap_err(),
    );
    assert_eq!(index, 3);
    assert!(matches!(reason, BreakReason::PreviousHashMismatch { .. }));
}

#[tokio::test]
async fn test_removed_record_detected() {
    let harness = seeded().await;
    let ledger = TamperingLedger::new(harness.memory.clone(), |records| {
        if records.len() > 2 {
            records.remove(1);
        }
    });
    let audit = AuditTrailService::new(Arc::new(ledger));

    let (index, reason) = broken_at(audit.verify_chain(ChainScope::Global).await.unwrap_err());
    assert_eq!(index, 1);
    assert!(matches!(reason, BreakReason::SequenceGap { expected: 1, found: 2 }));
}

#[tokio::test]
async fn test_verify_unknown_resource() {
    let harness = Harness::new();
    let audit = AuditTrailService::new(Arc::new(harness.memory.clone()));

    let err = audit
        .verify_chain(ChainScope::Resource(ResourceId::new("ghost")))
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::NotFound(_)));

    let report = audit.verify_chain(ChainScope::Global).await.unwrap();
    assert_eq!(report, ChainReport::default());
}
