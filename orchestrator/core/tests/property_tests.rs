// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

mod common;

use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use cloudledger_core::application::{
    AuditTrailService, ChainReport, ChainScope, ErrorKind, LifecycleError, RequestContext, ResourceLifecycleService,
};
use cloudledger_core::domain::audit::{BreakReason, IntegrityError};
use cloudledger_core::domain::repository::{
    ChangeLogRepository, Pagination, ResourceFilter, ResourceStore, SortOrder,
};
use cloudledger_core::domain::resource::{ResourceId, ResourceInput, ResourcePatch};

use common::{Harness, TamperingLedger};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("tokio runtime")
}

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        "[a-zA-Z0-9 ._-]{0,24}".prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
        Just(Value::Null),
    ]
}

fn payload() -> impl Strategy<Value = BTreeMap<String, Value>> {
    prop::collection::btree_map("[a-z][a-z0-9_]{0,11}", scalar(), 0..8)
}

fn input(id: &str, provider: &str, data: &BTreeMap<String, Value>) -> ResourceInput {
    data.iter().fold(
        ResourceInput::new("vm", provider).with_id(id),
        |input, (key, value)| input.with_data(key.clone(), value.clone()),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn test_embedding_failure_never_leaves_partial_create(
        id in "[a-z][a-z0-9-]{0,15}",
        provider in prop::sample::select(vec!["aws", "gcp", "azure"]),
        data in payload(),
    ) {
        runtime().block_on(async {
            let harness = Harness::new();
            harness.embedder.fail();
            let ctx = RequestContext::new("prop");

            let err = harness
                .service
                .create_resource(&ctx, input(&id, provider, &data))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Embedding);

            let rid = ResourceId::new(id.as_str());
            assert!(harness.memory.find_by_id(&rid).await.unwrap().is_none());
            assert!(harness.memory.find_by_resource(&rid).await.unwrap().is_empty());
            assert!(harness.memory.chain_ids().await.unwrap().is_empty());
            let live = harness
                .memory
                .query(&ResourceFilter::default(), Pagination::new(0, 100), SortOrder::default())
                .await
                .unwrap();
            assert!(live.is_empty());
        });
    }

    #[test]
    fn test_embedding_failure_never_leaves_partial_update(
        original in payload(),
        patch in payload(),
    ) {
        runtime().block_on(async {
            let harness = Harness::new();
            let ctx = RequestContext::new("prop");
            let rid = ResourceId::new("r1");
            harness.service.create_resource(&ctx, input("r1", "aws", &original)).await.unwrap();
            let before = harness.memory.find_by_id(&rid).await.unwrap().unwrap();

            harness.embedder.fail();
            let patch = patch
                .iter()
                .fold(ResourcePatch::default(), |p, (key, value)| p.set_data(key.clone(), value.clone()))
                .set_data("revision", json!(["next"]));
            let err = harness.service.update_resource(&ctx, &rid, patch).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Embedding);

            let after = harness.memory.find_by_id(&rid).await.unwrap().unwrap();
            assert_eq!(after.view(), before.view());
            assert_eq!(after.vector, before.vector);
            assert_eq!(harness.records("r1").await.len(), 1);
        });
    }

    #[test]
    fn test_chain_verifies_and_pinpoints_tampering(
        updates in 0usize..12,
        tamper in any::<prop::sample::Index>(),
    ) {
        runtime().block_on(async {
            let harness = Harness::new();
            let ctx = RequestContext::new("prop");
            let rid = ResourceId::new("r1");
            harness.service.create_resource(&ctx, input("r1", "aws", &BTreeMap::new())).await.unwrap();
            for step in 0..updates {
                let patch = ResourcePatch::default().set_data("step", json!(step));
                harness.service.update_resource(&ctx, &rid, patch).await.unwrap();
            }

            let total = updates + 1;
            let audit = AuditTrailService::new(Arc::new(harness.memory.clone()));
            let report = audit.verify_chain(ChainScope::Resource(rid.clone())).await.unwrap();
            assert_eq!(report, ChainReport { chains: 1, records: total });

            let target = tamper.index(total);
            let ledger = TamperingLedger::new(harness.memory.clone(), move |records| {
                if let Some(record) = records.get_mut(target) {
                    record.actor.push_str("-forged");
                }
            });
            let audit = AuditTrailService::new(Arc::new(ledger));
            match audit.verify_chain(ChainScope::Resource(rid)).await.unwrap_err() {
                LifecycleError::ChainBroken(IntegrityError::ChainBroken { index, reason, .. }) => {
                    assert_eq!(index, target);
                    assert!(matches!(reason, BreakReason::HashMismatch { .. }));
                }
                other => panic!("expected a broken chain, got {:?}", other),
            }
        });
    }
}
