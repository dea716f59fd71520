// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Audit Chain
//!
//! Every mutation of a resource produces exactly one immutable
//! [`ChangeRecord`]. Records of the same resource form a singly-linked hash
//! chain:
//!
//! ```text
//! block_hash[n] = SHA-256( hex(block_hash[n-1]) || "\n" || canonical(record[n]) )
//! block_hash[-1] = GENESIS (32 zero bytes)
//! ```
//!
//! ## Chain Scope
//!
//! One chain per resource id. The serialization point for appends is
//! therefore a single resource, which lets writers on different resources
//! proceed independently. Recreating an id after deletion continues the same
//! chain with a fresh `create` record.
//!
//! ## Canonical Encoding
//!
//! Hash input is JSON with recursively sorted object keys, no whitespace,
//! and the timestamp rendered with exactly six fractional digits. Stores
//! keep timestamps at microsecond precision, so re-hashing a record read
//! back from any store reproduces the stored hash. Negative zero in
//! `changes` is sealed as `0.0`, since JSONB numerics cannot carry the sign.

use crate::domain::resource::ResourceId;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

pub const HASH_LENGTH: usize = 32;

/// SHA-256 link between consecutive change records.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockHash([u8; HASH_LENGTH]);

impl BlockHash {
    /// Previous-hash input of the first record in every chain.
    pub const GENESIS: BlockHash = BlockHash([0u8; HASH_LENGTH]);

    pub fn from_bytes(bytes: [u8; HASH_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LENGTH] {
        &self.0
    }

    pub fn is_genesis(&self) -> bool {
        self.0 == [0u8; HASH_LENGTH]
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Default for BlockHash {
    fn default() -> Self {
        Self::GENESIS
    }
}

impl std::fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BlockHash({}...)", &self.to_hex()[..16])
    }
}

impl std::fmt::Display for BlockHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for BlockHash {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; HASH_LENGTH];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl Serialize for BlockHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for BlockHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOperation {
    Create,
    Update,
    Delete,
}

impl ChangeOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A change record before it is linked into a chain.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingChange {
    pub resource_id: ResourceId,
    pub operation: ChangeOperation,
    pub changes: Value,
    pub actor: String,
}

impl PendingChange {
    pub fn new(resource_id: ResourceId, operation: ChangeOperation, changes: Value, actor: impl Into<String>) -> Self {
        Self {
            resource_id,
            operation,
            changes,
            actor: actor.into(),
        }
    }
}

/// Rewrite every `-0.0` to `0.0`.
fn normalize_numbers(value: &mut Value) {
    match value {
        Value::Number(n) => {
            if n.is_f64() && n.as_f64().is_some_and(|f| f == 0.0 && f.is_sign_negative()) {
                *value = json!(0.0);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(normalize_numbers),
        Value::Object(map) => map.values_mut().for_each(normalize_numbers),
        _ => {}
    }
}

/// Tail of a chain: what the next record links to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainHead {
    pub sequence: u64,
    pub block_hash: BlockHash,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub id: Uuid,
    pub resource_id: ResourceId,
    /// Position in the resource's chain, starting at 0
    pub sequence: u64,
    pub operation: ChangeOperation,
    pub changes: Value,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
    pub previous_hash: BlockHash,
    pub block_hash: BlockHash,
}

impl ChangeRecord {
    pub fn head(&self) -> ChainHead {
        ChainHead {
            sequence: self.sequence,
            block_hash: self.block_hash,
        }
    }

    /// Recompute this record's hash from its own fields and `previous_hash`.
    pub fn compute_hash(&self) -> BlockHash {
        let material = json!({
            "id": self.id.to_string(),
            "resource_id": self.resource_id.as_str(),
            "sequence": self.sequence,
            "operation": self.operation.as_str(),
            "changes": self.changes,
            "actor": self.actor,
            "timestamp": self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
        });

        let mut hasher = Sha256::new();
        hasher.update(self.previous_hash.to_hex().as_bytes());
        hasher.update(b"\n");
        hasher.update(canonical_json(&material).as_bytes());
        BlockHash(hasher.finalize().into())
    }
}

/// Deterministic JSON encoding: object keys sorted at every depth, compact.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(item, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakReason {
    /// Record belongs to a different resource's chain
    ForeignRecord { found: ResourceId },
    SequenceGap { expected: u64, found: u64 },
    /// `previous_hash` does not match the predecessor's `block_hash`
    PreviousHashMismatch { expected: BlockHash, found: BlockHash },
    /// Recomputed hash differs from the stored one (content tampered)
    HashMismatch { computed: BlockHash, stored: BlockHash },
}

impl std::fmt::Display for BreakReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ForeignRecord { found } => write!(f, "record belongs to resource {}", found),
            Self::SequenceGap { expected, found } => {
                write!(f, "expected sequence {}, found {}", expected, found)
            }
            Self::PreviousHashMismatch { expected, found } => {
                write!(f, "previous hash {} does not link to {}", found, expected)
            }
            Self::HashMismatch { computed, stored } => {
                write!(f, "stored hash {} does not match recomputed {}", stored, computed)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityError {
    #[error("audit chain of resource {resource_id} broken at index {index}: {reason}")]
    ChainBroken {
        resource_id: ResourceId,
        index: usize,
        reason: BreakReason,
    },
}

impl IntegrityError {
    pub fn index(&self) -> usize {
        match self {
            Self::ChainBroken { index, .. } => *index,
        }
    }
}

/// Stateless chain operations. Persistence of sealed records is the
/// store's job; this type only links and checks.
pub struct AuditChain;

impl AuditChain {
    /// Link a pending change onto `head` (or genesis) and compute its hash.
    pub fn seal(pending: PendingChange, head: Option<ChainHead>, timestamp: DateTime<Utc>) -> ChangeRecord {
        let (sequence, previous_hash) = match head {
            Some(head) => (head.sequence + 1, head.block_hash),
            None => (0, BlockHash::GENESIS),
        };

        let mut changes = pending.changes;
        normalize_numbers(&mut changes);

        let mut record = ChangeRecord {
            id: Uuid::new_v4(),
            resource_id: pending.resource_id,
            sequence,
            operation: pending.operation,
            changes,
            actor: pending.actor,
            timestamp,
            previous_hash,
            block_hash: BlockHash::GENESIS,
        };
        record.block_hash = record.compute_hash();
        record
    }

    /// True when `record` is a valid direct successor of `head`.
    pub fn links_to(record: &ChangeRecord, head: Option<ChainHead>) -> bool {
        match head {
            Some(head) => record.sequence == head.sequence + 1 && record.previous_hash == head.block_hash,
            None => record.sequence == 0 && record.previous_hash.is_genesis(),
        }
    }

    /// Walk a chain in order, recomputing every hash. Returns the number of
    /// verified records or the first break.
    pub fn verify(resource_id: &ResourceId, records: &[ChangeRecord]) -> Result<usize, IntegrityError> {
        let mut expected_previous = BlockHash::GENESIS;

        for (index, record) in records.iter().enumerate() {
            let broken = |reason| IntegrityError::ChainBroken {
                resource_id: resource_id.clone(),
                index,
                reason,
            };

            if &record.resource_id != resource_id {
                return Err(broken(BreakReason::ForeignRecord {
                    found: record.resource_id.clone(),
                }));
            }
            if record.sequence != index as u64 {
                return Err(broken(BreakReason::SequenceGap {
                    expected: index as u64,
                    found: record.sequence,
                }));
            }
            if record.previous_hash != expected_previous {
                return Err(broken(BreakReason::PreviousHashMismatch {
                    expected: expected_previous,
                    found: record.previous_hash,
                }));
            }
            let computed = record.compute_hash();
            if computed != record.block_hash {
                return Err(broken(BreakReason::HashMismatch {
                    computed,
                    stored: record.block_hash,
                }));
            }

            expected_previous = record.block_hash;
        }

        Ok(records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::resource::utc_now;

    fn chain(resource: &str, length: usize) -> Vec<ChangeRecord> {
        let resource_id = ResourceId::from(resource);
        let mut records: Vec<ChangeRecord> = Vec::new();
        for i in 0..length {
            let operation = if i == 0 { ChangeOperation::Create } else { ChangeOperation::Update };
            let pending = PendingChange::new(resource_id.clone(), operation, json!({ "step": i }), "tester");
            let head = records.last().map(ChangeRecord::head);
            records.push(AuditChain::seal(pending, head, utc_now()));
        }
        records
    }

    #[test]
    fn test_first_record_links_to_genesis() {
        let records = chain("r1", 1);
        assert_eq!(records[0].sequence, 0);
        assert!(records[0].previous_hash.is_genesis());
        assert!(AuditChain::links_to(&records[0], None));
    }

    #[test]
    fn test_seal_links_to_predecessor() {
        let records = chain("r1", 3);
        assert_eq!(records[2].previous_hash, records[1].block_hash);
        assert_eq!(records[2].sequence, 2);
        assert!(AuditChain::links_to(&records[2], Some(records[1].head())));
        assert!(!AuditChain::links_to(&records[2], Some(records[0].head())));
    }

    #[test]
    fn test_verify_intact_chain() {
        let records = chain("r1", 5);
        assert_eq!(AuditChain::verify(&ResourceId::from("r1"), &records), Ok(5));
        assert_eq!(AuditChain::verify(&ResourceId::from("r1"), &[]), Ok(0));
    }

    #[test]
    fn test_tampered_changes_detected_at_index() {
        let mut records = chain("r1", 5);
        records[3].changes = json!({ "step": 99 });

        let err = AuditChain::verify(&ResourceId::from("r1"), &records).unwrap_err();
        assert_eq!(err.index(), 3);
        assert!(matches!(err, IntegrityError::ChainBroken { reason: BreakReason::HashMismatch { .. }, .. }));
    }

    #[test]
    fn test_tampered_hash_detected_at_index() {
        let mut records = chain("r1", 4);
        records[1].block_hash = BlockHash::from_bytes([7u8; HASH_LENGTH]);

        let err = AuditChain::verify(&ResourceId::from("r1"), &records).unwrap_err();
        assert_eq!(err.index(), 1);
    }

    #[test]
    fn test_removed_record_detected() {
        let mut records = chain("r1", 4);
        records.remove(2);

        let err = AuditChain::verify(&ResourceId::from("r1"), &records).unwrap_err();
        assert_eq!(err.index(), 2);
        assert!(matches!(err, IntegrityError::ChainBroken { reason: BreakReason::SequenceGap { .. }, .. }));
    }

    #[test]
    fn test_foreign_record_detected() {
        let mut records = chain("r1", 2);
        records.extend(chain("r2", 1));

        let err = AuditChain::verify(&ResourceId::from("r1"), &records).unwrap_err();
        assert_eq!(err.index(), 2);
    }

    #[test]
    fn test_canonical_json_ignores_key_order() {
        let a: Value = serde_json::from_str(r#"{"b":1,"a":{"y":[1,{"k":2,"j":1}],"x":"s"}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a":{"x":"s","y":[1,{"j":1,"k":2}]},"b":1}"#).unwrap();

        assert_eq!(canonical_json(&a), canonical_json(&b));
        assert_eq!(canonical_json(&a), r#"{"a":{"x":"s","y":[1,{"j":1,"k":2}]},"b":1}"#);
    }

    #[test]
    fn test_hash_survives_serde_round_trip() {
        let records = chain("r1", 2);
        let json = serde_json::to_string(&records).unwrap();
        let restored: Vec<ChangeRecord> = serde_json::from_str(&json).unwrap();

        assert_eq!(AuditChain::verify(&ResourceId::from("r1"), &restored), Ok(2));
        assert_eq!(restored[1].block_hash, records[1].block_hash);
    }

    #[test]
    fn test_negative_zero_sealed_as_zero() {
        let changes = json!({ "data.offset": { "old": -0.0, "new": [1, -0.0, { "x": -0.0 }] }, "count": 0 });
        let pending = PendingChange::new(ResourceId::from("r1"), ChangeOperation::Update, changes, "tester");
        let record = AuditChain::seal(pending, None, utc_now());

        let stored = json!({ "data.offset": { "old": 0.0, "new": [1, 0.0, { "x": 0.0 }] }, "count": 0 });
        assert_eq!(record.changes, stored);

        let mut reloaded = record.clone();
        reloaded.changes = stored;
        assert_eq!(reloaded.compute_hash(), record.block_hash);
        assert!(!record.changes["data.offset"]["old"].as_f64().unwrap().is_sign_negative());
    }

    #[test]
    fn test_block_hash_hex_round_trip() {
        let hash = chain("r1", 1)[0].block_hash;
        let parsed: BlockHash = hash.to_hex().parse().unwrap();
        assert_eq!(parsed, hash);
        assert!("abc".parse::<BlockHash>().is_err());
    }
}
