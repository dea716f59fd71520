// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Resource Aggregate
//!
//! A [`Resource`] is one catalogued cloud object (VM, bucket, subnet, ...) as
//! reported by a provider discovery adapter. The provider's native shape lives
//! in the open [`Payload`] maps; only identity and classification are typed.
//!
//! ## Read Models
//!
//! [`Resource`] owns the embedding vector and is deliberately not
//! `Serialize`. Everything that leaves the engine goes through
//! [`ResourceView`], which carries a `vectorized` flag instead of the vector.
//!
//! ## Graph Hints
//!
//! `parent_id`, `children` and `links` are weak references: ids only, never
//! ownership. Removing a resource does not touch the resources it points at.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Open, schema-less key/value container used for `data`, IAM hints and
/// custom metadata.
pub type Payload = serde_json::Map<String, Value>;

/// Fields whose change invalidates the stored embedding.
pub const VECTORIZABLE_FIELDS: &[&str] = &["type", "provider", "region", "name", "tags"];

/// Current UTC time truncated to microseconds.
///
/// Every timestamp the engine writes goes through here so that stores with
/// microsecond resolution (PostgreSQL `timestamptz`) round-trip it exactly.
pub fn utc_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

// ============================================================================
// Value Objects
// ============================================================================

/// Globally unique resource identifier. Immutable once assigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// System-generated id for inputs that arrive without one.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ResourceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Lifecycle of a single resource:
/// `Unvectorized -> Active <-> Active(updated) -> Deleted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Persisted without an embedding (explicitly recorded in its audit chain)
    Unvectorized,
    /// Persisted with an embedding of the store's dimensionality
    Active,
    /// Terminal. Only visible under the logical deletion policy.
    Deleted,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unvectorized => "unvectorized",
            Self::Active => "active",
            Self::Deleted => "deleted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "unvectorized" => Some(Self::Unvectorized),
            "active" => Some(Self::Active),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }

    pub fn is_live(&self) -> bool {
        !matches!(self, Self::Deleted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkDirection {
    Outbound,
    Inbound,
}

/// Typed, directed relation to another resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLink {
    /// Relation name, e.g. `attached_to`, `routes_through`
    pub kind: String,
    pub target: ResourceId,
    pub direction: LinkDirection,
    #[serde(default)]
    pub properties: Payload,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_by: Option<String>,

    /// IAM hints (owning account, roles, policies) as reported by the provider
    #[serde(default)]
    pub iam: Payload,

    #[serde(default)]
    pub custom: Payload,
}

// ============================================================================
// Aggregate
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: ResourceId,
    pub resource_type: String,
    pub provider: String,
    pub region: String,
    pub name: String,
    pub data: Payload,
    pub tags: BTreeMap<String, String>,
    pub metadata: ResourceMetadata,
    pub parent_id: Option<ResourceId>,
    pub children: BTreeSet<ResourceId>,
    pub links: Vec<ResourceLink>,
    pub state: LifecycleState,
    pub vector: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_scanned_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Resource {
    /// Build a new, not yet vectorized resource from a create request.
    pub fn from_input(input: ResourceInput, actor: &str, now: DateTime<Utc>) -> Self {
        let mut metadata = input.metadata;
        metadata.created_by = Some(actor.to_string());
        metadata.modified_by = Some(actor.to_string());

        Self {
            id: input.id.unwrap_or_else(ResourceId::generate),
            resource_type: input.resource_type,
            provider: input.provider,
            region: input.region,
            name: input.name,
            data: input.data,
            tags: input.tags,
            metadata,
            parent_id: input.parent_id,
            children: input.children,
            links: input.links,
            state: LifecycleState::Unvectorized,
            vector: None,
            created_at: now,
            updated_at: now,
            last_scanned_at: input.last_scanned_at.map(|ts| ts.trunc_subsecs(6)),
            deleted_at: None,
        }
    }

    /// Attach an embedding and move to `Active`.
    pub fn attach_vector(&mut self, vector: Vec<f32>) {
        self.vector = Some(vector);
        self.state = LifecycleState::Active;
    }

    /// Drop the embedding and move back to `Unvectorized`.
    pub fn detach_vector(&mut self) {
        self.vector = None;
        self.state = LifecycleState::Unvectorized;
    }

    pub fn mark_deleted(&mut self, actor: &str, now: DateTime<Utc>) {
        self.state = LifecycleState::Deleted;
        self.deleted_at = Some(now);
        self.updated_at = now;
        self.metadata.modified_by = Some(actor.to_string());
    }

    pub fn is_live(&self) -> bool {
        self.state.is_live()
    }

    /// Apply a patch in place and return what actually changed.
    ///
    /// `data` is merged key by key (a JSON `null` removes the key); every
    /// other present field replaces the current value. Bookkeeping fields
    /// (`updated_at`, `metadata.modified_by`) are only touched when the diff
    /// is non-empty.
    pub fn apply_patch(&mut self, patch: ResourcePatch, actor: &str, now: DateTime<Utc>) -> ResourceDiff {
        let mut diff = ResourceDiff::default();

        if let Some(name) = patch.name {
            diff.record("name", json!(self.name), json!(name));
            self.name = name;
        }

        if let Some(region) = patch.region {
            diff.record("region", json!(self.region), json!(region));
            self.region = region;
        }

        if let Some(data) = patch.data {
            for (key, value) in data {
                let field = format!("data.{}", key);
                let old = self.data.get(&key).cloned().unwrap_or(Value::Null);
                if value.is_null() {
                    self.data.remove(&key);
                } else {
                    self.data.insert(key, value.clone());
                }
                diff.record(&field, old, value);
            }
        }

        if let Some(tags) = patch.tags {
            diff.record("tags", json!(self.tags), json!(tags));
            self.tags = tags;
        }

        if let Some(parent_id) = patch.parent_id {
            diff.record("parent_id", json!(self.parent_id), json!(parent_id));
            self.parent_id = parent_id;
        }

        if let Some(children) = patch.children {
            diff.record("children", json!(self.children), json!(children));
            self.children = children;
        }

        if let Some(links) = patch.links {
            diff.record("links", json!(self.links), json!(links));
            self.links = links;
        }

        if let Some(iam) = patch.iam {
            diff.record("metadata.iam", Value::Object(self.metadata.iam.clone()), Value::Object(iam.clone()));
            self.metadata.iam = iam;
        }

        if let Some(custom) = patch.custom {
            diff.record("metadata.custom", Value::Object(self.metadata.custom.clone()), Value::Object(custom.clone()));
            self.metadata.custom = custom;
        }

        if let Some(scanned) = patch.last_scanned_at {
            let scanned = scanned.trunc_subsecs(6);
            diff.record("last_scanned_at", json!(self.last_scanned_at), json!(scanned));
            self.last_scanned_at = Some(scanned);
        }

        if !diff.is_empty() {
            self.updated_at = now;
            self.metadata.modified_by = Some(actor.to_string());
        }

        diff
    }

    /// The two maps handed to the embedding port: vectorizable content and
    /// identifying metadata.
    pub fn embedding_input(&self) -> (Payload, Payload) {
        let mut content = Payload::new();
        content.insert("type".to_string(), json!(self.resource_type));
        content.insert("provider".to_string(), json!(self.provider));
        content.insert("region".to_string(), json!(self.region));
        content.insert("name".to_string(), json!(self.name));
        content.insert("data".to_string(), Value::Object(self.data.clone()));
        content.insert("tags".to_string(), json!(self.tags));

        let mut metadata = Payload::new();
        metadata.insert("id".to_string(), json!(self.id));
        if let Some(parent) = &self.parent_id {
            metadata.insert("parent_id".to_string(), json!(parent));
        }
        if !self.metadata.custom.is_empty() {
            metadata.insert("custom".to_string(), Value::Object(self.metadata.custom.clone()));
        }

        (content, metadata)
    }

    /// Client-facing read model. The vector never leaves through here.
    pub fn view(&self) -> ResourceView {
        ResourceView {
            id: self.id.clone(),
            resource_type: self.resource_type.clone(),
            provider: self.provider.clone(),
            region: self.region.clone(),
            name: self.name.clone(),
            data: self.data.clone(),
            tags: self.tags.clone(),
            metadata: self.metadata.clone(),
            parent_id: self.parent_id.clone(),
            children: self.children.clone(),
            links: self.links.clone(),
            state: self.state,
            vectorized: self.vector.is_some(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            last_scanned_at: self.last_scanned_at,
        }
    }

    /// Full snapshot recorded as the `changes` payload of create and delete
    /// records.
    pub fn snapshot(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self.view())
    }
}

/// Resource as returned to callers: every field except the embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceView {
    pub id: ResourceId,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub provider: String,
    pub region: String,
    pub name: String,
    pub data: Payload,
    pub tags: BTreeMap<String, String>,
    pub metadata: ResourceMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<ResourceId>,
    pub children: BTreeSet<ResourceId>,
    pub links: Vec<ResourceLink>,
    pub state: LifecycleState,
    pub vectorized: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_scanned_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Commands
// ============================================================================

/// Create request as supplied by the discovery layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceInput {
    #[serde(default)]
    pub id: Option<ResourceId>,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub provider: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub data: Payload,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub metadata: ResourceMetadata,
    #[serde(default)]
    pub parent_id: Option<ResourceId>,
    #[serde(default)]
    pub children: BTreeSet<ResourceId>,
    #[serde(default)]
    pub links: Vec<ResourceLink>,
    #[serde(default)]
    pub last_scanned_at: Option<DateTime<Utc>>,
}

impl ResourceInput {
    pub fn new(resource_type: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            provider: provider.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<ResourceId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// Partial update. Absent fields are left untouched; `id`, `type` and
/// `provider` cannot be patched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourcePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Merged into `data`; a `null` value removes the key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,
    /// `Some(None)` clears the parent
    #[serde(default, deserialize_with = "deserialize_present", skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Option<ResourceId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<BTreeSet<ResourceId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<ResourceLink>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iam: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_scanned_at: Option<DateTime<Utc>>,
}

impl ResourcePatch {
    pub fn set_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.get_or_insert_with(Payload::new).insert(key.into(), value);
        self
    }

    pub fn remove_data(self, key: impl Into<String>) -> Self {
        self.set_data(key, Value::Null)
    }

    pub fn set_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn set_tags(mut self, tags: BTreeMap<String, String>) -> Self {
        self.tags = Some(tags);
        self
    }
}

/// Distinguishes an explicit `null` (present, cleared) from an absent key.
fn deserialize_present<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

// ============================================================================
// Diff
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub old: Value,
    pub new: Value,
}

/// Field-level difference produced by [`Resource::apply_patch`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceDiff {
    entries: BTreeMap<String, FieldChange>,
}

impl ResourceDiff {
    fn record(&mut self, field: &str, old: Value, new: Value) {
        if old != new {
            self.entries.insert(field.to_string(), FieldChange { old, new });
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn get(&self, field: &str) -> Option<&FieldChange> {
        self.entries.get(field)
    }

    /// True when the stored embedding no longer describes the resource.
    pub fn touches_vectorizable_fields(&self) -> bool {
        self.entries
            .keys()
            .any(|field| field.starts_with("data.") || VECTORIZABLE_FIELDS.contains(&field.as_str()))
    }

    /// `{"field": {"old": .., "new": ..}}`, the `changes` payload of update
    /// records.
    pub fn to_changes(&self) -> Value {
        let map: Payload = self
            .entries
            .iter()
            .map(|(field, change)| {
                (field.clone(), json!({ "old": change.old, "new": change.new }))
            })
            .collect();
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vm() -> Resource {
        let input = ResourceInput::new("vm", "aws")
            .with_id("r1")
            .with_name("web-1")
            .with_region("us-east-1")
            .with_data("size", json!("t3.micro"))
            .with_tag("env", "prod");
        Resource::from_input(input, "scanner", utc_now())
    }

    #[test]
    fn test_from_input_generates_id_and_stamps_actor() {
        let resource = Resource::from_input(ResourceInput::new("bucket", "gcp"), "alice", utc_now());

        assert!(!resource.id.is_blank());
        assert_eq!(resource.state, LifecycleState::Unvectorized);
        assert_eq!(resource.metadata.created_by.as_deref(), Some("alice"));
        assert!(resource.vector.is_none());
    }

    #[test]
    fn test_patch_merges_data_and_reports_diff() {
        let mut resource = vm();
        let patch = ResourcePatch::default()
            .set_data("size", json!("t3.large"))
            .set_data("ami", json!("ami-123"));

        let diff = resource.apply_patch(patch, "bob", utc_now());

        assert_eq!(resource.data.get("size"), Some(&json!("t3.large")));
        assert_eq!(diff.get("data.size").unwrap().old, json!("t3.micro"));
        assert_eq!(diff.get("data.ami").unwrap().old, Value::Null);
        assert!(diff.touches_vectorizable_fields());
        assert_eq!(resource.metadata.modified_by.as_deref(), Some("bob"));
    }

    #[test]
    fn test_patch_null_removes_data_key() {
        let mut resource = vm();
        let diff = resource.apply_patch(ResourcePatch::default().remove_data("size"), "bob", utc_now());

        assert!(!resource.data.contains_key("size"));
        assert_eq!(diff.get("data.size").unwrap().new, Value::Null);
    }

    #[test]
    fn test_identical_patch_is_empty() {
        let mut resource = vm();
        let before = resource.updated_at;
        let diff = resource.apply_patch(
            ResourcePatch::default().set_data("size", json!("t3.micro")).set_name("web-1"),
            "bob",
            utc_now(),
        );

        assert!(diff.is_empty());
        assert_eq!(resource.updated_at, before);
        assert_eq!(resource.metadata.modified_by.as_deref(), Some("scanner"));
    }

    #[test]
    fn test_graph_hint_changes_do_not_invalidate_vector() {
        let mut resource = vm();
        let patch = ResourcePatch {
            parent_id: Some(Some(ResourceId::from("vpc-1"))),
            ..Default::default()
        };

        let diff = resource.apply_patch(patch, "bob", utc_now());

        assert!(!diff.is_empty());
        assert!(!diff.touches_vectorizable_fields());
    }

    #[test]
    fn test_patch_parent_null_clears() {
        let patch: ResourcePatch = serde_json::from_value(json!({ "parent_id": null })).unwrap();
        assert_eq!(patch.parent_id, Some(None));

        let absent: ResourcePatch = serde_json::from_value(json!({})).unwrap();
        assert_eq!(absent.parent_id, None);
    }

    #[test]
    fn test_view_hides_vector() {
        let mut resource = vm();
        resource.attach_vector(vec![0.1, 0.2]);

        let json = serde_json::to_value(resource.view()).unwrap();
        assert!(json.get("vector").is_none());
        assert_eq!(json["vectorized"], json!(true));
        assert_eq!(json["type"], json!("vm"));
    }
}
