// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Resource Schemas
//!
//! A [`ResourceSchema`] describes the expected shape of `data` for one
//! `(provider, type)` pair. Schemas are consumed, never written, by the
//! engine; they are loaded from the catalog configuration.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// JSON kind a schema may require for a data field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Number,
    Bool,
    Object,
    Array,
}

impl FieldKind {
    pub fn of(value: &Value) -> Option<Self> {
        match value {
            Value::String(_) => Some(Self::String),
            Value::Number(_) => Some(Self::Number),
            Value::Bool(_) => Some(Self::Bool),
            Value::Object(_) => Some(Self::Object),
            Value::Array(_) => Some(Self::Array),
            Value::Null => None,
        }
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Bool => "bool",
            Self::Object => "object",
            Self::Array => "array",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSchema {
    pub provider: String,

    #[serde(rename = "type")]
    pub resource_type: String,

    /// Dotted paths into `data` that must be present and non-null
    #[serde(default)]
    pub required_fields: Vec<String>,

    /// Expected JSON kind per dotted path, checked when the field is present
    #[serde(default)]
    pub field_kinds: BTreeMap<String, FieldKind>,
}

impl ResourceSchema {
    pub fn new(provider: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            resource_type: resource_type.into(),
            required_fields: Vec::new(),
            field_kinds: BTreeMap::new(),
        }
    }

    pub fn require(mut self, field: impl Into<String>) -> Self {
        self.required_fields.push(field.into());
        self
    }

    pub fn expect_kind(mut self, field: impl Into<String>, kind: FieldKind) -> Self {
        self.field_kinds.insert(field.into(), kind);
        self
    }
}

/// Registered schemas keyed by `(provider, type)`.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<(String, String), ResourceSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_schemas(schemas: impl IntoIterator<Item = ResourceSchema>) -> Self {
        let mut registry = Self::new();
        for schema in schemas {
            registry.register(schema);
        }
        registry
    }

    /// Register a schema, replacing any previous one for the same pair.
    pub fn register(&mut self, schema: ResourceSchema) {
        let key = (schema.provider.clone(), schema.resource_type.clone());
        self.schemas.insert(key, schema);
    }

    pub fn lookup(&self, provider: &str, resource_type: &str) -> Option<&ResourceSchema> {
        self.schemas.get(&(provider.to_string(), resource_type.to_string()))
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

/// Resolve a dotted path (`network.vpc_id`) inside a JSON object.
pub fn resolve_path<'a>(data: &'a serde_json::Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = data.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}
