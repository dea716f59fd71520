// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Resource Validation
//!
//! Structural checks that run before a resource touches any store. The
//! validator is a pure function of the resource and the schema registry:
//! no I/O, no clock, no mutation.
//!
//! | Check | Error |
//! |-------|-------|
//! | `id`, `type`, `provider` non-empty | [`ValidationError::MissingField`] |
//! | registered schema: required fields present | [`ValidationError::SchemaMismatch`] |
//! | registered schema: field kinds match | [`ValidationError::SchemaMismatch`] |
//! | graph hints never point at the resource itself | [`ValidationError::SelfReference`] |

use crate::domain::resource::Resource;
use crate::domain::schema::{resolve_path, FieldKind, SchemaRegistry};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MismatchReason {
    Missing,
    WrongKind { expected: FieldKind, found: Option<FieldKind> },
}

impl std::fmt::Display for MismatchReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing => f.write_str("required field is absent"),
            Self::WrongKind { expected, found: Some(found) } => {
                write!(f, "expected {}, found {}", expected, found)
            }
            Self::WrongKind { expected, found: None } => write!(f, "expected {}, found null", expected),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required field '{field}'")]
    MissingField { field: &'static str },

    #[error("schema mismatch for {provider}/{resource_type} at 'data.{field}': {reason}")]
    SchemaMismatch {
        provider: String,
        resource_type: String,
        field: String,
        reason: MismatchReason,
    },

    #[error("field '{field}' references the resource itself")]
    SelfReference { field: &'static str },

    #[error("invalid argument '{parameter}': {reason}")]
    InvalidArgument { parameter: &'static str, reason: String },
}

impl ValidationError {
    /// Name of the offending field or parameter.
    pub fn field(&self) -> String {
        match self {
            Self::MissingField { field } | Self::SelfReference { field } => field.to_string(),
            Self::SchemaMismatch { field, .. } => format!("data.{}", field),
            Self::InvalidArgument { parameter, .. } => parameter.to_string(),
        }
    }
}

/// Validate a resource against the structural invariants and, when one is
/// registered for its `(provider, type)`, its schema.
pub fn validate(resource: &Resource, schemas: &SchemaRegistry) -> Result<(), ValidationError> {
    if resource.id.is_blank() {
        return Err(ValidationError::MissingField { field: "id" });
    }
    if resource.resource_type.trim().is_empty() {
        return Err(ValidationError::MissingField { field: "type" });
    }
    if resource.provider.trim().is_empty() {
        return Err(ValidationError::MissingField { field: "provider" });
    }

    if resource.parent_id.as_ref() == Some(&resource.id) {
        return Err(ValidationError::SelfReference { field: "parent_id" });
    }
    if resource.children.contains(&resource.id) {
        return Err(ValidationError::SelfReference { field: "children" });
    }
    if resource.links.iter().any(|link| link.target == resource.id) {
        return Err(ValidationError::SelfReference { field: "links" });
    }

    let Some(schema) = schemas.lookup(&resource.provider, &resource.resource_type) else {
        return Ok(());
    };

    let mismatch = |field: &str, reason: MismatchReason| ValidationError::SchemaMismatch {
        provider: resource.provider.clone(),
        resource_type: resource.resource_type.clone(),
        field: field.to_string(),
        reason,
    };

    for field in &schema.required_fields {
        match resolve_path(&resource.data, field) {
            None | Some(serde_json::Value::Null) => return Err(mismatch(field, MismatchReason::Missing)),
            Some(_) => {}
        }
    }

    for (field, expected) in &schema.field_kinds {
        if let Some(value) = resolve_path(&resource.data, field) {
            let found = FieldKind::of(value);
            if found != Some(*expected) {
                return Err(mismatch(field, MismatchReason::WrongKind { expected: *expected, found }));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::resource::{utc_now, ResourceInput, ResourceId, ResourceLink, LinkDirection, Payload};
    use crate::domain::schema::ResourceSchema;
    use serde_json::json;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::from_schemas([ResourceSchema::new("aws", "vm")
            .require("size")
            .require("network.vpc_id")
            .expect_kind("size", FieldKind::String)
            .expect_kind("cpus", FieldKind::Number)])
    }

    fn resource(input: ResourceInput) -> Resource {
        Resource::from_input(input, "tester", utc_now())
    }

    #[test]
    fn test_missing_identity_fields() {
        let schemas = SchemaRegistry::new();

        let no_type = resource(ResourceInput::new("", "aws").with_id("r1"));
        assert_eq!(validate(&no_type, &schemas), Err(ValidationError::MissingField { field: "type" }));

        let no_provider = resource(ResourceInput::new("vm", " ").with_id("r1"));
        assert_eq!(validate(&no_provider, &schemas), Err(ValidationError::MissingField { field: "provider" }));

        let no_id = resource(ResourceInput::new("vm", "aws").with_id(""));
        assert_eq!(validate(&no_id, &schemas), Err(ValidationError::MissingField { field: "id" }));
    }

    #[test]
    fn test_unregistered_pair_skips_schema_checks() {
        let r = resource(ResourceInput::new("bucket", "aws").with_id("b1"));
        assert!(validate(&r, &registry()).is_ok());
    }

    #[test]
    fn test_required_field_absent() {
        let r = resource(
            ResourceInput::new("vm", "aws")
                .with_id("r1")
                .with_data("network", json!({ "vpc_id": "vpc-1" })),
        );

        let err = validate(&r, &registry()).unwrap_err();
        assert_eq!(err.field(), "data.size");
        assert!(matches!(err, ValidationError::SchemaMismatch { reason: MismatchReason::Missing, .. }));
    }

    #[test]
    fn test_nested_required_field() {
        let r = resource(
            ResourceInput::new("vm", "aws")
                .with_id("r1")
                .with_data("size", json!("t3.micro"))
                .with_data("network", json!({ "subnet": "s-1" })),
        );

        let err = validate(&r, &registry()).unwrap_err();
        assert_eq!(err.field(), "data.network.vpc_id");
    }

    #[test]
    fn test_wrong_kind() {
        let r = resource(
            ResourceInput::new("vm", "aws")
                .with_id("r1")
                .with_data("size", json!("t3.micro"))
                .with_data("cpus", json!("two"))
                .with_data("network", json!({ "vpc_id": "vpc-1" })),
        );

        let err = validate(&r, &registry()).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::SchemaMismatch {
                reason: MismatchReason::WrongKind { expected: FieldKind::Number, found: Some(FieldKind::String) },
                ..
            }
        ));
    }

    #[test]
    fn test_self_reference_rejected() {
        let mut r = resource(ResourceInput::new("vm", "aws").with_id("r1"));
        r.links.push(ResourceLink {
            kind: "attached_to".to_string(),
            target: ResourceId::from("r1"),
            direction: LinkDirection::Outbound,
            properties: Payload::new(),
        });

        assert_eq!(validate(&r, &SchemaRegistry::new()), Err(ValidationError::SelfReference { field: "links" }));
    }

    #[test]
    fn test_validate_is_pure() {
        let r = resource(ResourceInput::new("vm", "aws").with_id("r1"));
        let schemas = registry();
        let before = r.clone();

        let first = validate(&r, &schemas);
        let second = validate(&r, &schemas);

        assert_eq!(first, second);
        assert_eq!(r, before);
    }
}
