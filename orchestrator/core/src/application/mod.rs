// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod lifecycle;
pub mod audit_trail;
pub mod repository_factory;

// Re-export use cases for convenience
pub use lifecycle::{
    ErrorKind, LifecycleError, LifecycleSettings, RequestContext, ResourceLifecycleService,
    StandardResourceLifecycleService,
};
pub use audit_trail::{AuditTrailService, ChainReport, ChainScope};
pub use repository_factory::{build_services, create_embedder, create_resource_store, CatalogServices, StoreHandles};
