// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Pure catalog model: resources, schemas, the audit chain, similarity
//! ranking and the ports implemented by infrastructure adapters.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Types, invariants and port traits; no I/O

pub mod resource;
pub mod schema;
pub mod validation;
pub mod embedding;
pub mod audit;
pub mod similarity;
pub mod repository;
pub mod events;
pub mod catalog_config;
