// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Lib
//!
//! Resource lifecycle and audit engine of the cloud resource catalog.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Domain model, lifecycle orchestration and storage adapters

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
