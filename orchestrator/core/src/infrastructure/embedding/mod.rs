// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Embedding Adapters
//!
//! Implementations of [`EmbeddingPort`](crate::domain::embedding::EmbeddingPort).
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Turn resource content into vectors
//!
//! | Adapter | Backend |
//! |---------|---------|
//! | [`FeatureHashEmbedder`] | offline, deterministic feature hashing |
//! | [`OllamaEmbedder`] | Ollama `/api/embeddings` over HTTP |

pub mod feature_hash;
pub mod ollama;

pub use feature_hash::FeatureHashEmbedder;
pub use ollama::OllamaEmbedder;

use crate::domain::resource::Payload;
use serde_json::Value;

/// Flatten content into sorted `path=value` tokens.
///
/// Nested objects extend the path with `.`; array elements share their
/// parent's path. Strings are rendered without quotes.
pub(crate) fn content_tokens(content: &Payload) -> Vec<String> {
    let mut tokens = Vec::new();
    for (key, value) in content {
        flatten(key, value, &mut tokens);
    }
    tokens.sort();
    tokens
}

fn flatten(path: &str, value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, item) in map {
                flatten(&format!("{}.{}", path, key), item, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                flatten(path, item, out);
            }
        }
        Value::String(s) => out.push(format!("{}={}", path, s)),
        Value::Null => {}
        scalar => out.push(format!("{}={}", path, scalar)),
    }
}
