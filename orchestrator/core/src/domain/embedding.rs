// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Embedding Port
//!
//! Contract for turning resource content into a fixed-length vector. The
//! engine treats implementations as black boxes; the only hard requirement
//! (one dimensionality per store) is enforced by the store, not here.
//!
//! Implementations live in `crate::infrastructure::embedding`.

use crate::domain::resource::Payload;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EmbeddingError {
    #[error("embedding service unavailable: {0}")]
    Unavailable(String),

    #[error("embedding request failed: {0}")]
    Network(String),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("invalid embedding vector: {0}")]
    InvalidVector(String),
}

impl EmbeddingError {
    /// Transient failures are worth retrying by the caller; a malformed
    /// vector will come back malformed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidVector(_))
    }
}

#[async_trait]
pub trait EmbeddingPort: Send + Sync {
    /// Produce the vector for a resource's vectorizable `content`, with
    /// identifying `metadata` as context. Must not have other side effects.
    async fn generate_vector(&self, content: &Payload, metadata: &Payload) -> Result<Vec<f32>, EmbeddingError>;
}

/// What the engine does when the embedding port fails during a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingFailurePolicy {
    /// Abort the whole mutation; nothing is written
    #[default]
    Abort,
    /// Persist the resource as `Unvectorized` and record that in the chain
    MarkUnvectorized,
}

/// Reject vectors no store could rank: empty or containing NaN/inf.
pub fn check_vector(vector: &[f32]) -> Result<(), EmbeddingError> {
    if vector.is_empty() {
        return Err(EmbeddingError::InvalidVector("empty vector".to_string()));
    }
    if let Some(position) = vector.iter().position(|v| !v.is_finite()) {
        return Err(EmbeddingError::InvalidVector(format!(
            "non-finite component at position {}",
            position
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_vector() {
        assert!(check_vector(&[0.1, 0.2]).is_ok());
        assert!(matches!(check_vector(&[]), Err(EmbeddingError::InvalidVector(_))));
        assert!(matches!(check_vector(&[0.1, f32::NAN]), Err(EmbeddingError::InvalidVector(_))));
    }

    #[test]
    fn test_retryable() {
        assert!(EmbeddingError::Unavailable("down".into()).is_retryable());
        assert!(!EmbeddingError::InvalidVector("empty".into()).is_retryable());
    }
}
