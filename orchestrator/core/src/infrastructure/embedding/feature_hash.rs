// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Feature-hashing embedder.
//!
//! Each content token (`path=value`, plus the lowercase words of string
//! values) is hashed with SHA-256 into one signed bucket of the output
//! vector, which is then L2-normalised. Resources sharing many attributes
//! end up close under cosine distance. Needs no network and always returns
//! the same vector for the same content.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::content_tokens;
use crate::domain::embedding::{EmbeddingError, EmbeddingPort};
use crate::domain::resource::Payload;

pub const DEFAULT_DIMENSIONS: usize = 384;

#[derive(Debug, Clone)]
pub struct FeatureHashEmbedder {
    dimensions: usize,
}

impl FeatureHashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn features(content: &Payload) -> Vec<String> {
        let mut features = Vec::new();
        for token in content_tokens(content) {
            if let Some((_, value)) = token.split_once('=') {
                features.extend(
                    value
                        .split(|c: char| !c.is_alphanumeric())
                        .filter(|word| word.len() > 1)
                        .map(|word| format!("~{}", word.to_lowercase())),
                );
            }
            features.push(token);
        }
        features
    }

    pub fn embed(&self, content: &Payload) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        if self.dimensions == 0 {
            return vector;
        }

        for feature in Self::features(content) {
            let digest = Sha256::digest(feature.as_bytes());
            let mut index_bytes = [0u8; 8];
            index_bytes.copy_from_slice(&digest[..8]);
            let index = (u64::from_le_bytes(index_bytes) % self.dimensions as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl Default for FeatureHashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

#[async_trait]
impl EmbeddingPort for FeatureHashEmbedder {
    async fn generate_vector(&self, content: &Payload, _metadata: &Payload) -> Result<Vec<f32>, EmbeddingError> {
        if self.dimensions == 0 {
            return Err(EmbeddingError::InvalidVector("embedder configured with 0 dimensions".to_string()));
        }
        Ok(self.embed(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::similarity::cosine_distance;
    use serde_json::{json, Value};

    fn payload(value: Value) -> Payload {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[tokio::test]
    async fn test_dimensions_and_norm() {
        let embedder = FeatureHashEmbedder::default();
        let vector = embedder
            .generate_vector(&payload(json!({ "type": "vm", "provider": "aws" })), &Payload::new())
            .await
            .unwrap();

        assert_eq!(vector.len(), 384);
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_deterministic_and_ignores_metadata() {
        let embedder = FeatureHashEmbedder::new(64);
        let content = payload(json!({ "type": "vm", "data": { "size": "t3.micro" } }));

        let a = embedder.generate_vector(&content, &payload(json!({ "id": "a" }))).await.unwrap();
        let b = embedder.generate_vector(&content, &payload(json!({ "id": "b" }))).await.unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_similar_content_is_closer() {
        let embedder = FeatureHashEmbedder::default();
        let base = embedder.embed(&payload(json!({
            "type": "vm", "provider": "aws", "region": "us-east-1", "name": "web-server-1"
        })));
        let sibling = embedder.embed(&payload(json!({
            "type": "vm", "provider": "aws", "region": "us-east-1", "name": "web-server-2"
        })));
        let unrelated = embedder.embed(&payload(json!({
            "type": "bucket", "provider": "gcp", "region": "europe-west4", "name": "backups"
        })));

        assert!(cosine_distance(&base, &sibling) < cosine_distance(&base, &unrelated));
    }

    #[tokio::test]
    async fn test_zero_dimensions_rejected() {
        let embedder = FeatureHashEmbedder::new(0);
        let result = embedder.generate_vector(&Payload::new(), &Payload::new()).await;
        assert!(matches!(result, Err(EmbeddingError::InvalidVector(_))));
    }
}
