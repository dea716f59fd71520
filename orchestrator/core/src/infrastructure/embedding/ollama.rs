// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Ollama embedding adapter.
//!
//! Translates resource content into a request against Ollama's
//! `/api/embeddings` endpoint, for deployments that run local models.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::content_tokens;
use crate::domain::embedding::{EmbeddingError, EmbeddingPort};
use crate::domain::resource::Payload;

pub struct OllamaEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: String,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedder {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Result<Self, EmbeddingError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EmbeddingError::Unavailable(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
        })
    }

    /// One `path=value` line per content attribute.
    fn prompt(content: &Payload) -> String {
        content_tokens(content).join("\n")
    }
}

#[async_trait]
impl EmbeddingPort for OllamaEmbedder {
    async fn generate_vector(&self, content: &Payload, _metadata: &Payload) -> Result<Vec<f32>, EmbeddingError> {
        let request = EmbeddingRequest {
            model: &self.model,
            prompt: Self::prompt(content),
        };

        let url = format!("{}/api/embeddings", self.endpoint.trim_end_matches('/'));
        debug!(url = %url, model = %self.model, "Requesting embedding");

        let response = self.client.post(&url).json(&request).send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                EmbeddingError::Unavailable(e.to_string())
            } else {
                EmbeddingError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(if status.is_server_error() {
                EmbeddingError::Unavailable(format!("HTTP {}: {}", status, error_text))
            } else if status == reqwest::StatusCode::NOT_FOUND {
                EmbeddingError::InvalidResponse(format!("model '{}' not found", self.model))
            } else {
                EmbeddingError::InvalidResponse(format!("HTTP {}: {}", status, error_text))
            });
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        Ok(body.embedding)
    }
}
