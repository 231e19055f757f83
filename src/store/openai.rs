//! OpenAI-compatible embeddings client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Embedder, StoreError};
use crate::config::EmbeddingsConfig;
use crate::utils::HttpClient;

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

/// Calls `POST {api_base}/embeddings`
#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    client: HttpClient,
    api_base: String,
    api_key: String,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(
        client: HttpClient,
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// Build from config. A key is required.
    pub fn from_config(client: HttpClient, config: &EmbeddingsConfig) -> Result<Self, StoreError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                StoreError::Config(
                    "no embeddings API key; set OPENAI_API_KEY or embeddings.api_key".to_string(),
                )
            })?;
        Ok(Self::new(client, &config.api_base, api_key, &config.model))
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed_documents(&self, documents: &[String]) -> Result<Vec<Vec<f32>>, StoreError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embeddings", self.api_base);
        tracing::debug!(model = %self.model, count = documents.len(), "Requesting embeddings");

        let response = self
            .client
            .client()
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: documents,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StoreError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let mut body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;
        body.data.sort_by_key(|d| d.index);
        Ok(body.data.into_iter().map(|d| d.embedding).collect())
    }
}
