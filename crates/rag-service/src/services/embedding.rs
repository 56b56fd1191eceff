use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::config::ModelsConfig;
use crate::utils::error::ApiError;
use crate::utils::similarity::normalize;

/// Capability boundary to the external embedding model. Vectors come back
/// unit-norm with a constant dimension.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ApiError>;
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    input: Vec<String>,
    model: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

pub struct HttpEmbeddingClient {
    client: Client,
    base_url: String,
    model: String,
    dimension: usize,
    cache: RwLock<HashMap<String, Vec<f32>>>,
}

const MAX_RETRIES: u32 = 2;

impl HttpEmbeddingClient {
    pub fn new(llm: &LlmConfig, models: &ModelsConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(llm.embedding_timeout_seconds))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: llm.embedding_base_url.clone(),
            model: models.embedding_model.clone(),
            dimension: llm.embedding_dimension,
            cache: RwLock::new(HashMap::new()),
        }
    }

    async fn embed_uncached(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        let request = EmbeddingRequest {
            input: texts.to_vec(),
            model: self.model.clone(),
        };
        let url = format!("{}/v1/embeddings", self.base_url);

        let mut attempt = 0;
        let response = loop {
            match self.client.post(&url).json(&request).send().await {
                Ok(resp) => break resp,
                Err(e) if attempt < MAX_RETRIES => {
                    let delay = Duration::from_millis(250 * 2u64.pow(attempt));
                    warn!(
                        "Embedding request failed (attempt {}): {}; retrying in {:?}",
                        attempt + 1,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(ApiError::EmbeddingFailed(e.to_string())),
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::EmbeddingFailed(format!(
                "embedding API error ({}): {}",
                status, body
            )));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| ApiError::EmbeddingFailed(format!("bad embedding response: {}", e)))?;

        if body.data.len() != texts.len() {
            return Err(ApiError::EmbeddingFailed(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                body.data.len()
            )));
        }

        let mut out = Vec::with_capacity(body.data.len());
        for data in body.data {
            let mut v = data.embedding;
            if v.len() != self.dimension {
                return Err(ApiError::EmbeddingFailed(format!(
                    "embedding dimension mismatch: expected {}, got {}",
                    self.dimension,
                    v.len()
                )));
            }
            normalize(&mut v);
            out.push(v);
        }
        Ok(out)
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut misses = Vec::new();
        {
            let cache = self.cache.read();
            for (i, text) in texts.iter().enumerate() {
                match cache.get(text) {
                    Some(v) => results[i] = Some(v.clone()),
                    None => misses.push(i),
                }
            }
        }

        if !misses.is_empty() {
            debug!(
                "Embedding {} text(s) ({} cache hit(s))",
                misses.len(),
                texts.len() - misses.len()
            );
            let miss_texts: Vec<String> = misses.iter().map(|&i| texts[i].clone()).collect();
            let fresh = self.embed_uncached(&miss_texts).await?;

            let mut cache = self.cache.write();
            for (&i, v) in misses.iter().zip(fresh.into_iter()) {
                cache.insert(texts[i].clone(), v.clone());
                results[i] = Some(v);
            }
        }

        Ok(results.into_iter().map(|v| v.unwrap_or_default()).collect())
    }
}
