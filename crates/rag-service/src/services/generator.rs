use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::utils::error::ApiError;

/// Capability boundary to the external generation model. One synchronous
/// call per request; the model id is chosen per intent by the caller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GeneratorProvider: Send + Sync {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        model_id: &str,
    ) -> Result<String, ApiError>;
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<RequestMessage>,
    max_tokens: usize,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct RequestMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

pub struct HttpGeneratorClient {
    client: Client,
    base_url: String,
    max_tokens: usize,
}

const MAX_RETRIES: u32 = 2;

impl HttpGeneratorClient {
    pub fn new(llm: &LlmConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(llm.generation_timeout_seconds))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: llm.generation_base_url.clone(),
            max_tokens: llm.max_tokens,
        }
    }
}

#[async_trait]
impl GeneratorProvider for HttpGeneratorClient {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        model_id: &str,
    ) -> Result<String, ApiError> {
        debug!("Generating with model {}", model_id);

        let request = ChatCompletionRequest {
            model: model_id.to_string(),
            messages: vec![
                RequestMessage {
                    role: "system",
                    content: system_prompt.to_string(),
                },
                RequestMessage {
                    role: "user",
                    content: user_prompt.to_string(),
                },
            ],
            max_tokens: self.max_tokens,
            temperature: 0.7,
            stream: false,
        };
        let url = format!("{}/v1/chat/completions", self.base_url);

        let mut attempt = 0;
        let response = loop {
            match self.client.post(&url).json(&request).send().await {
                Ok(resp) => break resp,
                Err(e) if attempt < MAX_RETRIES => {
                    let delay = Duration::from_millis(500 * 2u64.pow(attempt));
                    warn!(
                        "Generation request failed (attempt {}): {}; retrying in {:?}",
                        attempt + 1,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(ApiError::GenerationFailed(e.to_string())),
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::GenerationFailed(format!(
                "generation API error ({}): {}",
                status, body
            )));
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ApiError::GenerationFailed(format!("bad generation response: {}", e)))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.is_empty())
            .ok_or_else(|| ApiError::GenerationFailed("empty completion".to_string()))
    }
}
