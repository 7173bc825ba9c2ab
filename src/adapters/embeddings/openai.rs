//! OpenAI embedding provider adapter.
//!
//! Talks to the `/v1/embeddings` endpoint of OpenAI or any compatible
//! server (Azure OpenAI, local inference servers). Transient failures
//! (network errors, 429 and 5xx responses) are retried with exponential
//! backoff.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::EmbeddingConfig;
use crate::domain::ports::embedding::{EmbeddingInput, EmbeddingOutput, EmbeddingProvider};

/// Configuration for the OpenAI embedding provider.
#[derive(Debug, Clone)]
pub struct OpenAiEmbeddingConfig {
    /// API key. Falls back to `OPENAI_API_KEY` env var.
    pub api_key: Option<String>,
    /// Base URL for the API. Default: `https://api.openai.com/v1`.
    pub base_url: String,
    /// Embedding model. Default: `text-embedding-3-small`.
    pub model: String,
    /// Expected embedding dimension. Default: 1536.
    pub dimension: usize,
    /// Request timeout in seconds. Default: 30.
    pub timeout_secs: u64,
    /// Maximum texts per single API request. Default: 2048.
    pub max_batch_size: usize,
    /// Retries after the first attempt for transient failures. Default: 3.
    pub max_retries: u32,
    /// First backoff interval in milliseconds. Default: 500.
    pub initial_backoff_ms: u64,
}

impl Default for OpenAiEmbeddingConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimension: 1536,
            timeout_secs: 30,
            max_batch_size: 2048,
            max_retries: 3,
            initial_backoff_ms: 500,
        }
    }
}

impl OpenAiEmbeddingConfig {
    /// Build from the `embedding` config section and the run's model choice.
    pub fn from_settings(settings: &EmbeddingConfig, model: &str) -> Self {
        Self {
            api_key: settings.resolve_api_key(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            dimension: settings.dimension,
            timeout_secs: settings.timeout_secs,
            max_batch_size: settings.max_batch_size,
            max_retries: settings.max_retries,
            ..Default::default()
        }
    }

    fn get_api_key(&self) -> DomainResult<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                DomainError::EmbeddingUnavailable(
                    "OpenAI API key not set. Set OPENAI_API_KEY env var or configure embedding.api_key."
                        .to_string(),
                )
            })
    }
}

/// OpenAI embedding provider.
pub struct OpenAiEmbeddingProvider {
    config: OpenAiEmbeddingConfig,
    client: Arc<reqwest::Client>,
}

impl OpenAiEmbeddingProvider {
    pub fn new(config: OpenAiEmbeddingConfig) -> DomainResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                DomainError::EmbeddingUnavailable(format!("Failed to build HTTP client: {e}"))
            })?;
        Ok(Self {
            config,
            client: Arc::new(client),
        })
    }

    async fn call_embeddings_api(&self, texts: &[String]) -> DomainResult<Vec<Vec<f32>>> {
        let api_key = self.config.get_api_key()?;
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(self.config.initial_backoff_ms.max(1)))
            .with_max_elapsed_time(Some(Duration::from_secs(self.config.timeout_secs * 4)))
            .build();

        let max_retries = self.config.max_retries;
        let mut attempt = 0u32;
        backoff::future::retry(policy, || {
            attempt += 1;
            let this_attempt = attempt;
            let api_key = api_key.as_str();
            async move {
                match self.request_once(api_key, texts).await {
                    Err(backoff::Error::Transient { err, .. }) if this_attempt > max_retries => {
                        Err(backoff::Error::permanent(err))
                    }
                    Err(backoff::Error::Transient { err, retry_after }) => {
                        debug!(attempt = this_attempt, error = %err, "retrying embedding request");
                        Err(backoff::Error::Transient { err, retry_after })
                    }
                    other => other,
                }
            }
        })
        .await
    }

    async fn request_once(
        &self,
        api_key: &str,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>, backoff::Error<DomainError>> {
        let url = format!("{}/embeddings", self.config.base_url);
        let request_body = EmbeddingsRequest {
            model: &self.config.model,
            input: texts,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                backoff::Error::transient(DomainError::EmbeddingUnavailable(format!(
                    "Embedding API request failed: {e}"
                )))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read response body".to_string());
            let err = DomainError::EmbeddingUnavailable(format!(
                "Embedding API returned {status}: {body}"
            ));
            return Err(if status.as_u16() == 429 || status.is_server_error() {
                backoff::Error::transient(err)
            } else {
                backoff::Error::permanent(err)
            });
        }

        let result: EmbeddingsResponse = response.json().await.map_err(|e| {
            backoff::Error::permanent(DomainError::SerializationError(format!(
                "Failed to parse embedding response: {e}"
            )))
        })?;

        if result.data.len() != texts.len() {
            return Err(backoff::Error::permanent(DomainError::EmbeddingUnavailable(
                format!(
                    "Embedding API returned {} vectors for {} inputs",
                    result.data.len(),
                    texts.len()
                ),
            )));
        }

        // Sort by index to maintain input order
        let mut data = result.data;
        data.sort_by_key(|d| d.index);

        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    async fn embed(&self, text: &str) -> DomainResult<Vec<f32>> {
        let results = self.call_embeddings_api(&[text.to_string()]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| DomainError::EmbeddingUnavailable("Empty embedding response".to_string()))
    }

    async fn embed_batch(&self, inputs: &[EmbeddingInput]) -> DomainResult<Vec<EmbeddingOutput>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let mut all_outputs = Vec::with_capacity(inputs.len());
        for chunk in inputs.chunks(self.config.max_batch_size.max(1)) {
            let texts: Vec<String> = chunk.iter().map(|i| i.text.clone()).collect();
            let vectors = self.call_embeddings_api(&texts).await?;

            for (input, vector) in chunk.iter().zip(vectors) {
                all_outputs.push(EmbeddingOutput {
                    id: input.id.clone(),
                    vector,
                });
            }
        }

        Ok(all_outputs)
    }

    fn max_batch_size(&self) -> usize {
        self.config.max_batch_size
    }
}

// -- OpenAI API request/response types --

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}
