//! Provider used when a run goes without text embeddings.
//!
//! Its zero dimension makes the pipeline omit the embedding segment of
//! every feature vector. It remembers why embeddings are off so the run
//! log can say so.

use std::fmt;

use async_trait::async_trait;

use super::embedding::{EmbeddingInput, EmbeddingOutput, EmbeddingProvider};
use crate::domain::errors::{DomainError, DomainResult};

/// Why a run has no embedding backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingsDisabled {
    /// Turned off in configuration or with `--no-embeddings`.
    ByConfig,
    /// Enabled, but no API key could be resolved.
    MissingApiKey,
}

impl EmbeddingsDisabled {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ByConfig => "disabled",
            Self::MissingApiKey => "no-api-key",
        }
    }
}

impl fmt::Display for EmbeddingsDisabled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ByConfig => f.write_str("embeddings disabled by configuration"),
            Self::MissingApiKey => f.write_str("no embedding API key configured"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NullEmbeddingProvider {
    cause: EmbeddingsDisabled,
}

impl NullEmbeddingProvider {
    pub fn new(cause: EmbeddingsDisabled) -> Self {
        Self { cause }
    }

    pub fn cause(&self) -> EmbeddingsDisabled {
        self.cause
    }
}

#[async_trait]
impl EmbeddingProvider for NullEmbeddingProvider {
    fn name(&self) -> &'static str {
        self.cause.as_str()
    }

    fn model(&self) -> &str {
        "none"
    }

    fn dimension(&self) -> usize {
        0
    }

    async fn embed(&self, _text: &str) -> DomainResult<Vec<f32>> {
        Err(DomainError::EmbeddingUnavailable(self.cause.to_string()))
    }

    async fn embed_batch(&self, inputs: &[EmbeddingInput]) -> DomainResult<Vec<EmbeddingOutput>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        Err(DomainError::EmbeddingUnavailable(self.cause.to_string()))
    }

    fn max_batch_size(&self) -> usize {
        0
    }
}
