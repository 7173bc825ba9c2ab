//! Embedding service for trace text.
//!
//! Embeds the input/output text of every trace in a batch. Identical texts
//! are sent once, long texts are truncated, and large batches are chunked
//! to the provider's batch limit.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::Trace;
use crate::domain::ports::embedding::{EmbeddingInput, EmbeddingOutput, EmbeddingProvider};

/// Configuration for the embedding service.
#[derive(Debug, Clone)]
pub struct EmbeddingServiceConfig {
    /// Minimum number of items to use the provider's batch API.
    /// Below this threshold, items are embedded one by one.
    pub batch_threshold: usize,
    /// Texts longer than this many characters are truncated.
    pub max_text_chars: usize,
}

impl Default for EmbeddingServiceConfig {
    fn default() -> Self {
        Self {
            batch_threshold: 5,
            max_text_chars: 8000,
        }
    }
}

/// Report from a batch embedding operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchEmbeddingReport {
    /// Traces that received a vector.
    pub traces: usize,
    /// Distinct texts sent to the provider.
    pub unique_texts: usize,
    /// Number of provider calls made.
    pub api_calls: usize,
}

/// Embedding service that orchestrates embedding generation.
pub struct EmbeddingService {
    provider: Arc<dyn EmbeddingProvider>,
    config: EmbeddingServiceConfig,
}

impl EmbeddingService {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: EmbeddingServiceConfig) -> Self {
        Self { provider, config }
    }

    pub fn with_defaults(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self::new(provider, EmbeddingServiceConfig::default())
    }

    /// Provider name for diagnostics.
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Embedding dimension.
    pub fn dimension(&self) -> usize {
        self.provider.dimension()
    }

    /// Embed multiple texts, preserving input order.
    ///
    /// For small batches (below `batch_threshold`), embeds individually.
    /// For larger batches, uses the provider's batch API chunked to its limit.
    pub async fn embed_many(&self, inputs: &[EmbeddingInput]) -> DomainResult<Vec<EmbeddingOutput>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let max_size = self.provider.max_batch_size();
        if inputs.len() < self.config.batch_threshold || max_size == 0 {
            let mut outputs = Vec::with_capacity(inputs.len());
            for input in inputs {
                let vector = self.provider.embed(&input.text).await?;
                outputs.push(EmbeddingOutput {
                    id: input.id.clone(),
                    vector,
                });
            }
            return Ok(outputs);
        }

        let mut all_outputs = Vec::with_capacity(inputs.len());
        for chunk in inputs.chunks(max_size) {
            let chunk_outputs = self.provider.embed_batch(chunk).await?;
            if chunk_outputs.len() != chunk.len() {
                return Err(DomainError::EmbeddingUnavailable(format!(
                    "provider returned {} vectors for {} texts",
                    chunk_outputs.len(),
                    chunk.len()
                )));
            }
            all_outputs.extend(chunk_outputs);
        }

        Ok(all_outputs)
    }

    fn api_calls(&self, items: usize) -> usize {
        let max_size = self.provider.max_batch_size();
        if items < self.config.batch_threshold || max_size == 0 {
            items
        } else {
            items.div_ceil(max_size)
        }
    }

    /// Embed the text of every trace. The result maps trace id to vector.
    pub async fn embed_traces(
        &self,
        traces: &[Trace],
    ) -> DomainResult<(HashMap<String, Vec<f32>>, BatchEmbeddingReport)> {
        let mut text_ids: HashMap<String, String> = HashMap::new();
        let mut inputs = Vec::new();
        let mut trace_text: Vec<(&str, String)> = Vec::with_capacity(traces.len());

        for trace in traces {
            let text = truncate_chars(&trace.embedding_text(), self.config.max_text_chars);
            let id = match text_ids.get(&text) {
                Some(id) => id.clone(),
                None => {
                    let id = inputs.len().to_string();
                    text_ids.insert(text.clone(), id.clone());
                    inputs.push(EmbeddingInput {
                        id: id.clone(),
                        text,
                    });
                    id
                }
            };
            trace_text.push((trace.trace_id.as_str(), id));
        }

        let outputs = self.embed_many(&inputs).await?;
        let by_id: HashMap<String, Vec<f32>> =
            outputs.into_iter().map(|o| (o.id, o.vector)).collect();

        let mut vectors = HashMap::with_capacity(traces.len());
        for (trace_id, text_id) in trace_text {
            let vector = by_id.get(&text_id).ok_or_else(|| {
                DomainError::EmbeddingUnavailable(format!("no embedding returned for trace {trace_id}"))
            })?;
            vectors.insert(trace_id.to_string(), vector.clone());
        }

        let report = BatchEmbeddingReport {
            traces: vectors.len(),
            unique_texts: inputs.len(),
            api_calls: self.api_calls(inputs.len()),
        };
        debug!(
            provider = self.provider_name(),
            traces = report.traces,
            unique_texts = report.unique_texts,
            api_calls = report.api_calls,
            "embedded trace text"
        );
        Ok((vectors, report))
    }
}

/// First `max_chars` characters of `text`, never splitting a code point.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text.to_string(),
    }
}
