//! Read-only batch statistics shared by every per-trace computation of a run.

use std::collections::HashMap;

use crate::domain::models::{DiscoveryConfig, Trace};
use crate::services::badness_scorer::LatencyBaseline;
use crate::services::feature_extractor::{ScalarMetrics, ToolVocabulary, SCALAR_FEATURE_COUNT};
use crate::services::statistics::ColumnStats;

/// Text embeddings for every trace of the batch, all of one dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingSegment {
    dimension: usize,
    vectors: HashMap<String, Vec<f64>>,
}

impl EmbeddingSegment {
    /// Build a segment, or `None` if any trace lacks a vector or the vectors
    /// disagree on their length. A run either embeds every trace or none.
    pub fn new(traces: &[Trace], vectors: HashMap<String, Vec<f32>>) -> Option<Self> {
        let dimension = traces
            .first()
            .and_then(|t| vectors.get(&t.trace_id))
            .map(Vec::len)?;
        if dimension == 0 {
            return None;
        }

        let mut converted = HashMap::with_capacity(traces.len());
        for trace in traces {
            let vector = vectors.get(&trace.trace_id)?;
            if vector.len() != dimension || vector.iter().any(|v| !v.is_finite()) {
                return None;
            }
            converted.insert(
                trace.trace_id.clone(),
                vector.iter().map(|v| f64::from(*v)).collect(),
            );
        }

        Some(Self {
            dimension,
            vectors: converted,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn get(&self, trace_id: &str) -> Option<&[f64]> {
        self.vectors.get(trace_id).map(Vec::as_slice)
    }
}

/// Statistics computed once over the whole validated batch.
///
/// Built before any per-trace work starts and never mutated afterwards, so it
/// can be shared by reference across worker threads.
#[derive(Debug, Clone)]
pub struct BatchContext {
    pub latency: LatencyBaseline,
    pub vocabulary: ToolVocabulary,
    pub scalar_stats: [ColumnStats; SCALAR_FEATURE_COUNT],
    pub embeddings: Option<EmbeddingSegment>,
}

impl BatchContext {
    pub fn build(
        traces: &[Trace],
        config: &DiscoveryConfig,
        embeddings: Option<EmbeddingSegment>,
    ) -> Self {
        let metrics: Vec<ScalarMetrics> = traces.iter().map(ScalarMetrics::from_trace).collect();
        let scalar_stats = std::array::from_fn(|column| {
            let values: Vec<f64> = metrics.iter().map(|m| m.values()[column]).collect();
            ColumnStats::from_values(&values)
        });

        Self {
            latency: LatencyBaseline::from_traces(traces),
            vocabulary: ToolVocabulary::build(traces, config.max_tool_ngrams),
            scalar_stats,
            embeddings,
        }
    }

    /// Length of every feature vector produced from this context.
    pub fn feature_dimension(&self) -> usize {
        self.vocabulary.len() + SCALAR_FEATURE_COUNT + self.embedding_dimension().unwrap_or(0)
    }

    pub fn embedding_dimension(&self) -> Option<usize> {
        self.embeddings.as_ref().map(EmbeddingSegment::dimension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn traces(ids: &[&str]) -> Vec<Trace> {
        let at = Utc.with_ymd_and_hms(2025, 1, 13, 0, 0, 0).unwrap();
        ids.iter().map(|id| Trace::new(*id, at, 100.0)).collect()
    }

    #[test]
    fn test_segment_requires_every_trace() {
        let batch = traces(&["a", "b"]);
        let mut vectors = HashMap::new();
        vectors.insert("a".to_string(), vec![0.1, 0.2]);
        assert!(EmbeddingSegment::new(&batch, vectors.clone()).is_none());

        vectors.insert("b".to_string(), vec![0.3, 0.4]);
        let segment = EmbeddingSegment::new(&batch, vectors).unwrap();
        assert_eq!(segment.dimension(), 2);
    }

    #[test]
    fn test_segment_rejects_inconsistent_dimension() {
        let batch = traces(&["a", "b"]);
        let vectors = HashMap::from([
            ("a".to_string(), vec![0.1, 0.2]),
            ("b".to_string(), vec![0.3]),
        ]);
        assert!(EmbeddingSegment::new(&batch, vectors).is_none());
    }

    #[test]
    fn test_segment_rejects_empty_vectors() {
        let batch = traces(&["a"]);
        let vectors = HashMap::from([("a".to_string(), Vec::new())]);
        assert!(EmbeddingSegment::new(&batch, vectors).is_none());
    }

    #[test]
    fn test_feature_dimension_without_embeddings() {
        let batch = traces(&["a", "b", "c"]);
        let ctx = BatchContext::build(&batch, &DiscoveryConfig::default(), None);
        assert_eq!(ctx.vocabulary.len(), 0);
        assert_eq!(ctx.feature_dimension(), SCALAR_FEATURE_COUNT);
        assert_eq!(ctx.embedding_dimension(), None);
    }
}
