//! Feature extraction from traces for clustering.
//!
//! Each trace becomes a fixed-length vector made of three segments, in this
//! order:
//!
//! 1. tool n-gram frequencies over the batch vocabulary,
//! 2. standardized scalar metrics,
//! 3. the text embedding, when the run has one.
//!
//! Every vector of a run has the same length
//! ([`BatchContext::feature_dimension`]).

use std::collections::{BTreeMap, HashMap, HashSet};

use rayon::prelude::*;

use crate::domain::models::Trace;
use crate::services::batch_context::BatchContext;

/// Number of scalar metrics per trace.
pub const SCALAR_FEATURE_COUNT: usize = 9;

/// Separator between the two tool names of a bigram key.
const BIGRAM_SEPARATOR: &str = "->";

/// Numeric representation of one trace.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub trace_id: String,
    pub values: Vec<f64>,
}

impl FeatureVector {
    pub fn dimension(&self) -> usize {
        self.values.len()
    }
}

/// Unigram and bigram counts of a tool sequence, keyed `"tool"` and
/// `"first->second"`.
pub fn tool_ngrams(sequence: &[&str]) -> HashMap<String, usize> {
    let mut ngrams = HashMap::new();
    for tool in sequence {
        *ngrams.entry((*tool).to_string()).or_insert(0) += 1;
    }
    for pair in sequence.windows(2) {
        *ngrams
            .entry(format!("{}{BIGRAM_SEPARATOR}{}", pair[0], pair[1]))
            .or_insert(0) += 1;
    }
    ngrams
}

/// The n-grams that get a feature column, chosen once per batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolVocabulary {
    ngrams: Vec<String>,
}

impl ToolVocabulary {
    /// Keep the `max_size` n-grams that occur in the most traces. Ties go to
    /// the lexically smaller n-gram.
    pub fn build(traces: &[Trace], max_size: usize) -> Self {
        let mut document_frequency: BTreeMap<String, usize> = BTreeMap::new();
        for trace in traces {
            let seen: HashSet<String> = tool_ngrams(&trace.tool_sequence()).into_keys().collect();
            for ngram in seen {
                *document_frequency.entry(ngram).or_insert(0) += 1;
            }
        }

        let mut ranked: Vec<(String, usize)> = document_frequency.into_iter().collect();
        // BTreeMap iteration is lexical; a stable sort keeps that for ties.
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.truncate(max_size);

        Self {
            ngrams: ranked.into_iter().map(|(ngram, _)| ngram).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.ngrams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ngrams.is_empty()
    }

    pub fn ngrams(&self) -> &[String] {
        &self.ngrams
    }

    /// Within-trace frequency of each vocabulary n-gram.
    pub fn frequencies(&self, trace: &Trace) -> Vec<f64> {
        let counts = tool_ngrams(&trace.tool_sequence());
        self.ngrams
            .iter()
            .map(|ngram| counts.get(ngram).copied().unwrap_or(0) as f64)
            .collect()
    }
}

/// Raw (unstandardized) scalar metrics of a trace.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalarMetrics([f64; SCALAR_FEATURE_COUNT]);

impl ScalarMetrics {
    pub const NAMES: [&'static str; SCALAR_FEATURE_COUNT] = [
        "total_latency_ms",
        "llm_latency_ms",
        "tool_latency_ms",
        "token_count",
        "llm_call_count",
        "tool_call_count",
        "tool_success_rate",
        "error_count",
        "unique_tools",
    ];

    pub fn from_trace(trace: &Trace) -> Self {
        let tool_calls = trace.tool_call_count();
        let tool_success_rate = if tool_calls == 0 {
            1.0
        } else {
            1.0 - trace.failed_tool_call_count() as f64 / tool_calls as f64
        };
        let unique_tools = trace
            .tool_calls
            .iter()
            .map(|c| c.name.as_str())
            .collect::<HashSet<_>>()
            .len();

        Self([
            trace.total_latency_ms,
            trace.llm_latency_ms,
            trace.tool_latency_ms,
            trace.token_count as f64,
            trace.llm_call_count as f64,
            tool_calls as f64,
            tool_success_rate,
            trace.error_count as f64,
            unique_tools as f64,
        ])
    }

    pub fn values(&self) -> &[f64; SCALAR_FEATURE_COUNT] {
        &self.0
    }
}

/// Turns traces into feature vectors against a fixed batch context.
#[derive(Debug, Clone, Copy)]
pub struct FeatureExtractor<'a> {
    ctx: &'a BatchContext,
}

impl<'a> FeatureExtractor<'a> {
    pub fn new(ctx: &'a BatchContext) -> Self {
        Self { ctx }
    }

    pub fn extract(&self, trace: &Trace) -> FeatureVector {
        let mut values = Vec::with_capacity(self.ctx.feature_dimension());

        values.extend(self.ctx.vocabulary.frequencies(trace));

        let metrics = ScalarMetrics::from_trace(trace);
        values.extend(
            metrics
                .values()
                .iter()
                .zip(self.ctx.scalar_stats.iter())
                .map(|(value, stats)| stats.standardize(*value)),
        );

        if let Some(segment) = &self.ctx.embeddings {
            match segment.get(&trace.trace_id) {
                Some(embedding) => values.extend_from_slice(embedding),
                // Segments are built for the whole batch; a miss means the
                // trace was not part of it.
                None => values.extend(std::iter::repeat(0.0).take(segment.dimension())),
            }
        }

        FeatureVector {
            trace_id: trace.trace_id.clone(),
            values,
        }
    }

    /// Extract every trace in parallel, preserving input order.
    pub fn extract_batch(&self, traces: &[Trace]) -> Vec<FeatureVector> {
        traces.par_iter().map(|t| self.extract(t)).collect()
    }
}
