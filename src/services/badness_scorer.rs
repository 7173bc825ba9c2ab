//! Badness score aggregation from multiple per-trace signals.
//!
//! Scoring is a two-pass computation: the batch's p95 latency is computed
//! once up front (see [`LatencyBaseline`]) and then every trace is scored
//! independently against it.

use rayon::prelude::*;

use crate::domain::models::{BadnessScore, BadnessSignals, BadnessWeights, Trace};
use crate::services::statistics::percentile;

/// Error-span count at which the error component saturates at 1.0.
pub const ERROR_COUNT_SATURATION: f64 = 3.0;

/// p95 used when no trace in the batch has a positive latency.
pub const DEFAULT_P95_LATENCY_MS: f64 = 30_000.0;

/// Batch-level latency reference for the latency component.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyBaseline {
    pub p95_ms: f64,
}

impl LatencyBaseline {
    /// p95 over the strictly positive latencies of the batch.
    pub fn from_traces(traces: &[Trace]) -> Self {
        let latencies: Vec<f64> = traces
            .iter()
            .map(|t| t.total_latency_ms)
            .filter(|l| l.is_finite() && *l > 0.0)
            .collect();
        let p95_ms = percentile(&latencies, 0.95).unwrap_or(DEFAULT_P95_LATENCY_MS);
        Self { p95_ms }
    }
}

impl Default for LatencyBaseline {
    fn default() -> Self {
        Self {
            p95_ms: DEFAULT_P95_LATENCY_MS,
        }
    }
}

/// Converts raw trace signals into a normalized badness score.
#[derive(Debug, Clone)]
pub struct BadnessScorer {
    weights: BadnessWeights,
    latency: LatencyBaseline,
}

impl BadnessScorer {
    pub fn new(weights: BadnessWeights, latency: LatencyBaseline) -> Self {
        Self { weights, latency }
    }

    /// Extract the five components for a trace. Each lies in [0, 1].
    pub fn signals(&self, trace: &Trace) -> BadnessSignals {
        let tool_calls = trace.tool_call_count();
        let tool_errors = if tool_calls == 0 {
            0.0
        } else {
            trace.failed_tool_call_count() as f64 / tool_calls as f64
        };

        let latency = if trace.total_latency_ms > 0.0 && self.latency.p95_ms > 0.0 {
            (trace.total_latency_ms / self.latency.p95_ms).min(1.0)
        } else {
            0.0
        };

        let error_count = (trace.error_count.max(0) as f64 / ERROR_COUNT_SATURATION).min(1.0);

        BadnessSignals {
            quality_eval: trace.quality_score.map(|q| 1.0 - q),
            grounding_eval: trace.grounding_score.map(|g| 1.0 - g),
            tool_errors,
            latency,
            error_count,
        }
    }

    /// Weighted mean of the present components.
    ///
    /// Weights are renormalized over the components a trace actually has; if
    /// those weights sum to zero the score is 0.0.
    pub fn score(&self, trace: &Trace) -> BadnessScore {
        let signals = self.signals(trace);
        let (weighted, total_weight) = signals
            .weighted(&self.weights)
            .into_iter()
            .fold((0.0, 0.0), |(acc, total), (value, weight)| {
                (acc + value * weight, total + weight)
            });

        let score = if total_weight > 0.0 {
            (weighted / total_weight).clamp(0.0, 1.0)
        } else {
            0.0
        };

        BadnessScore {
            trace_id: trace.trace_id.clone(),
            score,
            signals,
        }
    }

    /// Score every trace of an already-validated batch, in input order.
    pub fn score_batch(&self, traces: &[Trace]) -> Vec<BadnessScore> {
        traces.par_iter().map(|t| self.score(t)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ToolCall;
    use chrono::{TimeZone, Utc};

    fn trace(id: &str, latency: f64) -> Trace {
        Trace::new(id, Utc.with_ymd_and_hms(2025, 1, 13, 0, 0, 0).unwrap(), latency)
    }

    fn scorer(p95: f64) -> BadnessScorer {
        BadnessScorer::new(BadnessWeights::default(), LatencyBaseline { p95_ms: p95 })
    }

    #[test]
    fn test_zero_tool_calls_has_zero_tool_error_component() {
        let signals = scorer(1000.0).signals(&trace("t", 100.0));
        assert_eq!(signals.tool_errors, 0.0);
    }

    #[test]
    fn test_tool_error_rate() {
        let mut t = trace("t", 100.0);
        let at = t.start_time;
        t.tool_calls = vec![
            ToolCall::new("search", at),
            ToolCall::failed("fetch", at),
            ToolCall::new("fetch", at),
            ToolCall::failed("write", at),
        ];
        assert!((scorer(1000.0).signals(&t).tool_errors - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_latency_component_clips_at_p95() {
        let s = scorer(1000.0);
        assert!((s.signals(&trace("a", 500.0)).latency - 0.5).abs() < 1e-12);
        assert_eq!(s.signals(&trace("b", 5000.0)).latency, 1.0);
        assert_eq!(s.signals(&trace("c", 0.0)).latency, 0.0);
    }

    #[test]
    fn test_error_count_saturates() {
        let s = scorer(1000.0);
        let mut t = trace("t", 0.0);
        t.error_count = 1;
        assert!((s.signals(&t).error_count - 1.0 / 3.0).abs() < 1e-12);
        t.error_count = 12;
        assert_eq!(s.signals(&t).error_count, 1.0);
    }

    #[test]
    fn test_exact_weighted_sum_with_all_signals() {
        let mut t = trace("t", 500.0);
        t.quality_score = Some(0.2);
        t.grounding_score = Some(0.6);
        t.error_count = 3;
        let at = t.start_time;
        t.tool_calls = vec![ToolCall::failed("a", at), ToolCall::new("b", at)];

        let score = scorer(1000.0).score(&t).score;
        let expected = 0.3 * 0.8 + 0.2 * 0.4 + 0.2 * 0.5 + 0.1 * 0.5 + 0.2 * 1.0;
        assert!((score - expected).abs() < 1e-12);
    }

    #[test]
    fn test_missing_evals_renormalize_over_operational_signals() {
        let mut t = trace("t", 1000.0);
        t.error_count = 3;
        // tool_errors 0 (w 0.2), latency 1.0 (w 0.1), error_count 1.0 (w 0.2)
        let score = scorer(1000.0).score(&t).score;
        assert!((score - 0.3 / 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_zero_weight_over_present_signals_scores_zero() {
        let weights = BadnessWeights {
            quality_eval: 1.0,
            grounding_eval: 0.0,
            tool_errors: 0.0,
            latency: 0.0,
            error_count: 0.0,
        };
        let s = BadnessScorer::new(weights, LatencyBaseline::default());
        let mut t = trace("t", 100.0);
        t.error_count = 5;
        assert_eq!(s.score(&t).score, 0.0);
    }

    #[test]
    fn test_latency_baseline_ignores_non_positive() {
        let traces: Vec<Trace> = (1..=20)
            .map(|i| trace(&format!("t{i}"), f64::from(i) * 100.0))
            .chain(std::iter::once(trace("zero", 0.0)))
            .collect();
        // 20 positive latencies: index floor(19.0) = 19 -> 2000.0
        assert_eq!(LatencyBaseline::from_traces(&traces).p95_ms, 2000.0);
    }

    #[test]
    fn test_latency_baseline_default_when_no_latency() {
        let traces = vec![trace("a", 0.0), trace("b", 0.0)];
        assert_eq!(
            LatencyBaseline::from_traces(&traces).p95_ms,
            DEFAULT_P95_LATENCY_MS
        );
    }

    #[test]
    fn test_score_batch_preserves_order() {
        let traces = vec![trace("a", 10.0), trace("b", 20.0), trace("c", 30.0)];
        let scores = scorer(30.0).score_batch(&traces);
        let ids: Vec<&str> = scores.iter().map(|s| s.trace_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}
