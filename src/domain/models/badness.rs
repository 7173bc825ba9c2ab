//! Badness scoring types.

use serde::{Deserialize, Serialize};

/// A trace is bad iff its badness score is strictly above this value.
pub const BAD_THRESHOLD: f64 = 0.5;

/// Weights for the five badness signals.
///
/// The weights should sum to 1.0, but scoring renormalizes over whichever
/// signals a trace actually has, so a trace without eval annotations is
/// scored from operational signals alone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BadnessWeights {
    #[serde(default = "default_quality_eval")]
    pub quality_eval: f64,
    #[serde(default = "default_grounding_eval")]
    pub grounding_eval: f64,
    #[serde(default = "default_tool_errors")]
    pub tool_errors: f64,
    #[serde(default = "default_latency")]
    pub latency: f64,
    #[serde(default = "default_error_count")]
    pub error_count: f64,
}

const fn default_quality_eval() -> f64 {
    0.3
}

const fn default_grounding_eval() -> f64 {
    0.2
}

const fn default_tool_errors() -> f64 {
    0.2
}

const fn default_latency() -> f64 {
    0.1
}

const fn default_error_count() -> f64 {
    0.2
}

impl Default for BadnessWeights {
    fn default() -> Self {
        Self {
            quality_eval: default_quality_eval(),
            grounding_eval: default_grounding_eval(),
            tool_errors: default_tool_errors(),
            latency: default_latency(),
            error_count: default_error_count(),
        }
    }
}

impl BadnessWeights {
    /// Weights paired with their names, in a fixed order.
    pub fn named(&self) -> [(&'static str, f64); 5] {
        [
            ("quality_eval", self.quality_eval),
            ("grounding_eval", self.grounding_eval),
            ("tool_errors", self.tool_errors),
            ("latency", self.latency),
            ("error_count", self.error_count),
        ]
    }

    pub fn total(&self) -> f64 {
        self.named().iter().map(|(_, w)| w).sum()
    }
}

/// Per-trace badness components, each in [0, 1].
///
/// Eval components are `None` when the trace carries no such annotation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BadnessSignals {
    pub quality_eval: Option<f64>,
    pub grounding_eval: Option<f64>,
    pub tool_errors: f64,
    pub latency: f64,
    pub error_count: f64,
}

impl BadnessSignals {
    /// Present components paired with their weights.
    pub fn weighted(&self, weights: &BadnessWeights) -> Vec<(f64, f64)> {
        let mut present = Vec::with_capacity(5);
        if let Some(q) = self.quality_eval {
            present.push((q, weights.quality_eval));
        }
        if let Some(g) = self.grounding_eval {
            present.push((g, weights.grounding_eval));
        }
        present.push((self.tool_errors, weights.tool_errors));
        present.push((self.latency, weights.latency));
        present.push((self.error_count, weights.error_count));
        present
    }
}

/// Aggregated badness for one trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BadnessScore {
    pub trace_id: String,
    /// 0.0 (good) to 1.0 (bad).
    pub score: f64,
    pub signals: BadnessSignals,
}

impl BadnessScore {
    pub fn is_bad(&self) -> bool {
        self.score > BAD_THRESHOLD
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weights_sum_to_one() {
        assert!((BadnessWeights::default().total() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_weighted_skips_missing_evals() {
        let signals = BadnessSignals {
            quality_eval: None,
            grounding_eval: Some(0.4),
            tool_errors: 0.0,
            latency: 0.5,
            error_count: 1.0,
        };
        let pairs = signals.weighted(&BadnessWeights::default());
        assert_eq!(pairs.len(), 4);
        assert_eq!(pairs[0], (0.4, 0.2));
    }

    #[test]
    fn test_is_bad_is_strict() {
        let signals = BadnessSignals {
            quality_eval: None,
            grounding_eval: None,
            tool_errors: 0.0,
            latency: 0.0,
            error_count: 0.0,
        };
        let at = BadnessScore { trace_id: "a".into(), score: 0.5, signals };
        let above = BadnessScore { trace_id: "b".into(), score: 0.5001, signals };
        assert!(!at.is_bad());
        assert!(above.is_bad());
    }
}
