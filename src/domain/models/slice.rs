//! Slice domain model.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of sample trace ids kept per slice.
pub const SLICE_SAMPLE_COUNT: usize = 5;

/// Correction applied to slice p-values when many candidates are tested in
/// the same run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PValueCorrection {
    /// Raw chi-squared p-values.
    #[default]
    None,
    /// Family-wise error control: `p * m`, capped at 1.
    Bonferroni,
    /// False discovery rate control (step-up).
    BenjaminiHochberg,
}

impl fmt::Display for PValueCorrection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Bonferroni => "bonferroni",
            Self::BenjaminiHochberg => "benjamini_hochberg",
        })
    }
}

/// One attribute assignment within a slice, e.g. `model = gpt-4`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttributeValue {
    pub attribute: String,
    pub value: String,
}

/// A segment of traces sharing the values of one or two attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slice {
    /// Assignments in configured attribute order.
    pub attributes: Vec<AttributeValue>,
    pub size: usize,
    pub bad_count: usize,
    pub badness_rate: f64,
    pub baseline_rate: f64,
    /// `badness_rate / baseline_rate`.
    pub lift: f64,
    /// Raw chi-squared p-value.
    pub p_value: f64,
    /// p-value after the run's multiple-comparison correction.
    pub adjusted_p_value: f64,
    pub sample_trace_ids: Vec<String>,
}

impl Slice {
    pub fn depth(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_significant(&self, threshold: f64) -> bool {
        self.adjusted_p_value < threshold
    }

    /// `model=gpt-4, intent=search`
    pub fn attribute_str(&self) -> String {
        self.attributes
            .iter()
            .map(|a| format!("{}={}", a.attribute, a.value))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
