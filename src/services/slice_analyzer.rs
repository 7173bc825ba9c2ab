//! Slice analysis: which attribute combinations are over-represented among
//! bad traces.
//!
//! Candidates are every value of each configured attribute (depth 1) and
//! every value pair of two distinct attributes (depth 2). A candidate is
//! tested when it has at least `min_slice_size` members; its significance
//! comes from a Yates-corrected chi-squared test of the 2x2 table
//! {in slice, rest of batch} x {bad, good}. When many candidates are tested,
//! the configured p-value correction is applied across all of them before
//! thresholding.

use std::collections::BTreeMap;

use tracing::debug;

use crate::domain::models::{
    AttributeValue, DiscoveryConfig, PValueCorrection, Slice, TraceAttributes, SLICE_SAMPLE_COUNT,
};
use crate::services::statistics::{adjust_p_values, ContingencyTable};

/// What the analyzer needs to know about one trace.
#[derive(Debug, Clone, Copy)]
pub struct SliceInput<'a> {
    pub trace_id: &'a str,
    pub attributes: &'a TraceAttributes,
    pub is_bad: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SliceAnalysis {
    /// Significant slices, best first.
    pub slices: Vec<Slice>,
    /// Candidates that met the size threshold and were tested.
    pub slices_tested: usize,
    pub baseline_rate: f64,
}

struct Candidate {
    attributes: Vec<AttributeValue>,
    members: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct SliceAnalyzer {
    attributes: Vec<String>,
    min_slice_size: usize,
    max_depth: usize,
    significance_threshold: f64,
    correction: PValueCorrection,
    max_reported: usize,
}

impl SliceAnalyzer {
    pub fn new(config: &DiscoveryConfig) -> Self {
        Self {
            attributes: config.slice_attributes.clone(),
            min_slice_size: config.min_slice_size,
            max_depth: config.max_slice_depth.clamp(1, 2),
            significance_threshold: config.significance_threshold,
            correction: config.p_value_correction,
            max_reported: config.max_reported_slices,
        }
    }

    pub fn analyze(&self, inputs: &[SliceInput<'_>]) -> SliceAnalysis {
        let total = inputs.len();
        let total_bad = inputs.iter().filter(|i| i.is_bad).count();
        let baseline_rate = if total == 0 {
            0.0
        } else {
            total_bad as f64 / total as f64
        };

        // Lift is undefined without any bad trace in the batch.
        if total_bad == 0 {
            return SliceAnalysis {
                slices: Vec::new(),
                slices_tested: 0,
                baseline_rate,
            };
        }

        let candidates: Vec<Candidate> = self
            .enumerate(inputs)
            .into_iter()
            .filter(|c| c.members.len() >= self.min_slice_size)
            .collect();

        let tested: Vec<(Candidate, usize, f64)> = candidates
            .into_iter()
            .map(|candidate| {
                let bad = candidate.members.iter().filter(|m| inputs[**m].is_bad).count();
                let p_value = ContingencyTable::for_slice(bad, candidate.members.len(), total_bad, total)
                    .map_or(1.0, |table| table.p_value());
                (candidate, bad, p_value)
            })
            .collect();

        let raw: Vec<f64> = tested.iter().map(|(_, _, p)| *p).collect();
        let adjusted = adjust_p_values(&raw, self.correction);
        let slices_tested = tested.len();

        let mut slices: Vec<Slice> = tested
            .into_iter()
            .zip(adjusted)
            .map(|((candidate, bad_count, p_value), adjusted_p_value)| {
                to_slice(candidate, inputs, bad_count, baseline_rate, (p_value, adjusted_p_value))
            })
            .filter(|s| s.is_significant(self.significance_threshold))
            .collect();

        slices.sort_by(|a, b| {
            b.lift
                .total_cmp(&a.lift)
                .then(a.adjusted_p_value.total_cmp(&b.adjusted_p_value))
                .then(a.p_value.total_cmp(&b.p_value))
                .then_with(|| a.attribute_str().cmp(&b.attribute_str()))
        });
        slices.truncate(self.max_reported);

        debug!(
            tested = slices_tested,
            significant = slices.len(),
            baseline_rate,
            "slice analysis finished"
        );

        SliceAnalysis {
            slices,
            slices_tested,
            baseline_rate,
        }
    }

    /// Depth-1 candidates first, then depth-2, attributes in configured
    /// order and values in lexical order.
    fn enumerate(&self, inputs: &[SliceInput<'_>]) -> Vec<Candidate> {
        let mut combos: Vec<Vec<&str>> = self.attributes.iter().map(|a| vec![a.as_str()]).collect();
        if self.max_depth >= 2 {
            for (i, first) in self.attributes.iter().enumerate() {
                for second in &self.attributes[i + 1..] {
                    combos.push(vec![first.as_str(), second.as_str()]);
                }
            }
        }

        let mut candidates = Vec::new();
        for combo in combos {
            let mut groups: BTreeMap<Vec<&str>, Vec<usize>> = BTreeMap::new();
            for (row, input) in inputs.iter().enumerate() {
                let key: Vec<&str> = combo.iter().map(|a| input.attributes.get(a)).collect();
                groups.entry(key).or_default().push(row);
            }

            for (values, members) in groups {
                let attributes = combo
                    .iter()
                    .zip(values)
                    .map(|(attribute, value)| AttributeValue {
                        attribute: (*attribute).to_string(),
                        value: value.to_string(),
                    })
                    .collect();
                candidates.push(Candidate {
                    attributes,
                    members,
                });
            }
        }
        candidates
    }
}

fn to_slice(
    candidate: Candidate,
    inputs: &[SliceInput<'_>],
    bad_count: usize,
    baseline_rate: f64,
    (p_value, adjusted_p_value): (f64, f64),
) -> Slice {
    let size = candidate.members.len();
    let badness_rate = bad_count as f64 / size as f64;
    let mut sample_trace_ids: Vec<String> = candidate
        .members
        .iter()
        .map(|m| inputs[*m].trace_id.to_string())
        .collect();
    sample_trace_ids.sort();
    sample_trace_ids.truncate(SLICE_SAMPLE_COUNT);

    Slice {
        attributes: candidate.attributes,
        size,
        bad_count,
        badness_rate,
        baseline_rate,
        lift: badness_rate / baseline_rate,
        p_value,
        adjusted_p_value,
        sample_trace_ids,
    }
}
