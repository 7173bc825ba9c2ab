//! Discovery run output.
//!
//! A `DiscoveryReport` is built once, at the end of a successful run, and
//! then handed to the persistence collaborator.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::cluster::Cluster;
use super::config::DiscoveryConfig;
use super::slice::Slice;
use super::trace::Trace;

/// Half-open time range `[start, end)` a run analyzes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The `days` days leading up to now.
    pub fn last_days(days: i64) -> Self {
        let end = Utc::now();
        Self {
            start: end - Duration::days(days),
            end,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to {}",
            self.start.format("%Y-%m-%d %H:%M:%S UTC"),
            self.end.format("%Y-%m-%d %H:%M:%S UTC")
        )
    }
}

/// Lifecycle status of a discovery run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    InsufficientData,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::InsufficientData => "insufficient_data",
            Self::Failed => "failed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "insufficient_data" => Some(Self::InsufficientData),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A trace excluded from the batch: malformed signals, a repeated id, or
/// a source record that could not be decoded at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedTrace {
    pub trace_id: String,
    pub reason: String,
}

/// What a trace source hands back: the decoded traces plus the records it
/// had to reject while decoding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraceBatch {
    pub traces: Vec<Trace>,
    pub rejected: Vec<SkippedTrace>,
}

impl TraceBatch {
    pub fn new(traces: Vec<Trace>, rejected: Vec<SkippedTrace>) -> Self {
        Self { traces, rejected }
    }
}

impl From<Vec<Trace>> for TraceBatch {
    fn from(traces: Vec<Trace>) -> Self {
        Self {
            traces,
            rejected: Vec::new(),
        }
    }
}

/// Recorded when a batch exceeded `max_traces` and was cut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplingNote {
    pub fetched: usize,
    pub kept: usize,
}

/// Full output of one discovery run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryReport {
    pub run_id: Uuid,
    pub project: String,
    pub window: TimeWindow,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub status: RunStatus,

    /// Valid traces analyzed (after sampling and malformed-trace exclusion).
    pub total_traces: usize,
    pub num_bad_traces: usize,
    /// Fraction of analyzed traces that are bad.
    pub baseline_badness_rate: f64,
    /// Mean badness score over analyzed traces.
    pub mean_badness: f64,

    /// Ranked by descending badness rate.
    pub clusters: Vec<Cluster>,
    /// Significant slices ranked by descending lift.
    pub slices: Vec<Slice>,

    pub num_clusters: usize,
    pub num_significant_slices: usize,
    pub noise_trace_ids: Vec<String>,

    pub skipped_traces: Vec<SkippedTrace>,
    pub sampling: Option<SamplingNote>,
    /// Length of the embedding segment, `None` when it was omitted.
    pub embedding_dimension: Option<usize>,
    /// Candidate slices that met the size threshold and were tested.
    pub slices_tested: usize,

    pub config: DiscoveryConfig,
}

impl DiscoveryReport {
    /// Cluster with the highest badness rate.
    pub fn worst_cluster(&self) -> Option<&Cluster> {
        self.clusters.first()
    }

    /// Slice with the highest lift.
    pub fn worst_slice(&self) -> Option<&Slice> {
        self.slices.first()
    }

    /// Human-readable multi-line summary.
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("Discovery report for {}", self.project),
            format!("Time range: {}", self.window),
            format!("Total traces: {}", self.total_traces),
            format!("Baseline badness: {:.1}%", self.baseline_badness_rate * 100.0),
            format!("Clusters found: {}", self.num_clusters),
            format!("Significant slices: {}", self.num_significant_slices),
        ];

        if !self.skipped_traces.is_empty() {
            lines.push(format!("Skipped malformed traces: {}", self.skipped_traces.len()));
        }

        if let Some(sampling) = self.sampling {
            lines.push(format!(
                "Sampled {} most recent of {} fetched traces",
                sampling.kept, sampling.fetched
            ));
        }

        if let Some(cluster) = self.worst_cluster() {
            lines.push(format!(
                "Worst cluster: #{} ({:.1}% bad, {} traces)",
                cluster.cluster_index,
                cluster.badness_rate * 100.0,
                cluster.size
            ));
        }

        if let Some(slice) = self.worst_slice() {
            lines.push(format!(
                "Worst slice: {} (lift={:.2}x)",
                slice.attribute_str(),
                slice.lift
            ));
        }

        lines.join("\n")
    }
}

/// A failed run, recorded for history but carrying no results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedRun {
    pub run_id: Uuid,
    pub project: String,
    pub window: TimeWindow,
    pub started_at: DateTime<Utc>,
    pub failed_at: DateTime<Utc>,
    pub status: RunStatus,
    pub error_message: String,
}

/// One row of run history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub project: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_traces: Option<usize>,
    pub baseline_badness_rate: Option<f64>,
    pub num_clusters: usize,
    pub num_slices: usize,
    pub error_message: Option<String>,
}
