//! Cluster domain model.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of example trace ids kept per cluster.
pub const CLUSTER_EXAMPLE_COUNT: usize = 5;

/// Clustering method selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClusterMethod {
    /// Hierarchical density-based clustering; supports a noise label.
    #[default]
    Hdbscan,
    /// Centroid clustering with a fixed or estimated `k`; never labels noise.
    Kmeans,
}

impl ClusterMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hdbscan => "hdbscan",
            Self::Kmeans => "kmeans",
        }
    }
}

impl fmt::Display for ClusterMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Label assigned to one point by a clustering algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterLabel {
    Noise,
    Member(usize),
}

impl ClusterLabel {
    pub fn index(&self) -> Option<usize> {
        match self {
            Self::Noise => None,
            Self::Member(i) => Some(*i),
        }
    }

    pub fn is_noise(&self) -> bool {
        matches!(self, Self::Noise)
    }
}

/// A group of behaviourally similar traces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub cluster_index: usize,
    /// Member trace ids in ascending id order.
    pub trace_ids: Vec<String>,
    pub size: usize,
    pub avg_badness: f64,
    /// Fraction of members whose badness exceeds the bad threshold.
    pub badness_rate: f64,
    /// Most common value of each tracked categorical attribute.
    pub dominant_attributes: BTreeMap<String, String>,
    /// First few member ids in id order.
    pub example_trace_ids: Vec<String>,
}

impl Cluster {
    /// Clusters with more than 30% bad traces are flagged in summaries.
    pub fn is_problematic(&self) -> bool {
        self.badness_rate > 0.3
    }

    pub fn dominant(&self, attribute: &str) -> Option<&str> {
        self.dominant_attributes.get(attribute).map(String::as_str)
    }
}
