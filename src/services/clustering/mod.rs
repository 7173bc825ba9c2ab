//! Clustering engine: labels feature vectors and aggregates each cluster.

pub mod hdbscan;
pub mod kmeans;

use std::collections::BTreeMap;

use tracing::debug;

use crate::domain::models::{
    BadnessScore, Cluster, ClusterLabel, ClusterMethod, DiscoveryConfig, Trace,
    CLUSTER_EXAMPLE_COUNT,
};
use crate::services::feature_extractor::FeatureVector;

pub use hdbscan::Hdbscan;
pub use kmeans::KMeans;

/// Clusters of a run plus the traces no cluster claimed.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusteringOutcome {
    /// Ranked by descending badness rate, then descending size, then
    /// ascending index.
    pub clusters: Vec<Cluster>,
    /// Noise trace ids in ascending order.
    pub noise_trace_ids: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ClusteringEngine {
    method: ClusterMethod,
    min_cluster_size: usize,
    n_clusters: Option<usize>,
    tracked_attributes: Vec<String>,
}

impl ClusteringEngine {
    pub fn new(config: &DiscoveryConfig) -> Self {
        Self {
            method: config.cluster_method,
            min_cluster_size: config.min_cluster_size,
            n_clusters: config.n_clusters,
            tracked_attributes: config.tracked_attributes(),
        }
    }

    pub fn label(&self, vectors: &[FeatureVector]) -> Vec<ClusterLabel> {
        let points: Vec<Vec<f64>> = vectors.iter().map(|v| v.values.clone()).collect();
        match self.method {
            ClusterMethod::Hdbscan => Hdbscan::new(self.min_cluster_size).fit(&points),
            ClusterMethod::Kmeans => KMeans::new(self.n_clusters).fit(&points),
        }
    }

    /// Cluster the batch. `traces`, `vectors` and `scores` are index-aligned.
    pub fn cluster(
        &self,
        traces: &[Trace],
        vectors: &[FeatureVector],
        scores: &[BadnessScore],
    ) -> ClusteringOutcome {
        let labels = self.label(vectors);
        let outcome = self.aggregate(traces, scores, &labels);
        debug!(
            method = %self.method,
            clusters = outcome.clusters.len(),
            noise = outcome.noise_trace_ids.len(),
            "clustering finished"
        );
        outcome
    }

    /// Build per-cluster statistics from labels.
    pub fn aggregate(
        &self,
        traces: &[Trace],
        scores: &[BadnessScore],
        labels: &[ClusterLabel],
    ) -> ClusteringOutcome {
        let mut members: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        let mut noise_trace_ids = Vec::new();
        for (i, label) in labels.iter().enumerate() {
            match label {
                ClusterLabel::Member(index) => members.entry(*index).or_default().push(i),
                ClusterLabel::Noise => noise_trace_ids.push(traces[i].trace_id.clone()),
            }
        }
        noise_trace_ids.sort();

        let mut clusters: Vec<Cluster> = members
            .into_iter()
            .map(|(index, rows)| self.build_cluster(index, &rows, traces, scores))
            .collect();

        clusters.sort_by(|a, b| {
            b.badness_rate
                .total_cmp(&a.badness_rate)
                .then(b.size.cmp(&a.size))
                .then(a.cluster_index.cmp(&b.cluster_index))
        });

        ClusteringOutcome {
            clusters,
            noise_trace_ids,
        }
    }

    fn build_cluster(
        &self,
        cluster_index: usize,
        rows: &[usize],
        traces: &[Trace],
        scores: &[BadnessScore],
    ) -> Cluster {
        let size = rows.len();
        let total: f64 = rows.iter().map(|r| scores[*r].score).sum();
        let bad = rows.iter().filter(|r| scores[**r].is_bad()).count();

        let dominant_attributes = self
            .tracked_attributes
            .iter()
            .map(|attribute| {
                let values = rows.iter().map(|r| traces[*r].attributes.get(attribute));
                (attribute.clone(), mode(values))
            })
            .collect();

        let mut trace_ids: Vec<String> = rows.iter().map(|r| traces[*r].trace_id.clone()).collect();
        trace_ids.sort();
        let example_trace_ids = trace_ids.iter().take(CLUSTER_EXAMPLE_COUNT).cloned().collect();

        Cluster {
            cluster_index,
            trace_ids,
            size,
            avg_badness: total / size as f64,
            badness_rate: bad as f64 / size as f64,
            dominant_attributes,
            example_trace_ids,
        }
    }
}

/// Most frequent value; ties go to the value seen first.
fn mode<'a>(values: impl Iterator<Item = &'a str>) -> String {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for value in values {
        match counts.iter_mut().find(|(v, _)| *v == value) {
            Some((_, count)) => *count += 1,
            None => counts.push((value, 1)),
        }
    }

    let mut best: Option<(&str, usize)> = None;
    for (value, count) in counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((value, count));
        }
    }
    best.map_or_else(|| crate::domain::models::UNKNOWN_ATTRIBUTE.to_string(), |(v, _)| v.to_string())
}
