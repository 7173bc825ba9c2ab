//! Deterministic k-means.
//!
//! Seeding is farthest-first from the first point, so the same input always
//! yields the same centroids. Every point is assigned to a cluster; k-means
//! has no noise label.

use rayon::prelude::*;

use super::hdbscan::euclidean;
use crate::domain::models::ClusterLabel;

const MAX_ITERATIONS: usize = 100;

/// Largest `k` the elbow estimate considers.
const MAX_ESTIMATED_K: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KMeans {
    k: Option<usize>,
    max_iterations: usize,
}

/// Result of one k-means run.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansFit {
    pub assignments: Vec<usize>,
    pub centroids: Vec<Vec<f64>>,
    /// Sum of squared distances to the assigned centroid.
    pub inertia: f64,
}

impl KMeans {
    /// `k = None` estimates the cluster count with the elbow method.
    pub fn new(k: Option<usize>) -> Self {
        Self {
            k,
            max_iterations: MAX_ITERATIONS,
        }
    }

    pub fn fit(&self, points: &[Vec<f64>]) -> Vec<ClusterLabel> {
        if points.is_empty() {
            return Vec::new();
        }
        let k = self
            .k
            .unwrap_or_else(|| estimate_k(points, self.max_iterations))
            .clamp(1, points.len());

        run(points, k, self.max_iterations)
            .assignments
            .into_iter()
            .map(ClusterLabel::Member)
            .collect()
    }
}

pub fn run(points: &[Vec<f64>], k: usize, max_iterations: usize) -> KMeansFit {
    let mut centroids = farthest_first_seeds(points, k);
    let mut assignments = assign(points, &centroids);

    for _ in 0..max_iterations {
        centroids = recompute_centroids(points, &assignments, &centroids);
        let next = assign(points, &centroids);
        if next == assignments {
            break;
        }
        assignments = next;
    }

    let inertia = points
        .iter()
        .zip(&assignments)
        .map(|(p, c)| euclidean(p, &centroids[*c]).powi(2))
        .sum();

    KMeansFit {
        assignments,
        centroids,
        inertia,
    }
}

fn farthest_first_seeds(points: &[Vec<f64>], k: usize) -> Vec<Vec<f64>> {
    let mut centroids = vec![points[0].clone()];
    let mut nearest: Vec<f64> = points.iter().map(|p| euclidean(p, &points[0])).collect();

    while centroids.len() < k {
        let mut far = 0;
        for (i, d) in nearest.iter().enumerate() {
            if *d > nearest[far] {
                far = i;
            }
        }
        let seed = points[far].clone();
        for (d, p) in nearest.iter_mut().zip(points) {
            *d = d.min(euclidean(p, &seed));
        }
        centroids.push(seed);
    }
    centroids
}

/// Nearest centroid per point; ties go to the lower centroid index.
fn assign(points: &[Vec<f64>], centroids: &[Vec<f64>]) -> Vec<usize> {
    points
        .par_iter()
        .map(|p| {
            let mut best = 0;
            let mut best_distance = f64::INFINITY;
            for (i, c) in centroids.iter().enumerate() {
                let d = euclidean(p, c);
                if d < best_distance {
                    best = i;
                    best_distance = d;
                }
            }
            best
        })
        .collect()
}

/// Mean of each cluster's members. A cluster that lost all its members
/// keeps its previous centroid.
fn recompute_centroids(
    points: &[Vec<f64>],
    assignments: &[usize],
    previous: &[Vec<f64>],
) -> Vec<Vec<f64>> {
    let dim = points[0].len();
    let mut sums = vec![vec![0.0; dim]; previous.len()];
    let mut counts = vec![0usize; previous.len()];
    for (p, c) in points.iter().zip(assignments) {
        counts[*c] += 1;
        for (s, v) in sums[*c].iter_mut().zip(p) {
            *s += v;
        }
    }

    sums.into_iter()
        .zip(counts)
        .zip(previous)
        .map(|((sum, count), prev)| {
            if count == 0 {
                prev.clone()
            } else {
                sum.into_iter().map(|s| s / count as f64).collect()
            }
        })
        .collect()
}

/// Elbow estimate: the `k` after which the inertia curve bends the most.
pub fn estimate_k(points: &[Vec<f64>], max_iterations: usize) -> usize {
    let n = points.len();
    let max_k = MAX_ESTIMATED_K.min(n / 5);
    if n < max_k {
        return (n / 3).max(2);
    }

    let inertias: Vec<f64> = (2..(max_k + 1).min(n))
        .map(|k| run(points, k, max_iterations).inertia)
        .collect();
    if inertias.len() < 3 {
        return 3.min(n);
    }

    let diffs: Vec<f64> = inertias.windows(2).map(|w| w[1] - w[0]).collect();
    let second: Vec<f64> = diffs.windows(2).map(|w| w[1] - w[0]).collect();

    let mut elbow = 0;
    for (i, v) in second.iter().enumerate() {
        if *v > second[elbow] {
            elbow = i;
        }
    }
    (elbow + 2).min(max_k)
}
