//! HDBSCAN over dense feature vectors.
//!
//! The pipeline is the classic one:
//!
//! 1. core distance of every point (distance to its `min_samples`-th nearest
//!    neighbour, the point itself included),
//! 2. a minimum spanning tree of the mutual-reachability graph,
//! 3. the single-linkage hierarchy obtained by merging MST edges in
//!    ascending weight order,
//! 4. the condensed tree, where splits that shed fewer than
//!    `min_cluster_size` points are treated as points falling out of the
//!    parent rather than as new clusters,
//! 5. excess-of-mass selection of the most stable clusters.
//!
//! Every step is deterministic: ties in the MST go to the lowest vertex
//! index, edge sorting is stable and cluster ids follow breadth-first order
//! of the hierarchy. The root cluster is never selected, so a batch with no
//! real density structure (for instance, all points identical) is labelled
//! entirely as noise.

use std::collections::VecDeque;

use rayon::prelude::*;

use crate::domain::models::ClusterLabel;

/// Upper bound for `1 / distance`, used for zero-distance merges.
const MAX_LAMBDA: f64 = 1e12;

/// Neighbourhood size for core distances. Only `min_cluster_size` is tuned
/// per run; this stays fixed unless the cluster size is smaller.
pub const DEFAULT_MIN_SAMPLES: usize = 5;

/// Density-based hierarchical clustering with a noise label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hdbscan {
    min_cluster_size: usize,
    min_samples: usize,
}

impl Hdbscan {
    /// `min_samples` defaults to [`DEFAULT_MIN_SAMPLES`], capped at
    /// `min_cluster_size`.
    pub fn new(min_cluster_size: usize) -> Self {
        let min_cluster_size = min_cluster_size.max(2);
        Self {
            min_cluster_size,
            min_samples: DEFAULT_MIN_SAMPLES.min(min_cluster_size),
        }
    }

    pub fn with_min_samples(mut self, min_samples: usize) -> Self {
        self.min_samples = min_samples.max(1);
        self
    }

    pub fn min_samples(&self) -> usize {
        self.min_samples
    }

    /// Core distance of every point under this configuration.
    pub fn core_distances(&self, points: &[Vec<f64>]) -> Vec<f64> {
        core_distances(points, self.min_samples)
    }

    /// Label every point. The output is index-aligned with `points`.
    pub fn fit(&self, points: &[Vec<f64>]) -> Vec<ClusterLabel> {
        let n = points.len();
        if n < 2 || n < self.min_cluster_size {
            return vec![ClusterLabel::Noise; n];
        }

        let core = self.core_distances(points);
        let mut edges = minimum_spanning_tree(points, &core);
        edges.sort_by(|a, b| a.weight.total_cmp(&b.weight));

        let merges = single_linkage(n, &edges);
        let tree = CondensedTree::build(n, &merges, self.min_cluster_size);
        let selected = tree.select_clusters();
        tree.labels(n, &selected)
    }
}

pub(crate) fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

fn core_distances(points: &[Vec<f64>], min_samples: usize) -> Vec<f64> {
    let k = min_samples.min(points.len());
    points
        .par_iter()
        .map(|p| {
            let mut distances: Vec<f64> = points.iter().map(|q| euclidean(p, q)).collect();
            let (_, kth, _) = distances.select_nth_unstable_by(k - 1, f64::total_cmp);
            *kth
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Edge {
    a: usize,
    b: usize,
    weight: f64,
}

/// Dense Prim's algorithm over mutual-reachability distances, rooted at
/// vertex 0.
fn minimum_spanning_tree(points: &[Vec<f64>], core: &[f64]) -> Vec<Edge> {
    let n = points.len();
    let mut in_tree = vec![false; n];
    let mut best = vec![f64::INFINITY; n];
    let mut parent = vec![0usize; n];
    let mut edges = Vec::with_capacity(n.saturating_sub(1));

    let mut current = 0;
    in_tree[current] = true;

    for _ in 1..n {
        let mut next: Option<usize> = None;
        for v in 0..n {
            if in_tree[v] {
                continue;
            }
            let reach = euclidean(&points[current], &points[v])
                .max(core[current])
                .max(core[v]);
            if reach < best[v] {
                best[v] = reach;
                parent[v] = current;
            }
            match next {
                Some(u) if best[u] <= best[v] => {}
                _ => next = Some(v),
            }
        }

        let Some(v) = next else { break };
        in_tree[v] = true;
        edges.push(Edge {
            a: parent[v],
            b: v,
            weight: best[v],
        });
        current = v;
    }

    edges
}

/// One merge of the single-linkage hierarchy. Merge `i` creates node `n + i`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Merge {
    left: usize,
    right: usize,
    distance: f64,
    size: usize,
}

struct UnionFind {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        let total = 2 * n - 1;
        let mut size = vec![0; total];
        size[..n].fill(1);
        Self {
            parent: (0..total).collect(),
            size,
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize, into: usize) {
        self.parent[a] = into;
        self.parent[b] = into;
        self.size[into] = self.size[a] + self.size[b];
    }
}

fn single_linkage(n: usize, sorted_edges: &[Edge]) -> Vec<Merge> {
    let mut uf = UnionFind::new(n);
    sorted_edges
        .iter()
        .enumerate()
        .map(|(i, edge)| {
            let left = uf.find(edge.a);
            let right = uf.find(edge.b);
            let node = n + i;
            uf.union(left, right, node);
            Merge {
                left,
                right,
                distance: edge.weight,
                size: uf.size[node],
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CondensedChild {
    Point(usize),
    Cluster(usize),
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct CondensedEdge {
    parent: usize,
    child: CondensedChild,
    lambda: f64,
    size: usize,
}

struct CondensedTree {
    edges: Vec<CondensedEdge>,
    num_clusters: usize,
}

fn lambda_of(distance: f64) -> f64 {
    if distance > 0.0 {
        (1.0 / distance).min(MAX_LAMBDA)
    } else {
        MAX_LAMBDA
    }
}

impl CondensedTree {
    fn build(n: usize, merges: &[Merge], min_cluster_size: usize) -> Self {
        let node_size = |node: usize| if node < n { 1 } else { merges[node - n].size };
        let root = n + merges.len() - 1;

        let mut edges = Vec::with_capacity(2 * n);
        let mut num_clusters = 1;
        let mut queue = VecDeque::from([(root, 0usize)]);

        while let Some((node, cluster)) = queue.pop_front() {
            if node < n {
                continue;
            }
            let merge = merges[node - n];
            let lambda = lambda_of(merge.distance);
            let left_size = node_size(merge.left);
            let right_size = node_size(merge.right);
            let left_big = left_size >= min_cluster_size;
            let right_big = right_size >= min_cluster_size;

            if left_big && right_big {
                for (child, size) in [(merge.left, left_size), (merge.right, right_size)] {
                    let id = num_clusters;
                    num_clusters += 1;
                    edges.push(CondensedEdge {
                        parent: cluster,
                        child: CondensedChild::Cluster(id),
                        lambda,
                        size,
                    });
                    queue.push_back((child, id));
                }
                continue;
            }

            for (child, big) in [(merge.left, left_big), (merge.right, right_big)] {
                if big {
                    queue.push_back((child, cluster));
                } else {
                    for point in leaves(child, n, merges) {
                        edges.push(CondensedEdge {
                            parent: cluster,
                            child: CondensedChild::Point(point),
                            lambda,
                            size: 1,
                        });
                    }
                }
            }
        }

        Self {
            edges,
            num_clusters,
        }
    }

    /// Excess-of-mass selection. Returns a flag per condensed cluster id.
    fn select_clusters(&self) -> Vec<bool> {
        let num = self.num_clusters;
        let mut birth = vec![0.0; num];
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); num];
        for edge in &self.edges {
            if let CondensedChild::Cluster(id) = edge.child {
                birth[id] = edge.lambda;
                children[edge.parent].push(id);
            }
        }

        let mut stability = vec![0.0; num];
        for edge in &self.edges {
            stability[edge.parent] += (edge.lambda - birth[edge.parent]) * edge.size as f64;
        }

        let mut selected = vec![false; num];
        // Children always carry larger ids than their parent.
        for cluster in (1..num).rev() {
            let child_stability: f64 = children[cluster].iter().map(|c| stability[*c]).sum();
            if !children[cluster].is_empty() && child_stability > stability[cluster] {
                stability[cluster] = child_stability;
            } else {
                selected[cluster] = true;
                let mut stack = children[cluster].clone();
                while let Some(descendant) = stack.pop() {
                    selected[descendant] = false;
                    stack.extend_from_slice(&children[descendant]);
                }
            }
        }
        selected
    }

    fn labels(&self, n: usize, selected: &[bool]) -> Vec<ClusterLabel> {
        let mut parent_of = vec![None; self.num_clusters];
        let mut falls_from = vec![0usize; n];
        for edge in &self.edges {
            match edge.child {
                CondensedChild::Cluster(id) => parent_of[id] = Some(edge.parent),
                CondensedChild::Point(p) => falls_from[p] = edge.parent,
            }
        }

        let mut output_index = vec![None; self.num_clusters];
        let mut next = 0;
        for (id, is_selected) in selected.iter().enumerate() {
            if *is_selected {
                output_index[id] = Some(next);
                next += 1;
            }
        }

        falls_from
            .into_iter()
            .map(|mut cluster| loop {
                if let Some(index) = output_index[cluster] {
                    break ClusterLabel::Member(index);
                }
                match parent_of[cluster] {
                    Some(parent) => cluster = parent,
                    None => break ClusterLabel::Noise,
                }
            })
            .collect()
    }
}

fn leaves(node: usize, n: usize, merges: &[Merge]) -> Vec<usize> {
    let mut out = Vec::new();
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        if current < n {
            out.push(current);
        } else {
            let merge = merges[current - n];
            stack.push(merge.right);
            stack.push(merge.left);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn blob(center: (f64, f64), count: usize, spread: f64) -> Vec<Vec<f64>> {
        (0..count)
            .map(|i| {
                let angle = i as f64 * 0.7;
                let radius = spread * ((i % 4) as f64 + 1.0) / 4.0;
                vec![center.0 + radius * angle.cos(), center.1 + radius * angle.sin()]
            })
            .collect()
    }

    #[test]
    fn test_two_blobs_and_an_outlier() {
        let mut points = blob((0.0, 0.0), 15, 0.0);
        points.extend(blob((10.0, 10.0), 15, 0.0));
        points.push(vec![100.0, -100.0]);

        let labels = Hdbscan::new(5).fit(&points);

        assert_eq!(labels[0], ClusterLabel::Member(0));
        assert!(labels[..15].iter().all(|l| *l == ClusterLabel::Member(0)));
        assert!(labels[15..30].iter().all(|l| *l == ClusterLabel::Member(1)));
        assert_eq!(labels[30], ClusterLabel::Noise);
    }

    #[test]
    fn test_spread_blobs_are_separated() {
        let mut points = blob((0.0, 0.0), 20, 1.0);
        points.extend(blob((50.0, 50.0), 20, 1.0));

        let labels = Hdbscan::new(5).fit(&points);

        let first: HashSet<usize> = labels[..20].iter().filter_map(ClusterLabel::index).collect();
        let second: HashSet<usize> = labels[20..].iter().filter_map(ClusterLabel::index).collect();
        assert!(!first.is_empty());
        assert!(!second.is_empty());
        assert!(first.is_disjoint(&second));
    }

    #[test]
    fn test_identical_points_are_all_noise() {
        let points = vec![vec![1.0, 2.0, 3.0]; 40];
        let labels = Hdbscan::new(5).fit(&points);
        assert!(labels.iter().all(ClusterLabel::is_noise));
    }

    #[test]
    fn test_fewer_points_than_min_cluster_size_are_noise() {
        let points = vec![vec![0.0], vec![1.0], vec![2.0]];
        let labels = Hdbscan::new(10).fit(&points);
        assert_eq!(labels, vec![ClusterLabel::Noise; 3]);
        assert!(Hdbscan::new(10).fit(&[]).is_empty());
    }

    #[test]
    fn test_deterministic() {
        let mut points = blob((0.0, 0.0), 12, 2.0);
        points.extend(blob((8.0, 0.0), 12, 2.0));
        points.extend(blob((4.0, 9.0), 12, 2.0));

        let hdbscan = Hdbscan::new(5);
        assert_eq!(hdbscan.fit(&points), hdbscan.fit(&points));
    }

    #[test]
    fn test_single_linkage_sizes() {
        let edges = vec![
            Edge { a: 0, b: 1, weight: 1.0 },
            Edge { a: 2, b: 3, weight: 1.0 },
            Edge { a: 1, b: 2, weight: 5.0 },
        ];
        let merges = single_linkage(4, &edges);
        assert_eq!(merges.len(), 3);
        assert_eq!(merges[2].size, 4);
        assert_eq!((merges[2].left, merges[2].right), (4, 5));
    }

    #[test]
    fn test_min_samples_defaults_to_five() {
        assert_eq!(Hdbscan::new(10).min_samples(), 5);
        assert_eq!(Hdbscan::new(50).min_samples(), 5);
        assert_eq!(Hdbscan::new(3).min_samples(), 3);
        assert_eq!(Hdbscan::new(10).with_min_samples(8).min_samples(), 8);
    }

    #[test]
    fn test_fit_uses_fifth_neighbour_for_core_distance() {
        let points: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64]).collect();
        let core = Hdbscan::new(10).core_distances(&points);
        // Self plus four neighbours: the end point reaches x = 4.
        assert_eq!(core[0], 4.0);
        assert_eq!(core[10], 2.0);
        assert_eq!(core[19], 4.0);
    }

    #[test]
    fn test_core_distance_counts_self() {
        let points = vec![vec![0.0], vec![1.0], vec![3.0]];
        // k = 2: nearest neighbour other than the point itself.
        assert_eq!(core_distances(&points, 2), vec![1.0, 1.0, 2.0]);
    }
}
