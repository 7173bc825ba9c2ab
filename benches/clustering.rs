//! Clustering and end-to-end batch analysis benchmarks.

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use tracesift::domain::models::{DiscoveryConfig, ToolCall, Trace, TraceAttributes};
use tracesift::services::analyze_batch;
use tracesift::services::clustering::{Hdbscan, KMeans};

/// Three well-separated blobs laid out on a deterministic lattice.
fn blobs(n: usize, dim: usize) -> Vec<Vec<f64>> {
    (0..n)
        .map(|i| {
            let center = (i % 3) as f64 * 20.0;
            (0..dim)
                .map(|d| center + ((i * 31 + d * 17) % 13) as f64 * 0.1)
                .collect()
        })
        .collect()
}

fn traces(n: usize) -> Vec<Trace> {
    let t0 = Utc.with_ymd_and_hms(2025, 1, 13, 0, 0, 0).unwrap();
    (0..n)
        .map(|i| {
            let start = t0 + Duration::seconds(i as i64);
            let mut trace = Trace::new(format!("t{i:05}"), start, 500.0 + (i % 40) as f64 * 50.0);
            trace.error_count = (i % 7 == 0) as i64 * 2;
            trace.quality_score = Some(((i % 10) as f64) / 10.0);
            trace.tool_calls = (0..(i % 4))
                .map(|k| {
                    let at = start + Duration::milliseconds(k as i64 * 10);
                    if (i + k) % 5 == 0 {
                        ToolCall::failed(format!("tool-{k}"), at)
                    } else {
                        ToolCall::new(format!("tool-{k}"), at)
                    }
                })
                .collect();
            trace.attributes = TraceAttributes::default()
                .with("model", ["gpt-4", "claude-3", "llama"][i % 3])
                .with("intent", ["search", "chat"][i % 2]);
            trace
        })
        .collect()
}

fn bench_hdbscan(c: &mut Criterion) {
    let mut group = c.benchmark_group("clustering/hdbscan");
    group.sample_size(20);

    for n in [100usize, 500, 1_000] {
        let points = blobs(n, 12);
        group.bench_with_input(BenchmarkId::from_parameter(n), &points, |b, points| {
            b.iter(|| Hdbscan::new(10).fit(black_box(points)));
        });
    }

    group.finish();
}

fn bench_kmeans(c: &mut Criterion) {
    let mut group = c.benchmark_group("clustering/kmeans");

    for n in [100usize, 1_000] {
        let points = blobs(n, 12);
        group.bench_with_input(BenchmarkId::new("fixed_k", n), &points, |b, points| {
            b.iter(|| KMeans::new(Some(3)).fit(black_box(points)));
        });
        group.bench_with_input(BenchmarkId::new("elbow", n), &points, |b, points| {
            b.iter(|| KMeans::new(None).fit(black_box(points)));
        });
    }

    group.finish();
}

fn bench_analyze_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline/analyze_batch");
    group.sample_size(10);
    let config = DiscoveryConfig {
        embeddings_enabled: false,
        ..Default::default()
    };

    for n in [200usize, 1_000] {
        let batch = traces(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &batch, |b, batch| {
            b.iter(|| analyze_batch(black_box(batch), &config, None));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_hdbscan, bench_kmeans, bench_analyze_batch);
criterion_main!(benches);
