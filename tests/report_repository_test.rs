//! SQLite run history against a migrated in-memory database.

mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use common::{fixture_window, gpt4_scenario, offline_config, StaticTraceSource};
use tracesift::adapters::sqlite::{create_migrated_test_pool, SqliteReportRepository};
use tracesift::domain::models::{DiscoveryReport, FailedRun, RunStatus};
use tracesift::domain::ports::ReportRepository;
use tracesift::services::DiscoveryPipeline;

async fn setup_repo() -> SqliteReportRepository {
    let pool = create_migrated_test_pool()
        .await
        .expect("Failed to create test pool");
    SqliteReportRepository::new(pool)
}

async fn sample_report(project: &str) -> DiscoveryReport {
    DiscoveryPipeline::new(offline_config(), Arc::new(StaticTraceSource::new(Vec::new())))
        .analyze(project, gpt4_scenario(), fixture_window())
        .await
        .expect("analysis should succeed")
}

fn failure(project: &str, minutes_ago: i64) -> FailedRun {
    let started_at = Utc::now() - Duration::minutes(minutes_ago);
    FailedRun {
        run_id: Uuid::new_v4(),
        project: project.to_string(),
        window: fixture_window(),
        started_at,
        failed_at: started_at + Duration::seconds(1),
        status: RunStatus::InsufficientData,
        error_message: "Insufficient data: need at least 50 traces, found 3".to_string(),
    }
}

fn assert_same_results(stored: &DiscoveryReport, original: &DiscoveryReport) {
    assert_eq!(stored.run_id, original.run_id);
    assert_eq!(stored.project, original.project);
    assert_eq!(stored.status, RunStatus::Completed);
    assert_eq!(stored.window, original.window);
    assert_eq!(stored.total_traces, original.total_traces);
    assert_eq!(stored.num_bad_traces, original.num_bad_traces);
    assert_eq!(stored.baseline_badness_rate, original.baseline_badness_rate);
    assert_eq!(stored.clusters, original.clusters);
    assert_eq!(stored.slices, original.slices);
    assert_eq!(stored.noise_trace_ids, original.noise_trace_ids);
    assert_eq!(stored.skipped_traces, original.skipped_traces);
    assert_eq!(stored.sampling, original.sampling);
    assert_eq!(stored.slices_tested, original.slices_tested);
    assert_eq!(stored.embedding_dimension, original.embedding_dimension);
    assert_eq!(stored.config.min_cluster_size, original.config.min_cluster_size);
    assert_eq!(stored.config.cluster_method, original.config.cluster_method);
}

#[tokio::test]
async fn test_persist_and_get() {
    let repo = setup_repo().await;
    let report = sample_report("checkout-agent").await;

    repo.persist(&report).await.expect("Failed to persist report");

    let stored = repo
        .get(report.run_id)
        .await
        .expect("Failed to get report")
        .expect("Report not found");
    assert_same_results(&stored, &report);
}

#[tokio::test]
async fn test_cluster_and_slice_ranking_survive_storage() {
    let repo = setup_repo().await;
    let report = sample_report("checkout-agent").await;
    repo.persist(&report).await.unwrap();

    let stored = repo.get(report.run_id).await.unwrap().unwrap();
    let ranked: Vec<f64> = stored.slices.iter().map(|s| s.lift).collect();
    let mut sorted = ranked.clone();
    sorted.sort_by(|a, b| b.total_cmp(a));
    assert_eq!(ranked, sorted);
    assert_eq!(
        stored.worst_cluster().map(|c| c.cluster_index),
        report.worst_cluster().map(|c| c.cluster_index)
    );
}

#[tokio::test]
async fn test_get_unknown_run() {
    let repo = setup_repo().await;
    let found = repo.get(Uuid::new_v4()).await.unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn test_failed_run_is_not_a_report() {
    let repo = setup_repo().await;
    let failed = failure("checkout-agent", 0);
    repo.record_failure(&failed).await.unwrap();

    assert!(repo.get(failed.run_id).await.unwrap().is_none());
    assert!(repo.latest_completed("checkout-agent").await.unwrap().is_none());
}

#[tokio::test]
async fn test_latest_completed_ignores_failures_and_other_projects() {
    let repo = setup_repo().await;

    let first = sample_report("checkout-agent").await;
    repo.persist(&first).await.unwrap();
    let second = sample_report("checkout-agent").await;
    repo.persist(&second).await.unwrap();
    let other = sample_report("support-agent").await;
    repo.persist(&other).await.unwrap();
    repo.record_failure(&failure("checkout-agent", -5)).await.unwrap();

    let latest = repo
        .latest_completed("checkout-agent")
        .await
        .unwrap()
        .expect("a completed run exists");
    assert_eq!(latest.run_id, second.run_id);
}

#[tokio::test]
async fn test_list_runs_newest_first_with_status() {
    let repo = setup_repo().await;

    repo.record_failure(&failure("checkout-agent", 60)).await.unwrap();
    let report = sample_report("checkout-agent").await;
    repo.persist(&report).await.unwrap();
    repo.record_failure(&failure("support-agent", 0)).await.unwrap();

    let runs = repo.list_runs("checkout-agent", 20).await.unwrap();
    assert_eq!(runs.len(), 2);

    assert_eq!(runs[0].run_id, report.run_id);
    assert_eq!(runs[0].status, RunStatus::Completed);
    assert_eq!(runs[0].total_traces, Some(100));
    assert_eq!(runs[0].num_clusters, report.num_clusters);
    assert!(runs[0].error_message.is_none());

    assert_eq!(runs[1].status, RunStatus::InsufficientData);
    assert_eq!(runs[1].total_traces, None);
    assert!(runs[1]
        .error_message
        .as_deref()
        .is_some_and(|m| m.contains("Insufficient data")));
}

#[tokio::test]
async fn test_list_runs_respects_limit() {
    let repo = setup_repo().await;
    for minutes_ago in 0..5 {
        repo.record_failure(&failure("checkout-agent", minutes_ago))
            .await
            .unwrap();
    }

    let runs = repo.list_runs("checkout-agent", 3).await.unwrap();
    assert_eq!(runs.len(), 3);
    for pair in runs.windows(2) {
        assert!(pair[0].started_at >= pair[1].started_at);
    }
}

#[tokio::test]
async fn test_duplicate_run_id_is_rejected() {
    let repo = setup_repo().await;
    let report = sample_report("checkout-agent").await;
    repo.persist(&report).await.unwrap();

    assert!(repo.persist(&report).await.is_err());
    let runs = repo.list_runs("checkout-agent", 10).await.unwrap();
    assert_eq!(runs.len(), 1);
}
