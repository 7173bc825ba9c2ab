//! Discovery over a JSON Lines trace directory.

mod common;

use std::io::Write;
use std::sync::Arc;

use common::{fixture_window, gpt4_scenario, offline_config};
use tracesift::domain::errors::DomainError;
use tracesift::domain::models::RunStatus;
use tracesift::{DiscoveryPipeline, JsonlTraceSource};

fn write_project(dir: &std::path::Path, project: &str, extra_lines: &[&str]) {
    let mut file = std::fs::File::create(dir.join(format!("{project}.jsonl"))).unwrap();
    for trace in gpt4_scenario() {
        writeln!(file, "{}", serde_json::to_string(&trace).unwrap()).unwrap();
    }
    for line in extra_lines {
        writeln!(file, "{line}").unwrap();
    }
}

#[tokio::test]
async fn test_directory_resolves_project_file() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path(), "checkout-agent", &[]);

    let source = Arc::new(JsonlTraceSource::new(dir.path()));
    let report = DiscoveryPipeline::new(offline_config(), source)
        .run("checkout-agent", fixture_window())
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.total_traces, 100);
    assert_eq!(report.num_bad_traces, 20);
}

#[tokio::test]
async fn test_missing_project_file_is_a_source_error() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path(), "checkout-agent", &[]);

    let source = Arc::new(JsonlTraceSource::new(dir.path()));
    let err = DiscoveryPipeline::new(offline_config(), source)
        .run("support-agent", fixture_window())
        .await
        .unwrap_err();

    assert!(matches!(err, DomainError::TraceSource(ref m) if m.contains("support-agent.jsonl")));
}

#[tokio::test]
async fn test_unparsable_lines_are_reported_as_skipped() {
    let dir = tempfile::tempdir().unwrap();
    write_project(
        dir.path(),
        "checkout-agent",
        &["{not json", r#"{"trace_id": "t-late", "start_time": 7}"#],
    );

    let source = Arc::new(JsonlTraceSource::new(dir.path()));
    let report = DiscoveryPipeline::new(offline_config(), source)
        .run("checkout-agent", fixture_window())
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.total_traces, 100);
    assert_eq!(report.num_bad_traces, 20);

    let skipped: Vec<(&str, &str)> = report
        .skipped_traces
        .iter()
        .map(|s| (s.trace_id.as_str(), s.reason.as_str()))
        .collect();
    assert_eq!(skipped.len(), 2);
    assert_eq!(skipped[0].0, "line 101");
    assert!(skipped[0].1.starts_with("line 101:"));
    assert_eq!(skipped[1].0, "t-late");
    assert!(skipped[1].1.starts_with("line 102:"));
}

#[tokio::test]
async fn test_mostly_unparsable_file_is_insufficient_data() {
    let dir = tempfile::tempdir().unwrap();
    let mut file = std::fs::File::create(dir.path().join("checkout-agent.jsonl")).unwrap();
    for trace in gpt4_scenario().into_iter().take(10) {
        writeln!(file, "{}", serde_json::to_string(&trace).unwrap()).unwrap();
    }
    for _ in 0..90 {
        writeln!(file, "garbage").unwrap();
    }

    let source = Arc::new(JsonlTraceSource::new(dir.path()));
    let err = DiscoveryPipeline::new(offline_config(), source)
        .run("checkout-agent", fixture_window())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DomainError::InsufficientData { found: 10, required: 50 }
    ));
}
