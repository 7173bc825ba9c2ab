//! Common test utilities for integration tests
//!
//! Shared trace fixtures, an in-memory trace source and an in-memory
//! report repository.

#![allow(dead_code)]

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use tracesift::domain::errors::DomainResult;
use tracesift::domain::models::{
    DiscoveryConfig, DiscoveryReport, FailedRun, RunSummary, TimeWindow, ToolCall, Trace,
    TraceAttributes, TraceBatch,
};
use tracesift::domain::ports::{ReportRepository, TraceSource};

/// Fixed reference time all fixtures are laid out from.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 13, 12, 0, 0).unwrap()
}

/// A window wide enough to hold every fixture trace.
pub fn fixture_window() -> TimeWindow {
    TimeWindow::new(t0() - Duration::days(1), t0() + Duration::days(30))
}

/// Setup test logging
#[allow(dead_code)]
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// A healthy trace: perfect evals, no errors, successful tools.
pub fn good_trace(id: &str, model: &str, intent: &str, minute: i64) -> Trace {
    let start = t0() + Duration::minutes(minute);
    let mut trace = Trace::new(id, start, 1_000.0);
    trace.llm_latency_ms = 700.0;
    trace.tool_latency_ms = 300.0;
    trace.token_count = 800;
    trace.llm_call_count = 2;
    trace.quality_score = Some(1.0);
    trace.grounding_score = Some(1.0);
    trace.tool_calls = vec![
        ToolCall::new("search", start),
        ToolCall::new("summarize", start + Duration::seconds(1)),
    ];
    trace.attributes = TraceAttributes::default()
        .with("model", model)
        .with("intent", intent)
        .with("route", "default")
        .with("provider", provider_for(model));
    trace.input_text = Some(format!("{intent} request"));
    trace.output_text = Some("answer".to_string());
    trace
}

/// A failing trace: zero evals, error spans, failed tool calls.
pub fn bad_trace(id: &str, model: &str, intent: &str, minute: i64) -> Trace {
    let mut trace = good_trace(id, model, intent, minute);
    let start = trace.start_time;
    trace.total_latency_ms = 4_000.0;
    trace.quality_score = Some(0.0);
    trace.grounding_score = Some(0.0);
    trace.error_count = 3;
    trace.tool_calls = vec![
        ToolCall::failed("search", start),
        ToolCall::failed("search", start + Duration::seconds(1)),
        ToolCall::failed("retry", start + Duration::seconds(2)),
    ];
    trace.output_text = Some("error".to_string());
    trace
}

fn provider_for(model: &str) -> &'static str {
    if model.starts_with("gpt") {
        "openai"
    } else {
        "anthropic"
    }
}

/// 100 traces: 40 on gpt-4, 60 on claude-3, intents alternating.
/// The 20 gpt-4 `search` traces are bad, so `model=gpt-4` has a 50% bad
/// rate against a 20% baseline.
pub fn gpt4_scenario() -> Vec<Trace> {
    (0..100)
        .map(|i| {
            let id = format!("t{i:03}");
            let model = if i < 40 { "gpt-4" } else { "claude-3" };
            let intent = if i % 2 == 0 { "search" } else { "chat" };
            if i < 40 && i % 2 == 0 {
                bad_trace(&id, model, intent, i)
            } else {
                good_trace(&id, model, intent, i)
            }
        })
        .collect()
}

/// Config that runs without embeddings and with default thresholds.
pub fn offline_config() -> DiscoveryConfig {
    DiscoveryConfig {
        embeddings_enabled: false,
        ..Default::default()
    }
}

/// Trace source serving a fixed batch, filtered by window.
pub struct StaticTraceSource {
    traces: Vec<Trace>,
}

impl StaticTraceSource {
    pub fn new(traces: Vec<Trace>) -> Self {
        Self { traces }
    }
}

#[async_trait]
impl TraceSource for StaticTraceSource {
    async fn fetch_traces(&self, _project: &str, window: TimeWindow) -> DomainResult<TraceBatch> {
        let traces: Vec<Trace> = self
            .traces
            .iter()
            .filter(|t| window.contains(t.start_time))
            .cloned()
            .collect();
        Ok(traces.into())
    }
}

/// Repository keeping everything in memory.
#[derive(Default)]
pub struct InMemoryReportRepository {
    pub reports: Mutex<Vec<DiscoveryReport>>,
    pub failures: Mutex<Vec<FailedRun>>,
}

#[async_trait]
impl ReportRepository for InMemoryReportRepository {
    async fn persist(&self, report: &DiscoveryReport) -> DomainResult<()> {
        self.reports.lock().unwrap().push(report.clone());
        Ok(())
    }

    async fn record_failure(&self, failure: &FailedRun) -> DomainResult<()> {
        self.failures.lock().unwrap().push(failure.clone());
        Ok(())
    }

    async fn get(&self, run_id: Uuid) -> DomainResult<Option<DiscoveryReport>> {
        Ok(self
            .reports
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.run_id == run_id)
            .cloned())
    }

    async fn latest_completed(&self, project: &str) -> DomainResult<Option<DiscoveryReport>> {
        Ok(self
            .reports
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.project == project)
            .max_by_key(|r| r.completed_at)
            .cloned())
    }

    async fn list_runs(&self, _project: &str, _limit: usize) -> DomainResult<Vec<RunSummary>> {
        Ok(Vec::new())
    }
}
