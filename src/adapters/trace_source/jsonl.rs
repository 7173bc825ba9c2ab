//! JSON Lines trace source.
//!
//! One trace per line, in the serde shape of [`Trace`]. Blank lines are
//! ignored; lines that do not decode are rejected without failing the read. A path pointing at a directory is resolved to
//! `<dir>/<project>.jsonl`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{SkippedTrace, TimeWindow, Trace, TraceBatch};
use crate::domain::ports::TraceSource;

pub struct JsonlTraceSource {
    path: PathBuf,
}

impl JsonlTraceSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File the traces of `project` are read from.
    pub fn file_for(&self, project: &str) -> PathBuf {
        if self.path.is_dir() {
            self.path.join(format!("{project}.jsonl"))
        } else {
            self.path.clone()
        }
    }
}

/// Best-effort id for a line that does not decode as a [`Trace`].
fn rejected_id(line: &str, number: usize) -> String {
    serde_json::from_str::<serde_json::Value>(line)
        .ok()
        .and_then(|value| value.get("trace_id")?.as_str().map(str::to_owned))
        .unwrap_or_else(|| format!("line {number}"))
}

/// Parse JSON Lines content. Lines that fail to decode are returned as
/// rejected records carrying their line number.
pub fn parse_traces(content: &str, origin: &Path) -> TraceBatch {
    let mut batch = TraceBatch::default();

    for (index, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let number = index + 1;
        match serde_json::from_str::<Trace>(line) {
            Ok(trace) => batch.traces.push(trace),
            Err(e) => {
                warn!(origin = %origin.display(), line = number, error = %e, "skipping unparsable trace line");
                batch.rejected.push(SkippedTrace {
                    trace_id: rejected_id(line, number),
                    reason: format!("line {number}: {e}"),
                });
            }
        }
    }
    batch
}

#[async_trait]
impl TraceSource for JsonlTraceSource {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn fetch_traces(&self, project: &str, window: TimeWindow) -> DomainResult<TraceBatch> {
        let file = self.file_for(project);
        let content = tokio::fs::read_to_string(&file).await.map_err(|e| {
            DomainError::TraceSource(format!("cannot read {}: {e}", file.display()))
        })?;

        // Rejected lines have no trustworthy start time and are all kept.
        let TraceBatch { traces, rejected } = parse_traces(&content, &file);
        let total = traces.len();
        let traces: Vec<Trace> = traces
            .into_iter()
            .filter(|t| window.contains(t.start_time))
            .collect();

        debug!(
            read = total,
            in_window = traces.len(),
            rejected = rejected.len(),
            "loaded traces"
        );
        Ok(TraceBatch::new(traces, rejected))
    }
}
