//! Trace source port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{TimeWindow, TraceBatch};

/// Supplies the raw traces (with eval annotations already attached) for a
/// project and time window.
#[async_trait]
pub trait TraceSource: Send + Sync {
    /// Fetch every trace of `project` that started inside `window`.
    ///
    /// Records that cannot be decoded go into [`TraceBatch::rejected`]; an
    /// error is reserved for a source that cannot be read at all.
    async fn fetch_traces(&self, project: &str, window: TimeWindow) -> DomainResult<TraceBatch>;
}
