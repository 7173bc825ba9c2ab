//! Report repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{DiscoveryReport, FailedRun, RunSummary};

/// Repository interface for discovery run persistence, keyed by project
/// and run id.
#[async_trait]
pub trait ReportRepository: Send + Sync {
    /// Store a completed run with its clusters and slices.
    async fn persist(&self, report: &DiscoveryReport) -> DomainResult<()>;

    /// Store a run that ended without a report.
    async fn record_failure(&self, failure: &FailedRun) -> DomainResult<()>;

    /// Load a completed run by id.
    async fn get(&self, run_id: Uuid) -> DomainResult<Option<DiscoveryReport>>;

    /// Most recently completed run of a project.
    async fn latest_completed(&self, project: &str) -> DomainResult<Option<DiscoveryReport>>;

    /// Recent runs of a project, newest first, regardless of status.
    async fn list_runs(&self, project: &str, limit: usize) -> DomainResult<Vec<RunSummary>>;
}
