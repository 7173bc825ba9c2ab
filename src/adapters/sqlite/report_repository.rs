//! SQLite implementation of the ReportRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{parse_datetime, parse_json_or_default, parse_optional_datetime, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Cluster, DiscoveryConfig, DiscoveryReport, FailedRun, RunStatus, RunSummary, Slice, TimeWindow,
};
use crate::domain::ports::ReportRepository;

const RUN_COLUMNS: &str = "id, project, status, window_start, window_end, started_at, completed_at, \
    total_traces, num_bad_traces, baseline_badness_rate, mean_badness, num_clusters, \
    num_significant_slices, slices_tested, embedding_dimension, noise_trace_ids, skipped_traces, \
    sampling, config, error_message";

#[derive(Clone)]
pub struct SqliteReportRepository {
    pool: SqlitePool,
}

impl SqliteReportRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn load_report(&self, row: RunRow) -> DomainResult<DiscoveryReport> {
        let clusters: Vec<ClusterRow> = sqlx::query_as(
            "SELECT cluster_index, size, avg_badness, badness_rate, dominant_attributes, example_trace_ids, trace_ids
             FROM trace_clusters WHERE run_id = ? ORDER BY rank",
        )
        .bind(&row.id)
        .fetch_all(&self.pool)
        .await?;

        let slices: Vec<SliceRow> = sqlx::query_as(
            "SELECT attributes, size, bad_count, badness_rate, baseline_rate, lift, p_value, adjusted_p_value, sample_trace_ids
             FROM trace_slices WHERE run_id = ? ORDER BY rank",
        )
        .bind(&row.id)
        .fetch_all(&self.pool)
        .await?;

        let clusters = clusters
            .into_iter()
            .map(Cluster::try_from)
            .collect::<DomainResult<Vec<_>>>()?;
        let slices = slices
            .into_iter()
            .map(Slice::try_from)
            .collect::<DomainResult<Vec<_>>>()?;

        row.into_report(clusters, slices)
    }
}

#[async_trait]
impl ReportRepository for SqliteReportRepository {
    async fn persist(&self, report: &DiscoveryReport) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"INSERT INTO trace_discovery_runs (id, project, status, window_start, window_end, started_at, completed_at,
                   total_traces, num_bad_traces, baseline_badness_rate, mean_badness, num_clusters,
                   num_significant_slices, slices_tested, embedding_dimension, noise_trace_ids, skipped_traces,
                   sampling, config, error_message)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL)"#,
        )
        .bind(report.run_id.to_string())
        .bind(&report.project)
        .bind(report.status.as_str())
        .bind(report.window.start.to_rfc3339())
        .bind(report.window.end.to_rfc3339())
        .bind(report.started_at.to_rfc3339())
        .bind(report.completed_at.to_rfc3339())
        .bind(to_db_count(report.total_traces))
        .bind(to_db_count(report.num_bad_traces))
        .bind(report.baseline_badness_rate)
        .bind(report.mean_badness)
        .bind(to_db_count(report.num_clusters))
        .bind(to_db_count(report.num_significant_slices))
        .bind(to_db_count(report.slices_tested))
        .bind(report.embedding_dimension.map(to_db_count))
        .bind(serde_json::to_string(&report.noise_trace_ids)?)
        .bind(serde_json::to_string(&report.skipped_traces)?)
        .bind(serde_json::to_string(&report.sampling)?)
        .bind(serde_json::to_string(&report.config)?)
        .execute(&mut *tx)
        .await?;

        for (rank, cluster) in report.clusters.iter().enumerate() {
            sqlx::query(
                r#"INSERT INTO trace_clusters (run_id, rank, cluster_index, size, avg_badness, badness_rate,
                       dominant_attributes, example_trace_ids, trace_ids)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(report.run_id.to_string())
            .bind(to_db_count(rank))
            .bind(to_db_count(cluster.cluster_index))
            .bind(to_db_count(cluster.size))
            .bind(cluster.avg_badness)
            .bind(cluster.badness_rate)
            .bind(serde_json::to_string(&cluster.dominant_attributes)?)
            .bind(serde_json::to_string(&cluster.example_trace_ids)?)
            .bind(serde_json::to_string(&cluster.trace_ids)?)
            .execute(&mut *tx)
            .await?;
        }

        for (rank, slice) in report.slices.iter().enumerate() {
            sqlx::query(
                r#"INSERT INTO trace_slices (run_id, rank, attributes, size, bad_count, badness_rate, baseline_rate,
                       lift, p_value, adjusted_p_value, sample_trace_ids)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(report.run_id.to_string())
            .bind(to_db_count(rank))
            .bind(serde_json::to_string(&slice.attributes)?)
            .bind(to_db_count(slice.size))
            .bind(to_db_count(slice.bad_count))
            .bind(slice.badness_rate)
            .bind(slice.baseline_rate)
            .bind(slice.lift)
            .bind(slice.p_value)
            .bind(slice.adjusted_p_value)
            .bind(serde_json::to_string(&slice.sample_trace_ids)?)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn record_failure(&self, failure: &FailedRun) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO trace_discovery_runs (id, project, status, window_start, window_end, started_at,
                   completed_at, error_message)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(failure.run_id.to_string())
        .bind(&failure.project)
        .bind(failure.status.as_str())
        .bind(failure.window.start.to_rfc3339())
        .bind(failure.window.end.to_rfc3339())
        .bind(failure.started_at.to_rfc3339())
        .bind(failure.failed_at.to_rfc3339())
        .bind(&failure.error_message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, run_id: Uuid) -> DomainResult<Option<DiscoveryReport>> {
        let query = format!(
            "SELECT {RUN_COLUMNS} FROM trace_discovery_runs WHERE id = ? AND status = 'completed'"
        );
        let row: Option<RunRow> = sqlx::query_as(&query)
            .bind(run_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => self.load_report(row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn latest_completed(&self, project: &str) -> DomainResult<Option<DiscoveryReport>> {
        let query = format!(
            "SELECT {RUN_COLUMNS} FROM trace_discovery_runs
             WHERE project = ? AND status = 'completed'
             ORDER BY completed_at DESC LIMIT 1"
        );
        let row: Option<RunRow> = sqlx::query_as(&query)
            .bind(project)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => self.load_report(row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn list_runs(&self, project: &str, limit: usize) -> DomainResult<Vec<RunSummary>> {
        let query = format!(
            "SELECT {RUN_COLUMNS} FROM trace_discovery_runs
             WHERE project = ? ORDER BY started_at DESC LIMIT ?"
        );
        let rows: Vec<RunRow> = sqlx::query_as(&query)
            .bind(project)
            .bind(to_db_count(limit))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(RunRow::into_summary).collect()
    }
}

fn to_db_count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn from_db_count(n: i64, column: &str) -> DomainResult<usize> {
    usize::try_from(n).map_err(|_| {
        DomainError::SerializationError(format!("column {column} holds negative count {n}"))
    })
}

fn required<T>(value: Option<T>, column: &str) -> DomainResult<T> {
    value.ok_or_else(|| {
        DomainError::SerializationError(format!("completed run is missing {column}"))
    })
}

#[derive(sqlx::FromRow)]
struct RunRow {
    id: String,
    project: String,
    status: String,
    window_start: String,
    window_end: String,
    started_at: String,
    completed_at: Option<String>,
    total_traces: Option<i64>,
    num_bad_traces: Option<i64>,
    baseline_badness_rate: Option<f64>,
    mean_badness: Option<f64>,
    num_clusters: i64,
    num_significant_slices: i64,
    slices_tested: i64,
    embedding_dimension: Option<i64>,
    noise_trace_ids: Option<String>,
    skipped_traces: Option<String>,
    sampling: Option<String>,
    config: Option<String>,
    error_message: Option<String>,
}

impl RunRow {
    fn status(&self) -> DomainResult<RunStatus> {
        RunStatus::from_str(&self.status).ok_or_else(|| {
            DomainError::SerializationError(format!("unknown run status: {}", self.status))
        })
    }

    fn into_summary(self) -> DomainResult<RunSummary> {
        Ok(RunSummary {
            run_id: parse_uuid(&self.id)?,
            status: self.status()?,
            started_at: parse_datetime(&self.started_at)?,
            completed_at: parse_optional_datetime(self.completed_at)?,
            total_traces: self
                .total_traces
                .map(|n| from_db_count(n, "total_traces"))
                .transpose()?,
            baseline_badness_rate: self.baseline_badness_rate,
            num_clusters: from_db_count(self.num_clusters, "num_clusters")?,
            num_slices: from_db_count(self.num_significant_slices, "num_significant_slices")?,
            error_message: self.error_message,
            project: self.project,
        })
    }

    fn into_report(self, clusters: Vec<Cluster>, slices: Vec<Slice>) -> DomainResult<DiscoveryReport> {
        let status = self.status()?;
        let config: Option<DiscoveryConfig> = self
            .config
            .map(|c| serde_json::from_str(&c))
            .transpose()?;

        Ok(DiscoveryReport {
            run_id: parse_uuid(&self.id)?,
            project: self.project,
            window: TimeWindow::new(
                parse_datetime(&self.window_start)?,
                parse_datetime(&self.window_end)?,
            ),
            started_at: parse_datetime(&self.started_at)?,
            completed_at: parse_datetime(&required(self.completed_at, "completed_at")?)?,
            status,
            total_traces: from_db_count(required(self.total_traces, "total_traces")?, "total_traces")?,
            num_bad_traces: from_db_count(
                required(self.num_bad_traces, "num_bad_traces")?,
                "num_bad_traces",
            )?,
            baseline_badness_rate: required(self.baseline_badness_rate, "baseline_badness_rate")?,
            mean_badness: required(self.mean_badness, "mean_badness")?,
            clusters,
            slices,
            num_clusters: from_db_count(self.num_clusters, "num_clusters")?,
            num_significant_slices: from_db_count(
                self.num_significant_slices,
                "num_significant_slices",
            )?,
            noise_trace_ids: parse_json_or_default(self.noise_trace_ids)?,
            skipped_traces: parse_json_or_default(self.skipped_traces)?,
            sampling: parse_json_or_default(self.sampling)?,
            embedding_dimension: self
                .embedding_dimension
                .map(|n| from_db_count(n, "embedding_dimension"))
                .transpose()?,
            slices_tested: from_db_count(self.slices_tested, "slices_tested")?,
            config: required(config, "config")?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ClusterRow {
    cluster_index: i64,
    size: i64,
    avg_badness: f64,
    badness_rate: f64,
    dominant_attributes: String,
    example_trace_ids: String,
    trace_ids: String,
}

impl TryFrom<ClusterRow> for Cluster {
    type Error = DomainError;

    fn try_from(row: ClusterRow) -> Result<Self, Self::Error> {
        Ok(Cluster {
            cluster_index: from_db_count(row.cluster_index, "cluster_index")?,
            trace_ids: serde_json::from_str(&row.trace_ids)?,
            size: from_db_count(row.size, "size")?,
            avg_badness: row.avg_badness,
            badness_rate: row.badness_rate,
            dominant_attributes: serde_json::from_str(&row.dominant_attributes)?,
            example_trace_ids: serde_json::from_str(&row.example_trace_ids)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SliceRow {
    attributes: String,
    size: i64,
    bad_count: i64,
    badness_rate: f64,
    baseline_rate: f64,
    lift: f64,
    p_value: f64,
    adjusted_p_value: f64,
    sample_trace_ids: String,
}

impl TryFrom<SliceRow> for Slice {
    type Error = DomainError;

    fn try_from(row: SliceRow) -> Result<Self, Self::Error> {
        Ok(Slice {
            attributes: serde_json::from_str(&row.attributes)?,
            size: from_db_count(row.size, "size")?,
            bad_count: from_db_count(row.bad_count, "bad_count")?,
            badness_rate: row.badness_rate,
            baseline_rate: row.baseline_rate,
            lift: row.lift,
            p_value: row.p_value,
            adjusted_p_value: row.adjusted_p_value,
            sample_trace_ids: serde_json::from_str(&row.sample_trace_ids)?,
        })
    }
}
