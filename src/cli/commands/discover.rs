//! `tracesift discover`: run one discovery pass over a trace file.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::Args;
use serde::Serialize;
use tracing::info;

use crate::adapters::embeddings::{OpenAiEmbeddingConfig, OpenAiEmbeddingProvider};
use crate::adapters::sqlite::{initialize_database, SqliteReportRepository};
use crate::adapters::trace_source::JsonlTraceSource;
use crate::cli::output::{create_spinner, output, CommandOutput, ProgressBarExt, TableFormatter};
use crate::domain::models::{ClusterMethod, Config, DiscoveryReport, TimeWindow};
use crate::domain::ports::{EmbeddingProvider, EmbeddingsDisabled, NullEmbeddingProvider};
use crate::services::DiscoveryPipeline;

#[derive(Args, Debug)]
pub struct DiscoverArgs {
    /// JSON Lines trace file, or a directory holding `<project>.jsonl`
    #[arg(short, long)]
    pub traces: PathBuf,

    /// Project to analyze
    #[arg(short, long)]
    pub project: String,

    /// Analyze the last N days (ignored when --since is given)
    #[arg(short, long, default_value = "7")]
    pub days_back: i64,

    /// Window start (RFC 3339 or YYYY-MM-DD)
    #[arg(long, value_parser = parse_timestamp)]
    pub since: Option<DateTime<Utc>>,

    /// Window end, exclusive (RFC 3339 or YYYY-MM-DD); defaults to now
    #[arg(long, value_parser = parse_timestamp, requires = "since")]
    pub until: Option<DateTime<Utc>>,

    /// Override the configured clustering method
    #[arg(long, value_enum)]
    pub method: Option<MethodArg>,

    /// Override the configured minimum cluster size
    #[arg(long)]
    pub min_cluster_size: Option<usize>,

    /// Override the configured minimum trace count
    #[arg(long)]
    pub min_traces: Option<usize>,

    /// Skip text embeddings even when an API key is available
    #[arg(long)]
    pub no_embeddings: bool,

    /// Do not store the run in the history database
    #[arg(long)]
    pub no_persist: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum MethodArg {
    Hdbscan,
    Kmeans,
}

impl From<MethodArg> for ClusterMethod {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Hdbscan => Self::Hdbscan,
            MethodArg::Kmeans => Self::Kmeans,
        }
    }
}

/// Accepts RFC 3339 timestamps or plain dates (midnight UTC).
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| format!("invalid timestamp '{value}', expected RFC 3339 or YYYY-MM-DD"))
}

impl DiscoverArgs {
    /// Window selected by `--since/--until` or `--days-back`.
    pub fn window(&self) -> Result<TimeWindow> {
        let window = match self.since {
            Some(start) => TimeWindow::new(start, self.until.unwrap_or_else(Utc::now)),
            None => {
                if self.days_back <= 0 {
                    bail!("--days-back must be positive, got {}", self.days_back);
                }
                TimeWindow::last_days(self.days_back)
            }
        };
        if window.start >= window.end {
            bail!("empty time window: {window}");
        }
        Ok(window)
    }
}

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct DiscoverOutput {
    pub report: DiscoveryReport,
}

impl CommandOutput for DiscoverOutput {
    fn to_human(&self) -> String {
        render_report(&self.report)
    }
}

/// Summary followed by cluster and slice tables.
pub fn render_report(report: &DiscoveryReport) -> String {
    let formatter = TableFormatter::new();
    let mut sections = vec![
        format!("Run {}", report.run_id),
        report.summary(),
    ];

    if report.clusters.is_empty() {
        sections.push("\nNo clusters found.".to_string());
    } else {
        sections.push(format!("\nClusters ({}):", report.num_clusters));
        sections.push(formatter.format_clusters(&report.clusters));
    }

    if report.slices.is_empty() {
        sections.push(format!(
            "\nNo significant slices ({} tested).",
            report.slices_tested
        ));
    } else {
        sections.push(format!(
            "\nSignificant slices ({} of {} tested):",
            report.num_significant_slices, report.slices_tested
        ));
        sections.push(formatter.format_slices(&report.slices));
    }

    sections.join("\n")
}

/// Embedding backend for a run: OpenAI when embeddings are enabled and a
/// key resolves, otherwise a null provider recording why not.
pub fn select_embedding_provider(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    if !config.discovery.embeddings_enabled {
        return Ok(Arc::new(NullEmbeddingProvider::new(EmbeddingsDisabled::ByConfig)));
    }
    if config.embedding.resolve_api_key().is_none() {
        return Ok(Arc::new(NullEmbeddingProvider::new(
            EmbeddingsDisabled::MissingApiKey,
        )));
    }
    let provider_config =
        OpenAiEmbeddingConfig::from_settings(&config.embedding, &config.discovery.embedding_model);
    Ok(Arc::new(OpenAiEmbeddingProvider::new(provider_config)?))
}

pub async fn execute(args: DiscoverArgs, mut config: Config, json_mode: bool) -> Result<()> {
    let window = args.window()?;

    if let Some(method) = args.method {
        config.discovery.cluster_method = method.into();
    }
    if let Some(size) = args.min_cluster_size {
        config.discovery.min_cluster_size = size;
    }
    if let Some(min) = args.min_traces {
        config.discovery.min_traces = min;
    }
    if args.no_embeddings {
        config.discovery.embeddings_enabled = false;
    }

    let provider = select_embedding_provider(&config)?;
    info!(
        provider = provider.name(),
        model = provider.model(),
        "embedding provider selected"
    );
    let source = Arc::new(JsonlTraceSource::new(&args.traces));
    let mut pipeline = DiscoveryPipeline::new(config.discovery.clone(), source)
        .with_embedding_provider(provider);

    if !args.no_persist {
        let pool = initialize_database(&config.database)
            .await
            .with_context(|| format!("Failed to open database at {}", config.database.path))?;
        pipeline = pipeline.with_repository(Arc::new(SqliteReportRepository::new(pool)));
    }

    let spinner = create_spinner(
        format!("Discovering failure patterns in {}", args.project),
        !json_mode,
    );
    let report = match pipeline.run(&args.project, window).await {
        Ok(report) => {
            spinner.finish_success(format!(
                "{} traces, {} clusters, {} slices",
                report.total_traces, report.num_clusters, report.num_significant_slices
            ));
            report
        }
        Err(err) => {
            spinner.finish_error("discovery failed");
            return Err(err).context(format!("Discovery run for '{}' failed", args.project));
        }
    };

    output(&DiscoverOutput { report }, json_mode);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_timestamp_accepts_dates_and_rfc3339() {
        assert_eq!(
            parse_timestamp("2025-01-13").unwrap(),
            Utc.with_ymd_and_hms(2025, 1, 13, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_timestamp("2025-01-13T10:30:00+02:00").unwrap(),
            Utc.with_ymd_and_hms(2025, 1, 13, 8, 30, 0).unwrap()
        );
        assert!(parse_timestamp("last tuesday").is_err());
    }

    fn args() -> DiscoverArgs {
        DiscoverArgs {
            traces: PathBuf::from("traces.jsonl"),
            project: "p".into(),
            days_back: 7,
            since: None,
            until: None,
            method: None,
            min_cluster_size: None,
            min_traces: None,
            no_embeddings: false,
            no_persist: false,
        }
    }

    #[test]
    fn test_window_from_days_back() {
        let window = args().window().unwrap();
        assert_eq!((window.end - window.start).num_days(), 7);
    }

    #[test]
    fn test_window_rejects_inverted_range() {
        let mut a = args();
        a.since = Some(Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap());
        a.until = Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        assert!(a.window().is_err());
    }

    #[test]
    fn test_disabled_embeddings_select_null_provider() {
        let mut config = Config::default();
        config.discovery.embeddings_enabled = false;
        config.embedding.api_key = Some("sk-test".into());

        let provider = select_embedding_provider(&config).unwrap();
        assert_eq!(provider.name(), "disabled");
        assert_eq!(provider.dimension(), 0);
    }

    #[test]
    fn test_missing_key_selects_null_provider() {
        temp_env::with_var_unset("OPENAI_API_KEY", || {
            let mut config = Config::default();
            config.discovery.embeddings_enabled = true;
            config.embedding.api_key = None;

            let provider = select_embedding_provider(&config).unwrap();
            assert_eq!(provider.name(), "no-api-key");
            assert_eq!(provider.model(), "none");
        });
    }

    #[test]
    fn test_configured_key_selects_openai() {
        let mut config = Config::default();
        config.discovery.embeddings_enabled = true;
        config.embedding.api_key = Some("sk-test".into());

        let provider = select_embedding_provider(&config).unwrap();
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.model(), config.discovery.embedding_model);
    }

    #[test]
    fn test_window_rejects_non_positive_days() {
        let mut a = args();
        a.days_back = 0;
        assert!(a.window().is_err());
    }
}
