//! Discovery orchestrator.
//!
//! Sequences one run end to end:
//!
//! 1. validate the configuration (before any work),
//! 2. fetch traces from the trace source and enforce the trace-count policy,
//! 3. drop malformed traces,
//! 4. embed trace text when a provider is attached,
//! 5. score, extract features, cluster and slice on a blocking worker,
//! 6. assemble the report and hand it to the repository.
//!
//! Runs share nothing mutable, so one pipeline may serve concurrent runs
//! for different projects.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    BadnessScore, DiscoveryConfig, DiscoveryReport, FailedRun, RunStatus, SamplingNote,
    SkippedTrace, TimeWindow, Trace, TraceBatch,
};
use crate::domain::ports::{EmbeddingProvider, ReportRepository, TraceSource};
use crate::services::badness_scorer::BadnessScorer;
use crate::services::batch_context::{BatchContext, EmbeddingSegment};
use crate::services::clustering::{ClusteringEngine, ClusteringOutcome};
use crate::services::embedding_service::EmbeddingService;
use crate::services::feature_extractor::FeatureExtractor;
use crate::services::slice_analyzer::{SliceAnalysis, SliceAnalyzer, SliceInput};

/// Everything the CPU-bound phase produces for one batch.
#[derive(Debug, Clone)]
pub struct BatchAnalysis {
    pub scores: Vec<BadnessScore>,
    pub clustering: ClusteringOutcome,
    pub slices: SliceAnalysis,
    pub embedding_dimension: Option<usize>,
}

/// Score, featurize, cluster and slice an already-validated batch.
///
/// Per-trace work runs on the rayon pool against an immutable
/// [`BatchContext`]; clustering and slicing start once all of it is done.
pub fn analyze_batch(
    traces: &[Trace],
    config: &DiscoveryConfig,
    embeddings: Option<EmbeddingSegment>,
) -> BatchAnalysis {
    let ctx = BatchContext::build(traces, config, embeddings);
    let scorer = BadnessScorer::new(config.badness_weights, ctx.latency);
    let extractor = FeatureExtractor::new(&ctx);

    let (scores, vectors): (Vec<_>, Vec<_>) = traces
        .par_iter()
        .map(|trace| (scorer.score(trace), extractor.extract(trace)))
        .unzip();

    let clustering = ClusteringEngine::new(config).cluster(traces, &vectors, &scores);

    let inputs: Vec<SliceInput<'_>> = traces
        .iter()
        .zip(&scores)
        .map(|(trace, score)| SliceInput {
            trace_id: &trace.trace_id,
            attributes: &trace.attributes,
            is_bad: score.is_bad(),
        })
        .collect();
    let slices = SliceAnalyzer::new(config).analyze(&inputs);

    BatchAnalysis {
        scores,
        clustering,
        slices,
        embedding_dimension: ctx.embedding_dimension(),
    }
}

fn ratio(numerator: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        numerator / count as f64
    }
}

/// Keep the `max` most recent traces (newest first, ties by id).
fn sample_most_recent(mut traces: Vec<Trace>, max: usize) -> (Vec<Trace>, Option<SamplingNote>) {
    if traces.len() <= max {
        return (traces, None);
    }
    let fetched = traces.len();
    traces.sort_by(|a, b| {
        b.start_time
            .cmp(&a.start_time)
            .then_with(|| a.trace_id.cmp(&b.trace_id))
    });
    traces.truncate(max);
    (
        traces,
        Some(SamplingNote {
            fetched,
            kept: max,
        }),
    )
}

/// Reason recorded for a trace whose id already appeared in the batch.
const DUPLICATE_TRACE_REASON: &str = "duplicate trace id";

/// Split a batch into valid traces and skipped ones. Of several valid
/// traces sharing an id, the most recent is kept (the first on a tie).
fn partition_valid(traces: Vec<Trace>) -> (Vec<Trace>, Vec<SkippedTrace>) {
    let checked: Vec<(Trace, DomainResult<()>)> = traces
        .into_par_iter()
        .map(|trace| {
            let result = trace.validate();
            (trace, result)
        })
        .collect();

    let mut valid: Vec<Trace> = Vec::with_capacity(checked.len());
    let mut position: HashMap<String, usize> = HashMap::with_capacity(checked.len());
    let mut skipped = Vec::new();
    for (trace, result) in checked {
        match result {
            Ok(()) => match position.get(&trace.trace_id) {
                Some(&at) => {
                    let dropped = if trace.start_time > valid[at].start_time {
                        std::mem::replace(&mut valid[at], trace)
                    } else {
                        trace
                    };
                    skipped.push(SkippedTrace {
                        trace_id: dropped.trace_id,
                        reason: DUPLICATE_TRACE_REASON.to_string(),
                    });
                }
                None => {
                    position.insert(trace.trace_id.clone(), valid.len());
                    valid.push(trace);
                }
            },
            Err(DomainError::MalformedTrace { trace_id, reason }) => {
                skipped.push(SkippedTrace { trace_id, reason });
            }
            Err(other) => skipped.push(SkippedTrace {
                trace_id: trace.trace_id,
                reason: other.to_string(),
            }),
        }
    }
    (valid, skipped)
}

pub struct DiscoveryPipeline {
    config: DiscoveryConfig,
    trace_source: Arc<dyn TraceSource>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    repository: Option<Arc<dyn ReportRepository>>,
}

impl DiscoveryPipeline {
    pub fn new(config: DiscoveryConfig, trace_source: Arc<dyn TraceSource>) -> Self {
        Self {
            config,
            trace_source,
            embedding_provider: None,
            repository: None,
        }
    }

    pub fn with_embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    pub fn with_repository(mut self, repository: Arc<dyn ReportRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Fetch, analyze and persist one run.
    ///
    /// A run that fails after the configuration check is recorded as a
    /// failed run when a repository is attached.
    #[instrument(skip(self, project, window), fields(project = %project, window = %window))]
    pub async fn run(&self, project: &str, window: TimeWindow) -> DomainResult<DiscoveryReport> {
        self.config.validate()?;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, "starting discovery run");

        let outcome = async {
            let TraceBatch { traces, rejected } =
                self.trace_source.fetch_traces(project, window).await?;
            info!(
                fetched = traces.len(),
                rejected = rejected.len(),
                "fetched traces"
            );
            self.check_min_traces(traces.len())?;
            self.analyze_inner(run_id, project, window, started_at, traces, rejected)
                .await
        }
        .await;

        match outcome {
            Ok(report) => {
                if let Some(repository) = &self.repository {
                    repository.persist(&report).await?;
                }
                info!(
                    %run_id,
                    total_traces = report.total_traces,
                    clusters = report.num_clusters,
                    slices = report.num_significant_slices,
                    baseline = report.baseline_badness_rate,
                    "discovery run completed"
                );
                Ok(report)
            }
            Err(err) => {
                warn!(%run_id, error = %err, "discovery run failed");
                self.record_failure(run_id, project, window, started_at, &err).await;
                Err(err)
            }
        }
    }

    /// Analyze a batch the caller already holds. Nothing is fetched or
    /// persisted.
    pub async fn analyze(
        &self,
        project: &str,
        traces: Vec<Trace>,
        window: TimeWindow,
    ) -> DomainResult<DiscoveryReport> {
        self.config.validate()?;
        self.check_min_traces(traces.len())?;
        self.analyze_inner(Uuid::new_v4(), project, window, Utc::now(), traces, Vec::new())
            .await
    }

    fn check_min_traces(&self, found: usize) -> DomainResult<()> {
        if found < self.config.min_traces {
            return Err(DomainError::InsufficientData {
                found,
                required: self.config.min_traces,
            });
        }
        Ok(())
    }

    async fn analyze_inner(
        &self,
        run_id: Uuid,
        project: &str,
        window: TimeWindow,
        started_at: DateTime<Utc>,
        traces: Vec<Trace>,
        rejected: Vec<SkippedTrace>,
    ) -> DomainResult<DiscoveryReport> {
        let (traces, sampling) = sample_most_recent(traces, self.config.max_traces);
        if let Some(note) = sampling {
            info!(fetched = note.fetched, kept = note.kept, "sampled most recent traces");
        }

        let (mut traces, excluded) = partition_valid(traces);
        if !excluded.is_empty() {
            warn!(skipped = excluded.len(), "excluded malformed or duplicate traces");
        }
        let mut skipped_traces = rejected;
        skipped_traces.extend(excluded);
        self.check_min_traces(traces.len())?;
        traces.sort_by(|a, b| a.trace_id.cmp(&b.trace_id));

        let embeddings = self.embed(&traces).await;

        let config = self.config.clone();
        let (traces, analysis) = tokio::task::spawn_blocking(move || {
            let analysis = analyze_batch(&traces, &config, embeddings);
            (traces, analysis)
        })
        .await
        .map_err(|e| DomainError::ExecutionFailed(format!("analysis worker failed: {e}")))?;

        let total_traces = traces.len();
        let num_bad_traces = analysis.scores.iter().filter(|s| s.is_bad()).count();
        let mean_badness = ratio(analysis.scores.iter().map(|s| s.score).sum(), total_traces);
        let clusters = analysis.clustering.clusters;
        let slices = analysis.slices.slices;

        Ok(DiscoveryReport {
            run_id,
            project: project.to_string(),
            window,
            started_at,
            completed_at: Utc::now(),
            status: RunStatus::Completed,
            total_traces,
            num_bad_traces,
            baseline_badness_rate: ratio(num_bad_traces as f64, total_traces),
            mean_badness,
            num_clusters: clusters.len(),
            num_significant_slices: slices.len(),
            clusters,
            slices,
            noise_trace_ids: analysis.clustering.noise_trace_ids,
            skipped_traces,
            sampling,
            embedding_dimension: analysis.embedding_dimension,
            slices_tested: analysis.slices.slices_tested,
            config: self.config.clone(),
        })
    }

    /// Embedding segment for the batch, or `None` when embeddings are off
    /// or the provider could not serve every trace.
    async fn embed(&self, traces: &[Trace]) -> Option<EmbeddingSegment> {
        if !self.config.embeddings_enabled {
            return None;
        }
        let provider = self.embedding_provider.as_ref()?;
        if provider.dimension() == 0 {
            info!(
                provider = provider.name(),
                model = provider.model(),
                "provider has no embedding dimension, clustering on structural features"
            );
            return None;
        }

        let service = EmbeddingService::with_defaults(Arc::clone(provider));
        match service.embed_traces(traces).await {
            Ok((vectors, report)) => {
                let segment = EmbeddingSegment::new(traces, vectors);
                match &segment {
                    Some(_) => info!(
                        provider = provider.name(),
                        model = provider.model(),
                        dimension = provider.dimension(),
                        embedded = report.traces,
                        api_calls = report.api_calls,
                        "embedded trace text"
                    ),
                    None => warn!(
                        provider = provider.name(),
                        model = provider.model(),
                        "embeddings incomplete or of mixed dimension, omitting embedding features"
                    ),
                }
                segment
            }
            Err(err) => {
                warn!(
                    provider = provider.name(),
                    model = provider.model(),
                    error = %err,
                    "embedding unavailable, omitting embedding features"
                );
                None
            }
        }
    }

    async fn record_failure(
        &self,
        run_id: Uuid,
        project: &str,
        window: TimeWindow,
        started_at: DateTime<Utc>,
        err: &DomainError,
    ) {
        let Some(repository) = &self.repository else {
            return;
        };
        let status = match err {
            DomainError::InsufficientData { .. } => RunStatus::InsufficientData,
            _ => RunStatus::Failed,
        };
        let failure = FailedRun {
            run_id,
            project: project.to_string(),
            window,
            started_at,
            failed_at: Utc::now(),
            status,
            error_message: err.to_string(),
        };
        if let Err(record_err) = repository.record_failure(&failure).await {
            warn!(%run_id, error = %record_err, "could not record failed run");
        }
    }
}
