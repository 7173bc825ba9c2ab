//! Tracesift - failure-pattern discovery over recorded agent traces
//!
//! Tracesift scores every trace of a batch for "badness", clusters the
//! batch by behavior and finds attribute slices whose failure rate is
//! significantly above baseline.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Trace and report models, errors, port traits
//! - **Service Layer** (`services`): Scoring, feature extraction, clustering,
//!   slice analysis and the discovery pipeline
//! - **Adapters** (`adapters`): JSON Lines traces, OpenAI embeddings, SQLite history
//! - **Infrastructure Layer** (`infrastructure`): Configuration and logging
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tracesift::{DiscoveryConfig, DiscoveryPipeline, JsonlTraceSource, TimeWindow};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let source = Arc::new(JsonlTraceSource::new("traces/"));
//!     let pipeline = DiscoveryPipeline::new(DiscoveryConfig::default(), source);
//!     let report = pipeline.run("checkout-agent", TimeWindow::last_days(7)).await?;
//!     println!("{}", report.summary());
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use adapters::trace_source::JsonlTraceSource;
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    BadnessScore, Cluster, ClusterMethod, Config, DiscoveryConfig, DiscoveryReport,
    PValueCorrection, Slice, TimeWindow, Trace, TraceBatch,
};
pub use domain::ports::{EmbeddingProvider, ReportRepository, TraceSource};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{BadnessScorer, ClusteringEngine, DiscoveryPipeline, SliceAnalyzer};
