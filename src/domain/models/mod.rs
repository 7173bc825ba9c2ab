pub mod badness;
pub mod cluster;
pub mod config;
pub mod report;
pub mod slice;
pub mod trace;

pub use badness::{BadnessScore, BadnessSignals, BadnessWeights, BAD_THRESHOLD};
pub use cluster::{Cluster, ClusterLabel, ClusterMethod, CLUSTER_EXAMPLE_COUNT};
pub use config::{Config, DatabaseConfig, DiscoveryConfig, EmbeddingConfig, LoggingConfig};
pub use report::{
    DiscoveryReport, FailedRun, RunStatus, RunSummary, SamplingNote, SkippedTrace, TimeWindow,
    TraceBatch,
};
pub use slice::{AttributeValue, PValueCorrection, Slice, SLICE_SAMPLE_COUNT};
pub use trace::{ToolCall, Trace, TraceAttributes, UNKNOWN_ATTRIBUTE};
