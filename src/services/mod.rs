pub mod badness_scorer;
pub mod batch_context;
pub mod clustering;
pub mod discovery_pipeline;
pub mod embedding_service;
pub mod feature_extractor;
pub mod slice_analyzer;
pub mod statistics;

pub use badness_scorer::{BadnessScorer, LatencyBaseline};
pub use batch_context::{BatchContext, EmbeddingSegment};
pub use clustering::{ClusteringEngine, ClusteringOutcome};
pub use discovery_pipeline::{analyze_batch, BatchAnalysis, DiscoveryPipeline};
pub use embedding_service::{EmbeddingService, EmbeddingServiceConfig};
pub use feature_extractor::{FeatureExtractor, FeatureVector, ToolVocabulary};
pub use slice_analyzer::{SliceAnalysis, SliceAnalyzer, SliceInput};
