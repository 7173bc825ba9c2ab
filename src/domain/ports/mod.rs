//! Port trait definitions (Hexagonal Architecture)
//!
//! The discovery core talks to the outside world only through these traits:
//! - TraceSource: fetches a batch of traces with their eval annotations
//! - EmbeddingProvider: turns trace text into a vector (optional)
//! - ReportRepository: stores finished and failed runs

pub mod embedding;
pub mod null_embedding;
pub mod report_repository;
pub mod trace_source;

pub use embedding::{EmbeddingInput, EmbeddingOutput, EmbeddingProvider};
pub use null_embedding::{EmbeddingsDisabled, NullEmbeddingProvider};
pub use report_repository::ReportRepository;
pub use trace_source::TraceSource;
