//! Adapters for external systems.

pub mod embeddings;
pub mod sqlite;
pub mod trace_source;
