//! Trace source adapters.

pub mod jsonl;

pub use jsonl::JsonlTraceSource;
