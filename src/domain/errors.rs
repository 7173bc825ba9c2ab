//! Domain errors for the tracesift discovery pipeline.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors that can occur while discovering failure patterns.
///
/// Only `InvalidConfig` and `InsufficientData` end a run. `MalformedTrace`
/// and `EmbeddingUnavailable` are recovered inside the pipeline and surface
/// in the report instead.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Insufficient data: need at least {required} traces, found {found}")]
    InsufficientData { found: usize, required: usize },

    #[error("Malformed trace {trace_id}: {reason}")]
    MalformedTrace { trace_id: String, reason: String },

    #[error("Embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Invalid discovery configuration: {0}")]
    InvalidConfig(String),

    #[error("Trace source error: {0}")]
    TraceSource(String),

    #[error("Discovery run not found: {0}")]
    RunNotFound(Uuid),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    /// Shorthand used by trace validation.
    pub fn malformed(trace_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedTrace {
            trace_id: trace_id.into(),
            reason: reason.into(),
        }
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_data_message() {
        let err = DomainError::InsufficientData { found: 10, required: 50 };
        assert_eq!(
            err.to_string(),
            "Insufficient data: need at least 50 traces, found 10"
        );
    }

    #[test]
    fn test_malformed_helper() {
        let err = DomainError::malformed("t-1", "negative error_count");
        assert!(matches!(
            err,
            DomainError::MalformedTrace { ref trace_id, .. } if trace_id == "t-1"
        ));
        assert_eq!(err.to_string(), "Malformed trace t-1: negative error_count");
    }

    #[test]
    fn test_serde_json_conversion() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: DomainError = parse_err.into();
        assert!(matches!(err, DomainError::SerializationError(_)));
    }
}
