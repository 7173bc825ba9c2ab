//! Trace domain model.
//!
//! A trace is one recorded execution of an agent: the tool calls it made,
//! its latency and token accounting, optional evaluation scores, and the
//! categorical attributes used for slicing. Traces are immutable inputs to
//! a discovery run.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainError, DomainResult};

/// Value reported for a categorical attribute the trace does not carry.
pub const UNKNOWN_ATTRIBUTE: &str = "unknown";

/// One tool invocation inside a trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool name as recorded by the tracer.
    pub name: String,
    /// When the tool call started.
    pub timestamp: DateTime<Utc>,
    /// Whether the tool span ended with an error status.
    #[serde(default)]
    pub failed: bool,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            timestamp,
            failed: false,
        }
    }

    pub fn failed(name: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            timestamp,
            failed: true,
        }
    }
}

/// Categorical attributes attached to a trace.
///
/// The four well-known attributes are explicit fields; anything else a
/// project records lands in `extra`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceAttributes {
    #[serde(default = "unknown")]
    pub intent: String,
    #[serde(default = "unknown")]
    pub route: String,
    #[serde(default = "unknown")]
    pub model: String,
    #[serde(default = "unknown")]
    pub provider: String,
    /// Project-defined attributes (e.g. `prompt_version`).
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, String>,
}

fn unknown() -> String {
    UNKNOWN_ATTRIBUTE.to_string()
}

impl Default for TraceAttributes {
    fn default() -> Self {
        Self {
            intent: unknown(),
            route: unknown(),
            model: unknown(),
            provider: unknown(),
            extra: BTreeMap::new(),
        }
    }
}

impl TraceAttributes {
    /// Look up an attribute by name, falling back to `"unknown"`.
    pub fn get(&self, name: &str) -> &str {
        match name {
            "intent" => &self.intent,
            "route" => &self.route,
            "model" => &self.model,
            "provider" => &self.provider,
            other => self
                .extra
                .get(other)
                .map_or(UNKNOWN_ATTRIBUTE, String::as_str),
        }
    }

    /// Builder-style setter used by fixtures and adapters.
    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        match name {
            "intent" => self.intent = value,
            "route" => self.route = value,
            "model" => self.model = value,
            "provider" => self.provider = value,
            other => {
                self.extra.insert(other.to_string(), value);
            }
        }
        self
    }
}

/// A recorded execution trace with its evaluation annotations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub trace_id: String,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    pub total_latency_ms: f64,
    #[serde(default)]
    pub llm_latency_ms: f64,
    #[serde(default)]
    pub tool_latency_ms: f64,
    #[serde(default)]
    pub token_count: i64,
    #[serde(default)]
    pub llm_call_count: i64,
    /// Number of spans in the trace with an error status.
    #[serde(default)]
    pub error_count: i64,
    #[serde(default)]
    pub quality_score: Option<f64>,
    #[serde(default)]
    pub grounding_score: Option<f64>,
    #[serde(default)]
    pub attributes: TraceAttributes,
    #[serde(default)]
    pub input_text: Option<String>,
    #[serde(default)]
    pub output_text: Option<String>,
}

impl Trace {
    /// Create a trace with no tool calls, zero counts and default attributes.
    pub fn new(trace_id: impl Into<String>, start_time: DateTime<Utc>, total_latency_ms: f64) -> Self {
        Self {
            trace_id: trace_id.into(),
            start_time,
            tool_calls: Vec::new(),
            total_latency_ms,
            llm_latency_ms: 0.0,
            tool_latency_ms: 0.0,
            token_count: 0,
            llm_call_count: 0,
            error_count: 0,
            quality_score: None,
            grounding_score: None,
            attributes: TraceAttributes::default(),
            input_text: None,
            output_text: None,
        }
    }

    pub fn tool_call_count(&self) -> usize {
        self.tool_calls.len()
    }

    pub fn failed_tool_call_count(&self) -> usize {
        self.tool_calls.iter().filter(|c| c.failed).count()
    }

    /// Tool names ordered by call timestamp. Calls sharing a timestamp keep
    /// their recorded order.
    pub fn tool_sequence(&self) -> Vec<&str> {
        let mut calls: Vec<&ToolCall> = self.tool_calls.iter().collect();
        calls.sort_by_key(|c| c.timestamp);
        calls.into_iter().map(|c| c.name.as_str()).collect()
    }

    /// Text handed to the embedding provider: input and output joined by a
    /// separator line.
    pub fn embedding_text(&self) -> String {
        format!(
            "{}\n---\n{}",
            self.input_text.as_deref().unwrap_or_default(),
            self.output_text.as_deref().unwrap_or_default()
        )
    }

    /// Reject traces whose raw signals cannot be scored.
    pub fn validate(&self) -> DomainResult<()> {
        let id = &self.trace_id;
        if id.trim().is_empty() {
            return Err(DomainError::malformed("<empty>", "trace id is empty"));
        }

        for (field, value) in [
            ("total_latency_ms", self.total_latency_ms),
            ("llm_latency_ms", self.llm_latency_ms),
            ("tool_latency_ms", self.tool_latency_ms),
        ] {
            if !value.is_finite() {
                return Err(DomainError::malformed(id, format!("{field} is not finite")));
            }
            if value < 0.0 {
                return Err(DomainError::malformed(id, format!("{field} is negative ({value})")));
            }
        }

        for (field, value) in [
            ("token_count", self.token_count),
            ("llm_call_count", self.llm_call_count),
            ("error_count", self.error_count),
        ] {
            if value < 0 {
                return Err(DomainError::malformed(id, format!("{field} is negative ({value})")));
            }
        }

        for (field, score) in [
            ("quality_score", self.quality_score),
            ("grounding_score", self.grounding_score),
        ] {
            if let Some(s) = score {
                if !s.is_finite() || !(0.0..=1.0).contains(&s) {
                    return Err(DomainError::malformed(
                        id,
                        format!("{field} must lie in [0, 1], got {s}"),
                    ));
                }
            }
        }

        if let Some(pos) = self.tool_calls.iter().position(|c| c.name.trim().is_empty()) {
            return Err(DomainError::malformed(id, format!("tool call #{pos} has an empty name")));
        }

        Ok(())
    }
}
