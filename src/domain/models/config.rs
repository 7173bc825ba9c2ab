use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::badness::BadnessWeights;
use super::cluster::ClusterMethod;
use super::slice::PValueCorrection;
use crate::domain::errors::{DomainError, DomainResult};

/// Main configuration structure for tracesift
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Discovery run parameters
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Embedding provider connection
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".tracesift/tracesift.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseConfig {
    pub fn url(&self) -> String {
        format!("sqlite:{}", self.path)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stderr only when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// File rotation: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}

/// Connection settings for an OpenAI-compatible embeddings endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EmbeddingConfig {
    /// API key; falls back to `OPENAI_API_KEY`
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Expected vector length for the configured model
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum texts per request
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Retries for transient HTTP failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

const fn default_dimension() -> usize {
    1536
}

const fn default_timeout_secs() -> u64 {
    30
}

const fn default_max_batch_size() -> usize {
    2048
}

const fn default_max_retries() -> u32 {
    3
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            dimension: default_dimension(),
            timeout_secs: default_timeout_secs(),
            max_batch_size: default_max_batch_size(),
            max_retries: default_max_retries(),
        }
    }
}

impl EmbeddingConfig {
    /// Configured key, else the `OPENAI_API_KEY` environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()))
    }
}

/// Parameters for one discovery run.
///
/// Supplied fresh at the start of each run and never mutated while it
/// executes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DiscoveryConfig {
    #[serde(default)]
    pub cluster_method: ClusterMethod,

    /// Smallest group HDBSCAN will report as a cluster; the only density knob.
    #[serde(default = "default_min_cluster_size")]
    pub min_cluster_size: usize,

    /// Fixed `k` for k-means; estimated with the elbow method when unset.
    #[serde(default)]
    pub n_clusters: Option<usize>,

    /// Categorical attributes eligible for slicing, in enumeration order.
    #[serde(default = "default_slice_attributes")]
    pub slice_attributes: Vec<String>,

    #[serde(default = "default_min_slice_size")]
    pub min_slice_size: usize,

    /// 1 = single attributes, 2 = single attributes and pairs.
    #[serde(default = "default_max_slice_depth")]
    pub max_slice_depth: usize,

    #[serde(default = "default_significance_threshold")]
    pub significance_threshold: f64,

    #[serde(default)]
    pub p_value_correction: PValueCorrection,

    #[serde(default = "default_max_reported_slices")]
    pub max_reported_slices: usize,

    #[serde(default)]
    pub badness_weights: BadnessWeights,

    /// Size cap of the tool n-gram vocabulary.
    #[serde(default = "default_max_tool_ngrams")]
    pub max_tool_ngrams: usize,

    #[serde(default = "default_true")]
    pub embeddings_enabled: bool,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_min_traces")]
    pub min_traces: usize,

    #[serde(default = "default_max_traces")]
    pub max_traces: usize,
}

const fn default_min_cluster_size() -> usize {
    10
}

fn default_slice_attributes() -> Vec<String> {
    ["intent", "route", "model", "provider"]
        .into_iter()
        .map(String::from)
        .collect()
}

const fn default_min_slice_size() -> usize {
    10
}

const fn default_max_slice_depth() -> usize {
    2
}

const fn default_significance_threshold() -> f64 {
    0.05
}

const fn default_max_reported_slices() -> usize {
    20
}

const fn default_max_tool_ngrams() -> usize {
    20
}

const fn default_true() -> bool {
    true
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

const fn default_min_traces() -> usize {
    50
}

const fn default_max_traces() -> usize {
    10_000
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            cluster_method: ClusterMethod::default(),
            min_cluster_size: default_min_cluster_size(),
            n_clusters: None,
            slice_attributes: default_slice_attributes(),
            min_slice_size: default_min_slice_size(),
            max_slice_depth: default_max_slice_depth(),
            significance_threshold: default_significance_threshold(),
            p_value_correction: PValueCorrection::default(),
            max_reported_slices: default_max_reported_slices(),
            badness_weights: BadnessWeights::default(),
            max_tool_ngrams: default_max_tool_ngrams(),
            embeddings_enabled: default_true(),
            embedding_model: default_embedding_model(),
            min_traces: default_min_traces(),
            max_traces: default_max_traces(),
        }
    }
}

impl DiscoveryConfig {
    /// Check the configuration before a run does any work.
    pub fn validate(&self) -> DomainResult<()> {
        for (name, weight) in self.badness_weights.named() {
            if !weight.is_finite() || weight < 0.0 {
                return Err(invalid(format!(
                    "badness weight {name} must be a non-negative number, got {weight}"
                )));
            }
        }
        if self.badness_weights.total() <= 0.0 {
            return Err(invalid("badness weights must not all be zero"));
        }

        if !(1..=2).contains(&self.max_slice_depth) {
            return Err(invalid(format!(
                "max_slice_depth must be 1 or 2, got {}",
                self.max_slice_depth
            )));
        }

        if !(self.significance_threshold > 0.0 && self.significance_threshold < 1.0) {
            return Err(invalid(format!(
                "significance_threshold must lie in (0, 1), got {}",
                self.significance_threshold
            )));
        }

        if self.min_cluster_size < 2 {
            return Err(invalid(format!(
                "min_cluster_size must be at least 2, got {}",
                self.min_cluster_size
            )));
        }

        if self.n_clusters == Some(0) {
            return Err(invalid("n_clusters must be positive when set"));
        }

        if self.min_slice_size == 0 {
            return Err(invalid("min_slice_size must be at least 1"));
        }

        if self.slice_attributes.is_empty() {
            return Err(invalid("slice_attributes cannot be empty"));
        }

        let mut seen = HashSet::new();
        for attribute in &self.slice_attributes {
            if attribute.trim().is_empty() {
                return Err(invalid("slice attribute names cannot be empty"));
            }
            if !seen.insert(attribute.as_str()) {
                return Err(invalid(format!("slice attribute '{attribute}' is listed twice")));
            }
        }

        if self.max_traces == 0 {
            return Err(invalid("max_traces must be positive"));
        }

        if self.min_traces > self.max_traces {
            return Err(invalid(format!(
                "min_traces ({}) cannot exceed max_traces ({})",
                self.min_traces, self.max_traces
            )));
        }

        Ok(())
    }

    /// Attributes whose dominant value is reported per cluster: the four
    /// well-known attributes followed by any extra slice attributes.
    pub fn tracked_attributes(&self) -> Vec<String> {
        let mut tracked: Vec<String> = ["intent", "route", "model", "provider"]
            .into_iter()
            .map(String::from)
            .collect();
        for attribute in &self.slice_attributes {
            if !tracked.contains(attribute) {
                tracked.push(attribute.clone());
            }
        }
        tracked
    }
}

fn invalid(message: impl Into<String>) -> DomainError {
    DomainError::InvalidConfig(message.into())
}
