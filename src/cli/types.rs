//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use super::commands::discover::DiscoverArgs;
use super::commands::report::ReportArgs;

#[derive(Parser, Debug)]
#[command(name = "tracesift")]
#[command(about = "Tracesift - failure-pattern discovery over agent traces", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Config file to load instead of .tracesift/config.yaml
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the configured log level
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Cluster a batch of traces and find over-represented failure slices
    Discover(DiscoverArgs),

    /// Inspect stored discovery runs
    Report(ReportArgs),
}
