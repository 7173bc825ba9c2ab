//! `tracesift report`: read stored discovery runs.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use uuid::Uuid;

use super::discover::render_report;
use crate::adapters::sqlite::{initialize_database, SqliteReportRepository};
use crate::cli::output::{output, CommandOutput, TableFormatter};
use crate::domain::errors::DomainError;
use crate::domain::models::{Config, DiscoveryReport, RunSummary};
use crate::domain::ports::ReportRepository;

#[derive(Args, Debug)]
pub struct ReportArgs {
    #[command(subcommand)]
    pub command: ReportCommands,
}

#[derive(Subcommand, Debug)]
pub enum ReportCommands {
    /// Show the most recent completed run of a project
    Latest {
        /// Project name
        #[arg(short, long)]
        project: String,
    },
    /// Show a run by id
    Show {
        /// Run ID
        run_id: Uuid,
    },
    /// List recent runs of a project, newest first
    List {
        /// Project name
        #[arg(short, long)]
        project: String,
        /// Maximum number of runs to display
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct ReportOutput {
    pub report: DiscoveryReport,
}

impl CommandOutput for ReportOutput {
    fn to_human(&self) -> String {
        render_report(&self.report)
    }
}

#[derive(Debug, Serialize)]
pub struct RunListOutput {
    pub project: String,
    pub runs: Vec<RunSummary>,
    pub total: usize,
}

impl CommandOutput for RunListOutput {
    fn to_human(&self) -> String {
        if self.runs.is_empty() {
            return format!("No discovery runs recorded for {}.", self.project);
        }
        format!(
            "{} run(s) for {}:\n{}",
            self.total,
            self.project,
            TableFormatter::new().format_runs(&self.runs)
        )
    }
}

pub async fn execute(args: ReportArgs, config: Config, json_mode: bool) -> Result<()> {
    let pool = initialize_database(&config.database)
        .await
        .with_context(|| format!("Failed to open database at {}", config.database.path))?;
    let repo = SqliteReportRepository::new(pool);

    match args.command {
        ReportCommands::Latest { project } => {
            let report = repo
                .latest_completed(&project)
                .await?
                .with_context(|| format!("No completed discovery run for project '{project}'"))?;
            output(&ReportOutput { report }, json_mode);
        }

        ReportCommands::Show { run_id } => {
            let report = repo
                .get(run_id)
                .await?
                .ok_or(DomainError::RunNotFound(run_id))?;
            output(&ReportOutput { report }, json_mode);
        }

        ReportCommands::List { project, limit } => {
            let runs = repo.list_runs(&project, limit).await?;
            let out = RunListOutput {
                total: runs.len(),
                project,
                runs,
            };
            output(&out, json_mode);
        }
    }

    Ok(())
}
