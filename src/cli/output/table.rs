//! Table output formatting for CLI commands
//!
//! Renders clusters, slices and run history with comfy-table. Colors are
//! dropped when `NO_COLOR` is set or the terminal is dumb.

use std::env;

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};

use super::truncate;
use crate::domain::models::{Cluster, RunStatus, RunSummary, Slice};

/// Table formatter for CLI output
pub struct TableFormatter {
    /// Whether to use colors in output
    use_colors: bool,
    /// Maximum width for tables (None = auto)
    max_width: Option<u16>,
}

impl TableFormatter {
    pub fn new() -> Self {
        Self {
            use_colors: supports_color(),
            max_width: None,
        }
    }

    pub fn with_config(use_colors: bool, max_width: Option<u16>) -> Self {
        Self {
            use_colors,
            max_width,
        }
    }

    /// Ranked clusters, worst first.
    pub fn format_clusters(&self, clusters: &[Cluster]) -> String {
        let mut table = self.create_base_table();
        table.set_header(header(&[
            "Rank", "Cluster", "Size", "Bad %", "Avg badness", "Model", "Intent", "Examples",
        ]));

        for (rank, cluster) in clusters.iter().enumerate() {
            let rate = format!("{:.1}", cluster.badness_rate * 100.0);
            let rate_cell = if self.use_colors && cluster.is_problematic() {
                Cell::new(rate).fg(Color::Red)
            } else {
                Cell::new(rate)
            };

            table.add_row(vec![
                Cell::new(rank + 1),
                Cell::new(format!("#{}", cluster.cluster_index)),
                Cell::new(cluster.size),
                rate_cell,
                Cell::new(format!("{:.3}", cluster.avg_badness)),
                Cell::new(cluster.dominant("model").unwrap_or("-")),
                Cell::new(cluster.dominant("intent").unwrap_or("-")),
                Cell::new(truncate(&cluster.example_trace_ids.join(", "), 40)),
            ]);
        }

        table.to_string()
    }

    /// Significant slices, highest lift first.
    pub fn format_slices(&self, slices: &[Slice]) -> String {
        let mut table = self.create_base_table();
        table.set_header(header(&[
            "Slice", "Size", "Bad", "Bad %", "Lift", "p-value", "Adj. p",
        ]));

        for slice in slices {
            let lift = format!("{:.2}x", slice.lift);
            let lift_cell = if self.use_colors && slice.lift >= 2.0 {
                Cell::new(lift).fg(Color::Red).add_attribute(Attribute::Bold)
            } else if self.use_colors && slice.lift > 1.0 {
                Cell::new(lift).fg(Color::Yellow)
            } else {
                Cell::new(lift)
            };

            table.add_row(vec![
                Cell::new(truncate(&slice.attribute_str(), 48)),
                Cell::new(slice.size),
                Cell::new(slice.bad_count),
                Cell::new(format!("{:.1}", slice.badness_rate * 100.0)),
                lift_cell,
                Cell::new(format!("{:.2e}", slice.p_value)),
                Cell::new(format!("{:.2e}", slice.adjusted_p_value)),
            ]);
        }

        table.to_string()
    }

    /// Run history, newest first.
    pub fn format_runs(&self, runs: &[RunSummary]) -> String {
        let mut table = self.create_base_table();
        table.set_header(header(&[
            "Run", "Status", "Started", "Traces", "Baseline %", "Clusters", "Slices", "Error",
        ]));

        for run in runs {
            let status_cell = if self.use_colors {
                Cell::new(run.status).fg(status_color(run.status))
            } else {
                Cell::new(run.status)
            };

            table.add_row(vec![
                Cell::new(&run.run_id.to_string()[..8]),
                status_cell,
                Cell::new(run.started_at.format("%Y-%m-%d %H:%M").to_string()),
                Cell::new(run.total_traces.map_or_else(|| "-".to_string(), |n| n.to_string())),
                Cell::new(
                    run.baseline_badness_rate
                        .map_or_else(|| "-".to_string(), |r| format!("{:.1}", r * 100.0)),
                ),
                Cell::new(run.num_clusters),
                Cell::new(run.num_slices),
                Cell::new(truncate(run.error_message.as_deref().unwrap_or("-"), 40)),
            ]);
        }

        table.to_string()
    }

    fn create_base_table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);

        if let Some(width) = self.max_width {
            table.set_width(width);
        }

        table
    }
}

impl Default for TableFormatter {
    fn default() -> Self {
        Self::new()
    }
}

fn header(names: &[&str]) -> Vec<Cell> {
    names
        .iter()
        .map(|name| Cell::new(name).add_attribute(Attribute::Bold))
        .collect()
}

fn supports_color() -> bool {
    if env::var("NO_COLOR").is_ok() {
        return false;
    }

    if let Ok(term) = env::var("TERM") {
        if term == "dumb" {
            return false;
        }
    }

    true
}

fn status_color(status: RunStatus) -> Color {
    match status {
        RunStatus::Completed => Color::Green,
        RunStatus::Running => Color::Cyan,
        RunStatus::InsufficientData => Color::Yellow,
        RunStatus::Failed => Color::Red,
    }
}
