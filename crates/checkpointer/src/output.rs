//! Output formatting utilities

use anyhow::{Context, Result};
use checkpoint_lib::{AgentEndpoint, CheckpointRequest, CheckpointResult, RunReport, RunSummary};
use clap::ValueEnum;
use colored::Colorize;
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::path::Path;
use tabled::{settings::Style, Table, Tabled};

/// Output format for the run report
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

const MAX_DETAIL_WIDTH: usize = 60;

#[derive(Tabled)]
struct ResultRow {
    #[tabled(rename = "Pod")]
    pod: String,
    #[tabled(rename = "Container")]
    container: String,
    #[tabled(rename = "Node")]
    node: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Attempts")]
    attempts: u32,
    #[tabled(rename = "Duration")]
    duration: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

impl From<&CheckpointResult> for ResultRow {
    fn from(result: &CheckpointResult) -> Self {
        Self {
            pod: result.request.pod_name.clone(),
            container: result.request.container_name.clone(),
            node: display_node(&result.request.node_address),
            status: color_outcome(result.outcome.label()),
            attempts: result.attempts,
            duration: format_duration_ms(result.elapsed_ms),
            detail: truncate(result.outcome.diagnostic(), MAX_DETAIL_WIDTH),
        }
    }
}

#[derive(Tabled, Serialize)]
struct PlanRow {
    #[tabled(rename = "Pod")]
    pod: String,
    #[tabled(rename = "Container")]
    container: String,
    #[tabled(rename = "Node")]
    node: String,
    #[tabled(rename = "Checkpoint URL")]
    url: String,
}

fn plan_row(request: &CheckpointRequest, endpoint: &AgentEndpoint) -> PlanRow {
    let url = match endpoint.url_for(request) {
        Ok(url) => url.to_string(),
        Err(e) => format!("invalid: {}", e.diagnostic()),
    };
    PlanRow {
        pod: request.pod_name.clone(),
        container: request.container_name.clone(),
        node: display_node(&request.node_address),
        url,
    }
}

/// Print the per-container results and the run summary
pub fn print_report(report: &RunReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            if report.results.is_empty() {
                println!("{}", "No checkpoint requests were sent".yellow());
            } else {
                let rows: Vec<ResultRow> = report.results.iter().map(ResultRow::from).collect();
                let table = Table::new(rows).with(Style::rounded()).to_string();
                println!("{}", table);
            }
            println!();
            print_summary(&report.summary, report.cancelled);
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(report).context("Failed to encode report")?;
            println!("{}", json);
        }
    }
    Ok(())
}

/// Print what a dry run would have checkpointed
pub fn print_plan(
    requests: &[CheckpointRequest],
    endpoint: &AgentEndpoint,
    format: OutputFormat,
) -> Result<()> {
    let rows: Vec<PlanRow> = requests.iter().map(|r| plan_row(r, endpoint)).collect();
    match format {
        OutputFormat::Table => {
            if rows.is_empty() {
                println!("{}", "No containers found".yellow());
            } else {
                let table = Table::new(&rows).with(Style::rounded()).to_string();
                println!("{}", table);
            }
            print_info(&format!(
                "Dry run: {} checkpoint request(s) planned, none sent",
                rows.len()
            ));
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&rows).context("Failed to encode plan")?;
            println!("{}", json);
        }
    }
    Ok(())
}

fn print_summary(summary: &RunSummary, cancelled: bool) {
    let line = format!(
        "{} of {} checkpoint(s) succeeded, {} failed, {} skipped",
        summary.succeeded, summary.total_targets, summary.failed, summary.skipped
    );
    if summary.is_clean() {
        print_success(&line);
    } else {
        print_warning(&line);
    }
    if cancelled {
        print_warning("Run was interrupted before all containers were attempted");
    }
}

/// Write the process metrics in Prometheus text format
pub fn write_metrics_file(path: &Path) -> Result<()> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&prometheus::gather(), &mut buffer)
        .context("Failed to encode metrics")?;
    std::fs::write(path, buffer)
        .with_context(|| format!("Failed to write metrics to {}", path.display()))
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

fn color_outcome(label: &str) -> String {
    match label {
        "succeeded" => label.green().to_string(),
        "agent_rejected" => label.red().to_string(),
        _ => label.yellow().to_string(),
    }
}

fn display_node(address: &str) -> String {
    if address.is_empty() {
        "<unscheduled>".to_string()
    } else {
        address.to_string()
    }
}

/// Format a millisecond duration for display
pub fn format_duration_ms(ms: u64) -> String {
    if ms >= 60_000 {
        format!("{}m{:02}s", ms / 60_000, (ms % 60_000) / 1000)
    } else if ms >= 1000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{}ms", ms)
    }
}

/// Shorten to `max` characters on a char boundary, single line
pub fn truncate(text: &str, max: usize) -> String {
    let flat = text.replace(['\n', '\r'], " ");
    let flat = flat.trim();
    if flat.chars().count() <= max {
        return flat.to_string();
    }
    let kept: String = flat.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept)
}
