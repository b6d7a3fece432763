//! Container Checkpointer
//!
//! Discovers every pod in a namespace and asks the kubelet on each pod's
//! node to checkpoint each of its containers.

mod cluster;
mod config;
mod output;

use anyhow::{Context, Result};
use checkpoint_lib::{
    pipeline, CredentialProvider, NodeAgent, NodeAgentClient, RunOutcome, TrustPolicy,
};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Container Checkpointer
#[derive(Parser)]
#[command(name = "checkpointer")]
#[command(
    author,
    version,
    about = "Checkpoint every container in a Kubernetes namespace through the kubelet",
    long_about = None
)]
pub struct Cli {
    /// Namespace to discover and checkpoint (overrides configuration)
    #[arg(long, short)]
    pub namespace: Option<String>,

    /// Only checkpoint pods matching this label selector
    #[arg(long, short = 'l')]
    pub selector: Option<String>,

    /// Path to kubeconfig file (in-cluster or default config if not specified)
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Log output format
    #[arg(long, value_enum, default_value = "json")]
    pub log_format: LogFormat,

    /// List the checkpoints that would be taken without calling any kubelet
    #[arg(long)]
    pub dry_run: bool,

    /// Do not verify kubelet serving certificates
    #[arg(long)]
    pub insecure_skip_tls_verify: bool,

    /// Write Prometheus metrics for the run to this file
    #[arg(long)]
    pub metrics_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    Json,
    Text,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = config::CheckpointerConfig::load(cli.config.as_deref())?;
    if let Some(namespace) = cli.namespace {
        config.namespace = namespace;
    }
    if let Some(selector) = cli.selector {
        config.label_selector = Some(selector);
    }
    if cli.insecure_skip_tls_verify {
        config.trust_policy = TrustPolicy::InsecureSkipVerify;
    }

    info!(
        namespace = %config.namespace,
        selector = config.label_selector.as_deref().unwrap_or(""),
        dry_run = cli.dry_run,
        "Starting checkpointer"
    );

    let settings = config.run_settings(cli.dry_run);
    let credentials = CredentialProvider::new(config.credential_paths());
    let inventory = cluster::ClusterInventory::new(
        cli.kubeconfig,
        config.label_selector.clone(),
        config.page_size,
    );
    let agent_config = config.agent_client_config();

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, waiting for in-flight checkpoints");
            interrupt.cancel();
        }
    });

    let outcome = pipeline::execute(
        &settings,
        &credentials,
        &inventory,
        |bundle| {
            let client = NodeAgentClient::new(bundle, &agent_config)?;
            Ok(Arc::new(client) as Arc<dyn NodeAgent>)
        },
        &cancel,
    )
    .await
    .context("Checkpoint run aborted")?;

    match outcome {
        RunOutcome::Planned { requests, .. } => {
            output::print_plan(&requests, &agent_config.endpoint, cli.format)?;
        }
        RunOutcome::Completed(report) => {
            output::print_report(&report, cli.format)?;
            if let Some(path) = &cli.metrics_file {
                output::write_metrics_file(path)?;
                info!(path = %path.display(), "Metrics written");
            }

            let summary = &report.summary;
            if !summary.is_clean() {
                anyhow::bail!(
                    "{} of {} checkpoint(s) failed, {} skipped",
                    summary.failed,
                    summary.total_targets,
                    summary.skipped
                );
            }
        }
    }

    Ok(())
}
