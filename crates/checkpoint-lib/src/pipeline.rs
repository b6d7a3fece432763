//! One checkpoint run, end to end
//!
//! Settings are validated, credentials loaded and the node agent client
//! built before the inventory is queried; any failure there aborts the run
//! without a single checkpoint call.

use crate::agent::NodeAgent;
use crate::credentials::{CredentialBundle, CredentialProvider};
use crate::error::RunError;
use crate::inventory::InventorySource;
use crate::models::{plan_requests, total_containers, CheckpointRequest, RunReport, WorkloadEntry};
use crate::observability::{CheckpointMetrics, StructuredLogger};
use crate::orchestrator::{Orchestrator, OrchestratorConfig};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Settings for one run
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Namespace used both for discovery and for checkpoint paths
    pub namespace: String,
    pub orchestrator: OrchestratorConfig,
    /// Discover and plan, but do not call any node agent
    pub dry_run: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            orchestrator: OrchestratorConfig::default(),
            dry_run: false,
        }
    }
}

impl RunSettings {
    pub fn validate(&self) -> Result<(), RunError> {
        if self.namespace.trim().is_empty() {
            return Err(RunError::Configuration(
                "namespace must not be empty".to_string(),
            ));
        }
        self.orchestrator.validate()
    }
}

#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// Dry run: what would have been checkpointed
    Planned {
        inventory: Vec<WorkloadEntry>,
        requests: Vec<CheckpointRequest>,
    },
    Completed(RunReport),
}

/// Execute a run
///
/// `connect` turns the loaded credentials into a node agent; it is called
/// once, after the credentials are loaded and before discovery.
pub async fn execute<F>(
    settings: &RunSettings,
    credentials: &CredentialProvider,
    inventory: &dyn InventorySource,
    connect: F,
    cancel: &CancellationToken,
) -> Result<RunOutcome, RunError>
where
    F: FnOnce(&CredentialBundle) -> Result<Arc<dyn NodeAgent>, RunError>,
{
    settings.validate()?;

    let bundle = credentials.load().await?;
    let agent = connect(&bundle)?;

    let workloads = inventory.list_workloads(&settings.namespace).await?;
    let logger = StructuredLogger::new(&settings.namespace);
    logger.log_run_started(workloads.len(), total_containers(&workloads));

    if settings.dry_run {
        let requests = plan_requests(&workloads);
        info!(targets = requests.len(), "Dry run, no checkpoint requests sent");
        return Ok(RunOutcome::Planned {
            inventory: workloads,
            requests,
        });
    }

    let orchestrator = Orchestrator::new(agent, settings.orchestrator.clone())
        .with_metrics(CheckpointMetrics::new());
    let report = orchestrator.run(&workloads, cancel).await;
    logger.log_report(&report);

    Ok(RunOutcome::Completed(report))
}
