//! Core data models for a checkpoint run

use crate::error::CheckpointError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A pod as seen by the inventory source at the start of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadEntry {
    pub namespace: String,
    pub pod_name: String,
    /// Host IP of the node running the pod; empty if not yet scheduled
    pub node_address: String,
    pub containers: Vec<String>,
}

impl WorkloadEntry {
    /// One checkpoint request per container, in container order
    pub fn requests(&self) -> impl Iterator<Item = CheckpointRequest> + '_ {
        self.containers.iter().map(move |container| CheckpointRequest {
            node_address: self.node_address.clone(),
            namespace: self.namespace.clone(),
            pod_name: self.pod_name.clone(),
            container_name: container.clone(),
        })
    }
}

/// Flatten an inventory into checkpoint requests, preserving order
pub fn plan_requests(inventory: &[WorkloadEntry]) -> Vec<CheckpointRequest> {
    inventory.iter().flat_map(WorkloadEntry::requests).collect()
}

/// Total number of containers across an inventory
pub fn total_containers(inventory: &[WorkloadEntry]) -> usize {
    inventory.iter().map(|entry| entry.containers.len()).sum()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckpointRequest {
    pub node_address: String,
    pub namespace: String,
    pub pod_name: String,
    pub container_name: String,
}

impl CheckpointRequest {
    pub fn new(
        node_address: impl Into<String>,
        namespace: impl Into<String>,
        pod_name: impl Into<String>,
        container_name: impl Into<String>,
    ) -> Self {
        Self {
            node_address: node_address.into(),
            namespace: namespace.into(),
            pod_name: pod_name.into(),
            container_name: container_name.into(),
        }
    }

    /// `namespace/pod/container`, for logs
    pub fn target(&self) -> String {
        format!("{}/{}/{}", self.namespace, self.pod_name, self.container_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckpointOutcome {
    /// The agent answered 200; `body` is its informational payload
    Succeeded { body: String },
    Failed { error: CheckpointError },
}

impl CheckpointOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CheckpointOutcome::Succeeded { .. })
    }

    /// Response body on success, cause or rejection body on failure
    pub fn diagnostic(&self) -> &str {
        match self {
            CheckpointOutcome::Succeeded { body } => body,
            CheckpointOutcome::Failed { error } => error.diagnostic(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CheckpointOutcome::Succeeded { .. } => "succeeded",
            CheckpointOutcome::Failed { error } => error.label(),
        }
    }
}

impl From<Result<String, CheckpointError>> for CheckpointOutcome {
    fn from(result: Result<String, CheckpointError>) -> Self {
        match result {
            Ok(body) => CheckpointOutcome::Succeeded { body },
            Err(error) => CheckpointOutcome::Failed { error },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointResult {
    pub request: CheckpointRequest,
    pub outcome: CheckpointOutcome,
    /// Calls made for this target, retries included
    pub attempts: u32,
    pub elapsed_ms: u64,
    pub finished_at: DateTime<Utc>,
}

impl CheckpointResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

/// Aggregate counts for a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Containers in the inventory snapshot
    pub total_targets: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Targets never attempted because the run was cancelled
    pub skipped: usize,
}

impl RunSummary {
    pub fn from_results(total_targets: usize, results: &[CheckpointResult]) -> Self {
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        let attempted = results.len();
        Self {
            total_targets,
            attempted,
            succeeded,
            failed: attempted - succeeded,
            skipped: total_targets.saturating_sub(attempted),
        }
    }

    /// Every target was attempted and every attempt succeeded
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }
}

/// Everything a run produced, in inventory order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub results: Vec<CheckpointResult>,
    pub summary: RunSummary,
    pub cancelled: bool,
}
