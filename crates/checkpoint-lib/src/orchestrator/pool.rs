//! Bounded checkpoint worker pool

use super::retry::{checkpoint_with_retry, RetryPolicy};
use crate::agent::NodeAgent;
use crate::error::{CheckpointError, RunError, TransportErrorKind};
use crate::models::{
    plan_requests, CheckpointOutcome, CheckpointRequest, CheckpointResult, RunReport, RunSummary,
    WorkloadEntry,
};
use crate::observability::CheckpointMetrics;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Configuration for the checkpoint fan-out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Checkpoint calls in flight across the whole run
    pub max_concurrency: usize,
    /// Checkpoint calls in flight against a single node
    pub per_node_concurrency: usize,
    /// Deadline for one call to the node agent
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 16,
            per_node_concurrency: 2,
            request_timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<(), RunError> {
        if self.max_concurrency == 0 {
            return Err(RunError::Configuration(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.per_node_concurrency == 0 {
            return Err(RunError::Configuration(
                "per_node_concurrency must be at least 1".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(RunError::Configuration(
                "request_timeout must be greater than zero".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(RunError::Configuration(
                "retry max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Fans checkpoint requests out to node agents
pub struct Orchestrator {
    agent: Arc<dyn NodeAgent>,
    config: OrchestratorConfig,
    metrics: Option<CheckpointMetrics>,
}

impl Orchestrator {
    pub fn new(agent: Arc<dyn NodeAgent>, config: OrchestratorConfig) -> Self {
        Self {
            agent,
            config,
            metrics: None,
        }
    }

    /// Record per-target outcomes in Prometheus metrics
    pub fn with_metrics(mut self, metrics: CheckpointMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Checkpoint every container in `inventory`
    ///
    /// Results come back in inventory order. Once `cancel` fires no new call
    /// is started; calls already in flight finish or time out and the
    /// targets never started are reported as skipped.
    pub async fn run(&self, inventory: &[WorkloadEntry], cancel: &CancellationToken) -> RunReport {
        let requests = plan_requests(inventory);
        let total = requests.len();

        info!(
            pods = inventory.len(),
            targets = total,
            max_concurrency = self.config.max_concurrency,
            per_node_concurrency = self.config.per_node_concurrency,
            "Dispatching checkpoint requests"
        );

        let global = Arc::new(Semaphore::new(self.config.max_concurrency));
        let mut node_limits: HashMap<String, Arc<Semaphore>> = HashMap::new();
        let mut tasks = JoinSet::new();

        for (index, request) in requests.iter().enumerate() {
            let node_limit = node_limits
                .entry(request.node_address.clone())
                .or_insert_with(|| Arc::new(Semaphore::new(self.config.per_node_concurrency)))
                .clone();

            let dispatch = Dispatch {
                agent: self.agent.clone(),
                request: request.clone(),
                deadline: self.config.request_timeout,
                retry: self.config.retry.clone(),
                cancel: cancel.clone(),
                global: global.clone(),
                node_limit,
            };
            tasks.spawn(async move { (index, dispatch.execute().await) });
        }

        let mut slots: Vec<Slot> = (0..total).map(|_| Slot::Pending).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Some(result))) => {
                    if let Some(metrics) = &self.metrics {
                        metrics.observe_result(&result);
                    }
                    slots[index] = Slot::Done(result);
                }
                Ok((index, None)) => slots[index] = Slot::Skipped,
                Err(e) => error!(error = %e, "Checkpoint task did not complete"),
            }
        }

        let results = collect_results(slots, requests);
        let summary = RunSummary::from_results(total, &results);
        if let Some(metrics) = &self.metrics {
            metrics.add_skipped(summary.skipped);
        }

        debug!(
            attempted = summary.attempted,
            skipped = summary.skipped,
            "Checkpoint dispatch complete"
        );

        RunReport {
            results,
            summary,
            cancelled: cancel.is_cancelled(),
        }
    }
}

enum Slot {
    Pending,
    Done(CheckpointResult),
    Skipped,
}

/// Order results by inventory position; a task that never reported is a failure
fn collect_results(slots: Vec<Slot>, requests: Vec<CheckpointRequest>) -> Vec<CheckpointResult> {
    slots
        .into_iter()
        .zip(requests)
        .filter_map(|(slot, request)| match slot {
            Slot::Done(result) => Some(result),
            Slot::Skipped => None,
            Slot::Pending => Some(CheckpointResult {
                request,
                outcome: CheckpointOutcome::Failed {
                    error: CheckpointError::transport(
                        TransportErrorKind::Request,
                        "checkpoint task aborted before reporting a result",
                    ),
                },
                attempts: 1,
                elapsed_ms: 0,
                finished_at: Utc::now(),
            }),
        })
        .collect()
}

/// One target's journey through the pool
struct Dispatch {
    agent: Arc<dyn NodeAgent>,
    request: CheckpointRequest,
    deadline: Duration,
    retry: RetryPolicy,
    cancel: CancellationToken,
    global: Arc<Semaphore>,
    node_limit: Arc<Semaphore>,
}

impl Dispatch {
    /// `None` when the run was cancelled before this target started
    async fn execute(self) -> Option<CheckpointResult> {
        let permits = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            permits = acquire(&self.node_limit, &self.global) => permits,
        };
        let _permits = permits?;

        if self.cancel.is_cancelled() {
            return None;
        }

        let started = Instant::now();
        let (outcome, attempts) = checkpoint_with_retry(
            self.agent.as_ref(),
            &self.request,
            self.deadline,
            &self.retry,
            &self.cancel,
        )
        .await;

        debug!(
            checkpoint = %self.request.target(),
            success = outcome.is_ok(),
            attempts = attempts,
            "Checkpoint target finished"
        );

        Some(CheckpointResult {
            request: self.request,
            outcome: outcome.into(),
            attempts,
            elapsed_ms: started.elapsed().as_millis() as u64,
            finished_at: Utc::now(),
        })
    }
}

/// Take the node permit first so a busy node does not hold global slots
async fn acquire(
    node_limit: &Arc<Semaphore>,
    global: &Arc<Semaphore>,
) -> Option<(OwnedSemaphorePermit, OwnedSemaphorePermit)> {
    let node = node_limit.clone().acquire_owned().await.ok()?;
    let global = global.clone().acquire_owned().await.ok()?;
    Some((node, global))
}
