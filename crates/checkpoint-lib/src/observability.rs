//! Observability infrastructure for checkpoint runs
//!
//! Provides:
//! - Prometheus metrics (request outcomes, request latency, skipped targets)
//! - Structured logging with tracing

use crate::models::{CheckpointOutcome, CheckpointResult, RunReport, RunSummary};
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Histogram, IntCounter,
    IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for checkpoint call latency (in seconds)
///
/// Checkpoints dump container memory, so calls routinely take seconds.
const LATENCY_BUCKETS: &[f64] = &[
    0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<CheckpointMetricsInner> = OnceLock::new();

struct CheckpointMetricsInner {
    requests_total: IntCounterVec,
    request_duration_seconds: Histogram,
    targets_skipped: IntCounter,
}

impl CheckpointMetricsInner {
    fn new() -> Self {
        Self {
            requests_total: register_int_counter_vec!(
                "checkpointer_requests_total",
                "Checkpoint targets processed, by outcome",
                &["outcome"]
            )
            .expect("Failed to register requests_total"),

            request_duration_seconds: register_histogram!(
                "checkpointer_request_duration_seconds",
                "Time spent on a checkpoint target, retries included",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register request_duration_seconds"),

            targets_skipped: register_int_counter!(
                "checkpointer_targets_skipped_total",
                "Checkpoint targets not attempted because the run was cancelled"
            )
            .expect("Failed to register targets_skipped"),
        }
    }
}

/// Checkpoint metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct CheckpointMetrics {
    _private: (),
}

impl Default for CheckpointMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl CheckpointMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(CheckpointMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &CheckpointMetricsInner {
        GLOBAL_METRICS.get_or_init(CheckpointMetricsInner::new)
    }

    /// Record one finished target
    pub fn observe_result(&self, result: &CheckpointResult) {
        self.inner()
            .requests_total
            .with_label_values(&[result.outcome.label()])
            .inc();
        self.inner()
            .request_duration_seconds
            .observe(result.elapsed_ms as f64 / 1000.0);
    }

    pub fn add_skipped(&self, count: usize) {
        self.inner().targets_skipped.inc_by(count as u64);
    }

    #[cfg(test)]
    fn outcome_count(&self, outcome: &str) -> u64 {
        self.inner()
            .requests_total
            .with_label_values(&[outcome])
            .get()
    }
}

/// Structured logger for run events
///
/// Emits event-tagged records for the run lifecycle and for each result,
/// after the orchestration has finished.
#[derive(Clone)]
pub struct StructuredLogger {
    namespace: String,
}

impl StructuredLogger {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn log_run_started(&self, pods: usize, targets: usize) {
        info!(
            event = "run_started",
            namespace = %self.namespace,
            pods = pods,
            targets = targets,
            "Starting checkpoint run"
        );
    }

    pub fn log_result(&self, result: &CheckpointResult) {
        let request = &result.request;
        match &result.outcome {
            CheckpointOutcome::Succeeded { body } => {
                info!(
                    event = "checkpoint_succeeded",
                    namespace = %request.namespace,
                    pod = %request.pod_name,
                    container = %request.container_name,
                    node = %request.node_address,
                    attempts = result.attempts,
                    elapsed_ms = result.elapsed_ms,
                    response = %body,
                    "Checkpoint created"
                );
            }
            CheckpointOutcome::Failed { error } => {
                warn!(
                    event = "checkpoint_failed",
                    namespace = %request.namespace,
                    pod = %request.pod_name,
                    container = %request.container_name,
                    node = %request.node_address,
                    attempts = result.attempts,
                    elapsed_ms = result.elapsed_ms,
                    error_kind = error.label(),
                    error = %error,
                    "Checkpoint failed"
                );
            }
        }
    }

    pub fn log_summary(&self, summary: &RunSummary, cancelled: bool) {
        if summary.is_clean() {
            info!(
                event = "run_summary",
                namespace = %self.namespace,
                total = summary.total_targets,
                attempted = summary.attempted,
                succeeded = summary.succeeded,
                failed = summary.failed,
                skipped = summary.skipped,
                cancelled = cancelled,
                "Checkpoint run finished"
            );
        } else {
            warn!(
                event = "run_summary",
                namespace = %self.namespace,
                total = summary.total_targets,
                attempted = summary.attempted,
                succeeded = summary.succeeded,
                failed = summary.failed,
                skipped = summary.skipped,
                cancelled = cancelled,
                "Checkpoint run finished with failures"
            );
        }
    }

    /// Log every result and the summary of a finished run
    pub fn log_report(&self, report: &RunReport) {
        for result in &report.results {
            self.log_result(result);
        }
        self.log_summary(&report.summary, report.cancelled);
    }
}
