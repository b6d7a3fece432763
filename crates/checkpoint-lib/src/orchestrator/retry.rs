//! Per-target retry with exponential backoff

use crate::agent::NodeAgent;
use crate::error::{CheckpointError, TransportErrorKind};
use crate::models::CheckpointRequest;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// How often a single target may be attempted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per target, the first one included
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no retries
    pub fn none() -> Self {
        Self::default()
    }

    /// Delay before the attempt following `attempt` (1-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}

/// Run one target to completion under `policy`
///
/// Each attempt is bounded by `deadline`. Returns the final outcome and the
/// number of attempts made. No further attempt starts once `cancel` fires.
pub(crate) async fn checkpoint_with_retry(
    agent: &dyn NodeAgent,
    request: &CheckpointRequest,
    deadline: Duration,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> (Result<String, CheckpointError>, u32) {
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let outcome = match tokio::time::timeout(deadline, agent.checkpoint(request)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(CheckpointError::transport(
                TransportErrorKind::Timeout,
                format!("no response from node agent within {}ms", deadline.as_millis()),
            )),
        };

        match outcome {
            Err(err) if attempt < policy.max_attempts && err.is_retryable() => {
                let delay = policy.backoff_for(attempt);
                warn!(
                    checkpoint = %request.target(),
                    attempt = attempt,
                    next_backoff_ms = delay.as_millis() as u64,
                    error = %err,
                    "Checkpoint attempt failed, retrying"
                );

                tokio::select! {
                    _ = cancel.cancelled() => return (Err(err), attempt),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            outcome => return (outcome, attempt),
        }
    }
}
