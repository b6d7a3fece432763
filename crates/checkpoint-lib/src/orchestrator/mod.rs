//! Checkpoint fan-out across the inventory
//!
//! One request per (pod, container) pair is dispatched through a bounded
//! worker pool: a global semaphore caps the whole run and one semaphore per
//! node address protects each kubelet. Every call carries a deadline, and
//! a failure on one target never stops the others.

mod pool;
mod retry;


pub use pool::{Orchestrator, OrchestratorConfig};
pub use retry::RetryPolicy;
