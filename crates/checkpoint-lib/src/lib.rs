//! Checkpoint orchestration for Kubernetes workloads
//!
//! This crate provides the core functionality for:
//! - Loading the service account trust anchor and bearer token
//! - Discovering pods and containers through the Kubernetes API
//! - Calling the kubelet checkpoint endpoint on each node
//! - Fanning out checkpoint requests with per-node and global limits
//! - Structured logging and Prometheus metrics for a run

pub mod agent;
pub mod credentials;
pub mod error;
pub mod inventory;
pub mod models;
pub mod observability;
pub mod orchestrator;
pub mod pipeline;

pub use agent::{AgentClientConfig, AgentEndpoint, AgentScheme, NodeAgent, NodeAgentClient, TrustPolicy};
pub use credentials::{CredentialBundle, CredentialPaths, CredentialProvider};
pub use error::{
    CheckpointError, CredentialKind, CredentialLoadError, DiscoveryError, RunError,
    TransportErrorKind,
};
pub use inventory::{InventorySource, KubeInventory};
pub use models::*;
pub use observability::{CheckpointMetrics, StructuredLogger};
pub use orchestrator::{Orchestrator, OrchestratorConfig, RetryPolicy};
pub use pipeline::{RunOutcome, RunSettings};
