//! Communication with the node agent (kubelet) checkpoint endpoint

mod client;

pub use client::{
    AgentClientConfig, AgentEndpoint, AgentScheme, NodeAgentClient, NodeAgentClientBuilder,
    TrustPolicy, DEFAULT_AGENT_PORT,
};

use crate::error::CheckpointError;
use crate::models::CheckpointRequest;
use async_trait::async_trait;

/// A node agent that can checkpoint one container per call
///
/// Returns the agent's informational body on success. Implementations must
/// not retry; retry policy belongs to the caller.
#[async_trait]
pub trait NodeAgent: Send + Sync {
    async fn checkpoint(&self, request: &CheckpointRequest) -> Result<String, CheckpointError>;
}
