//! Checkpointer configuration
//!
//! Layered as: built-in defaults, optional config file, `CHECKPOINTER_*`
//! environment variables, then command-line flags.

use anyhow::{Context, Result};
use checkpoint_lib::credentials::{DEFAULT_TOKEN_PATH, DEFAULT_TRUST_ANCHOR_PATH};
use checkpoint_lib::inventory::DEFAULT_PAGE_SIZE;
use checkpoint_lib::{
    AgentClientConfig, AgentEndpoint, AgentScheme, CredentialPaths, OrchestratorConfig,
    RetryPolicy, RunSettings, TrustPolicy,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct CheckpointerConfig {
    /// Namespace to discover and checkpoint
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Optional label selector for pod discovery
    #[serde(default)]
    pub label_selector: Option<String>,

    /// Pods requested per list call
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    #[serde(default = "default_trust_anchor_path")]
    pub trust_anchor_path: PathBuf,

    #[serde(default = "default_token_path")]
    pub token_path: PathBuf,

    /// Kubelet port
    #[serde(default = "default_agent_port")]
    pub agent_port: u16,

    #[serde(default)]
    pub agent_scheme: AgentScheme,

    #[serde(default)]
    pub trust_policy: TrustPolicy,

    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    #[serde(default = "default_per_node_concurrency")]
    pub per_node_concurrency: usize,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Deadline for a single checkpoint call
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Attempts per container; 1 disables retries
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

fn default_trust_anchor_path() -> PathBuf {
    PathBuf::from(DEFAULT_TRUST_ANCHOR_PATH)
}

fn default_token_path() -> PathBuf {
    PathBuf::from(DEFAULT_TOKEN_PATH)
}

fn default_agent_port() -> u16 {
    AgentEndpoint::default().port
}

fn default_max_concurrency() -> usize {
    16
}

fn default_per_node_concurrency() -> usize {
    2
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    1
}

fn default_initial_backoff() -> u64 {
    1000
}

fn default_max_backoff() -> u64 {
    30_000
}

impl CheckpointerConfig {
    /// Load configuration from an optional file and the environment
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config = builder
            .add_source(config::Environment::with_prefix("CHECKPOINTER").try_parsing(true))
            .build()
            .context("Failed to load configuration")?;

        config
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    pub fn credential_paths(&self) -> CredentialPaths {
        CredentialPaths {
            trust_anchor: self.trust_anchor_path.clone(),
            token: self.token_path.clone(),
        }
    }

    pub fn agent_client_config(&self) -> AgentClientConfig {
        AgentClientConfig {
            endpoint: AgentEndpoint {
                scheme: self.agent_scheme,
                port: self.agent_port,
            },
            trust_policy: self.trust_policy,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        }
    }

    pub fn run_settings(&self, dry_run: bool) -> RunSettings {
        RunSettings {
            namespace: self.namespace.clone(),
            orchestrator: OrchestratorConfig {
                max_concurrency: self.max_concurrency,
                per_node_concurrency: self.per_node_concurrency,
                request_timeout: Duration::from_secs(self.request_timeout_secs),
                retry: RetryPolicy {
                    max_attempts: self.max_attempts,
                    initial_backoff: Duration::from_millis(self.initial_backoff_ms),
                    max_backoff: Duration::from_millis(self.max_backoff_ms),
                },
            },
            dry_run,
        }
    }
}
