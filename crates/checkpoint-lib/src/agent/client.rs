//! HTTPS client for the kubelet checkpoint API
//!
//! This module provides a client that:
//! - Verifies the kubelet serving certificate against the trust anchor only
//! - Authenticates with the service account bearer token
//! - Builds `/checkpoint/<namespace>/<pod>/<container>` targets on port 10250
//! - Classifies every response into success, rejection or transport failure

use super::NodeAgent;
use crate::credentials::CredentialBundle;
use crate::error::{error_chain, CheckpointError, RunError, TransportErrorKind};
use crate::models::CheckpointRequest;
use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Kubelet port serving the checkpoint API
pub const DEFAULT_AGENT_PORT: u16 = 10250;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentScheme {
    #[default]
    Https,
    /// Plain HTTP, for local agents and test doubles only
    Http,
}

impl fmt::Display for AgentScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentScheme::Https => f.write_str("https"),
            AgentScheme::Http => f.write_str("http"),
        }
    }
}

/// How the kubelet serving certificate is checked
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustPolicy {
    /// Verify against the loaded trust anchor; built-in roots are not used
    #[default]
    Verify,
    /// Accept any certificate. Must be chosen explicitly.
    InsecureSkipVerify,
}

/// Where checkpoint requests are sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentEndpoint {
    pub scheme: AgentScheme,
    pub port: u16,
}

impl Default for AgentEndpoint {
    fn default() -> Self {
        Self {
            scheme: AgentScheme::Https,
            port: DEFAULT_AGENT_PORT,
        }
    }
}

impl AgentEndpoint {
    /// Build the checkpoint URL for a request
    pub fn url_for(&self, request: &CheckpointRequest) -> Result<Url, CheckpointError> {
        let host = request.node_address.trim();
        if host.is_empty() {
            return Err(CheckpointError::transport(
                TransportErrorKind::InvalidTarget,
                format!("pod {} has no node address", request.pod_name),
            ));
        }

        let host = if host.contains(':') && !host.starts_with('[') {
            format!("[{}]", host)
        } else {
            host.to_string()
        };

        let base = format!("{}://{}:{}/", self.scheme, host, self.port);
        let mut url = Url::parse(&base).map_err(|e| {
            CheckpointError::transport(
                TransportErrorKind::InvalidTarget,
                format!("invalid node address {:?}: {}", request.node_address, e),
            )
        })?;

        url.path_segments_mut()
            .map_err(|_| {
                CheckpointError::transport(
                    TransportErrorKind::InvalidTarget,
                    format!("cannot build checkpoint path on {}", base),
                )
            })?
            .clear()
            .extend([
                "checkpoint",
                request.namespace.as_str(),
                request.pod_name.as_str(),
                request.container_name.as_str(),
            ]);

        Ok(url)
    }
}

/// Configuration for the node agent client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentClientConfig {
    pub endpoint: AgentEndpoint,
    pub trust_policy: TrustPolicy,
    /// TCP + TLS handshake timeout; the overall deadline is applied by the caller
    pub connect_timeout: Duration,
}

impl Default for AgentClientConfig {
    fn default() -> Self {
        Self {
            endpoint: AgentEndpoint::default(),
            trust_policy: TrustPolicy::default(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Authenticated client for kubelet checkpoint calls
pub struct NodeAgentClient {
    http: reqwest::Client,
    endpoint: AgentEndpoint,
    authorization: HeaderValue,
}

impl NodeAgentClient {
    /// Build a client that trusts the bundle's anchor and sends its token
    pub fn new(bundle: &CredentialBundle, config: &AgentClientConfig) -> Result<Self, RunError> {
        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .connect_timeout(config.connect_timeout);

        match config.trust_policy {
            TrustPolicy::Verify => {
                builder = builder.tls_built_in_root_certs(false);
                for der in bundle.trust_anchor_der() {
                    let cert = reqwest::Certificate::from_der(der)
                        .map_err(|source| RunError::Client { source })?;
                    builder = builder.add_root_certificate(cert);
                }
            }
            TrustPolicy::InsecureSkipVerify => {
                warn!("Kubelet certificate verification is disabled by configuration");
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        if config.endpoint.scheme == AgentScheme::Http {
            warn!("Node agent scheme is plain HTTP; the bearer token is sent unencrypted");
        }

        let http = builder
            .build()
            .map_err(|source| RunError::Client { source })?;

        let mut authorization = HeaderValue::from_str(&bundle.authorization()).map_err(|_| {
            RunError::Configuration("bearer token is not a valid header value".to_string())
        })?;
        authorization.set_sensitive(true);

        Ok(Self {
            http,
            endpoint: config.endpoint,
            authorization,
        })
    }
}

#[async_trait]
impl NodeAgent for NodeAgentClient {
    async fn checkpoint(&self, request: &CheckpointRequest) -> Result<String, CheckpointError> {
        let url = self.endpoint.url_for(request)?;
        debug!(url = %url, "Sending checkpoint request");

        let response = self
            .http
            .post(url)
            .header(AUTHORIZATION, self.authorization.clone())
            .send()
            .await
            .map_err(|e| CheckpointError::transport(classify_send_error(&e), error_chain(&e)))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            CheckpointError::transport(TransportErrorKind::Body, error_chain(&e))
        })?;

        if status != StatusCode::OK {
            return Err(CheckpointError::AgentRejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(body)
    }
}

fn classify_send_error(err: &reqwest::Error) -> TransportErrorKind {
    if err.is_builder() {
        TransportErrorKind::InvalidTarget
    } else if err.is_timeout() {
        TransportErrorKind::Timeout
    } else if err.is_connect() {
        TransportErrorKind::Connect
    } else if err.is_body() || err.is_decode() {
        TransportErrorKind::Body
    } else {
        TransportErrorKind::Request
    }
}

/// Builder for NodeAgentClient configuration
pub struct NodeAgentClientBuilder {
    config: AgentClientConfig,
}

impl NodeAgentClientBuilder {
    pub fn new() -> Self {
        Self {
            config: AgentClientConfig::default(),
        }
    }

    pub fn scheme(mut self, scheme: AgentScheme) -> Self {
        self.config.endpoint.scheme = scheme;
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.endpoint.port = port;
        self
    }

    pub fn trust_policy(mut self, policy: TrustPolicy) -> Self {
        self.config.trust_policy = policy;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn build(self, bundle: &CredentialBundle) -> Result<NodeAgentClient, RunError> {
        NodeAgentClient::new(bundle, &self.config)
    }
}

impl Default for NodeAgentClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(node: &str) -> CheckpointRequest {
        CheckpointRequest::new(node, "default", "web-1", "app")
    }

    #[test]
    fn test_url_for_ipv4_node() {
        let url = AgentEndpoint::default().url_for(&request("10.0.0.5")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://10.0.0.5:10250/checkpoint/default/web-1/app"
        );
    }

    #[test]
    fn test_url_for_ipv6_node() {
        let url = AgentEndpoint::default().url_for(&request("fd00::5")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://[fd00::5]:10250/checkpoint/default/web-1/app"
        );
    }

    #[test]
    fn test_url_for_custom_endpoint() {
        let endpoint = AgentEndpoint {
            scheme: AgentScheme::Http,
            port: 8080,
        };
        let url = endpoint.url_for(&request("node-a.internal")).unwrap();
        assert_eq!(
            url.as_str(),
            "http://node-a.internal:8080/checkpoint/default/web-1/app"
        );
    }

    #[test]
    fn test_url_segments_are_encoded() {
        let req = CheckpointRequest::new("10.0.0.5", "default", "web/1", "app?x");
        let url = AgentEndpoint::default().url_for(&req).unwrap();
        assert_eq!(
            url.as_str(),
            "https://10.0.0.5:10250/checkpoint/default/web%2F1/app%3Fx"
        );
    }

    #[test]
    fn test_empty_node_address_is_invalid_target() {
        let err = AgentEndpoint::default().url_for(&request("")).unwrap_err();
        match err {
            CheckpointError::Transport { kind, cause } => {
                assert_eq!(kind, TransportErrorKind::InvalidTarget);
                assert!(cause.contains("web-1"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_node_address_is_invalid_target() {
        let err = AgentEndpoint::default()
            .url_for(&request("bad host"))
            .unwrap_err();
        assert!(matches!(
            err,
            CheckpointError::Transport {
                kind: TransportErrorKind::InvalidTarget,
                ..
            }
        ));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_client_config_default() {
        let config = AgentClientConfig::default();
        assert_eq!(config.endpoint.port, 10250);
        assert_eq!(config.endpoint.scheme, AgentScheme::Https);
        assert_eq!(config.trust_policy, TrustPolicy::Verify);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_builder_pattern() {
        let builder = NodeAgentClientBuilder::new()
            .scheme(AgentScheme::Http)
            .port(18080)
            .trust_policy(TrustPolicy::InsecureSkipVerify)
            .connect_timeout(Duration::from_secs(2));

        assert_eq!(builder.config.endpoint.scheme, AgentScheme::Http);
        assert_eq!(builder.config.endpoint.port, 18080);
        assert_eq!(builder.config.trust_policy, TrustPolicy::InsecureSkipVerify);
        assert_eq!(builder.config.connect_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_trust_policy_serde_names() {
        let policy: TrustPolicy = serde_json::from_str("\"insecure_skip_verify\"").unwrap();
        assert_eq!(policy, TrustPolicy::InsecureSkipVerify);
        let scheme: AgentScheme = serde_json::from_str("\"http\"").unwrap();
        assert_eq!(scheme, AgentScheme::Http);
    }
}
