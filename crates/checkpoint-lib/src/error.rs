//! Error taxonomy for a checkpoint run
//!
//! Run-level errors ([`RunError`]) abort the run before or during discovery.
//! Per-target errors ([`CheckpointError`]) are attached to that target's
//! result and never escalate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors that stop a run before any checkpoint is attempted
#[derive(Debug, Error)]
pub enum RunError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error(transparent)]
    CredentialLoad(#[from] CredentialLoadError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error("failed to build node agent HTTP client")]
    Client {
        #[source]
        source: reqwest::Error,
    },
}

/// Which credential file a [`CredentialLoadError`] refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    TrustAnchor,
    BearerToken,
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialKind::TrustAnchor => f.write_str("trust anchor"),
            CredentialKind::BearerToken => f.write_str("bearer token"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CredentialLoadError {
    #[error("failed to read {kind} from {}", path.display())]
    Read {
        kind: CredentialKind,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{kind} at {} is empty", path.display())]
    Empty { kind: CredentialKind, path: PathBuf },

    #[error("trust anchor at {} is not usable: {reason}", path.display())]
    InvalidTrustAnchor { path: PathBuf, reason: String },

    #[error("bearer token at {} contains characters not allowed in an HTTP header", path.display())]
    InvalidToken { path: PathBuf },
}

impl CredentialLoadError {
    pub fn kind(&self) -> CredentialKind {
        match self {
            CredentialLoadError::Read { kind, .. } | CredentialLoadError::Empty { kind, .. } => {
                *kind
            }
            CredentialLoadError::InvalidTrustAnchor { .. } => CredentialKind::TrustAnchor,
            CredentialLoadError::InvalidToken { .. } => CredentialKind::BearerToken,
        }
    }
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("failed to list pods in namespace {namespace}")]
    List {
        namespace: String,
        #[source]
        source: kube::Error,
    },

    #[error("inventory for namespace {namespace} is unavailable: {reason}")]
    Unavailable { namespace: String, reason: String },
}

/// Transport failure categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    /// The request could not be built (bad node address, unencodable path)
    InvalidTarget,
    /// TCP or TLS connection could not be established
    Connect,
    /// No response before the per-call deadline
    Timeout,
    /// Any other failure while sending the request
    Request,
    /// The response body could not be read
    Body,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportErrorKind::InvalidTarget => "invalid target",
            TransportErrorKind::Connect => "connect",
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Request => "request",
            TransportErrorKind::Body => "body",
        };
        f.write_str(name)
    }
}

/// Failure of a single checkpoint call
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum CheckpointError {
    #[error("transport error ({kind}): {cause}")]
    Transport {
        kind: TransportErrorKind,
        cause: String,
    },

    #[error("node agent rejected checkpoint with status {status}: {body}")]
    AgentRejected { status: u16, body: String },
}

impl CheckpointError {
    pub fn transport(kind: TransportErrorKind, cause: impl Into<String>) -> Self {
        CheckpointError::Transport {
            kind,
            cause: cause.into(),
        }
    }

    /// Whether another attempt could plausibly succeed.
    ///
    /// Malformed targets and 4xx rejections are permanent; connection
    /// problems, timeouts and 5xx responses are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            CheckpointError::Transport { kind, .. } => *kind != TransportErrorKind::InvalidTarget,
            CheckpointError::AgentRejected { status, .. } => *status >= 500,
        }
    }

    /// Diagnostic text for operators: the cause or the agent's response body
    pub fn diagnostic(&self) -> &str {
        match self {
            CheckpointError::Transport { cause, .. } => cause,
            CheckpointError::AgentRejected { body, .. } => body,
        }
    }

    /// Short label used for metrics and logs
    pub fn label(&self) -> &'static str {
        match self {
            CheckpointError::Transport { .. } => "transport_error",
            CheckpointError::AgentRejected { .. } => "agent_rejected",
        }
    }
}

/// Render an error and its `source()` chain as one line
///
/// Causes whose text is already part of the rendered message are skipped,
/// since some errors (reqwest's among them) print their source themselves.
pub(crate) fn error_chain(err: &dyn std::error::Error) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let message = cause.to_string();
        if !rendered.contains(&message) {
            rendered.push_str(": ");
            rendered.push_str(&message);
        }
        source = cause.source();
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(CheckpointError::transport(TransportErrorKind::Timeout, "slow").is_retryable());
        assert!(CheckpointError::transport(TransportErrorKind::Connect, "refused").is_retryable());
        assert!(!CheckpointError::transport(TransportErrorKind::InvalidTarget, "no host").is_retryable());

        let server_error = CheckpointError::AgentRejected {
            status: 503,
            body: "busy".to_string(),
        };
        assert!(server_error.is_retryable());

        let forbidden = CheckpointError::AgentRejected {
            status: 403,
            body: "forbidden".to_string(),
        };
        assert!(!forbidden.is_retryable());
    }

    #[test]
    fn test_rejection_display_keeps_body() {
        let err = CheckpointError::AgentRejected {
            status: 500,
            body: "oom".to_string(),
        };
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("oom"));
        assert_eq!(err.diagnostic(), "oom");
        assert_eq!(err.label(), "agent_rejected");
    }

    #[test]
    fn test_checkpoint_error_serializes_tagged() {
        let err = CheckpointError::transport(TransportErrorKind::Timeout, "deadline exceeded");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["error"], "transport");
        assert_eq!(json["kind"], "timeout");
        assert_eq!(json["cause"], "deadline exceeded");
    }

    #[test]
    fn test_credential_error_kind() {
        let err = CredentialLoadError::Empty {
            kind: CredentialKind::BearerToken,
            path: PathBuf::from("/tmp/token"),
        };
        assert_eq!(err.kind(), CredentialKind::BearerToken);
        assert_eq!(err.to_string(), "bearer token at /tmp/token is empty");
    }

    #[test]
    fn test_error_chain_renders_sources() {
        let inner = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let outer = CredentialLoadError::Read {
            kind: CredentialKind::TrustAnchor,
            path: PathBuf::from("/ca.crt"),
            source: inner,
        };
        assert_eq!(
            error_chain(&outer),
            "failed to read trust anchor from /ca.crt: refused"
        );
    }

    #[derive(Debug)]
    struct ConnectFailure(std::io::Error);

    impl fmt::Display for ConnectFailure {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "error trying to connect: {}", self.0)
        }
    }

    impl std::error::Error for ConnectFailure {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    #[derive(Debug)]
    struct SendFailure(ConnectFailure);

    impl fmt::Display for SendFailure {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "error sending request: {}", self.0)
        }
    }

    impl std::error::Error for SendFailure {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_error_chain_skips_causes_already_in_message() {
        let inner = std::io::Error::new(std::io::ErrorKind::Other, "invalid peer certificate");
        let err = SendFailure(ConnectFailure(inner));

        assert_eq!(
            error_chain(&err),
            "error sending request: error trying to connect: invalid peer certificate"
        );
    }
}
