//! Service account credential loading
//!
//! The trust anchor and bearer token are read once per run, before any
//! network activity, and handed to the node agent client as a
//! [`CredentialBundle`].

use crate::error::{CredentialKind, CredentialLoadError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DEFAULT_TRUST_ANCHOR_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";
pub const DEFAULT_TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// Locations of the credential files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPaths {
    #[serde(default = "default_trust_anchor_path")]
    pub trust_anchor: PathBuf,
    #[serde(default = "default_token_path")]
    pub token: PathBuf,
}

fn default_trust_anchor_path() -> PathBuf {
    PathBuf::from(DEFAULT_TRUST_ANCHOR_PATH)
}

fn default_token_path() -> PathBuf {
    PathBuf::from(DEFAULT_TOKEN_PATH)
}

impl Default for CredentialPaths {
    fn default() -> Self {
        Self {
            trust_anchor: default_trust_anchor_path(),
            token: default_token_path(),
        }
    }
}

/// Trust anchor and bearer token shared by every call in a run
#[derive(Clone)]
pub struct CredentialBundle {
    /// DER-encoded CA certificates
    trust_anchor: Vec<Vec<u8>>,
    token: String,
}

impl CredentialBundle {
    pub fn trust_anchor_der(&self) -> &[Vec<u8>] {
        &self.trust_anchor
    }

    pub fn bearer_token(&self) -> &str {
        &self.token
    }

    /// Value for the `Authorization` header
    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialBundle")
            .field("trust_anchor_certs", &self.trust_anchor.len())
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Loads a [`CredentialBundle`] from fixed file locations
#[derive(Debug, Clone)]
pub struct CredentialProvider {
    paths: CredentialPaths,
}

impl CredentialProvider {
    pub fn new(paths: CredentialPaths) -> Self {
        Self { paths }
    }

    /// Read and validate both credential files
    pub async fn load(&self) -> Result<CredentialBundle, CredentialLoadError> {
        let pem = read_file(CredentialKind::TrustAnchor, &self.paths.trust_anchor).await?;
        let trust_anchor = parse_trust_anchor(&self.paths.trust_anchor, &pem)?;

        let raw_token = read_file(CredentialKind::BearerToken, &self.paths.token).await?;
        let token = parse_token(&self.paths.token, &raw_token)?;

        info!(
            trust_anchor = %self.paths.trust_anchor.display(),
            certificates = trust_anchor.len(),
            "Loaded service account credentials"
        );

        Ok(CredentialBundle {
            trust_anchor,
            token,
        })
    }
}

async fn read_file(kind: CredentialKind, path: &Path) -> Result<Vec<u8>, CredentialLoadError> {
    debug!(kind = %kind, path = %path.display(), "Reading credential file");
    tokio::fs::read(path)
        .await
        .map_err(|source| CredentialLoadError::Read {
            kind,
            path: path.to_path_buf(),
            source,
        })
}

fn parse_trust_anchor(path: &Path, pem: &[u8]) -> Result<Vec<Vec<u8>>, CredentialLoadError> {
    if pem.iter().all(u8::is_ascii_whitespace) {
        return Err(CredentialLoadError::Empty {
            kind: CredentialKind::TrustAnchor,
            path: path.to_path_buf(),
        });
    }

    let certs = rustls_pemfile::certs(&mut &pem[..]).map_err(|e| {
        CredentialLoadError::InvalidTrustAnchor {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
    })?;

    if certs.is_empty() {
        return Err(CredentialLoadError::InvalidTrustAnchor {
            path: path.to_path_buf(),
            reason: "no PEM certificate found".to_string(),
        });
    }

    Ok(certs)
}

fn parse_token(path: &Path, raw: &[u8]) -> Result<String, CredentialLoadError> {
    let token = std::str::from_utf8(raw)
        .map_err(|_| CredentialLoadError::InvalidToken {
            path: path.to_path_buf(),
        })?
        .trim();

    if token.is_empty() {
        return Err(CredentialLoadError::Empty {
            kind: CredentialKind::BearerToken,
            path: path.to_path_buf(),
        });
    }

    if !token.bytes().all(|b| b.is_ascii_graphic()) {
        return Err(CredentialLoadError::InvalidToken {
            path: path.to_path_buf(),
        });
    }

    Ok(token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TEST_CA: &str = include_str!("../tests/fixtures/ca.crt");

    fn write_credentials(dir: &TempDir, ca: &str, token: &str) -> CredentialPaths {
        let trust_anchor = dir.path().join("ca.crt");
        let token_path = dir.path().join("token");
        std::fs::write(&trust_anchor, ca).unwrap();
        std::fs::write(&token_path, token).unwrap();
        CredentialPaths {
            trust_anchor,
            token: token_path,
        }
    }

    #[test]
    fn test_default_paths_are_service_account_mount() {
        let paths = CredentialPaths::default();
        assert_eq!(paths.trust_anchor, PathBuf::from(DEFAULT_TRUST_ANCHOR_PATH));
        assert_eq!(paths.token, PathBuf::from(DEFAULT_TOKEN_PATH));
    }

    #[tokio::test]
    async fn test_load_valid_credentials() {
        let dir = TempDir::new().unwrap();
        let paths = write_credentials(&dir, TEST_CA, "secret-token\n");

        let bundle = CredentialProvider::new(paths).load().await.unwrap();
        assert_eq!(bundle.trust_anchor_der().len(), 1);
        assert_eq!(bundle.bearer_token(), "secret-token");
        assert_eq!(bundle.authorization(), "Bearer secret-token");
    }

    #[tokio::test]
    async fn test_missing_trust_anchor() {
        let dir = TempDir::new().unwrap();
        let mut paths = write_credentials(&dir, TEST_CA, "secret-token");
        paths.trust_anchor = dir.path().join("missing.crt");

        let err = CredentialProvider::new(paths).load().await.unwrap_err();
        assert!(matches!(err, CredentialLoadError::Read { .. }));
        assert_eq!(err.kind(), CredentialKind::TrustAnchor);
    }

    #[tokio::test]
    async fn test_missing_token() {
        let dir = TempDir::new().unwrap();
        let mut paths = write_credentials(&dir, TEST_CA, "secret-token");
        paths.token = dir.path().join("missing-token");

        let err = CredentialProvider::new(paths).load().await.unwrap_err();
        assert!(matches!(err, CredentialLoadError::Read { .. }));
        assert_eq!(err.kind(), CredentialKind::BearerToken);
    }

    #[tokio::test]
    async fn test_empty_token_rejected() {
        let dir = TempDir::new().unwrap();
        let paths = write_credentials(&dir, TEST_CA, "  \n");

        let err = CredentialProvider::new(paths).load().await.unwrap_err();
        assert!(matches!(
            err,
            CredentialLoadError::Empty {
                kind: CredentialKind::BearerToken,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_token_with_control_characters_rejected() {
        let dir = TempDir::new().unwrap();
        let paths = write_credentials(&dir, TEST_CA, "abc\r\ndef");

        let err = CredentialProvider::new(paths).load().await.unwrap_err();
        assert!(matches!(err, CredentialLoadError::InvalidToken { .. }));
    }

    #[tokio::test]
    async fn test_trust_anchor_without_certificate() {
        let dir = TempDir::new().unwrap();
        let paths = write_credentials(&dir, "not a certificate\n", "secret-token");

        let err = CredentialProvider::new(paths).load().await.unwrap_err();
        assert!(matches!(err, CredentialLoadError::InvalidTrustAnchor { .. }));
    }

    #[tokio::test]
    async fn test_trust_anchor_bundle_with_multiple_certificates() {
        let dir = TempDir::new().unwrap();
        let bundle_pem = format!("{}{}", TEST_CA, TEST_CA);
        let paths = write_credentials(&dir, &bundle_pem, "secret-token");

        let bundle = CredentialProvider::new(paths).load().await.unwrap();
        assert_eq!(bundle.trust_anchor_der().len(), 2);
    }

    #[tokio::test]
    async fn test_debug_redacts_token() {
        let dir = TempDir::new().unwrap();
        let paths = write_credentials(&dir, TEST_CA, "super-secret");

        let bundle = CredentialProvider::new(paths).load().await.unwrap();
        let rendered = format!("{:?}", bundle);
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
