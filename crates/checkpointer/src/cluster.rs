//! Kubernetes API access for the checkpointer binary

use async_trait::async_trait;
use checkpoint_lib::{DiscoveryError, InventorySource, KubeInventory, WorkloadEntry};
use kube::config::{KubeConfigOptions, Kubeconfig};
use std::path::PathBuf;
use tracing::debug;

/// Pod inventory whose API client is built on first use
///
/// Client construction reads kubeconfig or in-cluster files, so deferring it
/// keeps credential errors ahead of any cluster access.
pub struct ClusterInventory {
    kubeconfig: Option<PathBuf>,
    label_selector: Option<String>,
    page_size: u32,
}

impl ClusterInventory {
    pub fn new(kubeconfig: Option<PathBuf>, label_selector: Option<String>, page_size: u32) -> Self {
        Self {
            kubeconfig,
            label_selector,
            page_size,
        }
    }

    async fn client(&self, namespace: &str) -> Result<kube::Client, DiscoveryError> {
        let unavailable = |reason: String| DiscoveryError::Unavailable {
            namespace: namespace.to_string(),
            reason,
        };

        let config = match &self.kubeconfig {
            Some(path) => {
                debug!(path = %path.display(), "Loading kubeconfig");
                let kubeconfig = Kubeconfig::read_from(path)
                    .map_err(|e| unavailable(format!("failed to read kubeconfig: {}", e)))?;
                kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .map_err(|e| unavailable(format!("invalid kubeconfig: {}", e)))?
            }
            None => kube::Config::infer()
                .await
                .map_err(|e| unavailable(format!("no cluster configuration found: {}", e)))?,
        };

        kube::Client::try_from(config)
            .map_err(|e| unavailable(format!("failed to create API client: {}", e)))
    }
}

#[async_trait]
impl InventorySource for ClusterInventory {
    async fn list_workloads(&self, namespace: &str) -> Result<Vec<WorkloadEntry>, DiscoveryError> {
        let client = self.client(namespace).await?;
        let mut inventory = KubeInventory::new(client).with_page_size(self.page_size);
        if let Some(selector) = &self.label_selector {
            inventory = inventory.with_label_selector(selector.as_str());
        }
        inventory.list_workloads(namespace).await
    }
}
