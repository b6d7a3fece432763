//! Workload discovery through the Kubernetes API
//!
//! Lists the pods of a namespace page by page and turns each into a
//! [`WorkloadEntry`] carrying its node address and container names.

use crate::error::DiscoveryError;
use crate::models::WorkloadEntry;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams};
use tracing::{debug, info, warn};

/// Default number of pods requested per list call
pub const DEFAULT_PAGE_SIZE: u32 = 500;

/// Read-only source of the workloads to checkpoint
#[async_trait]
pub trait InventorySource: Send + Sync {
    async fn list_workloads(&self, namespace: &str) -> Result<Vec<WorkloadEntry>, DiscoveryError>;
}

/// Inventory backed by the Kubernetes pod list API
pub struct KubeInventory {
    client: kube::Client,
    label_selector: Option<String>,
    page_size: u32,
}

impl KubeInventory {
    pub fn new(client: kube::Client) -> Self {
        Self {
            client,
            label_selector: None,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Only list pods matching this label selector
    pub fn with_label_selector(mut self, selector: impl Into<String>) -> Self {
        let selector = selector.into();
        self.label_selector = if selector.trim().is_empty() {
            None
        } else {
            Some(selector)
        };
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn list_params(&self, continue_token: Option<&str>) -> ListParams {
        let mut params = ListParams::default().limit(self.page_size);
        if let Some(selector) = &self.label_selector {
            params = params.labels(selector);
        }
        if let Some(token) = continue_token {
            params = params.continue_token(token);
        }
        params
    }
}

#[async_trait]
impl InventorySource for KubeInventory {
    async fn list_workloads(&self, namespace: &str) -> Result<Vec<WorkloadEntry>, DiscoveryError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let mut entries = Vec::new();
        let mut continue_token: Option<String> = None;
        let mut pages = 0u32;

        loop {
            let params = self.list_params(continue_token.as_deref());
            let page = pods
                .list(&params)
                .await
                .map_err(|source| DiscoveryError::List {
                    namespace: namespace.to_string(),
                    source,
                })?;
            pages += 1;

            debug!(
                namespace = %namespace,
                page = pages,
                pods = page.items.len(),
                "Listed pod page"
            );
            entries.extend(page.items.iter().filter_map(|pod| workload_from_pod(namespace, pod)));

            match page.metadata.continue_ {
                Some(token) if !token.is_empty() => continue_token = Some(token),
                _ => break,
            }
        }

        info!(
            namespace = %namespace,
            pods = entries.len(),
            pages = pages,
            "Discovered workloads"
        );
        Ok(entries)
    }
}

/// Convert a pod into an inventory entry
///
/// Pods without a name are dropped. Pods not yet bound to a node keep an
/// empty node address so their containers still produce a (failed) result.
pub fn workload_from_pod(namespace: &str, pod: &Pod) -> Option<WorkloadEntry> {
    let Some(pod_name) = pod.metadata.name.clone() else {
        warn!(namespace = %namespace, "Skipping pod without a name");
        return None;
    };

    let node_address = pod
        .status
        .as_ref()
        .and_then(|status| status.host_ip.clone())
        .unwrap_or_default();

    if node_address.is_empty() {
        warn!(pod = %pod_name, "Pod has no host IP yet");
    }

    let containers = pod
        .spec
        .as_ref()
        .map(|spec| spec.containers.iter().map(|c| c.name.clone()).collect())
        .unwrap_or_default();

    Some(WorkloadEntry {
        namespace: pod
            .metadata
            .namespace
            .clone()
            .unwrap_or_else(|| namespace.to_string()),
        pod_name,
        node_address,
        containers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server, ServerGuard};
    use serde_json::json;

    const TEST_CA: &str = include_str!("../tests/fixtures/ca.crt");
    const PODS_PATH: &str = "/api/v1/namespaces/default/pods";

    fn pod(value: serde_json::Value) -> Pod {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_workload_from_running_pod() {
        let pod = pod(json!({
            "metadata": { "name": "web-1", "namespace": "default" },
            "spec": { "containers": [ { "name": "app" }, { "name": "sidecar" } ] },
            "status": { "hostIP": "10.0.0.5" }
        }));

        let entry = workload_from_pod("default", &pod).unwrap();
        assert_eq!(entry.pod_name, "web-1");
        assert_eq!(entry.namespace, "default");
        assert_eq!(entry.node_address, "10.0.0.5");
        assert_eq!(entry.containers, vec!["app", "sidecar"]);
    }

    #[test]
    fn test_init_containers_are_not_checkpointed() {
        let pod = pod(json!({
            "metadata": { "name": "web-1" },
            "spec": {
                "initContainers": [ { "name": "migrate" } ],
                "containers": [ { "name": "app" } ]
            },
            "status": { "hostIP": "10.0.0.5" }
        }));

        let entry = workload_from_pod("staging", &pod).unwrap();
        assert_eq!(entry.containers, vec!["app"]);
        assert_eq!(entry.namespace, "staging");
    }

    #[test]
    fn test_pending_pod_keeps_containers() {
        let pod = pod(json!({
            "metadata": { "name": "pending-0" },
            "spec": { "containers": [ { "name": "app" } ] }
        }));

        let entry = workload_from_pod("default", &pod).unwrap();
        assert!(entry.node_address.is_empty());
        assert_eq!(entry.containers.len(), 1);
    }

    #[test]
    fn test_unnamed_pod_is_dropped() {
        let pod = pod(json!({
            "metadata": {},
            "spec": { "containers": [ { "name": "app" } ] }
        }));

        assert!(workload_from_pod("default", &pod).is_none());
    }

    /// API client pointed at a mock API server
    fn api_client(server: &ServerGuard) -> kube::Client {
        let mut config = kube::Config::new(server.url().parse().unwrap());
        config.root_cert = Some(rustls_pemfile::certs(&mut TEST_CA.as_bytes()).unwrap());
        kube::Client::try_from(config).unwrap()
    }

    fn pod_list(continue_token: Option<&str>, pods: &[(&str, &str)]) -> String {
        let items: Vec<serde_json::Value> = pods
            .iter()
            .map(|(name, host_ip)| {
                json!({
                    "apiVersion": "v1",
                    "kind": "Pod",
                    "metadata": { "name": name, "namespace": "default" },
                    "spec": { "containers": [ { "name": "app" } ] },
                    "status": { "hostIP": host_ip }
                })
            })
            .collect();

        let mut metadata = json!({ "resourceVersion": "100" });
        if let Some(token) = continue_token {
            metadata["continue"] = json!(token);
        }

        json!({
            "apiVersion": "v1",
            "kind": "PodList",
            "metadata": metadata,
            "items": items
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_list_follows_continue_token() {
        let mut server = Server::new_async().await;
        let second_page = server
            .mock("GET", PODS_PATH)
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("continue".into(), "page-2".into()),
                Matcher::UrlEncoded("labelSelector".into(), "app=web".into()),
                Matcher::UrlEncoded("limit".into(), "2".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(pod_list(None, &[("web-3", "10.0.0.7")]))
            .expect(1)
            .create_async()
            .await;
        let first_page = server
            .mock("GET", PODS_PATH)
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("labelSelector".into(), "app=web".into()),
                Matcher::UrlEncoded("limit".into(), "2".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(pod_list(
                Some("page-2"),
                &[("web-1", "10.0.0.5"), ("web-2", "10.0.0.6")],
            ))
            .expect(1)
            .create_async()
            .await;

        let inventory = KubeInventory::new(api_client(&server))
            .with_label_selector("app=web")
            .with_page_size(2);
        let workloads = inventory.list_workloads("default").await.unwrap();

        let names: Vec<&str> = workloads.iter().map(|w| w.pod_name.as_str()).collect();
        assert_eq!(names, vec!["web-1", "web-2", "web-3"]);
        assert_eq!(workloads[2].node_address, "10.0.0.7");

        first_page.assert_async().await;
        second_page.assert_async().await;
    }

    #[tokio::test]
    async fn test_single_page_without_selector() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", PODS_PATH)
            .match_query(Matcher::UrlEncoded("limit".into(), "500".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(pod_list(None, &[("web-1", "10.0.0.5")]))
            .expect(1)
            .create_async()
            .await;

        let workloads = KubeInventory::new(api_client(&server))
            .with_label_selector("  ")
            .list_workloads("default")
            .await
            .unwrap();

        assert_eq!(workloads.len(), 1);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_failure_is_discovery_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", PODS_PATH)
            .match_query(Matcher::Any)
            .with_status(403)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "kind": "Status",
                    "apiVersion": "v1",
                    "status": "Failure",
                    "message": "pods is forbidden",
                    "reason": "Forbidden",
                    "code": 403
                })
                .to_string(),
            )
            .create_async()
            .await;

        let err = KubeInventory::new(api_client(&server))
            .list_workloads("default")
            .await
            .unwrap_err();

        match err {
            DiscoveryError::List { namespace, .. } => assert_eq!(namespace, "default"),
            other => panic!("expected list error, got {:?}", other),
        }
    }
}
