//! Cluster connections
//!
//! Turns a `ClusterHandle` into a live `ClusterApi`: clusters without an
//! endpoint use the ambient kubeconfig, provisioned clusters get a generated
//! kubeconfig holding their endpoint, CA and a bearer token.

use async_trait::async_trait;
use burst_core::domain::cluster::{ClusterEndpoint, ClusterHandle};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::capability::{ClusterApi, ClusterConnector};
use crate::error::{ClientError, Result};
use crate::gke::GoogleTokenSource;
use crate::kube_api::KubeClusterApi;

const USER_NAME: &str = "flux-burst";

/// Renders a single-context kubeconfig for an endpoint
pub fn render_kubeconfig(endpoint: &ClusterEndpoint, token: &str) -> Result<String> {
    let mut cluster = json!({ "server": endpoint.server });
    if let Some(ca) = &endpoint.ca_certificate {
        cluster["certificate-authority-data"] = json!(ca);
    }

    let kubeconfig = json!({
        "apiVersion": "v1",
        "kind": "Config",
        "clusters": [{ "name": endpoint.name, "cluster": cluster }],
        "users": [{ "name": USER_NAME, "user": { "token": token } }],
        "contexts": [{
            "name": endpoint.name,
            "context": { "cluster": endpoint.name, "user": USER_NAME }
        }],
        "current-context": endpoint.name,
    });

    serde_yaml::to_string(&kubeconfig).map_err(|e| ClientError::Kubeconfig(e.to_string()))
}

/// Builds a kube client for an endpoint
pub async fn client_for(endpoint: &ClusterEndpoint, token: &str) -> Result<Client> {
    let yaml = render_kubeconfig(endpoint, token)?;
    let kubeconfig =
        Kubeconfig::from_yaml(&yaml).map_err(|e| ClientError::Kubeconfig(e.to_string()))?;
    let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| ClientError::Kubeconfig(e.to_string()))?;

    Ok(Client::try_from(config)?)
}

/// `ClusterConnector` producing kube-backed APIs
#[derive(Debug, Clone)]
pub struct KubeConnector {
    tokens: GoogleTokenSource,
    http: reqwest::Client,
}

impl KubeConnector {
    /// `http` fetches access tokens from the metadata server
    pub fn new(tokens: GoogleTokenSource, http: reqwest::Client) -> Self {
        Self { tokens, http }
    }
}

#[async_trait]
impl ClusterConnector for KubeConnector {
    async fn connect(&self, handle: &ClusterHandle) -> Result<Arc<dyn ClusterApi>> {
        let api = match handle.endpoint() {
            None => {
                info!("Connecting to cluster from local kubeconfig");
                KubeClusterApi::try_default().await?
            }
            Some(endpoint) => {
                info!("Connecting to {} at {}", endpoint.name, endpoint.server);
                let token = self.tokens.access_token(&self.http).await?;
                KubeClusterApi::new(client_for(endpoint, &token).await?)
            }
        };
        Ok(Arc::new(api))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> ClusterEndpoint {
        ClusterEndpoint {
            name: "flux-cluster".to_string(),
            location: "us-central1-a".to_string(),
            project: "my-project".to_string(),
            server: "https://34.1.2.3".to_string(),
            ca_certificate: Some("Q0EK".to_string()),
        }
    }

    #[test]
    fn test_rendered_kubeconfig_parses() {
        let yaml = render_kubeconfig(&endpoint(), "secret-token").unwrap();
        let kubeconfig = Kubeconfig::from_yaml(&yaml).unwrap();

        assert_eq!(kubeconfig.current_context.as_deref(), Some("flux-cluster"));
        assert_eq!(kubeconfig.clusters.len(), 1);
        let cluster = kubeconfig.clusters[0].cluster.as_ref().unwrap();
        assert_eq!(cluster.server.as_deref(), Some("https://34.1.2.3"));
        assert_eq!(cluster.certificate_authority_data.as_deref(), Some("Q0EK"));
        assert_eq!(kubeconfig.auth_infos[0].name, "flux-burst");
    }

    #[test]
    fn test_kubeconfig_without_ca() {
        let mut endpoint = endpoint();
        endpoint.ca_certificate = None;
        let yaml = render_kubeconfig(&endpoint, "t").unwrap();
        assert!(!yaml.contains("certificate-authority-data"));
    }
}
