//! Google Kubernetes Engine provider
//!
//! Creates and destroys GKE clusters through the Container REST API.

use async_trait::async_trait;
use burst_core::domain::cluster::{ClusterEndpoint, ProviderConfig};
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, info};

use crate::capability::{ClusterProvider, ClusterState};
use crate::error::{ClientError, Result};

/// Base URL of the GKE Container API
pub const GKE_API_URL: &str = "https://container.googleapis.com/v1";

/// Environment variable holding a ready-made OAuth access token
pub const ACCESS_TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Where Google access tokens come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GoogleTokenSource {
    /// A token supplied by the caller
    Static(String),
    /// The GCE/GKE metadata server of the machine we run on
    MetadataServer,
}

#[derive(Deserialize)]
struct MetadataToken {
    access_token: String,
}

impl GoogleTokenSource {
    /// Uses `GOOGLE_OAUTH_ACCESS_TOKEN` when set, the metadata server otherwise
    pub fn from_env() -> Self {
        match std::env::var(ACCESS_TOKEN_ENV) {
            Ok(token) if !token.trim().is_empty() => Self::Static(token.trim().to_string()),
            _ => Self::MetadataServer,
        }
    }

    /// Returns a bearer token valid for the Google APIs and GKE API servers
    pub async fn access_token(&self, client: &Client) -> Result<String> {
        match self {
            Self::Static(token) => Ok(token.clone()),
            Self::MetadataServer => {
                let response = client
                    .get(METADATA_TOKEN_URL)
                    .header("Metadata-Flavor", "Google")
                    .send()
                    .await
                    .map_err(|e| {
                        ClientError::Auth(format!(
                            "no {} set and metadata server unreachable: {}",
                            ACCESS_TOKEN_ENV, e
                        ))
                    })?;
                let token: MetadataToken = handle_response(response).await?;
                Ok(token.access_token)
            }
        }
    }
}

/// Subset of the GKE `Cluster` resource the launcher reads
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GkeCluster {
    name: String,
    status: String,
    #[serde(default)]
    status_message: Option<String>,
    #[serde(default)]
    endpoint: Option<String>,
    #[serde(default)]
    master_auth: Option<MasterAuth>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MasterAuth {
    #[serde(default)]
    cluster_ca_certificate: Option<String>,
}

/// `ClusterProvider` for Google Kubernetes Engine
#[derive(Debug, Clone)]
pub struct GkeProvider {
    base_url: String,
    client: Client,
    tokens: GoogleTokenSource,
}

impl GkeProvider {
    /// Creates a provider for the public GKE API
    ///
    /// # Arguments
    /// * `client` - A configured reqwest Client; give it a timeout, a hung
    ///   request otherwise blocks the caller indefinitely
    /// * `tokens` - Source of the bearer token
    pub fn new(client: Client, tokens: GoogleTokenSource) -> Self {
        Self::with_base_url(GKE_API_URL, client, tokens)
    }

    /// Creates a provider against a different API root (e.g. a regional endpoint)
    pub fn with_base_url(
        base_url: impl Into<String>,
        client: Client,
        tokens: GoogleTokenSource,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            tokens,
        }
    }

    fn clusters_url(&self, project: &str, location: &str) -> String {
        format!(
            "{}/projects/{}/locations/{}/clusters",
            self.base_url, project, location
        )
    }

    fn cluster_url(&self, project: &str, location: &str, name: &str) -> String {
        format!("{}/{}", self.clusters_url(project, location), name)
    }

    async fn token(&self) -> Result<String> {
        self.tokens.access_token(&self.client).await
    }
}

/// Request body creating a fixed-size cluster
fn create_request(config: &ProviderConfig) -> serde_json::Value {
    json!({
        "cluster": {
            "name": config.cluster_name,
            "initialNodeCount": config.node_count,
            "nodeConfig": { "machineType": config.machine_type },
            "autoscaling": { "enableNodeAutoprovisioning": false }
        }
    })
}

/// Maps the GKE cluster status onto the provider-neutral state
fn state_of(cluster: GkeCluster, config: &ProviderConfig) -> Result<ClusterState> {
    match cluster.status.as_str() {
        "PROVISIONING" | "RECONCILING" | "STATUS_UNSPECIFIED" => Ok(ClusterState::Provisioning),
        "RUNNING" => {
            let endpoint = cluster.endpoint.ok_or_else(|| {
                ClientError::ParseError(format!("cluster {} has no endpoint", cluster.name))
            })?;
            Ok(ClusterState::Ready(ClusterEndpoint {
                name: cluster.name,
                location: config.location.clone(),
                project: config.project.clone(),
                server: format!("https://{}", endpoint),
                ca_certificate: cluster
                    .master_auth
                    .and_then(|auth| auth.cluster_ca_certificate),
            }))
        }
        other => Ok(ClusterState::Failed(format!(
            "cluster {} is {}: {}",
            cluster.name,
            other,
            cluster.status_message.unwrap_or_default()
        ))),
    }
}

/// Handle an API response and deserialize JSON
async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();

    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(ClientError::api_error(status.as_u16(), error_text));
    }

    response
        .json()
        .await
        .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
}

/// Handle an API response whose body (a long-running operation) is not needed
async fn handle_empty_response(response: reqwest::Response) -> Result<()> {
    let status = response.status();

    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(ClientError::api_error(status.as_u16(), error_text));
    }

    Ok(())
}

#[async_trait]
impl ClusterProvider for GkeProvider {
    async fn create_cluster(&self, config: &ProviderConfig) -> Result<()> {
        let url = self.clusters_url(&config.project, &config.location);
        info!(
            "Creating GKE cluster {} ({} x {}) in {}",
            config.cluster_name, config.node_count, config.machine_type, config.location
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.token().await?)
            .json(&create_request(config))
            .send()
            .await?;

        handle_empty_response(response).await
    }

    async fn cluster_state(&self, config: &ProviderConfig) -> Result<ClusterState> {
        let url = self.cluster_url(&config.project, &config.location, &config.cluster_name);
        let response = self
            .client
            .get(&url)
            .bearer_auth(self.token().await?)
            .send()
            .await?;

        let cluster: GkeCluster = handle_response(response).await?;
        debug!("GKE cluster {} status {}", cluster.name, cluster.status);
        state_of(cluster, config)
    }

    async fn destroy_cluster(&self, endpoint: &ClusterEndpoint) -> Result<()> {
        let url = self.cluster_url(&endpoint.project, &endpoint.location, &endpoint.name);
        info!("Deleting GKE cluster {}", endpoint.name);

        let response = self
            .client
            .delete(&url)
            .bearer_auth(self.token().await?)
            .send()
            .await?;

        match handle_empty_response(response).await {
            Err(e) if e.is_not_found() => {
                debug!("GKE cluster {} already deleted", endpoint.name);
                Ok(())
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ProviderConfig {
        ProviderConfig {
            project: "my-project".to_string(),
            location: "us-central1-a".to_string(),
            cluster_name: "flux-cluster".to_string(),
            machine_type: "c2-standard-8".to_string(),
            node_count: 4,
        }
    }

    fn cluster(value: serde_json::Value) -> GkeCluster {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_urls() {
        let provider = GkeProvider::with_base_url(
            "https://container.googleapis.com/v1/",
            Client::new(),
            GoogleTokenSource::Static("t".to_string()),
        );
        assert_eq!(
            provider.cluster_url("my-project", "us-central1-a", "flux-cluster"),
            "https://container.googleapis.com/v1/projects/my-project/locations/us-central1-a/clusters/flux-cluster"
        );
    }

    #[test]
    fn test_create_request_body() {
        let body = create_request(&config());
        assert_eq!(body["cluster"]["name"], "flux-cluster");
        assert_eq!(body["cluster"]["initialNodeCount"], 4);
        assert_eq!(body["cluster"]["nodeConfig"]["machineType"], "c2-standard-8");
    }

    #[test]
    fn test_running_cluster_is_ready() {
        let state = state_of(
            cluster(json!({
                "name": "flux-cluster",
                "status": "RUNNING",
                "endpoint": "34.1.2.3",
                "masterAuth": { "clusterCaCertificate": "Q0EK" }
            })),
            &config(),
        )
        .unwrap();

        let ClusterState::Ready(endpoint) = state else {
            panic!("expected ready cluster, got {:?}", state);
        };
        assert_eq!(endpoint.server, "https://34.1.2.3");
        assert_eq!(endpoint.ca_certificate.as_deref(), Some("Q0EK"));
        assert_eq!(endpoint.project, "my-project");
    }

    #[test]
    fn test_other_states() {
        let provisioning =
            state_of(cluster(json!({"name": "c", "status": "PROVISIONING"})), &config());
        assert_eq!(provisioning.unwrap(), ClusterState::Provisioning);

        let failed = state_of(
            cluster(json!({"name": "c", "status": "ERROR", "statusMessage": "quota exceeded"})),
            &config(),
        )
        .unwrap();
        assert!(matches!(failed, ClusterState::Failed(msg) if msg.contains("quota exceeded")));

        let no_endpoint = state_of(cluster(json!({"name": "c", "status": "RUNNING"})), &config());
        assert!(no_endpoint.is_err());
    }

    #[tokio::test]
    async fn test_static_token_source() {
        let source = GoogleTokenSource::Static("abc".to_string());
        let token = source.access_token(&Client::new()).await.unwrap();
        assert_eq!(token, "abc");
    }
}
