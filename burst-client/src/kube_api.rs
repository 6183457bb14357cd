//! Kubernetes implementation of `ClusterApi`

use async_trait::async_trait;
use burst_core::domain::pod::PodRecord;
use burst_core::domain::resource::ResourceRef;
use burst_core::dto::minicluster::MiniCluster;
use k8s_openapi::api::core::v1::{Namespace, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, ListParams, LogParams, PostParams};
use kube::Client;
use tracing::{debug, info};

use crate::capability::ClusterApi;
use crate::error::{ClientError, Result};
use crate::{manifest, pods};

/// `ClusterApi` backed by a kube client
#[derive(Clone)]
pub struct KubeClusterApi {
    client: Client,
}

impl KubeClusterApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connects to whatever the local kubeconfig or in-cluster config points at
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self::new(client))
    }

    fn miniclusters(&self, namespace: &str) -> Api<MiniCluster> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn ensure_namespace(&self, namespace: &str) -> Result<()> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let object = Namespace {
            metadata: ObjectMeta {
                name: Some(namespace.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        match api.create(&PostParams::default(), &object).await {
            Ok(_) => {
                info!("Created namespace {}", namespace);
                Ok(())
            }
            Err(e) => {
                let err = ClientError::from(e);
                if err.is_conflict() {
                    debug!("Namespace {} already exists", namespace);
                    Ok(())
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn apply_manifest(&self, manifest: &str) -> Result<usize> {
        manifest::apply(&self.client, manifest).await
    }

    async fn create_minicluster(&self, minicluster: &MiniCluster) -> Result<ResourceRef> {
        let resource = minicluster.resource_ref().ok_or_else(|| {
            ClientError::InvalidManifest("MiniCluster needs a name and namespace".to_string())
        })?;

        self.miniclusters(&resource.namespace)
            .create(&PostParams::default(), minicluster)
            .await?;

        debug!("Created MiniCluster {}", resource);
        Ok(resource)
    }

    async fn get_minicluster(&self, resource: &ResourceRef) -> Result<Option<MiniCluster>> {
        Ok(self
            .miniclusters(&resource.namespace)
            .get_opt(&resource.name)
            .await?)
    }

    async fn list_pods(&self, resource: &ResourceRef) -> Result<Vec<PodRecord>> {
        let params = ListParams::default().labels(&resource.pod_selector());
        let list = self.pods(&resource.namespace).list(&params).await?;

        Ok(list
            .items
            .iter()
            .filter_map(|pod| pods::pod_record(pod, &resource.name))
            .collect())
    }

    async fn pod_logs(&self, resource: &ResourceRef, pod: &str, follow: bool) -> Result<String> {
        let params = LogParams {
            follow,
            ..Default::default()
        };
        Ok(self.pods(&resource.namespace).logs(pod, &params).await?)
    }

    async fn delete_minicluster(&self, resource: &ResourceRef) -> Result<()> {
        let result = self
            .miniclusters(&resource.namespace)
            .delete(&resource.name, &DeleteParams::background())
            .await;
        if !deleted(result)? {
            debug!("MiniCluster {} already deleted", resource);
        }
        Ok(())
    }
}

/// Outcome of a delete call, where an object that is already gone counts
/// as deleted
///
/// # Returns
/// `false` when there was nothing left to delete
fn deleted<T>(result: std::result::Result<T, kube::Error>) -> Result<bool> {
    match result {
        Ok(_) => Ok(true),
        Err(e) => {
            let err = ClientError::from(e);
            if err.is_not_found() {
                Ok(false)
            } else {
                Err(err)
            }
        }
    }
}
