//! Capability traits
//!
//! The launcher never reaches for a global client. Everything it needs from
//! the outside world goes through these traits, so a fake implementation can
//! stand in for a real cluster or cloud account.

use async_trait::async_trait;
use burst_core::domain::cluster::{ClusterEndpoint, ClusterHandle, ProviderConfig};
use burst_core::domain::pod::PodRecord;
use burst_core::domain::resource::ResourceRef;
use burst_core::dto::minicluster::MiniCluster;
use std::sync::Arc;

use crate::error::Result;

/// Operations the launcher needs from a Kubernetes API server
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Creates the namespace, succeeding if it already exists
    async fn ensure_namespace(&self, namespace: &str) -> Result<()>;

    /// Server-side applies every object of a multi-document YAML manifest
    ///
    /// # Returns
    /// Number of objects applied
    async fn apply_manifest(&self, manifest: &str) -> Result<usize>;

    /// Submits a MiniCluster
    ///
    /// Fails with a 409 conflict when an object with the same name exists;
    /// the caller must not retry that without a new name.
    async fn create_minicluster(&self, minicluster: &MiniCluster) -> Result<ResourceRef>;

    /// Fetches a submitted MiniCluster, `None` once it is gone
    async fn get_minicluster(&self, resource: &ResourceRef) -> Result<Option<MiniCluster>>;

    /// Lists the pods of a MiniCluster as fresh records
    async fn list_pods(&self, resource: &ResourceRef) -> Result<Vec<PodRecord>>;

    /// Reads a pod's log
    ///
    /// With `follow` set the call returns once the container exits.
    async fn pod_logs(&self, resource: &ResourceRef, pod: &str, follow: bool) -> Result<String>;

    /// Deletes a MiniCluster; deleting one that is already gone succeeds
    async fn delete_minicluster(&self, resource: &ResourceRef) -> Result<()>;
}

/// Provider-side view of a cluster being created
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterState {
    Provisioning,
    Ready(ClusterEndpoint),
    Failed(String),
}

/// Cloud provider able to create and destroy whole clusters
#[async_trait]
pub trait ClusterProvider: Send + Sync {
    /// Starts cluster creation; a 409 conflict means it already exists
    async fn create_cluster(&self, config: &ProviderConfig) -> Result<()>;

    /// Reports where cluster creation stands
    async fn cluster_state(&self, config: &ProviderConfig) -> Result<ClusterState>;

    /// Destroys a cluster; destroying one that is already gone succeeds
    async fn destroy_cluster(&self, endpoint: &ClusterEndpoint) -> Result<()>;
}

/// Opens an API connection to the cluster behind a handle
#[async_trait]
pub trait ClusterConnector: Send + Sync {
    async fn connect(&self, handle: &ClusterHandle) -> Result<Arc<dyn ClusterApi>>;
}
