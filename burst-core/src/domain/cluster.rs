//! Cluster domain types

use serde::{Deserialize, Serialize};

/// How the launcher gets a cluster to run on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionMode {
    /// Use a cluster that already exists (local kind/minikube, or one reachable via kubeconfig)
    Borrow,
    /// Create a cluster through the provider and destroy it afterwards
    Create(ProviderConfig),
}

/// Parameters for creating a cluster through a cloud provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Cloud project that owns the cluster
    pub project: String,
    /// Zone or region the cluster lives in
    pub location: String,
    /// Cluster name
    pub cluster_name: String,
    /// Machine type for the node pool
    pub machine_type: String,
    /// Number of nodes in the default pool
    pub node_count: u32,
}

impl ProviderConfig {
    /// Endpoint naming this cluster before its API server address is known
    ///
    /// Enough to destroy a cluster whose creation never completed.
    pub fn unresolved_endpoint(&self) -> ClusterEndpoint {
        ClusterEndpoint {
            name: self.cluster_name.clone(),
            location: self.location.clone(),
            project: self.project.clone(),
            server: String::new(),
            ca_certificate: None,
        }
    }
}

/// Connection details for a cluster API server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterEndpoint {
    /// Cluster name as known to the provider
    pub name: String,
    /// Zone or region, used again to destroy the cluster
    pub location: String,
    /// Project the cluster belongs to
    pub project: String,
    /// API server address, e.g. `https://34.1.2.3`
    pub server: String,
    /// Base64 encoded cluster CA certificate
    pub ca_certificate: Option<String>,
}

/// Reference to the cluster a launch runs on
///
/// Ownership decides teardown: an `Owned` cluster was created by this launch
/// and must be destroyed by it, a `Borrowed` one must be left alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterHandle {
    Owned(ClusterEndpoint),
    /// `None` means "whatever the local kubeconfig points at"
    Borrowed(Option<ClusterEndpoint>),
}

impl ClusterHandle {
    pub fn is_owned(&self) -> bool {
        matches!(self, ClusterHandle::Owned(_))
    }

    pub fn endpoint(&self) -> Option<&ClusterEndpoint> {
        match self {
            ClusterHandle::Owned(endpoint) => Some(endpoint),
            ClusterHandle::Borrowed(endpoint) => endpoint.as_ref(),
        }
    }
}

impl std::fmt::Display for ClusterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusterHandle::Owned(endpoint) => write!(f, "owned cluster {}", endpoint.name),
            ClusterHandle::Borrowed(Some(endpoint)) => {
                write!(f, "borrowed cluster {}", endpoint.name)
            }
            ClusterHandle::Borrowed(None) => write!(f, "borrowed cluster (kubeconfig)"),
        }
    }
}
