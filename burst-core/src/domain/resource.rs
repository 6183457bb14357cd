//! Submitted resource reference

use serde::{Deserialize, Serialize};

/// Name and namespace of the submitted MiniCluster
///
/// The cluster owns the object once it is accepted; the launcher only keeps
/// this reference for polling and deletion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub name: String,
    pub namespace: String,
}

impl ResourceRef {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// Label selector matching the pods created for this resource
    pub fn pod_selector(&self) -> String {
        format!("job-name={}", self.name)
    }
}

impl std::fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
