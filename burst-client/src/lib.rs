//! Burst Client
//!
//! Capabilities the launcher consumes from the outside world, and their
//! production implementations.
//!
//! - `ClusterApi`: the Kubernetes operations needed for one MiniCluster run
//!   (implemented by `KubeClusterApi` on top of kube-rs)
//! - `ClusterProvider`: cloud cluster creation and teardown (implemented by
//!   `GkeProvider` against the GKE REST API)
//! - `ClusterConnector`: opens a `ClusterApi` for a `ClusterHandle`
//!   (implemented by `KubeConnector`)
//!
//! # Example
//!
//! ```no_run
//! use burst_client::{ClusterApi, KubeClusterApi};
//! use burst_core::domain::resource::ResourceRef;
//!
//! #[tokio::main]
//! async fn main() -> burst_client::Result<()> {
//!     let api = KubeClusterApi::try_default().await?;
//!     let pods = api
//!         .list_pods(&ResourceRef::new("flux-sample", "flux-operator"))
//!         .await?;
//!     println!("{} pod(s)", pods.len());
//!     Ok(())
//! }
//! ```

mod capability;
mod connector;
pub mod error;
mod gke;
mod kube_api;
mod manifest;
mod pods;

// Re-export commonly used types
pub use capability::{ClusterApi, ClusterConnector, ClusterProvider, ClusterState};
pub use connector::{KubeConnector, render_kubeconfig};
pub use error::{ClientError, Result};
pub use gke::{GkeProvider, GoogleTokenSource};
pub use kube_api::KubeClusterApi;
pub use manifest::parse_documents;
pub use pods::pod_record;
