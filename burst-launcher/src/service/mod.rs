//! Service layer
//!
//! One service per launch phase: provisioning the cluster, preparing it,
//! submitting the MiniCluster, watching its pods and collecting their
//! output. Services reach the outside world only through the capability
//! objects they are constructed with.

mod collector;
mod operator;
mod provisioner;
mod submitter;
mod watcher;

pub use collector::{CollectSettings, OutputCollector, PodOutput, assemble};
pub use operator::{DEFAULT_OPERATOR_MANIFEST, ManifestSource, OperatorInstaller};
pub use provisioner::ClusterProvisioner;
pub use submitter::ResourceSubmitter;
pub use watcher::{PodSetWatcher, WatchSettings, WatchState};
