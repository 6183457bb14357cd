//! Data Transfer Objects sent to the Kubernetes API
//!
//! The launcher talks to the cluster through a single custom resource, the
//! Flux Operator `MiniCluster`.

pub mod minicluster;
