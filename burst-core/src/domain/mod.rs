//! Core domain types
//!
//! These types describe one launch: what to run (`JobSpec`), where to run it
//! (`ClusterHandle`), what was submitted (`ResourceRef`), what the cluster
//! reports back (`PodRecord`) and how it ended (`JobOutcome`).

pub mod cluster;
pub mod job;
pub mod outcome;
pub mod pod;
pub mod resource;
