//! Burst Core
//!
//! Core types for the Flux burst launcher.
//!
//! This crate contains:
//! - Domain types: the job description, cluster handles, pod observations
//!   and the final job outcome
//! - DTOs: the `MiniCluster` custom resource submitted to the cluster

pub mod domain;
pub mod dto;
