//! Lifecycle layer
//!
//! Sequences the services into one launch and owns its cleanup.

pub mod controller;

pub use controller::LifecycleController;
