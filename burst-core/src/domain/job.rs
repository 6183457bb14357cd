//! Job domain types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Image used when the caller does not name one
pub const DEFAULT_IMAGE: &str = "ghcr.io/flux-framework/flux-restful-api";

/// Namespace used when the caller does not name one
pub const DEFAULT_NAMESPACE: &str = "flux-operator";

/// MiniCluster name used when the caller does not name one
pub const DEFAULT_NAME: &str = "flux-sample";

/// Flags passed to `flux submit` when the caller does not override them
pub const DEFAULT_OPTION_FLAGS: &str = "-ompi=openmpi@5 -c 1 -o cpu-affinity=per-task";

/// Flux broker log level used when the caller does not override it
pub const DEFAULT_FLUX_LOG_LEVEL: u8 = 7;

/// Immutable description of the work to run
///
/// Built once from caller input and validated before any cluster work
/// happens. Nothing downstream mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Logical job name, also the MiniCluster name
    pub name: String,
    /// Target namespace
    pub namespace: String,
    /// Container image reference
    pub image: String,
    /// Shell command run by flux
    pub command: String,
    /// Number of nodes (one pod per node)
    pub nodes: u32,
    /// Number of flux tasks
    pub tasks: u32,
    /// CPU limit (cores) applied as both limit and request
    pub cpu_limit: Option<u32>,
    /// Memory limit (Kubernetes quantity) applied as both limit and request
    pub memory_limit: Option<String>,
    /// Flux broker and logging options
    pub flux: FluxOptions,
    /// Where the aggregated output is written
    pub output: Option<PathBuf>,
}

/// Options forwarded to the flux broker inside the MiniCluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FluxOptions {
    pub option_flags: String,
    pub log_level: u8,
    /// Arguments to `flux wrap`, e.g. `strace,-e,network,-tt`
    pub wrap: Option<String>,
    /// Custom flux user inside the container
    pub flux_user: Option<String>,
    pub zeromq: bool,
    pub quiet: bool,
    pub strict: bool,
}

impl Default for FluxOptions {
    fn default() -> Self {
        Self {
            option_flags: DEFAULT_OPTION_FLAGS.to_string(),
            log_level: DEFAULT_FLUX_LOG_LEVEL,
            wrap: None,
            flux_user: None,
            zeromq: false,
            quiet: false,
            strict: false,
        }
    }
}

/// Reasons a job description is rejected before launch
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    #[error("node count must be at least 1")]
    NoNodes,

    #[error("task count must be at least 1")]
    NoTasks,

    #[error("command cannot be empty")]
    EmptyCommand,

    #[error("image cannot be empty")]
    EmptyImage,

    #[error("{field} '{value}' is not a valid DNS label")]
    InvalidName { field: &'static str, value: String },
}

impl JobSpec {
    /// Creates a job description with documented defaults
    ///
    /// Task count defaults to the node count.
    pub fn new(command: impl Into<String>, nodes: u32) -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            image: DEFAULT_IMAGE.to_string(),
            command: command.into(),
            nodes,
            tasks: nodes,
            cpu_limit: None,
            memory_limit: None,
            flux: FluxOptions::default(),
            output: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    pub fn with_tasks(mut self, tasks: u32) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    /// Validates the job description
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.nodes == 0 {
            return Err(SpecError::NoNodes);
        }
        if self.tasks == 0 {
            return Err(SpecError::NoTasks);
        }
        if self.command.trim().is_empty() {
            return Err(SpecError::EmptyCommand);
        }
        if self.image.trim().is_empty() {
            return Err(SpecError::EmptyImage);
        }
        if !is_dns_label(&self.name) {
            return Err(SpecError::InvalidName {
                field: "name",
                value: self.name.clone(),
            });
        }
        if !is_dns_label(&self.namespace) {
            return Err(SpecError::InvalidName {
                field: "namespace",
                value: self.namespace.clone(),
            });
        }
        Ok(())
    }
}

/// RFC 1123 label: lowercase alphanumerics and '-', alphanumeric at both ends
fn is_dns_label(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.is_empty() || bytes.len() > 63 {
        return false;
    }
    let valid = |b: &u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    valid(&bytes[0])
        && valid(&bytes[bytes.len() - 1])
        && bytes.iter().all(|b| valid(b) || *b == b'-')
}
