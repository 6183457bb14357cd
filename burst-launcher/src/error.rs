//! Error types of the launch phases
//!
//! Each phase has its own error; `LaunchError` is what aborts a launch
//! before a `JobOutcome` exists. Watch and collection errors never abort,
//! they degrade the outcome instead.

use burst_client::ClientError;
use burst_core::domain::job::SpecError;
use burst_core::domain::outcome::JobStatus;
use burst_core::domain::resource::ResourceRef;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Acquiring a cluster failed
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("Cluster creation requested but no cluster provider is configured")]
    NoProvider,

    #[error("Failed to create cluster {name}: {source}")]
    Create {
        name: String,
        #[source]
        source: ClientError,
    },

    #[error("Cluster {name} failed: {reason}")]
    NotReady { name: String, reason: String },

    #[error("Cluster {name} not ready after {waited:?}")]
    Timeout { name: String, waited: Duration },

    #[error("Failed to connect to the cluster: {0}")]
    Connect(#[source] ClientError),

    #[error("Provisioning cancelled")]
    Cancelled,
}

/// Creating the MiniCluster failed
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("Invalid job: {0}")]
    InvalidSpec(#[from] SpecError),

    #[error("MiniCluster {0} already exists; choose another --name or delete it first")]
    Duplicate(ResourceRef),

    #[error("MiniCluster {resource} was rejected: {source}")]
    Rejected {
        resource: ResourceRef,
        #[source]
        source: ClientError,
    },
}

/// Watching the pod set ended before it terminated
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("No pods appeared within {0:?}")]
    StartupTimeout(Duration),

    #[error("Only {observed} of {expected} pods appeared within {waited:?}")]
    IncompletePodSet {
        expected: usize,
        observed: usize,
        waited: Duration,
    },

    #[error("Job did not finish before its deadline")]
    DeadlineExceeded,

    #[error("Watch cancelled")]
    Cancelled,

    #[error("Listing pods failed {attempts} times in a row: {source}")]
    Api {
        attempts: u32,
        #[source]
        source: ClientError,
    },
}

impl WatchError {
    /// Job status this error leaves the launch in
    pub fn status(&self) -> JobStatus {
        match self {
            WatchError::StartupTimeout(_)
            | WatchError::IncompletePodSet { .. }
            | WatchError::DeadlineExceeded => JobStatus::TimedOut,
            WatchError::Cancelled => JobStatus::Cancelled,
            WatchError::Api { .. } => JobStatus::Failed,
        }
    }
}

/// Output of one pod could not be retrieved
#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("Pod {pod} never started")]
    NotStarted { pod: String },

    #[error("Fetching logs of pod {pod} failed after {attempts} attempt(s): {source}")]
    Fetch {
        pod: String,
        attempts: u32,
        #[source]
        source: ClientError,
    },

    #[error("Logs of pod {pod} not retrievable before the deadline")]
    Deadline { pod: String },

    #[error("Collection of pod {pod} cancelled")]
    Cancelled { pod: String },

    #[error("Pod {pod} failed")]
    PodFailed { pod: String },

    #[error("No pod contributed any output")]
    Empty,
}

/// Errors that abort a launch
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Invalid invocation: {0}")]
    Config(String),

    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error("Failed to write {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LaunchError {
    /// Process exit status for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            LaunchError::Config(_) => 2,
            LaunchError::Provision(ProvisionError::Cancelled) => 130,
            LaunchError::Provision(_) => 3,
            LaunchError::Submission(SubmissionError::InvalidSpec(_)) => 2,
            LaunchError::Submission(_) => 4,
            LaunchError::Output { .. } => 6,
        }
    }
}
