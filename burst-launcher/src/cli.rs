//! Command line
//!
//! Every flag can also be given through a `FLUX_BURST_*` environment
//! variable, which is how pipeline steps usually pass them.

use burst_core::domain::cluster::{ProviderConfig, ProvisionMode};
use burst_core::domain::job::{
    DEFAULT_FLUX_LOG_LEVEL, DEFAULT_IMAGE, DEFAULT_NAME, DEFAULT_NAMESPACE, DEFAULT_OPTION_FLAGS,
    FluxOptions, JobSpec,
};
use clap::{ArgGroup, Parser};
use std::path::PathBuf;

use crate::error::LaunchError;
use crate::output;
use crate::service::{DEFAULT_OPERATOR_MANIFEST, ManifestSource};

/// Default filter; `RUST_LOG` takes precedence
const DEFAULT_LOG_FILTER: &str = "flux_burst=info,burst_client=info,kube=warn";

#[derive(Parser, Debug)]
#[command(name = "flux-burst")]
#[command(about = "Run a job on a Flux Operator MiniCluster and collect its output", long_about = None)]
#[command(group(ArgGroup::new("target").required(true).args(["local", "project"])))]
pub struct Cli {
    /// Command every MiniCluster task runs
    #[arg(long, env = "FLUX_BURST_COMMAND")]
    pub command: String,

    /// Number of nodes, one pod each
    #[arg(long, env = "FLUX_BURST_NNODES")]
    pub nnodes: u32,

    /// Number of tasks (defaults to the node count)
    #[arg(long, env = "FLUX_BURST_NTASKS")]
    pub ntasks: Option<u32>,

    /// Container image for the MiniCluster
    #[arg(long, env = "FLUX_BURST_IMAGE", default_value = DEFAULT_IMAGE)]
    pub image: String,

    /// File receiving the collected output
    #[arg(long, env = "FLUX_BURST_OUTFILE")]
    pub outfile: Option<PathBuf>,

    /// Write the outcome as JSON to this file
    #[arg(long, env = "FLUX_BURST_SUMMARY")]
    pub summary: Option<PathBuf>,

    /// Use the cluster the local kubeconfig points at (kind, minikube, ...)
    #[arg(long, env = "FLUX_BURST_LOCAL")]
    pub local: bool,

    /// Google Cloud project to create a GKE cluster in
    #[arg(long, env = "FLUX_BURST_PROJECT")]
    pub project: Option<String>,

    /// Zone of the GKE cluster
    #[arg(long, env = "FLUX_BURST_ZONE", default_value = "us-central1-a")]
    pub zone: String,

    /// Name of the GKE cluster
    #[arg(long, env = "FLUX_BURST_CLUSTER_NAME", default_value = "flux-cluster")]
    pub cluster_name: String,

    /// Machine type of the GKE nodes
    #[arg(long, env = "FLUX_BURST_MACHINE_TYPE", default_value = "c2-standard-8")]
    pub machine_type: String,

    /// Name of the MiniCluster
    #[arg(long, env = "FLUX_BURST_NAME", default_value = DEFAULT_NAME)]
    pub name: String,

    /// Namespace of the MiniCluster
    #[arg(long, env = "FLUX_BURST_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// CPU limit (and request) per container
    #[arg(long, env = "FLUX_BURST_CPU_LIMIT")]
    pub cpu_limit: Option<u32>,

    /// Memory limit (and request) per container, e.g. "4Gi"
    #[arg(long, env = "FLUX_BURST_MEMORY_LIMIT")]
    pub memory_limit: Option<String>,

    /// User flux runs as inside the container
    #[arg(long, env = "FLUX_BURST_FLUX_USER")]
    pub flux_user: Option<String>,

    /// Arguments to flux wrap, e.g. "strace,-e,network,-tt"
    #[arg(long, env = "FLUX_BURST_WRAP")]
    pub wrap: Option<String>,

    /// Flux broker log level
    #[arg(long, env = "FLUX_BURST_LOG_LEVEL", default_value_t = DEFAULT_FLUX_LOG_LEVEL)]
    pub log_level: u8,

    /// Flux option flags
    #[arg(long, env = "FLUX_BURST_FLAGS", default_value = DEFAULT_OPTION_FLAGS)]
    pub flags: String,

    /// Enable zeromq logging
    #[arg(long, env = "FLUX_BURST_ZEROMQ")]
    pub zeromq: bool,

    /// Enable quiet flux logging
    #[arg(long, env = "FLUX_BURST_FLUX_QUIET")]
    pub flux_quiet: bool,

    /// Enable strict flux logging
    #[arg(long, env = "FLUX_BURST_STRICT")]
    pub strict: bool,

    /// Flux Operator manifest: URL, file path, or "none" to skip installing
    #[arg(long, env = "FLUX_BURST_OPERATOR_YAML", default_value = DEFAULT_OPERATOR_MANIFEST)]
    pub flux_operator_yaml: String,

    /// Debug logging
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long)]
    pub quiet: bool,
}

impl Cli {
    /// Validated job description
    pub fn job_spec(&self) -> Result<JobSpec, LaunchError> {
        let job = JobSpec {
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            image: self.image.clone(),
            command: self.command.clone(),
            nodes: self.nnodes,
            tasks: self.ntasks.unwrap_or(self.nnodes),
            cpu_limit: self.cpu_limit,
            memory_limit: self.memory_limit.clone(),
            flux: FluxOptions {
                option_flags: self.flags.clone(),
                log_level: self.log_level,
                wrap: self.wrap.clone(),
                flux_user: self.flux_user.clone(),
                zeromq: self.zeromq,
                quiet: self.flux_quiet,
                strict: self.strict,
            },
            output: self.outfile.clone(),
        };

        job.validate()
            .map_err(|e| LaunchError::Config(e.to_string()))?;
        for path in [&self.outfile, &self.summary].into_iter().flatten() {
            output::check_destination(path)?;
        }
        Ok(job)
    }

    /// Borrow the kubeconfig cluster, or create one in `--project`
    pub fn provision_mode(&self) -> ProvisionMode {
        match &self.project {
            Some(project) if !self.local => ProvisionMode::Create(ProviderConfig {
                project: project.clone(),
                location: self.zone.clone(),
                cluster_name: self.cluster_name.clone(),
                machine_type: self.machine_type.clone(),
                node_count: self.nnodes,
            }),
            _ => ProvisionMode::Borrow,
        }
    }

    pub fn manifest_source(&self) -> ManifestSource {
        ManifestSource::parse(&self.flux_operator_yaml)
    }

    /// Tracing filter for the verbosity flags
    pub fn log_filter(&self) -> String {
        if self.verbose {
            "flux_burst=debug,burst_client=debug,kube=info".to_string()
        } else if self.quiet {
            "warn".to_string()
        } else {
            DEFAULT_LOG_FILTER.to_string()
        }
    }
}
