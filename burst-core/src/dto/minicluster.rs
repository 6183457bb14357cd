//! MiniCluster custom resource
//!
//! The Flux Operator turns one `MiniCluster` into an indexed set of pods that
//! bootstrap a flux instance, run the command once and exit.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::job::JobSpec;
use crate::domain::resource::ResourceRef;

/// Label marking objects created by the launcher
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Label carrying the run identifier of the launch that created the object
pub const RUN_ID_LABEL: &str = "flux-burst/run-id";

/// Broker connect timeout handed to flux
const CONNECT_TIMEOUT: &str = "5s";

#[derive(CustomResource, Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "flux-framework.org",
    version = "v1alpha1",
    kind = "MiniCluster",
    plural = "miniclusters",
    namespaced,
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct MiniClusterSpec {
    /// Number of pods (one flux broker per node)
    pub size: u32,
    /// Number of flux tasks
    pub tasks: u32,
    pub interactive: bool,
    pub containers: Vec<MiniClusterContainer>,
    pub logging: LoggingSpec,
    pub flux: FluxSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MiniClusterContainer {
    pub image: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ContainerResources>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flux_user: Option<FluxUser>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct ContainerResources {
    pub limits: BTreeMap<String, Quantity>,
    pub requests: BTreeMap<String, Quantity>,
}

/// Resource quantity, either a plain integer (`2`) or a string (`"4Gi"`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Quantity {
    Int(i64),
    Str(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FluxUser {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct LoggingSpec {
    pub zeromq: bool,
    pub quiet: bool,
    pub strict: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FluxSpec {
    pub option_flags: String,
    pub connect_timeout: String,
    pub log_level: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrap: Option<String>,
}

impl MiniClusterSpec {
    /// Maps a job description onto the custom resource spec
    ///
    /// One field per job field; the only value not taken from the job is the
    /// broker connect timeout.
    pub fn from_job(job: &JobSpec) -> Self {
        let resources = if job.cpu_limit.is_none() && job.memory_limit.is_none() {
            None
        } else {
            let mut quantities = BTreeMap::new();
            if let Some(cpu) = job.cpu_limit {
                quantities.insert("cpu".to_string(), Quantity::Int(i64::from(cpu)));
            }
            if let Some(memory) = &job.memory_limit {
                quantities.insert("memory".to_string(), Quantity::Str(memory.clone()));
            }
            Some(ContainerResources {
                limits: quantities.clone(),
                requests: quantities,
            })
        };

        let container = MiniClusterContainer {
            image: job.image.clone(),
            command: job.command.clone(),
            resources,
            flux_user: job
                .flux
                .flux_user
                .as_ref()
                .map(|name| FluxUser { name: name.clone() }),
        };

        Self {
            size: job.nodes,
            tasks: job.tasks,
            interactive: false,
            containers: vec![container],
            logging: LoggingSpec {
                zeromq: job.flux.zeromq,
                quiet: job.flux.quiet,
                strict: job.flux.strict,
            },
            flux: FluxSpec {
                option_flags: job.flux.option_flags.clone(),
                connect_timeout: CONNECT_TIMEOUT.to_string(),
                log_level: job.flux.log_level,
                wrap: job.flux.wrap.clone(),
            },
        }
    }
}

impl MiniCluster {
    /// Builds the namespaced, labelled resource for one launch
    pub fn for_job(job: &JobSpec, run_id: Uuid) -> Self {
        let mut minicluster = MiniCluster::new(&job.name, MiniClusterSpec::from_job(job));
        minicluster.metadata.namespace = Some(job.namespace.clone());
        minicluster.metadata.labels = Some(BTreeMap::from([
            (MANAGED_BY_LABEL.to_string(), "flux-burst".to_string()),
            (RUN_ID_LABEL.to_string(), run_id.to_string()),
        ]));
        minicluster
    }

    /// Reference to this resource, if it carries a name and namespace
    pub fn resource_ref(&self) -> Option<ResourceRef> {
        match (&self.metadata.name, &self.metadata.namespace) {
            (Some(name), Some(namespace)) => Some(ResourceRef::new(name, namespace)),
            _ => None,
        }
    }
}
