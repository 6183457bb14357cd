//! Launch lifecycle
//!
//! Runs one job from cluster acquisition to output: acquire, prepare,
//! submit, watch, collect, clean up, write. Cleanup wraps the sequence:
//! once a MiniCluster exists it is deleted, and once a cluster is acquired
//! it is released, whichever way the steps in between end.

use burst_client::{ClusterApi, ClusterConnector};
use burst_core::domain::cluster::{ClusterHandle, ProvisionMode};
use burst_core::domain::job::JobSpec;
use burst_core::domain::outcome::{JobOutcome, JobStatus, PodExit};
use burst_core::domain::pod::{PodRecord, PodSnapshot};
use burst_core::domain::resource::ResourceRef;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{CollectionError, LaunchError, ProvisionError, WatchError};
use crate::output;
use crate::service::{
    ClusterProvisioner, CollectSettings, ManifestSource, OperatorInstaller, OutputCollector,
    PodOutput, PodSetWatcher, ResourceSubmitter, WatchSettings, WatchState, assemble,
};

/// Drives a job through its lifecycle
pub struct LifecycleController {
    provisioner: ClusterProvisioner,
    connector: Arc<dyn ClusterConnector>,
    manifest: ManifestSource,
    http: reqwest::Client,
    config: Config,
}

impl LifecycleController {
    /// Creates a controller
    ///
    /// # Arguments
    /// * `provisioner` - Acquires and releases the cluster
    /// * `connector` - Opens the API of the acquired cluster
    /// * `manifest` - Where the Flux Operator manifest comes from
    /// * `http` - Client for manifest downloads
    /// * `config` - Timing and retry settings
    pub fn new(
        provisioner: ClusterProvisioner,
        connector: Arc<dyn ClusterConnector>,
        manifest: ManifestSource,
        http: reqwest::Client,
        config: Config,
    ) -> Self {
        Self {
            provisioner,
            connector,
            manifest,
            http,
            config,
        }
    }

    /// Runs the job and writes its output
    ///
    /// # Returns
    /// The outcome once every resource of the launch has been cleaned up.
    /// Errors are reserved for launches that never got a job running
    /// (provisioning, submission) or whose output could not be written.
    pub async fn run(
        &self,
        job: &JobSpec,
        mode: &ProvisionMode,
        run_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<JobOutcome, LaunchError> {
        let handle = self.provisioner.acquire(mode, cancel).await?;
        info!("Acquired {}", handle);

        let result = self.run_on_cluster(job, run_id, &handle, cancel).await;
        self.provisioner.release(handle).await;
        let outcome = result?;

        if let Some(path) = &job.output {
            output::write_output(path, &outcome)?;
            info!(
                "Wrote {} byte(s) of output to {}",
                outcome.output.len(),
                path.display()
            );
        }

        Ok(outcome)
    }

    /// Everything between acquiring and releasing the cluster
    async fn run_on_cluster(
        &self,
        job: &JobSpec,
        run_id: Uuid,
        handle: &ClusterHandle,
        cancel: &CancellationToken,
    ) -> Result<JobOutcome, LaunchError> {
        let api = self
            .connector
            .connect(handle)
            .await
            .map_err(ProvisionError::Connect)?;

        OperatorInstaller::new(api.clone(), self.manifest.clone(), self.http.clone())
            .prepare(&job.namespace, cancel)
            .await;
        if cancel.is_cancelled() {
            info!("Cancelled before submission");
            return Ok(JobOutcome::without_output(
                JobStatus::Cancelled,
                "cancelled before submission",
            ));
        }

        let lease = ResourceSubmitter::new(api.clone())
            .submit(job, run_id)
            .await?;

        let outcome = self.supervise(api, job, lease.resource(), cancel).await;

        if let Err(e) = lease.release().await {
            warn!("Failed to delete MiniCluster, it may need manual cleanup: {}", e);
        }

        Ok(outcome)
    }

    /// Watches the pod set and collects output; never fails
    async fn supervise(
        &self,
        api: Arc<dyn ClusterApi>,
        job: &JobSpec,
        resource: &ResourceRef,
        cancel: &CancellationToken,
    ) -> JobOutcome {
        let deadline = Instant::now() + self.config.job_timeout;
        let expected = job.nodes as usize;
        let mut watcher = PodSetWatcher::new(
            api.clone(),
            resource.clone(),
            expected,
            WatchSettings::from(&self.config),
        );

        let stable = match watcher.wait_for(WatchState::Stable, deadline, cancel).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("{} did not start: {}", resource, e);
                return uncollected_outcome(job.nodes, watcher.last_snapshot(), e);
            }
        };
        info!("{} is {}", resource, watcher.state());

        let eligible: Vec<PodRecord> = stable
            .pods()
            .iter()
            .filter(|pod| pod.phase.is_started())
            .cloned()
            .collect();
        let collector = OutputCollector::new(api, CollectSettings::from(&self.config));

        // Log streams end when their containers exit; after the watch has
        // ended they get a bounded grace period, then they are cut off.
        let drain = cancel.child_token();
        let collected = CancellationToken::new();
        let grace = self.config.collect_grace;
        let (outputs, terminal) = tokio::join!(
            async {
                let outputs = collector.collect(resource, &eligible, deadline, &drain).await;
                collected.cancel();
                outputs
            },
            async {
                let terminal = watcher
                    .wait_for(WatchState::Terminated, deadline, cancel)
                    .await;
                tokio::select! {
                    _ = collected.cancelled() => {}
                    _ = tokio::time::sleep(grace) => {
                        debug!("Log streams still open {:?} after the watch ended", grace);
                        drain.cancel();
                    }
                }
                terminal
            },
        );

        debug!("{} went through {:?}", resource, watcher.history());
        let last = watcher.last_snapshot().unwrap_or(&stable);
        build_outcome(
            job.nodes,
            last,
            &outputs,
            watcher.failed_ordinals(),
            terminal.err(),
        )
    }
}

/// Outcome of a launch whose pods never became stable
fn uncollected_outcome(nodes: u32, last: Option<&PodSnapshot>, error: WatchError) -> JobOutcome {
    let pods = (0..nodes)
        .map(|ordinal| {
            let record = last.and_then(|snapshot| snapshot.get(ordinal));
            PodExit {
                ordinal,
                pod: record.map(|r| r.name.clone()),
                phase: record.map(|r| r.phase),
                collected: false,
                error: Some("not collected".to_string()),
            }
        })
        .collect();

    JobOutcome {
        status: error.status(),
        output: String::new(),
        pods,
        partial: nodes > 0,
        reason: Some(error.to_string()),
    }
}

/// Folds watch and collection results into the outcome
///
/// Output of failed pods is left out of the assembled text.
fn build_outcome(
    nodes: u32,
    last: &PodSnapshot,
    outputs: &[PodOutput],
    failed: &BTreeSet<u32>,
    watch_error: Option<WatchError>,
) -> JobOutcome {
    let mut kept: Vec<PodOutput> = Vec::new();
    let mut pods = Vec::with_capacity(nodes as usize);

    for ordinal in 0..nodes {
        let record = last.get(ordinal);
        let output = outputs.iter().find(|o| o.ordinal == ordinal);
        let name = record
            .map(|r| r.name.clone())
            .or_else(|| output.map(|o| o.pod.clone()));

        let error = if failed.contains(&ordinal) {
            Some(
                CollectionError::PodFailed {
                    pod: name.clone().unwrap_or_default(),
                }
                .to_string(),
            )
        } else {
            match output.map(|o| &o.result) {
                Some(Ok(text)) => {
                    kept.push(PodOutput {
                        ordinal,
                        pod: name.clone().unwrap_or_default(),
                        result: Ok(text.clone()),
                    });
                    None
                }
                Some(Err(e)) => Some(e.to_string()),
                None => Some("never became retrievable".to_string()),
            }
        };

        pods.push(PodExit {
            ordinal,
            pod: name,
            phase: record.map(|r| r.phase),
            collected: error.is_none(),
            error,
        });
    }

    let partial = pods.iter().any(|p| !p.collected);
    let (status, reason) = if !failed.is_empty() {
        let ordinals: Vec<String> = failed.iter().map(u32::to_string).collect();
        (
            JobStatus::Failed,
            Some(format!("pod(s) {} failed", ordinals.join(", "))),
        )
    } else if let Some(error) = watch_error {
        (error.status(), Some(error.to_string()))
    } else if kept.is_empty() && nodes > 0 {
        (JobStatus::Completed, Some(CollectionError::Empty.to_string()))
    } else if partial {
        let missing: Vec<String> = pods
            .iter()
            .filter(|p| !p.collected)
            .map(|p| p.ordinal.to_string())
            .collect();
        (
            JobStatus::Completed,
            Some(format!("output missing for pod(s) {}", missing.join(", "))),
        )
    } else {
        (JobStatus::Completed, None)
    };

    JobOutcome {
        status,
        output: assemble(&kept),
        pods,
        partial,
        reason,
    }
}
