//! MiniCluster submission
//!
//! Turns a `JobSpec` into a MiniCluster object and creates it. The returned
//! `ResourceLease` owns the obligation to delete it again.

use burst_client::{ClientError, ClusterApi};
use burst_core::domain::job::JobSpec;
use burst_core::domain::resource::ResourceRef;
use burst_core::dto::minicluster::MiniCluster;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::SubmissionError;

/// Creates and deletes MiniClusters
pub struct ResourceSubmitter {
    api: Arc<dyn ClusterApi>,
}

impl ResourceSubmitter {
    pub fn new(api: Arc<dyn ClusterApi>) -> Self {
        Self { api }
    }

    /// Validates the job and submits it as a MiniCluster
    ///
    /// # Arguments
    /// * `job` - What to run
    /// * `run_id` - Identifies this launch in the object's labels
    ///
    /// # Returns
    /// A lease on the created MiniCluster
    pub async fn submit(
        &self,
        job: &JobSpec,
        run_id: Uuid,
    ) -> Result<ResourceLease, SubmissionError> {
        job.validate()?;

        let minicluster = MiniCluster::for_job(job, run_id);
        let target = ResourceRef::new(&job.name, &job.namespace);
        debug!(
            "Submitting MiniCluster {} (size {}, tasks {})",
            target, minicluster.spec.size, minicluster.spec.tasks
        );

        let resource = match self.api.create_minicluster(&minicluster).await {
            Ok(resource) => resource,
            Err(e) if e.is_conflict() => return Err(SubmissionError::Duplicate(target)),
            Err(e) => {
                return Err(SubmissionError::Rejected {
                    resource: target,
                    source: e,
                });
            }
        };

        info!(
            "Submitted MiniCluster {} with {} node(s) running: {}",
            resource, job.nodes, job.command
        );
        Ok(ResourceLease::new(self.api.clone(), resource))
    }
}

/// A submitted MiniCluster that still has to be deleted
///
/// `release` performs the deletion. A lease dropped without being released
/// (an early return, a panic unwinding through the controller) spawns the
/// deletion in the background instead, so the object is never leaked
/// silently.
pub struct ResourceLease {
    api: Arc<dyn ClusterApi>,
    resource: ResourceRef,
    released: bool,
}

impl ResourceLease {
    fn new(api: Arc<dyn ClusterApi>, resource: ResourceRef) -> Self {
        Self {
            api,
            resource,
            released: false,
        }
    }

    pub fn resource(&self) -> &ResourceRef {
        &self.resource
    }

    /// Deletes the MiniCluster
    pub async fn release(mut self) -> Result<(), ClientError> {
        self.released = true;
        self.api.delete_minicluster(&self.resource).await?;
        info!("Deleted MiniCluster {}", self.resource);
        Ok(())
    }
}

impl Drop for ResourceLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        warn!(
            "MiniCluster {} was not released, deleting it in the background",
            self.resource
        );
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(
                "No runtime to delete MiniCluster {}; delete it manually",
                self.resource
            );
            return;
        };

        let api = self.api.clone();
        let resource = self.resource.clone();
        handle.spawn(async move {
            if let Err(e) = api.delete_minicluster(&resource).await {
                warn!("Failed to delete MiniCluster {}: {}", resource, e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCluster;
    use burst_core::domain::job::SpecError;

    fn job() -> JobSpec {
        JobSpec::new("echo hello", 4)
    }

    #[tokio::test]
    async fn test_submit_then_get_matches_counts() {
        let cluster = Arc::new(FakeCluster::new());
        let submitter = ResourceSubmitter::new(cluster.clone());

        let lease = submitter
            .submit(&job().with_tasks(8), Uuid::new_v4())
            .await
            .unwrap();
        let stored = cluster
            .get_minicluster(lease.resource())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(stored.spec.size, 4);
        assert_eq!(stored.spec.tasks, 8);
        lease.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_job_is_not_submitted() {
        let cluster = Arc::new(FakeCluster::new());
        let submitter = ResourceSubmitter::new(cluster.clone());

        let result = submitter
            .submit(&JobSpec::new("echo hello", 0), Uuid::new_v4())
            .await;

        assert!(matches!(
            result,
            Err(SubmissionError::InvalidSpec(SpecError::NoNodes))
        ));
        assert_eq!(cluster.creates(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_name_is_rejected() {
        let cluster = Arc::new(FakeCluster::new());
        let submitter = ResourceSubmitter::new(cluster.clone());

        let first = submitter.submit(&job(), Uuid::new_v4()).await.unwrap();
        let second = submitter.submit(&job(), Uuid::new_v4()).await;

        assert!(matches!(second, Err(SubmissionError::Duplicate(_))));
        first.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_submission() {
        let cluster = Arc::new(FakeCluster::new().rejecting_create(422));
        let submitter = ResourceSubmitter::new(cluster);

        let result = submitter.submit(&job(), Uuid::new_v4()).await;
        assert!(matches!(result, Err(SubmissionError::Rejected { .. })));
    }

    #[tokio::test]
    async fn test_double_delete_is_harmless() {
        let cluster = Arc::new(FakeCluster::new());
        let submitter = ResourceSubmitter::new(cluster.clone());

        let lease = submitter.submit(&job(), Uuid::new_v4()).await.unwrap();
        let resource = lease.resource().clone();
        lease.release().await.unwrap();
        cluster.delete_minicluster(&resource).await.unwrap();

        assert_eq!(cluster.deletes(), 2);
        assert!(cluster.stored(&resource).is_none());
    }

    #[tokio::test]
    async fn test_dropped_lease_deletes_in_background() {
        let cluster = Arc::new(FakeCluster::new());
        let submitter = ResourceSubmitter::new(cluster.clone());

        let lease = submitter.submit(&job(), Uuid::new_v4()).await.unwrap();
        let resource = lease.resource().clone();
        drop(lease);

        for _ in 0..10 {
            if cluster.deletes() > 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(cluster.deletes(), 1);
        assert!(cluster.stored(&resource).is_none());
    }
}
