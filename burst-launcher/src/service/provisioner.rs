//! Cluster provisioning
//!
//! Acquires the cluster a launch runs on and releases it afterwards.
//! Borrowed clusters are used as they are; created clusters are waited on
//! until ready and destroyed on release.

use burst_client::{ClientError, ClusterProvider, ClusterState};
use burst_core::domain::cluster::{ClusterEndpoint, ClusterHandle, ProviderConfig, ProvisionMode};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::ProvisionError;

const DESTROY_INITIAL_DELAY_MS: u64 = 2_000;
const DESTROY_MAX_DELAY_MS: u64 = 60_000;

/// Acquires and releases clusters
pub struct ClusterProvisioner {
    provider: Option<Arc<dyn ClusterProvider>>,
    timeout: Duration,
    poll_interval: Duration,
    destroy_retries: u32,
}

impl ClusterProvisioner {
    /// Creates a provisioner
    ///
    /// # Arguments
    /// * `provider` - Cloud provider, required only for `ProvisionMode::Create`
    /// * `config` - Supplies the readiness timeout and the destroy retry budget
    pub fn new(provider: Option<Arc<dyn ClusterProvider>>, config: &Config) -> Self {
        Self {
            provider,
            timeout: config.provision_timeout,
            poll_interval: config.provision_poll_interval,
            destroy_retries: config.destroy_retries.max(1),
        }
    }

    /// Returns a handle to a ready cluster
    ///
    /// A cluster that already exists under the requested name is adopted as
    /// borrowed and left running afterwards. If a cluster this call created
    /// never becomes ready, it is destroyed before the error is returned.
    /// Every provider call is raced against the provisioning deadline and
    /// `cancel`, so a request that never answers cannot stall the launch.
    pub async fn acquire(
        &self,
        mode: &ProvisionMode,
        cancel: &CancellationToken,
    ) -> Result<ClusterHandle, ProvisionError> {
        let config = match mode {
            ProvisionMode::Borrow => {
                info!("Using existing cluster from kubeconfig");
                return Ok(ClusterHandle::Borrowed(None));
            }
            ProvisionMode::Create(config) => config,
        };
        let provider = self.provider.as_ref().ok_or(ProvisionError::NoProvider)?;

        let started = Instant::now();
        let deadline = started + self.timeout;

        let created = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ProvisionError::Cancelled),
            result = provider.create_cluster(config) => Ok(result),
            _ = tokio::time::sleep_until(deadline) => Err(timed_out(config, started)),
        };

        let readiness = match created {
            Ok(Ok(())) => {
                self.wait_ready(provider.as_ref(), config, deadline, started, cancel)
                    .await
            }
            Ok(Err(e)) if e.is_conflict() => {
                info!(
                    "Cluster {} already exists, using it without taking ownership",
                    config.cluster_name
                );
                let endpoint = self
                    .wait_ready(provider.as_ref(), config, deadline, started, cancel)
                    .await?;
                return Ok(ClusterHandle::Borrowed(Some(endpoint)));
            }
            Ok(Err(e)) => {
                return Err(ProvisionError::Create {
                    name: config.cluster_name.clone(),
                    source: e,
                });
            }
            // the create request may still have gone through
            Err(e) => Err(e),
        };

        match readiness {
            Ok(endpoint) => {
                info!("Cluster {} is ready at {}", endpoint.name, endpoint.server);
                Ok(ClusterHandle::Owned(endpoint))
            }
            Err(e) => {
                warn!(
                    "Cluster {} did not become ready, destroying it: {}",
                    config.cluster_name, e
                );
                if let Err(destroy_error) = self
                    .destroy_with_retry(provider.as_ref(), &config.unresolved_endpoint())
                    .await
                {
                    error!(
                        "Cluster {} was left behind after failed provisioning; delete it manually: {}",
                        config.cluster_name, destroy_error
                    );
                }
                Err(e)
            }
        }
    }

    /// Releases a cluster: owned clusters are destroyed, borrowed ones kept
    ///
    /// Never fails; a cluster that could not be destroyed is reported at
    /// error level so it can be cleaned up by hand.
    pub async fn release(&self, handle: ClusterHandle) {
        match handle {
            ClusterHandle::Owned(endpoint) => match &self.provider {
                Some(provider) => {
                    if let Err(e) = self.destroy_with_retry(provider.as_ref(), &endpoint).await {
                        error!(
                            "Cluster {} was not destroyed; delete it manually: {}",
                            endpoint.name, e
                        );
                    }
                }
                None => error!(
                    "No provider to destroy cluster {}; delete it manually",
                    endpoint.name
                ),
            },
            ClusterHandle::Borrowed(_) => debug!("Leaving borrowed cluster in place"),
        }
    }

    /// Polls the provider until the cluster is ready, failed, or out of time
    async fn wait_ready(
        &self,
        provider: &dyn ClusterProvider,
        config: &ProviderConfig,
        deadline: Instant,
        started: Instant,
        cancel: &CancellationToken,
    ) -> Result<ClusterEndpoint, ProvisionError> {
        loop {
            let state = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ProvisionError::Cancelled),
                state = provider.cluster_state(config) => state,
                _ = tokio::time::sleep_until(deadline) => return Err(timed_out(config, started)),
            };

            match state {
                Ok(ClusterState::Ready(endpoint)) => return Ok(endpoint),
                Ok(ClusterState::Failed(reason)) => {
                    return Err(ProvisionError::NotReady {
                        name: config.cluster_name.clone(),
                        reason,
                    });
                }
                Ok(ClusterState::Provisioning) => {
                    debug!("Cluster {} still provisioning", config.cluster_name);
                }
                Err(e) if e.is_transient() => {
                    warn!("Failed to query cluster {}: {}", config.cluster_name, e);
                }
                Err(e) => {
                    return Err(ProvisionError::Create {
                        name: config.cluster_name.clone(),
                        source: e,
                    });
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(timed_out(config, started));
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(ProvisionError::Cancelled),
                _ = tokio::time::sleep_until((now + self.poll_interval).min(deadline)) => {}
            }
        }
    }

    /// Destroys a cluster with exponential backoff
    ///
    /// # Returns
    /// The last error once the retry budget is spent
    async fn destroy_with_retry(
        &self,
        provider: &dyn ClusterProvider,
        endpoint: &ClusterEndpoint,
    ) -> Result<(), ClientError> {
        let mut attempt = 0;
        let mut delay_ms = DESTROY_INITIAL_DELAY_MS;

        loop {
            attempt += 1;

            match provider.destroy_cluster(endpoint).await {
                Ok(()) => {
                    info!("Destroyed cluster {}", endpoint.name);
                    return Ok(());
                }
                Err(e) => {
                    if attempt >= self.destroy_retries {
                        return Err(e);
                    }

                    warn!(
                        "Failed to destroy cluster {} (attempt {}/{}): {}",
                        endpoint.name, attempt, self.destroy_retries, e
                    );
                    warn!("Retrying in {} ms...", delay_ms);

                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;

                    // Exponential backoff with cap
                    delay_ms = (delay_ms * 2).min(DESTROY_MAX_DELAY_MS);
                }
            }
        }
    }
}

fn timed_out(config: &ProviderConfig, started: Instant) -> ProvisionError {
    ProvisionError::Timeout {
        name: config.cluster_name.clone(),
        waited: started.elapsed(),
    }
}
