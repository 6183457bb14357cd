//! Output collection
//!
//! Follows the log of every pod concurrently and assembles the results in
//! ordinal order, whatever order the streams finish in.

use burst_client::{ClientError, ClusterApi};
use burst_core::domain::pod::PodRecord;
use burst_core::domain::resource::ResourceRef;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::CollectionError;

const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Retry budget of a single pod's log fetch
#[derive(Debug, Clone)]
pub struct CollectSettings {
    pub retries: u32,
    pub backoff: Duration,
}

impl From<&Config> for CollectSettings {
    fn from(config: &Config) -> Self {
        Self {
            retries: config.log_retries,
            backoff: config.log_retry_backoff,
        }
    }
}

/// Output, or the reason there is none, of one pod
#[derive(Debug)]
pub struct PodOutput {
    pub ordinal: u32,
    pub pod: String,
    pub result: Result<String, CollectionError>,
}

/// Fetches pod logs
pub struct OutputCollector {
    api: Arc<dyn ClusterApi>,
    settings: CollectSettings,
}

impl OutputCollector {
    pub fn new(api: Arc<dyn ClusterApi>, settings: CollectSettings) -> Self {
        Self { api, settings }
    }

    /// Fetches the output of every pod concurrently
    ///
    /// # Arguments
    /// * `resource` - MiniCluster the pods belong to
    /// * `pods` - Pods to collect from; pods that never started are reported
    ///   as missing
    /// * `deadline` - Streams still open at the deadline are abandoned
    /// * `cancel` - Abandons every open stream
    ///
    /// # Returns
    /// One entry per pod, sorted by ordinal
    pub async fn collect(
        &self,
        resource: &ResourceRef,
        pods: &[PodRecord],
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Vec<PodOutput> {
        info!("Collecting output of {} pod(s)", pods.len());

        let fetches = pods.iter().map(|pod| async move {
            PodOutput {
                ordinal: pod.ordinal,
                pod: pod.name.clone(),
                result: self.fetch(resource, pod, deadline, cancel).await,
            }
        });
        let mut outputs = join_all(fetches).await;
        outputs.sort_by_key(|output| output.ordinal);

        let collected = outputs.iter().filter(|o| o.result.is_ok()).count();
        info!("Collected output of {}/{} pod(s)", collected, outputs.len());
        outputs
    }

    /// Follows one pod's log until its container exits
    async fn fetch(
        &self,
        resource: &ResourceRef,
        pod: &PodRecord,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<String, CollectionError> {
        if !pod.phase.is_started() {
            return Err(CollectionError::NotStarted {
                pod: pod.name.clone(),
            });
        }

        let mut attempt = 0;
        let mut delay = self.settings.backoff;

        loop {
            attempt += 1;

            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(CollectionError::Cancelled { pod: pod.name.clone() });
                }
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(CollectionError::Deadline { pod: pod.name.clone() });
                }
                result = self.api.pod_logs(resource, &pod.name, true) => result,
            };

            match result {
                Ok(text) => {
                    debug!("Pod {}: {} byte(s) of output", pod.name, text.len());
                    return Ok(text);
                }
                Err(e) if e.is_transient() && attempt <= self.settings.retries => {
                    warn!(
                        "Fetching logs of pod {} failed (attempt {}/{}): {}",
                        pod.name,
                        attempt,
                        self.settings.retries + 1,
                        e
                    );
                }
                Err(e) => return Err(fetch_error(pod, attempt, e)),
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(CollectionError::Cancelled { pod: pod.name.clone() });
                }
                _ = tokio::time::sleep_until((Instant::now() + delay).min(deadline)) => {}
            }

            // Exponential backoff with cap
            delay = (delay * 2).min(MAX_BACKOFF);
        }
    }
}

fn fetch_error(pod: &PodRecord, attempts: u32, source: ClientError) -> CollectionError {
    CollectionError::Fetch {
        pod: pod.name.clone(),
        attempts,
        source,
    }
}

/// Concatenates collected output in ordinal order
pub fn assemble(outputs: &[PodOutput]) -> String {
    let mut ordered: Vec<&PodOutput> = outputs.iter().collect();
    ordered.sort_by_key(|output| output.ordinal);

    ordered
        .into_iter()
        .filter_map(|output| output.result.as_ref().ok())
        .map(String::as_str)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeCluster, LogReply, pod_set};
    use burst_core::domain::pod::PodPhase;

    fn settings() -> CollectSettings {
        CollectSettings {
            retries: 3,
            backoff: Duration::from_millis(100),
        }
    }

    fn resource() -> ResourceRef {
        ResourceRef::new("flux-sample", "flux-operator")
    }

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(600)
    }

    #[tokio::test(start_paused = true)]
    async fn test_output_is_ordered_by_ordinal_not_arrival() {
        let pods = pod_set("flux-sample", &[PodPhase::Succeeded; 3]);
        // pod 1 answers first, then pod 0, then pod 2
        let cluster = FakeCluster::new()
            .with_log(&pods[0].name, "a")
            .with_log(&pods[1].name, "b")
            .with_log(&pods[2].name, "c")
            .with_log_delay(&pods[0].name, Duration::from_millis(20))
            .with_log_delay(&pods[2].name, Duration::from_millis(40));
        let collector = OutputCollector::new(Arc::new(cluster), settings());

        let outputs = collector
            .collect(&resource(), &pods, deadline(), &CancellationToken::new())
            .await;

        assert_eq!(assemble(&outputs), "abc");
        let ordinals: Vec<u32> = outputs.iter().map(|o| o.ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 2]);
    }

    #[test]
    fn test_assemble_skips_missing_pods() {
        let outputs = vec![
            PodOutput {
                ordinal: 2,
                pod: "p2".to_string(),
                result: Ok("c".to_string()),
            },
            PodOutput {
                ordinal: 0,
                pod: "p0".to_string(),
                result: Ok("a".to_string()),
            },
            PodOutput {
                ordinal: 1,
                pod: "p1".to_string(),
                result: Err(CollectionError::Deadline {
                    pod: "p1".to_string(),
                }),
            },
        ];
        assert_eq!(assemble(&outputs), "ac");
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried() {
        let pods = pod_set("flux-sample", &[PodPhase::Running]);
        let cluster = Arc::new(FakeCluster::new().with_log_replies(
            &pods[0].name,
            vec![
                LogReply::Fail(400),
                LogReply::Fail(503),
                LogReply::Text("hello\n".to_string()),
            ],
        ));
        let collector = OutputCollector::new(cluster.clone(), settings());

        let outputs = collector
            .collect(&resource(), &pods, deadline(), &CancellationToken::new())
            .await;

        assert_eq!(outputs[0].result.as_deref().unwrap(), "hello\n");
        assert_eq!(cluster.log_calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_budget_is_bounded() {
        let pods = pod_set("flux-sample", &[PodPhase::Running]);
        let cluster = Arc::new(
            FakeCluster::new().with_log_replies(&pods[0].name, vec![LogReply::Fail(503)]),
        );
        let collector = OutputCollector::new(cluster.clone(), settings());

        let outputs = collector
            .collect(&resource(), &pods, deadline(), &CancellationToken::new())
            .await;

        assert!(matches!(
            outputs[0].result,
            Err(CollectionError::Fetch { attempts: 4, .. })
        ));
        assert_eq!(cluster.log_calls.load(std::sync::atomic::Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_errors_are_not_retried() {
        let pods = pod_set("flux-sample", &[PodPhase::Running]);
        let cluster = Arc::new(
            FakeCluster::new().with_log_replies(&pods[0].name, vec![LogReply::Fail(403)]),
        );
        let collector = OutputCollector::new(cluster.clone(), settings());

        let outputs = collector
            .collect(&resource(), &pods, deadline(), &CancellationToken::new())
            .await;

        assert!(matches!(
            outputs[0].result,
            Err(CollectionError::Fetch { attempts: 1, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_abandons_open_streams() {
        let pods = pod_set("flux-sample", &[PodPhase::Running, PodPhase::Running]);
        let cluster = FakeCluster::new()
            .with_log(&pods[0].name, "done\n")
            .with_log_replies(&pods[1].name, vec![LogReply::Hang]);
        let collector = OutputCollector::new(Arc::new(cluster), settings());

        let deadline = Instant::now() + Duration::from_secs(10);
        let outputs = collector
            .collect(&resource(), &pods, deadline, &CancellationToken::new())
            .await;

        assert!(outputs[0].result.is_ok());
        assert!(matches!(
            outputs[1].result,
            Err(CollectionError::Deadline { .. })
        ));
        assert_eq!(assemble(&outputs), "done\n");
    }

    #[tokio::test]
    async fn test_pending_pods_are_not_fetched() {
        let pods = pod_set("flux-sample", &[PodPhase::Pending]);
        let cluster = Arc::new(FakeCluster::new());
        let collector = OutputCollector::new(cluster.clone(), settings());

        let outputs = collector
            .collect(&resource(), &pods, deadline(), &CancellationToken::new())
            .await;

        assert!(matches!(
            outputs[0].result,
            Err(CollectionError::NotStarted { .. })
        ));
        assert_eq!(cluster.log_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }
}
