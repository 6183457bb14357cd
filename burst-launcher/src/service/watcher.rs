//! Pod set watching
//!
//! Polls the pods of a MiniCluster and folds every snapshot into a single
//! aggregate state. The state only ever moves forward.

use burst_client::ClusterApi;
use burst_core::domain::pod::{PodPhase, PodSnapshot};
use burst_core::domain::resource::ResourceRef;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::WatchError;

/// Aggregate state of a pod set, ordered by progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WatchState {
    /// No pods exist yet
    AwaitingPods,
    /// Pods exist, none has started
    Pending,
    /// Some pods started, others have not (or are not there yet)
    Mixed,
    /// Every expected pod is running or done; output can be collected
    Stable,
    /// Every expected pod succeeded, or one of them failed
    Terminated,
}

impl std::fmt::Display for WatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Classifies one snapshot against the expected pod count
pub fn classify(snapshot: &PodSnapshot, expected: usize) -> WatchState {
    if snapshot.is_empty() {
        return WatchState::AwaitingPods;
    }
    if snapshot.any_failed() {
        return WatchState::Terminated;
    }

    let complete = snapshot.len() >= expected;
    let pods = snapshot.pods();
    if complete && pods.iter().all(|p| p.phase == PodPhase::Succeeded) {
        WatchState::Terminated
    } else if complete
        && pods
            .iter()
            .all(|p| matches!(p.phase, PodPhase::Running | PodPhase::Succeeded))
    {
        WatchState::Stable
    } else if pods.iter().any(|p| p.phase.is_started()) {
        WatchState::Mixed
    } else {
        WatchState::Pending
    }
}

/// Watcher timing
#[derive(Debug, Clone)]
pub struct WatchSettings {
    pub poll_interval: Duration,
    pub startup_timeout: Duration,
    pub max_poll_failures: u32,
}

impl From<&Config> for WatchSettings {
    fn from(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval,
            startup_timeout: config.startup_timeout,
            max_poll_failures: config.max_poll_failures,
        }
    }
}

/// One phase change of one pod; `from` is `None` when the pod first shows up
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Transition {
    pod: String,
    ordinal: u32,
    from: Option<PodPhase>,
    to: PodPhase,
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.from {
            Some(from) => write!(f, "Pod {} (#{}): {} -> {}", self.pod, self.ordinal, from, self.to),
            None => write!(f, "Pod {} (#{}): {}", self.pod, self.ordinal, self.to),
        }
    }
}

/// Watches the pods of one MiniCluster
pub struct PodSetWatcher {
    api: Arc<dyn ClusterApi>,
    resource: ResourceRef,
    expected: usize,
    settings: WatchSettings,
    started: Instant,
    state: WatchState,
    history: Vec<WatchState>,
    phases: HashMap<String, PodPhase>,
    reported: HashSet<Transition>,
    failed: BTreeSet<u32>,
    consecutive_failures: u32,
    last: Option<PodSnapshot>,
}

impl PodSetWatcher {
    /// Creates a watcher; the startup clock starts now
    ///
    /// # Arguments
    /// * `api` - Cluster the pods live in
    /// * `resource` - MiniCluster whose pods are watched
    /// * `expected` - Number of pods the MiniCluster should have
    /// * `settings` - Poll interval, startup bound and failure budget
    pub fn new(
        api: Arc<dyn ClusterApi>,
        resource: ResourceRef,
        expected: usize,
        settings: WatchSettings,
    ) -> Self {
        Self {
            api,
            resource,
            expected,
            settings,
            started: Instant::now(),
            state: WatchState::AwaitingPods,
            history: vec![WatchState::AwaitingPods],
            phases: HashMap::new(),
            reported: HashSet::new(),
            failed: BTreeSet::new(),
            consecutive_failures: 0,
            last: None,
        }
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    /// Every state entered so far, in order
    pub fn history(&self) -> &[WatchState] {
        &self.history
    }

    /// Most recent successful snapshot
    pub fn last_snapshot(&self) -> Option<&PodSnapshot> {
        self.last.as_ref()
    }

    /// Ordinals of every pod ever seen `Failed`
    pub fn failed_ordinals(&self) -> &BTreeSet<u32> {
        &self.failed
    }

    /// Lists pods once and folds the result into the state
    ///
    /// # Returns
    /// The snapshot, or `None` when the listing failed within the failure
    /// budget and will be retried on the next tick
    pub async fn poll_once(&mut self) -> Result<Option<PodSnapshot>, WatchError> {
        let pods = match self.api.list_pods(&self.resource).await {
            Ok(pods) => pods,
            Err(e) => {
                self.consecutive_failures += 1;
                if self.consecutive_failures > self.settings.max_poll_failures {
                    return Err(WatchError::Api {
                        attempts: self.consecutive_failures,
                        source: e,
                    });
                }
                warn!(
                    "Failed to list pods of {} ({}/{}): {}",
                    self.resource, self.consecutive_failures, self.settings.max_poll_failures, e
                );
                self.check_startup()?;
                return Ok(None);
            }
        };
        self.consecutive_failures = 0;

        let snapshot = PodSnapshot::new(pods);
        for transition in self.record_transitions(&snapshot) {
            info!("{}", transition);
        }
        self.advance(classify(&snapshot, self.expected));
        debug!(
            "{}: {} of {} pod(s) observed, state {}",
            self.resource,
            snapshot.len(),
            self.expected,
            self.state
        );
        self.last = Some(snapshot.clone());
        self.check_startup()?;

        Ok(Some(snapshot))
    }

    /// Polls until the state reaches `target`
    ///
    /// # Arguments
    /// * `target` - State to wait for; any later state also satisfies it
    /// * `deadline` - Overall job deadline
    /// * `cancel` - Aborts the wait, including a listing still in flight
    ///
    /// # Returns
    /// The snapshot in which the target was reached
    pub async fn wait_for(
        &mut self,
        target: WatchState,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<PodSnapshot, WatchError> {
        loop {
            if cancel.is_cancelled() {
                return Err(WatchError::Cancelled);
            }

            let polled = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(WatchError::Cancelled),
                polled = self.poll_once() => polled?,
                _ = tokio::time::sleep_until(deadline) => return Err(WatchError::DeadlineExceeded),
            };
            if let Some(snapshot) = polled {
                if self.state >= target {
                    return Ok(snapshot);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(WatchError::DeadlineExceeded);
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(WatchError::Cancelled),
                _ = tokio::time::sleep_until((now + self.settings.poll_interval).min(deadline)) => {}
            }
        }
    }

    fn advance(&mut self, observed: WatchState) {
        if observed > self.state {
            info!("{}: {} -> {}", self.resource, self.state, observed);
            self.state = observed;
            self.history.push(observed);
        }
    }

    /// Tracks pod phases and returns the transitions not reported before
    fn record_transitions(&mut self, snapshot: &PodSnapshot) -> Vec<Transition> {
        let mut fresh = Vec::new();
        for pod in snapshot.pods() {
            if pod.phase == PodPhase::Failed {
                self.failed.insert(pod.ordinal);
            }

            let previous = self.phases.insert(pod.name.clone(), pod.phase);
            if previous == Some(pod.phase) {
                continue;
            }

            let transition = Transition {
                pod: pod.name.clone(),
                ordinal: pod.ordinal,
                from: previous,
                to: pod.phase,
            };
            if self.reported.insert(transition.clone()) {
                fresh.push(transition);
            }
        }
        fresh
    }

    /// Fails the watch once the startup bound passed without a stable pod set
    fn check_startup(&self) -> Result<(), WatchError> {
        if self.state >= WatchState::Stable {
            return Ok(());
        }

        let waited = self.started.elapsed();
        if waited < self.settings.startup_timeout {
            return Ok(());
        }

        let observed = self.last.as_ref().map(PodSnapshot::len).unwrap_or(0);
        if observed == 0 {
            Err(WatchError::StartupTimeout(waited))
        } else if observed < self.expected {
            Err(WatchError::IncompletePodSet {
                expected: self.expected,
                observed,
                waited,
            })
        } else {
            // every pod exists but some are still pulling images; the job
            // deadline bounds this
            Ok(())
        }
    }
}
