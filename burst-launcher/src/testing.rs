//! In-memory stand-ins for the cluster capabilities

use async_trait::async_trait;
use burst_client::{ClientError, ClusterApi, ClusterConnector, ClusterProvider, ClusterState, Result};
use burst_core::domain::cluster::{ClusterEndpoint, ClusterHandle, ProviderConfig};
use burst_core::domain::pod::{PodPhase, PodRecord};
use burst_core::domain::resource::ResourceRef;
use burst_core::dto::minicluster::MiniCluster;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Pods named the way the operator names them: `<name>-<ordinal>-<suffix>`
pub fn pod_set(name: &str, phases: &[PodPhase]) -> Vec<PodRecord> {
    phases
        .iter()
        .enumerate()
        .map(|(i, phase)| PodRecord::new(format!("{}-{}-x7k2p", name, i), i as u32, *phase))
        .collect()
}

/// Pop the next scripted reply, repeating the last one forever
fn next_reply<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

#[derive(Debug, Clone)]
pub enum LogReply {
    Text(String),
    Fail(u16),
    /// The stream never ends
    Hang,
}

/// Fake Kubernetes API server holding MiniClusters and scripted pods
#[derive(Default)]
pub struct FakeCluster {
    pods: Mutex<VecDeque<std::result::Result<Vec<PodRecord>, u16>>>,
    logs: Mutex<HashMap<String, VecDeque<LogReply>>>,
    log_delays: Mutex<HashMap<String, Duration>>,
    list_delay: Mutex<Option<Duration>>,
    miniclusters: Mutex<HashMap<ResourceRef, MiniCluster>>,
    reject_create: Mutex<Option<u16>>,
    fail_manifest: Mutex<bool>,
    pub namespaces: Mutex<Vec<String>>,
    pub manifests: Mutex<Vec<String>>,
    pub create_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    pub log_calls: AtomicUsize,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each `list_pods` call returns the next set; the last one repeats
    pub fn with_pod_script(self, script: Vec<Vec<PodRecord>>) -> Self {
        self.pods.lock().unwrap().extend(script.into_iter().map(Ok));
        self
    }

    /// Queues a failed pod listing with the given status
    pub fn with_list_failure(self, status: u16) -> Self {
        self.pods.lock().unwrap().push_back(Err(status));
        self
    }

    /// Queues a successful pod listing
    pub fn with_pods(self, pods: Vec<PodRecord>) -> Self {
        self.pods.lock().unwrap().push_back(Ok(pods));
        self
    }

    /// Every `list_pods` call takes this long to answer
    pub fn with_list_delay(self, delay: Duration) -> Self {
        *self.list_delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn with_log(self, pod: &str, text: &str) -> Self {
        self.with_log_replies(pod, vec![LogReply::Text(text.to_string())])
    }

    pub fn with_log_replies(self, pod: &str, replies: Vec<LogReply>) -> Self {
        self.logs
            .lock()
            .unwrap()
            .insert(pod.to_string(), replies.into_iter().collect());
        self
    }

    pub fn with_log_delay(self, pod: &str, delay: Duration) -> Self {
        self.log_delays.lock().unwrap().insert(pod.to_string(), delay);
        self
    }

    pub fn rejecting_create(self, status: u16) -> Self {
        *self.reject_create.lock().unwrap() = Some(status);
        self
    }

    pub fn failing_manifest(self) -> Self {
        *self.fail_manifest.lock().unwrap() = true;
        self
    }

    pub fn stored(&self, resource: &ResourceRef) -> Option<MiniCluster> {
        self.miniclusters.lock().unwrap().get(resource).cloned()
    }

    pub fn creates(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn ensure_namespace(&self, namespace: &str) -> Result<()> {
        self.namespaces.lock().unwrap().push(namespace.to_string());
        Ok(())
    }

    async fn apply_manifest(&self, manifest: &str) -> Result<usize> {
        if *self.fail_manifest.lock().unwrap() {
            return Err(ClientError::api_error(403, "forbidden"));
        }
        self.manifests.lock().unwrap().push(manifest.to_string());
        Ok(1)
    }

    async fn create_minicluster(&self, minicluster: &MiniCluster) -> Result<ResourceRef> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = *self.reject_create.lock().unwrap() {
            return Err(ClientError::api_error(status, "rejected"));
        }

        let resource = minicluster
            .resource_ref()
            .ok_or_else(|| ClientError::InvalidManifest("unnamed".to_string()))?;
        let mut stored = self.miniclusters.lock().unwrap();
        if stored.contains_key(&resource) {
            return Err(ClientError::api_error(409, "already exists"));
        }
        stored.insert(resource.clone(), minicluster.clone());
        Ok(resource)
    }

    async fn get_minicluster(&self, resource: &ResourceRef) -> Result<Option<MiniCluster>> {
        Ok(self.stored(resource))
    }

    async fn list_pods(&self, _resource: &ResourceRef) -> Result<Vec<PodRecord>> {
        let delay = *self.list_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let reply = next_reply(&mut self.pods.lock().unwrap());
        match reply {
            Some(Ok(pods)) => Ok(pods),
            Some(Err(status)) => Err(ClientError::api_error(status, "list failed")),
            None => Ok(Vec::new()),
        }
    }

    async fn pod_logs(&self, _resource: &ResourceRef, pod: &str, _follow: bool) -> Result<String> {
        self.log_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.log_delays.lock().unwrap().get(pod).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let reply = self
            .logs
            .lock()
            .unwrap()
            .get_mut(pod)
            .and_then(next_reply);
        match reply {
            Some(LogReply::Text(text)) => Ok(text),
            Some(LogReply::Fail(status)) => Err(ClientError::api_error(status, "log fetch failed")),
            Some(LogReply::Hang) => std::future::pending().await,
            None => Err(ClientError::api_error(404, "no such pod")),
        }
    }

    async fn delete_minicluster(&self, resource: &ResourceRef) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.miniclusters.lock().unwrap().remove(resource);
        Ok(())
    }
}

pub fn ready_endpoint(config: &ProviderConfig) -> ClusterEndpoint {
    ClusterEndpoint {
        server: "https://10.0.0.1".to_string(),
        ..config.unresolved_endpoint()
    }
}

/// Fake cloud provider with scripted cluster states
#[derive(Default)]
pub struct FakeProvider {
    create_status: Mutex<Option<u16>>,
    create_delay: Mutex<Option<Duration>>,
    states: Mutex<VecDeque<ClusterState>>,
    state_delay: Mutex<Option<Duration>>,
    destroy_failures: AtomicUsize,
    pub create_calls: AtomicUsize,
    pub destroy_calls: AtomicUsize,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each `cluster_state` call returns the next state; the last one repeats
    pub fn with_states(self, states: Vec<ClusterState>) -> Self {
        self.states.lock().unwrap().extend(states);
        self
    }

    pub fn failing_create(self, status: u16) -> Self {
        *self.create_status.lock().unwrap() = Some(status);
        self
    }

    /// Every `create_cluster` call takes this long to answer
    pub fn with_create_delay(self, delay: Duration) -> Self {
        *self.create_delay.lock().unwrap() = Some(delay);
        self
    }

    /// Every `cluster_state` call takes this long to answer
    pub fn with_state_delay(self, delay: Duration) -> Self {
        *self.state_delay.lock().unwrap() = Some(delay);
        self
    }

    /// The first `count` destroy calls fail with a server error
    pub fn failing_destroy(self, count: usize) -> Self {
        self.destroy_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn creates(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn destroys(&self) -> usize {
        self.destroy_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClusterProvider for FakeProvider {
    async fn create_cluster(&self, _config: &ProviderConfig) -> Result<()> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.create_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match *self.create_status.lock().unwrap() {
            Some(status) => Err(ClientError::api_error(status, "create failed")),
            None => Ok(()),
        }
    }

    async fn cluster_state(&self, _config: &ProviderConfig) -> Result<ClusterState> {
        let delay = *self.state_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(next_reply(&mut self.states.lock().unwrap()).unwrap_or(ClusterState::Provisioning))
    }

    async fn destroy_cluster(&self, _endpoint: &ClusterEndpoint) -> Result<()> {
        self.destroy_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.destroy_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.destroy_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ClientError::api_error(503, "backend unavailable"));
        }
        Ok(())
    }
}

/// Connector handing out one shared `FakeCluster`
pub struct FakeConnector {
    cluster: Arc<FakeCluster>,
}

impl FakeConnector {
    pub fn new(cluster: Arc<FakeCluster>) -> Self {
        Self { cluster }
    }
}

#[async_trait]
impl ClusterConnector for FakeConnector {
    async fn connect(&self, _handle: &ClusterHandle) -> Result<Arc<dyn ClusterApi>> {
        Ok(self.cluster.clone())
    }
}
