//! Pod conversion
//!
//! Turns Kubernetes `Pod` objects into the launcher's `PodRecord`.

use burst_core::domain::pod::{PodPhase, PodRecord};
use k8s_openapi::api::core::v1::Pod;

/// Annotation (and, on newer clusters, label) holding an indexed job's pod index
pub const COMPLETION_INDEX_KEY: &str = "batch.kubernetes.io/job-completion-index";

/// Converts a listed pod into a record
///
/// Returns `None` for pods that are being deleted or whose index cannot be
/// determined; neither can be attributed to a slot of the job.
pub fn pod_record(pod: &Pod, job_name: &str) -> Option<PodRecord> {
    if pod.metadata.deletion_timestamp.is_some() {
        return None;
    }

    let name = pod.metadata.name.clone()?;
    let ordinal = completion_index(pod).or_else(|| ordinal_from_name(&name, job_name))?;

    Some(PodRecord::new(name, ordinal, pod_phase(pod)))
}

fn completion_index(pod: &Pod) -> Option<u32> {
    let from = |map: &Option<std::collections::BTreeMap<String, String>>| {
        map.as_ref()
            .and_then(|m| m.get(COMPLETION_INDEX_KEY))
            .and_then(|v| v.parse().ok())
    };
    from(&pod.metadata.annotations).or_else(|| from(&pod.metadata.labels))
}

/// Indexed job pods are named `<job>-<index>-<suffix>`
fn ordinal_from_name(name: &str, job_name: &str) -> Option<u32> {
    name.strip_prefix(job_name)?
        .strip_prefix('-')?
        .split('-')
        .next()?
        .parse()
        .ok()
}

/// Phase of a pod, treating a pod whose containers all completed as succeeded
fn pod_phase(pod: &Pod) -> PodPhase {
    let Some(status) = &pod.status else {
        return PodPhase::Pending;
    };

    let phase = status
        .phase
        .as_deref()
        .map(PodPhase::parse)
        .unwrap_or(PodPhase::Pending);

    if phase == PodPhase::Running {
        let completed = status.container_statuses.as_ref().is_some_and(|statuses| {
            !statuses.is_empty()
                && statuses.iter().all(|s| {
                    s.state
                        .as_ref()
                        .and_then(|state| state.terminated.as_ref())
                        .is_some_and(|t| t.reason.as_deref() == Some("Completed"))
                })
        });
        if completed {
            return PodPhase::Succeeded;
        }
    }

    phase
}
