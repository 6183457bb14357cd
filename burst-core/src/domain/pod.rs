//! Pod observation types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Pod phase as reported by the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    /// Parses a phase string, accepting `Completed` as `Succeeded`
    pub fn parse(phase: &str) -> Self {
        match phase {
            "Pending" => PodPhase::Pending,
            "Running" => PodPhase::Running,
            "Succeeded" | "Completed" => PodPhase::Succeeded,
            "Failed" => PodPhase::Failed,
            _ => PodPhase::Unknown,
        }
    }

    /// Running or finished; output can be fetched
    pub fn is_started(&self) -> bool {
        matches!(
            self,
            PodPhase::Running | PodPhase::Succeeded | PodPhase::Failed
        )
    }

    /// Rank used when two pods claim the same ordinal; failures win
    fn precedence(&self) -> u8 {
        match self {
            PodPhase::Unknown => 0,
            PodPhase::Pending => 1,
            PodPhase::Running => 2,
            PodPhase::Succeeded => 3,
            PodPhase::Failed => 4,
        }
    }
}

impl std::fmt::Display for PodPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Observed state of one pod at one poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodRecord {
    pub name: String,
    /// Index within the job, 0..N-1
    pub ordinal: u32,
    pub phase: PodPhase,
    pub observed_at: DateTime<Utc>,
}

impl PodRecord {
    pub fn new(name: impl Into<String>, ordinal: u32, phase: PodPhase) -> Self {
        Self {
            name: name.into(),
            ordinal,
            phase,
            observed_at: Utc::now(),
        }
    }
}

/// All pods of a job as seen by one poll
///
/// Rebuilt from scratch on every poll. Records are sorted by ordinal and
/// hold at most one pod per ordinal. When a replaced pod and its successor
/// are both listed, the one with the higher phase precedence is kept (a
/// `Failed` pod always survives), with the pod name as tie breaker, so the
/// result does not depend on list order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodSnapshot {
    pods: Vec<PodRecord>,
    pub observed_at: DateTime<Utc>,
}

impl PodSnapshot {
    pub fn new(pods: Vec<PodRecord>) -> Self {
        let mut by_ordinal: BTreeMap<u32, PodRecord> = BTreeMap::new();
        for pod in pods {
            match by_ordinal.get(&pod.ordinal) {
                Some(kept)
                    if (kept.phase.precedence(), &kept.name)
                        >= (pod.phase.precedence(), &pod.name) => {}
                _ => {
                    by_ordinal.insert(pod.ordinal, pod);
                }
            }
        }
        Self {
            pods: by_ordinal.into_values().collect(),
            observed_at: Utc::now(),
        }
    }

    pub fn pods(&self) -> &[PodRecord] {
        &self.pods
    }

    pub fn len(&self) -> usize {
        self.pods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pods.is_empty()
    }

    pub fn get(&self, ordinal: u32) -> Option<&PodRecord> {
        self.pods.iter().find(|p| p.ordinal == ordinal)
    }

    pub fn any_failed(&self) -> bool {
        self.pods.iter().any(|p| p.phase == PodPhase::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_phase() {
        assert_eq!(PodPhase::parse("Running"), PodPhase::Running);
        assert_eq!(PodPhase::parse("Completed"), PodPhase::Succeeded);
        assert_eq!(PodPhase::parse("Evicted"), PodPhase::Unknown);
    }

    #[test]
    fn test_snapshot_sorted_by_ordinal() {
        let snapshot = PodSnapshot::new(vec![
            PodRecord::new("job-2-x", 2, PodPhase::Running),
            PodRecord::new("job-0-x", 0, PodPhase::Pending),
            PodRecord::new("job-1-x", 1, PodPhase::Succeeded),
        ]);

        let ordinals: Vec<u32> = snapshot.pods().iter().map(|p| p.ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 2]);
        assert_eq!(snapshot.get(2).map(|p| p.phase), Some(PodPhase::Running));
    }

    #[test]
    fn test_snapshot_keeps_failed_pod_over_replacement() {
        let failed = PodRecord::new("job-0-zzz", 0, PodPhase::Failed);
        let replacement = PodRecord::new("job-0-aaa", 0, PodPhase::Pending);

        let listed = PodSnapshot::new(vec![failed.clone(), replacement.clone()]);
        let reversed = PodSnapshot::new(vec![replacement, failed]);

        assert_eq!(listed.len(), 1);
        assert_eq!(listed.get(0).map(|p| p.name.as_str()), Some("job-0-zzz"));
        assert!(listed.any_failed());
        assert_eq!(listed.pods(), reversed.pods());
    }

    #[test]
    fn test_snapshot_duplicate_ordinal_ties_break_on_name() {
        let snapshot = PodSnapshot::new(vec![
            PodRecord::new("job-1-bbb", 1, PodPhase::Running),
            PodRecord::new("job-1-ccc", 1, PodPhase::Running),
            PodRecord::new("job-1-aaa", 1, PodPhase::Pending),
        ]);

        assert_eq!(snapshot.get(1).map(|p| p.name.as_str()), Some("job-1-ccc"));
    }
}
