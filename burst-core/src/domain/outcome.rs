//! Job outcome types

use serde::{Deserialize, Serialize};

use crate::domain::pod::PodPhase;

/// Terminal status of a launch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// What happened to one pod, in ordinal order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodExit {
    pub ordinal: u32,
    /// Pod name, when the pod was ever observed
    pub pod: Option<String>,
    /// Last observed phase
    pub phase: Option<PodPhase>,
    /// Whether this pod's output is part of the assembled text
    pub collected: bool,
    /// Why output is missing, if it is
    pub error: Option<String>,
}

/// Result of one launch, produced once at the end of the watch phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub status: JobStatus,
    /// Output of every collected pod, concatenated in ordinal order
    pub output: String,
    pub pods: Vec<PodExit>,
    /// Set when at least one expected pod contributed no output
    pub partial: bool,
    /// Human readable reason for a non-`Completed` status
    pub reason: Option<String>,
}

impl JobOutcome {
    /// Outcome for a run that never produced pods worth reporting
    pub fn without_output(status: JobStatus, reason: impl Into<String>) -> Self {
        Self {
            status,
            output: String::new(),
            pods: Vec::new(),
            partial: false,
            reason: Some(reason.into()),
        }
    }

    /// Ordinals whose output is missing from the assembled text
    pub fn missing_ordinals(&self) -> Vec<u32> {
        self.pods
            .iter()
            .filter(|p| !p.collected)
            .map(|p| p.ordinal)
            .collect()
    }

    /// Process exit code for this outcome
    ///
    /// A completed run with missing output reports the collection failure.
    pub fn exit_code(&self) -> u8 {
        match self.status {
            JobStatus::Completed if self.partial => 5,
            JobStatus::Completed => 0,
            JobStatus::Failed => 1,
            JobStatus::TimedOut => 124, // Standard timeout exit code
            JobStatus::Cancelled => 130,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exit(ordinal: u32, collected: bool) -> PodExit {
        PodExit {
            ordinal,
            pod: Some(format!("job-{ordinal}")),
            phase: Some(PodPhase::Succeeded),
            collected,
            error: None,
        }
    }

    #[test]
    fn test_exit_codes() {
        let mut outcome = JobOutcome {
            status: JobStatus::Completed,
            output: "hello\n".to_string(),
            pods: vec![exit(0, true)],
            partial: false,
            reason: None,
        };
        assert_eq!(outcome.exit_code(), 0);

        outcome.partial = true;
        assert_eq!(outcome.exit_code(), 5);

        assert_eq!(
            JobOutcome::without_output(JobStatus::TimedOut, "no pods").exit_code(),
            124
        );
        assert_eq!(
            JobOutcome::without_output(JobStatus::Failed, "pod failed").exit_code(),
            1
        );
    }

    #[test]
    fn test_missing_ordinals() {
        let outcome = JobOutcome {
            status: JobStatus::Failed,
            output: String::new(),
            pods: vec![exit(0, true), exit(1, false), exit(2, true), exit(3, false)],
            partial: true,
            reason: None,
        };
        assert_eq!(outcome.missing_ordinals(), vec![1, 3]);
    }
}
