//! Output destinations and the run summary

use burst_core::domain::outcome::{JobOutcome, JobStatus};
use colored::Colorize;
use std::path::{Path, PathBuf};

use crate::error::LaunchError;

/// Rejects a destination whose directory does not exist
///
/// Checked before any cluster work, so a typo in `--outfile` does not cost
/// a provisioned cluster.
pub fn check_destination(path: &Path) -> Result<(), LaunchError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => return Ok(()),
    };

    if !parent.is_dir() {
        return Err(LaunchError::Config(format!(
            "output directory {} does not exist",
            parent.display()
        )));
    }
    if path.is_dir() {
        return Err(LaunchError::Config(format!(
            "output path {} is a directory",
            path.display()
        )));
    }
    Ok(())
}

/// Writes the assembled output, replacing any existing file
pub fn write_output(path: &Path, outcome: &JobOutcome) -> Result<(), LaunchError> {
    std::fs::write(path, &outcome.output).map_err(|source| LaunchError::Output {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes the outcome as pretty JSON
pub fn write_summary(path: &Path, outcome: &JobOutcome) -> Result<(), LaunchError> {
    let to_error = |source: std::io::Error| LaunchError::Output {
        path: PathBuf::from(path),
        source,
    };

    let json = serde_json::to_string_pretty(outcome)
        .map_err(|e| to_error(std::io::Error::other(e)))?;
    std::fs::write(path, json).map_err(to_error)
}

/// Colorizes a job status for terminal output
fn colorize_status(status: JobStatus, partial: bool) -> String {
    match status {
        JobStatus::Completed if partial => "Completed (partial)".yellow().to_string(),
        JobStatus::Completed => "Completed".green().to_string(),
        JobStatus::Failed => "Failed".red().to_string(),
        JobStatus::TimedOut => "TimedOut".red().to_string(),
        JobStatus::Cancelled => "Cancelled".bright_black().to_string(),
    }
}

/// Prints the per-pod result table to stderr
pub fn print_summary(outcome: &JobOutcome) {
    eprintln!();
    eprintln!(
        "{} {}",
        "Job:".bold(),
        colorize_status(outcome.status, outcome.partial)
    );
    if let Some(reason) = &outcome.reason {
        eprintln!("  {}", reason.dimmed());
    }

    for pod in &outcome.pods {
        let mark = if pod.collected {
            "✓".green()
        } else {
            "✗".red()
        };
        let name = pod.pod.as_deref().unwrap_or("-");
        let phase = pod
            .phase
            .map(|phase| phase.to_string())
            .unwrap_or_else(|| "never seen".to_string());
        match &pod.error {
            Some(error) => eprintln!(
                "  {} #{:<3} {:<40} {:<10} {}",
                mark,
                pod.ordinal,
                name,
                phase,
                error.dimmed()
            ),
            None => eprintln!("  {} #{:<3} {:<40} {}", mark, pod.ordinal, name, phase),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burst_core::domain::outcome::PodExit;
    use burst_core::domain::pod::PodPhase;

    fn outcome() -> JobOutcome {
        JobOutcome {
            status: JobStatus::Completed,
            output: "hello\nhello\n".to_string(),
            pods: vec![PodExit {
                ordinal: 0,
                pod: Some("flux-sample-0-abcde".to_string()),
                phase: Some(PodPhase::Succeeded),
                collected: true,
                error: None,
            }],
            partial: false,
            reason: None,
        }
    }

    #[test]
    fn test_missing_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("nope").join("out.txt");
        assert!(matches!(
            check_destination(&bad),
            Err(LaunchError::Config(_))
        ));

        let good = dir.path().join("out.txt");
        assert!(check_destination(&good).is_ok());
        assert!(check_destination(Path::new("out.txt")).is_ok());
        assert!(check_destination(dir.path()).is_err());
    }

    #[test]
    fn test_write_output_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.txt");
        let summary = dir.path().join("summary.json");

        write_output(&output, &outcome()).unwrap();
        write_summary(&summary, &outcome()).unwrap();

        assert_eq!(std::fs::read_to_string(&output).unwrap(), "hello\nhello\n");
        let parsed: JobOutcome =
            serde_json::from_str(&std::fs::read_to_string(&summary).unwrap()).unwrap();
        assert_eq!(parsed, outcome());
    }

    #[test]
    fn test_write_failure_maps_to_output_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = write_output(&dir.path().join("gone").join("out.txt"), &outcome()).unwrap_err();
        assert_eq!(err.exit_code(), 6);
    }
}
