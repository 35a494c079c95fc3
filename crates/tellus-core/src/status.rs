// Job status vocabulary and progress mapping
//
// Remote backends report status in one of three vocabularies (OGC strings,
// PyWPS integer codes, OWSLib "Process*" strings). Everything is normalized
// into the canonical five-state set before it reaches a job record.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Canonical job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Accepted,
    Running,
    Succeeded,
    Failed,
    Dismissed,
}

impl JobStatus {
    /// Terminal states admit no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Dismissed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Accepted => "accepted",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Dismissed => "dismissed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "accepted" => Ok(JobStatus::Accepted),
            "running" => Ok(JobStatus::Running),
            "succeeded" => Ok(JobStatus::Succeeded),
            "failed" => Ok(JobStatus::Failed),
            "dismissed" => Ok(JobStatus::Dismissed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// Result of normalizing a remote status report.
///
/// `Unknown` is treated as `running` for polling purposes but is never
/// persisted as a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteStatus {
    Known(JobStatus),
    Unknown,
}

impl RemoteStatus {
    /// Status the poller should act on (`unknown` keeps the job running)
    pub fn effective(&self) -> JobStatus {
        match self {
            RemoteStatus::Known(s) => *s,
            RemoteStatus::Unknown => JobStatus::Running,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RemoteStatus::Known(s) if s.is_terminal())
    }
}

/// Normalize any of the three remote status vocabularies onto the canonical
/// set. Matching is case-insensitive; unknown values map to
/// `RemoteStatus::Unknown`.
pub fn map_status(remote: &str) -> RemoteStatus {
    let value = remote.trim();
    // PyWPS reports integer codes 0..5
    if let Ok(code) = value.parse::<u8>() {
        return map_pywps_status(code);
    }
    let lower = value.to_ascii_lowercase();
    // OWSLib vocabulary prefixes the OGC word with "Process"
    let lower = lower.strip_prefix("process").unwrap_or(&lower);
    match lower {
        "accepted" => RemoteStatus::Known(JobStatus::Accepted),
        // "paused" has no canonical equivalent; the job is still not terminal
        "running" | "started" | "paused" => RemoteStatus::Known(JobStatus::Running),
        "succeeded" | "successful" => RemoteStatus::Known(JobStatus::Succeeded),
        "failed" | "exception" => RemoteStatus::Known(JobStatus::Failed),
        "dismissed" => RemoteStatus::Known(JobStatus::Dismissed),
        _ => RemoteStatus::Unknown,
    }
}

/// PyWPS integer vocabulary: 0=unknown 1=accepted 2=started 3=paused
/// 4=succeeded 5=failed
fn map_pywps_status(code: u8) -> RemoteStatus {
    match code {
        1 => RemoteStatus::Known(JobStatus::Accepted),
        2 | 3 => RemoteStatus::Known(JobStatus::Running),
        4 => RemoteStatus::Known(JobStatus::Succeeded),
        5 => RemoteStatus::Known(JobStatus::Failed),
        _ => RemoteStatus::Unknown,
    }
}

// Progress slices allocated to each phase of a package execution.
pub const PROGRESS_PREP: u8 = 0;
pub const PROGRESS_LAUNCH: u8 = 5;
pub const PROGRESS_LOAD: u8 = 6;
pub const PROGRESS_CONVERT_INPUT: u8 = 10;
pub const PROGRESS_EXEC_DONE: u8 = 95;
pub const PROGRESS_COLLECT_OUTPUT: u8 = 99;
pub const PROGRESS_DONE: u8 = 100;

/// Map a phase-internal progress (0..=100) onto the slice `[min, max]`
/// allocated to that phase, so step-internal progress never overshoots.
pub fn map_progress(progress: f64, range_min: u8, range_max: u8) -> u8 {
    let p = progress.clamp(0.0, 100.0);
    let min = f64::from(range_min);
    let max = f64::from(range_max);
    (min + p / 100.0 * (max - min)).round().clamp(min, max) as u8
}

/// Progress slice for a workflow step: the execute slice (10..=95) is
/// partitioned equally by step index.
pub fn workflow_step_progress(step_idx: usize, n_steps: usize, step_progress: f64) -> u8 {
    debug_assert!(n_steps > 0);
    let span = f64::from(PROGRESS_EXEC_DONE - PROGRESS_CONVERT_INPUT);
    let p = step_progress.clamp(0.0, 100.0);
    let value =
        f64::from(PROGRESS_CONVERT_INPUT) + (step_idx as f64 + p / 100.0) * span / n_steps as f64;
    value.round().clamp(0.0, f64::from(PROGRESS_EXEC_DONE)) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ogc_vocabulary() {
        assert_eq!(map_status("accepted").effective(), JobStatus::Accepted);
        assert_eq!(map_status("RUNNING").effective(), JobStatus::Running);
        assert_eq!(map_status("succeeded").effective(), JobStatus::Succeeded);
        assert_eq!(map_status("failed").effective(), JobStatus::Failed);
    }

    #[test]
    fn test_owslib_vocabulary() {
        assert_eq!(
            map_status("ProcessAccepted").effective(),
            JobStatus::Accepted
        );
        assert_eq!(map_status("ProcessStarted").effective(), JobStatus::Running);
        assert_eq!(
            map_status("ProcessSucceeded").effective(),
            JobStatus::Succeeded
        );
        assert_eq!(map_status("ProcessFailed").effective(), JobStatus::Failed);
        assert_eq!(map_status("ProcessPaused").effective(), JobStatus::Running);
    }

    #[test]
    fn test_pywps_vocabulary() {
        assert_eq!(map_status("1").effective(), JobStatus::Accepted);
        assert_eq!(map_status("2").effective(), JobStatus::Running);
        assert_eq!(map_status("4").effective(), JobStatus::Succeeded);
        assert_eq!(map_status("5").effective(), JobStatus::Failed);
    }

    #[test]
    fn test_unknown_keeps_polling_but_is_not_terminal() {
        let status = map_status("SomethingElse");
        assert_eq!(status, RemoteStatus::Unknown);
        assert_eq!(status.effective(), JobStatus::Running);
        assert!(!status.is_terminal());
    }

    #[test]
    fn test_map_progress_bounds() {
        assert_eq!(map_progress(0.0, 10, 95), 10);
        assert_eq!(map_progress(100.0, 10, 95), 95);
        assert_eq!(map_progress(50.0, 10, 95), 53);
        // out-of-range internal progress is clamped to the slice
        assert_eq!(map_progress(150.0, 10, 95), 95);
    }

    #[test]
    fn test_workflow_step_progress_partitions_execute_slice() {
        // two steps: first step spans 10..=52, second 52..=95
        assert_eq!(workflow_step_progress(0, 2, 0.0), 10);
        assert_eq!(workflow_step_progress(0, 2, 100.0), 53);
        assert_eq!(workflow_step_progress(1, 2, 100.0), 95);
        // single step owns the whole slice
        assert_eq!(workflow_step_progress(0, 1, 100.0), 95);
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Dismissed.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(!JobStatus::Accepted.is_terminal());
    }

    #[test]
    fn test_status_round_trip() {
        for s in [
            JobStatus::Accepted,
            JobStatus::Running,
            JobStatus::Succeeded,
            JobStatus::Failed,
            JobStatus::Dismissed,
        ] {
            assert_eq!(s.as_str().parse::<JobStatus>().unwrap(), s);
        }
    }
}
