// Job entity and update discipline
//
// A job record tracks one execution through the canonical lifecycle.
// Progress is monotonically non-decreasing except for the reset to 0 on
// accept; once terminal, the record is immutable apart from log trailers
// drained from the status file.

use crate::process::Visibility;
use crate::status::JobStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Sync returns the result in the submit response; async returns 201 plus a
/// job location to poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum ExecuteMode {
    Sync,
    Async,
}

/// One recorded exception of a failed job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct JobException {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
    pub text: String,
}

impl JobException {
    pub fn new(code: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            locator: None,
            text: text.into(),
        }
    }

    pub fn with_locator(mut self, locator: impl Into<String>) -> Self {
        self.locator = Some(locator.into());
        self
    }
}

/// A job record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    /// Opaque worker queue handle
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub process: String,
    /// Provider id for jobs dispatched through a registered service
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    /// Submitted execute inputs, verbatim
    pub inputs: Value,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    /// Mirrors the process outputs; present only once succeeded
    #[serde(default)]
    pub results: Vec<Value>,
    /// Present only once failed
    #[serde(default)]
    pub exceptions: Vec<JobException>,
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub access: Visibility,
    pub execute_mode: ExecuteMode,
    pub is_workflow: bool,
    pub created: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_email: Option<String>,
}

impl Job {
    pub fn new(process: impl Into<String>, inputs: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id: None,
            user_id: None,
            process: process.into(),
            service: None,
            inputs,
            status: JobStatus::Accepted,
            progress: 0,
            message: "Job accepted".to_string(),
            results: Vec::new(),
            exceptions: Vec::new(),
            logs: Vec::new(),
            tags: Vec::new(),
            access: Visibility::Private,
            execute_mode: ExecuteMode::Async,
            is_workflow: false,
            created: Utc::now(),
            started: None,
            finished: None,
            notification_email: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Elapsed execution time, measured from start (or creation while
    /// still queued)
    pub fn duration(&self) -> chrono::Duration {
        let from = self.started.unwrap_or(self.created);
        let until = self.finished.unwrap_or_else(Utc::now);
        until - from
    }

    /// Apply one status update under the job update discipline. Returns
    /// false (and leaves the record untouched) when the job is already
    /// terminal.
    ///
    /// Progress is clamped upward: an update below the current progress
    /// keeps the current value, except for the explicit reset to 0 when the
    /// job re-enters `accepted`.
    pub fn apply_update(
        &mut self,
        status: JobStatus,
        progress: u8,
        message: impl Into<String>,
    ) -> bool {
        if self.is_terminal() {
            return false;
        }
        let now = Utc::now();
        match status {
            JobStatus::Accepted => {
                self.progress = 0;
            }
            _ => {
                self.progress = self.progress.max(progress.min(100));
            }
        }
        if status == JobStatus::Running && self.started.is_none() {
            self.started = Some(now);
        }
        if status.is_terminal() {
            self.finished = Some(now);
            if status == JobStatus::Succeeded {
                self.progress = 100;
            }
        }
        self.status = status;
        self.message = message.into();
        true
    }

    /// Append log trailers drained from the status file; allowed even on a
    /// terminal record.
    pub fn append_logs(&mut self, lines: impl IntoIterator<Item = String>) {
        self.logs.extend(lines);
    }

    /// Status document served by `GET /jobs/{id}`
    pub fn status_json(&self, location: &str) -> Value {
        serde_json::json!({
            "jobID": self.id,
            "processID": self.process,
            "providerID": self.service,
            "status": self.status,
            "progress": self.progress,
            "message": self.message,
            "created": self.created,
            "started": self.started,
            "finished": self.finished,
            "duration": format_duration(self.duration()),
            "location": location,
            "tags": self.tags,
        })
    }
}

/// Render a duration as `HH:MM:SS` (used in status documents and log lines)
pub fn format_duration(duration: chrono::Duration) -> String {
    let total = duration.num_seconds().max(0);
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_job_is_accepted_at_zero() {
        let job = Job::new("echo-tool", json!({}));
        assert_eq!(job.status, JobStatus::Accepted);
        assert_eq!(job.progress, 0);
        assert!(!job.is_terminal());
    }

    #[test]
    fn test_progress_is_monotonic() {
        let mut job = Job::new("echo-tool", json!({}));
        assert!(job.apply_update(JobStatus::Running, 40, "working"));
        assert!(job.apply_update(JobStatus::Running, 20, "noisy remote"));
        assert_eq!(job.progress, 40);
        assert!(job.apply_update(JobStatus::Running, 80, "almost"));
        assert_eq!(job.progress, 80);
    }

    #[test]
    fn test_accept_resets_progress() {
        let mut job = Job::new("echo-tool", json!({}));
        job.apply_update(JobStatus::Running, 50, "working");
        job.apply_update(JobStatus::Accepted, 0, "requeued");
        assert_eq!(job.progress, 0);
    }

    #[test]
    fn test_terminal_records_are_immutable() {
        let mut job = Job::new("echo-tool", json!({}));
        job.apply_update(JobStatus::Running, 50, "working");
        job.apply_update(JobStatus::Failed, 50, "boom");
        assert!(job.is_terminal());
        assert!(job.finished.is_some());
        assert!(!job.apply_update(JobStatus::Running, 60, "zombie"));
        assert_eq!(job.status, JobStatus::Failed);
        // log trailers may still be flushed
        job.append_logs(["last line".to_string()]);
        assert_eq!(job.logs.len(), 1);
    }

    #[test]
    fn test_succeeded_pins_progress_to_100() {
        let mut job = Job::new("echo-tool", json!({}));
        job.apply_update(JobStatus::Running, 95, "collecting");
        job.apply_update(JobStatus::Succeeded, 99, "done");
        assert_eq!(job.progress, 100);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(chrono::Duration::seconds(0)), "00:00:00");
        assert_eq!(format_duration(chrono::Duration::seconds(3725)), "01:02:05");
    }
}
