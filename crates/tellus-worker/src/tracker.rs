// Job tracker: single writer of a job record while it executes
//
// Backends push (status, progress, message) events into a per-job channel;
// the tracker serializes them into the store and the status log file. On
// terminal transitions the log file is drained into the job record and
// removed.

use std::path::PathBuf;
use std::sync::Arc;
use tellus_core::{
    job::format_duration, EngineConfig, Job, JobException, JobStatus, Result,
};
use tellus_storage::JobStore;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// One status event flowing from a backend to the tracker
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
}

/// Cloneable sender half of a job's status channel.
///
/// A workflow scopes a sender per step so step-internal progress maps into
/// the slice allocated to that step and sub-executions can never mark the
/// parent job terminal.
#[derive(Clone)]
pub struct ProgressSender {
    tx: mpsc::UnboundedSender<StatusUpdate>,
    step: Option<(usize, usize)>,
}

impl ProgressSender {
    pub fn channel() -> (ProgressSender, mpsc::UnboundedReceiver<StatusUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ProgressSender { tx, step: None }, rx)
    }

    /// Report progress; events after the channel closes are dropped
    pub fn send(&self, status: JobStatus, progress: u8, message: impl Into<String>) {
        let (status, progress) = match self.step {
            Some((idx, count)) => (
                // sub-executions stay "running" at the parent level
                JobStatus::Running,
                tellus_core::workflow_step_progress(idx, count, f64::from(progress)),
            ),
            None => (status, progress),
        };
        let _ = self.tx.send(StatusUpdate {
            status,
            progress,
            message: message.into(),
        });
    }

    /// Scope this sender to workflow step `idx` of `count`
    pub fn for_step(&self, idx: usize, count: usize) -> ProgressSender {
        ProgressSender {
            tx: self.tx.clone(),
            step: Some((idx, count)),
        }
    }
}

/// Owns the job record and its status file while a worker executes it
pub struct JobTracker {
    job: Job,
    store: Arc<dyn JobStore>,
    log_path: PathBuf,
    status_path: PathBuf,
}

impl JobTracker {
    /// Create the per-job output directory and status files
    pub async fn new(job: Job, store: Arc<dyn JobStore>, config: &EngineConfig) -> Result<Self> {
        let job_dir = config.output_dir.join(job.id.to_string());
        tokio::fs::create_dir_all(&job_dir)
            .await
            .map_err(|e| tellus_core::EngineError::execution(format!(
                "cannot create job output dir: {e}"
            )))?;
        let stem = job.id.to_string();
        Ok(Self {
            log_path: job_dir.join(format!("{stem}.log")),
            status_path: job_dir.join(format!("{stem}.xml")),
            job,
            store,
        })
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn log_path(&self) -> &PathBuf {
        &self.log_path
    }

    pub fn status_path(&self) -> &PathBuf {
        &self.status_path
    }

    /// Consume status events until the channel closes, then hand the
    /// tracker back for the terminal transition.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<StatusUpdate>) -> Self {
        while let Some(update) = rx.recv().await {
            if let Err(e) = self
                .update(update.status, update.progress, update.message)
                .await
            {
                error!(job_id = %self.job.id, error = %e, "Failed to apply status update");
            }
        }
        self
    }

    /// Apply one status update: record, log line, store
    pub async fn update(
        &mut self,
        status: JobStatus,
        progress: u8,
        message: impl Into<String>,
    ) -> Result<()> {
        let message = message.into();
        if !self.job.apply_update(status, progress, &message) {
            warn!(job_id = %self.job.id, "Dropping update for terminal job");
            return Ok(());
        }
        self.append_log_line().await;
        self.store.update_job(self.job.clone()).await
    }

    /// Terminal success: record results, drain the log file
    pub async fn succeed(mut self, results: Vec<serde_json::Value>) -> Result<Job> {
        self.job.results = results;
        self.job
            .apply_update(JobStatus::Succeeded, 100, "Job complete.");
        self.append_log_line().await;
        self.finalize().await
    }

    /// Terminal failure: record the exception, drain the log file
    pub async fn fail(mut self, exception: JobException) -> Result<Job> {
        let message = exception.text.clone();
        self.job.exceptions.push(exception);
        self.job.apply_update(JobStatus::Failed, self.job.progress, message);
        self.append_log_line().await;
        self.finalize().await
    }

    /// The job was dismissed by Tier 1 while executing: stop tracking
    /// without persisting further state.
    pub async fn abandon(self) -> Job {
        debug!(job_id = %self.job.id, "Tracking abandoned for dismissed job");
        self.job
    }

    async fn finalize(mut self) -> Result<Job> {
        self.drain_log_file().await;
        self.store.update_job(self.job.clone()).await?;
        Ok(self.job)
    }

    /// `"{duration} {progress:3d}% {status:10} {message}"`
    async fn append_log_line(&self) {
        let line = format!(
            "{} {:3}% {:10} {}\n",
            format_duration(self.job.duration()),
            self.job.progress,
            self.job.status.as_str(),
            self.job.message
        );
        let result = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await;
        match result {
            Ok(mut file) => {
                use tokio::io::AsyncWriteExt;
                if let Err(e) = file.write_all(line.as_bytes()).await {
                    warn!(job_id = %self.job.id, error = %e, "Cannot append status log line");
                }
            }
            Err(e) => warn!(job_id = %self.job.id, error = %e, "Cannot open status log file"),
        }
    }

    /// Drain the status file into the job record and remove it
    async fn drain_log_file(&mut self) {
        match tokio::fs::read_to_string(&self.log_path).await {
            Ok(content) => {
                self.job
                    .append_logs(content.lines().map(|l| l.to_string()));
                if let Err(e) = tokio::fs::remove_file(&self.log_path).await {
                    warn!(job_id = %self.job.id, error = %e, "Cannot remove drained log file");
                }
            }
            Err(e) => warn!(job_id = %self.job.id, error = %e, "Cannot drain status log file"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tellus_storage::{InMemoryJobs, JobStore};

    async fn tracker_fixture() -> (JobTracker, Arc<dyn JobStore>, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            output_dir: tmp.path().to_path_buf(),
            ..EngineConfig::default()
        };
        let store: Arc<dyn JobStore> = Arc::new(InMemoryJobs::default());
        let job = Job::new("echo-tool", json!({}));
        store.save_job(job.clone()).await.unwrap();
        let tracker = JobTracker::new(job, store.clone(), &config).await.unwrap();
        (tracker, store, tmp)
    }

    #[tokio::test]
    async fn test_updates_write_log_lines_and_store() {
        let (mut tracker, store, _tmp) = tracker_fixture().await;
        let job_id = tracker.job().id;
        tracker
            .update(JobStatus::Running, 10, "Launching package...")
            .await
            .unwrap();
        tracker
            .update(JobStatus::Running, 50, "Running package...")
            .await
            .unwrap();

        let content = std::fs::read_to_string(tracker.log_path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("running"));
        assert!(lines[0].ends_with("Launching package..."));
        assert!(lines[1].contains(" 50%"));

        let stored = store.fetch_by_id(job_id).await.unwrap().unwrap();
        assert_eq!(stored.progress, 50);
    }

    #[tokio::test]
    async fn test_terminal_drains_log_into_job() {
        let (mut tracker, store, _tmp) = tracker_fixture().await;
        let job_id = tracker.job().id;
        let log_path = tracker.log_path().clone();
        tracker
            .update(JobStatus::Running, 95, "echo: Dummy message")
            .await
            .unwrap();
        let job = tracker.succeed(vec![json!({"id": "out", "value": 1})]).await.unwrap();

        assert_eq!(job.status, JobStatus::Succeeded);
        assert!(!log_path.exists(), "log file should be drained and removed");
        assert!(job.logs.iter().any(|l| l.ends_with("echo: Dummy message")));

        let stored = store.fetch_by_id(job_id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Succeeded);
        assert_eq!(stored.results.len(), 1);
        assert_eq!(stored.progress, 100);
    }

    #[tokio::test]
    async fn test_channel_events_are_serialized() {
        let (tracker, store, _tmp) = tracker_fixture().await;
        let job_id = tracker.job().id;
        let (sender, rx) = ProgressSender::channel();
        let consumer = tokio::spawn(tracker.run(rx));

        sender.send(JobStatus::Running, 10, "first");
        sender.send(JobStatus::Running, 20, "second");
        drop(sender);

        let tracker = consumer.await.unwrap();
        assert_eq!(tracker.job().progress, 20);
        let stored = store.fetch_by_id(job_id).await.unwrap().unwrap();
        assert_eq!(stored.message, "second");
    }

    #[tokio::test]
    async fn test_step_scoped_sender_maps_progress() {
        let (sender, mut rx) = ProgressSender::channel();
        let scoped = sender.for_step(1, 2);
        // sub-execution "succeeded" must stay running at the parent level
        scoped.send(JobStatus::Succeeded, 100, "step done");
        let update = rx.recv().await.unwrap();
        assert_eq!(update.status, JobStatus::Running);
        assert_eq!(update.progress, 95);
    }

    #[tokio::test]
    async fn test_fail_records_exception() {
        let (tracker, store, _tmp) = tracker_fixture().await;
        let job_id = tracker.job().id;
        let job = tracker
            .fail(JobException::new("NoApplicableCode", "permanentFail: exit code 127"))
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        let stored = store.fetch_by_id(job_id).await.unwrap().unwrap();
        assert_eq!(stored.exceptions.len(), 1);
        assert!(stored.exceptions[0].text.contains("permanentFail"));
    }
}
