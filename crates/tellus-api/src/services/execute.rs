// Job submission and lifecycle service
//
// Submit builds the job record, enqueues it at Tier 2 and returns
// immediately; dismissal marks the record and revokes the worker handle.
// Results/exceptions/logs read the persisted record, with the status file
// serving as the read-only log view while the job still runs.

use serde_json::{json, Value};
use std::sync::Arc;
use tellus_core::{
    EngineConfig, EngineError, ExecuteMode, Job, JobStatus, Result, Visibility,
};
use tellus_storage::JobFilter;
use tellus_worker::{ExecutionEngine, JobRunner};
use tracing::info;
use uuid::Uuid;

pub struct JobService {
    engine: Arc<ExecutionEngine>,
    runner: Arc<dyn JobRunner>,
}

impl JobService {
    pub fn new(engine: Arc<ExecutionEngine>, runner: Arc<dyn JobRunner>) -> Self {
        Self { engine, runner }
    }

    fn config(&self) -> &EngineConfig {
        self.engine.config()
    }

    /// Submit a job on a deployed process (or, with `service` set, on a
    /// registered provider's process)
    pub async fn submit(
        &self,
        process_id: &str,
        service: Option<String>,
        body: &Value,
    ) -> Result<Job> {
        if service.is_none() {
            // fail fast on unknown processes; provider jobs resolve remotely
            self.engine
                .repos()
                .processes
                .fetch_by_id(process_id)
                .await?
                .ok_or_else(|| EngineError::ProcessNotFound(process_id.to_string()))?;
        }

        let mut job = Job::new(process_id, body.get("inputs").cloned().unwrap_or(Value::Null));
        job.service = service;
        job.execute_mode = match body.get("mode").and_then(Value::as_str) {
            Some("sync") => ExecuteMode::Sync,
            _ => ExecuteMode::Async,
        };
        job.access = body
            .get("access")
            .and_then(Value::as_str)
            .and_then(|v| v.parse().ok())
            .unwrap_or(Visibility::Private);
        job.tags = body
            .get("tags")
            .and_then(Value::as_array)
            .map(|tags| {
                tags.iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        job.notification_email = body
            .get("notification_email")
            .and_then(Value::as_str)
            .map(String::from);

        self.engine.repos().jobs.save_job(job.clone()).await?;
        let task_id = self.runner.submit(job.id).await?;
        job.task_id = Some(task_id);
        self.engine.repos().jobs.update_job(job.clone()).await?;
        info!(job_id = %job.id, process = %process_id, mode = ?job.execute_mode, "Job submitted");

        if job.execute_mode == ExecuteMode::Sync {
            return self.wait_terminal(job.id).await;
        }
        Ok(job)
    }

    /// Synchronous submit: poll the store until terminal (bounded by the
    /// configured job timeout, default 60s for sync requests)
    async fn wait_terminal(&self, job_id: Uuid) -> Result<Job> {
        let ceiling = self
            .config()
            .job_timeout
            .unwrap_or(std::time::Duration::from_secs(60));
        let started = std::time::Instant::now();
        loop {
            let job = self.fetch(job_id).await?;
            if job.is_terminal() {
                return Ok(job);
            }
            if started.elapsed() > ceiling {
                return Ok(job);
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
    }

    pub async fn fetch(&self, job_id: Uuid) -> Result<Job> {
        self.engine
            .repos()
            .jobs
            .fetch_by_id(job_id)
            .await?
            .ok_or(EngineError::JobNotFound(job_id))
    }

    pub async fn list(&self, filter: &JobFilter) -> Result<Vec<Job>> {
        self.engine.repos().jobs.list_jobs(filter).await
    }

    /// Dismiss a job: terminal states are not cancellable
    pub async fn dismiss(&self, job_id: Uuid) -> Result<Job> {
        let mut job = self.fetch(job_id).await?;
        if job.status == JobStatus::Dismissed {
            return Ok(job);
        }
        if job.is_terminal() {
            return Err(EngineError::execution(format!(
                "job {job_id} is already {} and cannot be dismissed",
                job.status
            )));
        }
        job.apply_update(JobStatus::Dismissed, job.progress, "Job dismissed");
        self.engine.repos().jobs.update_job(job.clone()).await?;
        self.runner.cancel(job_id).await?;
        info!(job_id = %job_id, "Job dismissed");
        Ok(job)
    }

    /// Results document; present only once succeeded
    pub async fn results(&self, job_id: Uuid) -> Result<Value> {
        let job = self.fetch(job_id).await?;
        if job.status != JobStatus::Succeeded {
            return Err(EngineError::execution(format!(
                "job {job_id} has no results (status: {})",
                job.status
            )));
        }
        Ok(json!({"outputs": job.results}))
    }

    /// Exceptions document; present only once failed
    pub async fn exceptions(&self, job_id: Uuid) -> Result<Value> {
        let job = self.fetch(job_id).await?;
        Ok(json!({"exceptions": job.exceptions}))
    }

    /// Log lines: the drained record once terminal, a read-only view of
    /// the status file while running
    pub async fn logs(&self, job_id: Uuid) -> Result<Vec<String>> {
        let job = self.fetch(job_id).await?;
        if !job.logs.is_empty() || job.is_terminal() {
            return Ok(job.logs);
        }
        let log_path = self
            .config()
            .output_dir
            .join(job_id.to_string())
            .join(format!("{job_id}.log"));
        match tokio::fs::read_to_string(&log_path).await {
            Ok(content) => Ok(content.lines().map(String::from).collect()),
            Err(_) => Ok(Vec::new()),
        }
    }

    /// Absolute URL of a job's status endpoint
    pub fn job_location(&self, job_id: Uuid) -> String {
        format!(
            "{}/jobs/{job_id}",
            self.config().base_url.trim_end_matches('/')
        )
    }
}
