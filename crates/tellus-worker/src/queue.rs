// Tier-2 worker pool
//
// Submit enqueues a job id; a pool of workers consumes the queue, each
// processing one job at a time. Cancellation revokes the worker handle: a
// queued job is skipped at pickup, a running one aborts at its next
// suspension point and persists nothing further.

use crate::dispatcher::ExecutionEngine;
use crate::tracker::{JobTracker, ProgressSender};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tellus_core::{EngineError, JobException, JobStatus, Result};
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Handle the API layer uses to push work at Tier 2
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Enqueue a job; returns the opaque task handle
    async fn submit(&self, job_id: Uuid) -> Result<String>;

    /// Revoke a job's worker handle (dismissal)
    async fn cancel(&self, job_id: Uuid) -> Result<()>;

    /// Whether the job is queued or executing
    async fn is_active(&self, job_id: Uuid) -> bool;
}

/// Revocation token checked by workers at suspension points
#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// A token that never fires (stand-alone executions); a dropped watch
    /// sender keeps reporting its last value
    pub fn none() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn from_receiver(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }
}

/// In-process worker pool over an mpsc job queue
pub struct WorkerPool {
    queue_tx: mpsc::UnboundedSender<Uuid>,
    engine: Arc<ExecutionEngine>,
    /// job id -> revoke sender
    revokers: Arc<RwLock<HashMap<Uuid, watch::Sender<bool>>>>,
}

impl WorkerPool {
    /// Start `worker_count` workers consuming the queue
    pub fn start(engine: Arc<ExecutionEngine>) -> Arc<Self> {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel::<Uuid>();
        let pool = Arc::new(Self {
            queue_tx,
            engine,
            revokers: Arc::new(RwLock::new(HashMap::new())),
        });
        let shared_rx = Arc::new(Mutex::new(queue_rx));
        for worker_idx in 0..pool.engine.config().worker_count {
            let pool = pool.clone();
            let shared_rx = shared_rx.clone();
            tokio::spawn(async move {
                info!(worker_idx, "Job worker started");
                loop {
                    let job_id = {
                        let mut rx = shared_rx.lock().await;
                        rx.recv().await
                    };
                    let Some(job_id) = job_id else {
                        info!(worker_idx, "Job queue closed, worker stopping");
                        break;
                    };
                    pool.process(worker_idx, job_id).await;
                }
            });
        }
        pool
    }

    async fn process(&self, worker_idx: usize, job_id: Uuid) {
        let cancel = {
            let revokers = self.revokers.read().await;
            match revokers.get(&job_id) {
                Some(tx) => CancelToken {
                    rx: tx.subscribe(),
                },
                None => {
                    warn!(job_id = %job_id, "No revoke handle for queued job");
                    CancelToken::none()
                }
            }
        };
        if cancel.is_cancelled() {
            info!(job_id = %job_id, "Job dismissed before pickup");
            self.revokers.write().await.remove(&job_id);
            return;
        }

        let job = match self.engine.repos().jobs.fetch_by_id(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                error!(job_id = %job_id, "Queued job vanished from the store");
                return;
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Cannot fetch queued job");
                return;
            }
        };
        if job.status != JobStatus::Accepted {
            info!(job_id = %job_id, status = %job.status, "Skipping job not in accepted state");
            self.revokers.write().await.remove(&job_id);
            return;
        }

        info!(worker_idx, job_id = %job_id, process = %job.process, "Worker picked up job");
        let tracker = match JobTracker::new(job, self.engine.repos().jobs.clone(), self.engine.config()).await
        {
            Ok(tracker) => tracker,
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Cannot initialize job tracker");
                return;
            }
        };

        let (progress, rx) = ProgressSender::channel();
        let status_path = tracker.status_path().clone();
        let consumer = tokio::spawn(tracker.run(rx));
        let outcome = self.engine.run_job(job_id, &progress, &cancel).await;
        drop(progress);
        let tracker = match consumer.await {
            Ok(tracker) => tracker,
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Status consumer panicked");
                self.revokers.write().await.remove(&job_id);
                return;
            }
        };

        let finalization = if cancel.is_cancelled() {
            // dismissed mid-flight: the record was already marked by Tier 1
            let _ = tracker.abandon().await;
            Ok(None)
        } else {
            match outcome {
                Ok(results) => tracker.succeed(results).await.map(Some),
                Err(error) => {
                    let exception = JobException::new(error.code(), error.to_string());
                    tracker.fail(exception).await.map(Some)
                }
            }
        };
        match finalization {
            Ok(Some(job)) => self.write_status_document(&job, &status_path).await,
            Ok(None) => {}
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Cannot persist terminal job state")
            }
        }
        self.revokers.write().await.remove(&job_id);
    }

    /// Persist the last WPS status document next to the job log
    async fn write_status_document(&self, job: &tellus_core::Job, status_path: &std::path::Path) {
        let config = self.engine.config();
        let status_url = format!("{}/{}.xml", config.job_output_url(&job.id), job.id);
        let xml = tellus_wps1::execute_response_xml(job, &status_url);
        if let Err(e) = tokio::fs::write(status_path, xml).await {
            warn!(job_id = %job.id, error = %e, "Cannot write status document");
        }
    }
}

#[async_trait]
impl JobRunner for WorkerPool {
    async fn submit(&self, job_id: Uuid) -> Result<String> {
        let (revoke_tx, _) = watch::channel(false);
        self.revokers.write().await.insert(job_id, revoke_tx);
        self.queue_tx
            .send(job_id)
            .map_err(|_| EngineError::execution("job queue is closed"))?;
        Ok(format!("task-{job_id}"))
    }

    async fn cancel(&self, job_id: Uuid) -> Result<()> {
        let revokers = self.revokers.read().await;
        match revokers.get(&job_id) {
            Some(revoke_tx) => {
                let _ = revoke_tx.send(true);
                Ok(())
            }
            // never queued or already finished; nothing to revoke
            None => Ok(()),
        }
    }

    async fn is_active(&self, job_id: Uuid) -> bool {
        self.revokers.read().await.contains_key(&job_id)
    }
}
