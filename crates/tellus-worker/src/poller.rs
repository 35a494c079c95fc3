// Remote status polling
//
// Bounded-backoff wait schedule; on transport failure the status document
// is read from the local output volume, since status-location URLs may
// resolve to a file served from it.

use crate::queue::CancelToken;
use crate::tracker::ProgressSender;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Instant;
use tellus_core::status::{PROGRESS_CONVERT_INPUT, PROGRESS_EXEC_DONE};
use tellus_core::{
    map_progress, EngineConfig, EngineError, JobStatus, Result,
};
use tellus_wps1::{parse_execute_response, ExecuteStatus};
use tracing::{debug, warn};

/// Fetches one status document from its location
#[async_trait]
pub trait StatusFetcher: Send + Sync {
    async fn fetch(&self, status_location: &str) -> Result<ExecuteStatus>;
}

/// Poll a remote job until it reaches a terminal status.
///
/// Progress reported by the remote is mapped into the execute slice so the
/// local job never overshoots it. A cancelled job stops being tracked; the
/// remote execution is left to run (WPS-1 has no cancel).
pub async fn poll_until_terminal(
    fetcher: &dyn StatusFetcher,
    status_location: &str,
    config: &EngineConfig,
    progress: &ProgressSender,
    cancel: &CancelToken,
) -> Result<ExecuteStatus> {
    let started = Instant::now();
    let mut attempt = 0usize;
    loop {
        if let Some(ceiling) = config.job_timeout {
            if started.elapsed() > ceiling {
                return Err(EngineError::communication(format!(
                    "remote execution exceeded the {}s polling ceiling",
                    ceiling.as_secs()
                )));
            }
        }
        tokio::time::sleep(config.poll.wait_for(attempt)).await;
        attempt += 1;

        if cancel.is_cancelled() {
            warn!(status_location, "orphaned remote execution");
            return Err(EngineError::execution("job dismissed while polling"));
        }

        let status = match fetcher.fetch(status_location).await {
            Ok(status) => status,
            Err(transport) => {
                match read_local_status(status_location, config).await {
                    Some(status) => status,
                    None => {
                        debug!(status_location, error = %transport, "Status fetch failed, will repoll");
                        continue;
                    }
                }
            }
        };

        let mapped = status.status.effective();
        let remote_progress = status.progress.unwrap_or(0);
        progress.send(
            JobStatus::Running,
            map_progress(
                f64::from(remote_progress),
                PROGRESS_CONVERT_INPUT,
                PROGRESS_EXEC_DONE,
            ),
            if status.message.is_empty() {
                format!("remote status: {mapped}")
            } else {
                status.message.clone()
            },
        );

        if status.is_terminal() {
            return Ok(status);
        }
    }
}

/// Resolve a status-location URL to a file on the shared output volume
fn local_status_path(status_location: &str, config: &EngineConfig) -> Option<PathBuf> {
    if let Some(path) = status_location.strip_prefix("file://") {
        return Some(PathBuf::from(path));
    }
    let base = config.output_url.trim_end_matches('/');
    let suffix = status_location.strip_prefix(base)?;
    Some(config.output_dir.join(suffix.trim_start_matches('/')))
}

async fn read_local_status(
    status_location: &str,
    config: &EngineConfig,
) -> Option<ExecuteStatus> {
    let path = local_status_path(status_location, config)?;
    let xml = tokio::fs::read_to_string(&path).await.ok()?;
    debug!(status_location, path = %path.display(), "Resolved status from local file");
    parse_execute_response(&xml).ok()
}
