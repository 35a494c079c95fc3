// Engine configuration
//
// EngineConfig is an immutable value built once (usually from the
// environment) and passed at engine construction. Nothing in the engine
// reads configuration from globals.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Role the engine plays in a deployment.
///
/// An EMS dispatches workflows to remote providers; an ADES deploys and runs
/// application packages locally. Hybrid does both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineRole {
    Ems,
    Ades,
    Hybrid,
}

impl EngineRole {
    /// Workflow deployment is an EMS capability
    pub fn accepts_workflows(&self) -> bool {
        matches!(self, EngineRole::Ems | EngineRole::Hybrid)
    }
}

/// Retry policy for remote HTTP dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt
    pub count: u32,
    /// Backoff before the first retry; doubles on each subsequent retry
    pub backoff_start: Duration,
}

impl RetryPolicy {
    /// Backoff to wait before retry `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_start * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            count: 3,
            backoff_start: Duration::from_secs(2),
        }
    }
}

/// Wait-interval schedule for polling long-running remote jobs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSchedule {
    intervals: Vec<Duration>,
}

impl PollSchedule {
    pub fn new(intervals: Vec<Duration>) -> Self {
        debug_assert!(!intervals.is_empty());
        Self { intervals }
    }

    /// Interval to wait before poll `attempt` (0-based); past the end of the
    /// schedule the last interval repeats indefinitely.
    pub fn wait_for(&self, attempt: usize) -> Duration {
        self.intervals
            .get(attempt)
            .or_else(|| self.intervals.last())
            .copied()
            .unwrap_or(Duration::from_secs(30))
    }
}

impl Default for PollSchedule {
    fn default() -> Self {
        let mut intervals = Vec::with_capacity(21);
        for secs in [2u64, 5, 10, 20] {
            intervals.extend(std::iter::repeat(Duration::from_secs(secs)).take(5));
        }
        intervals.push(Duration::from_secs(30));
        Self { intervals }
    }
}

/// Immutable engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// EMS / ADES / hybrid role
    pub role: EngineRole,
    /// Directory holding per-job output folders and status files
    pub output_dir: PathBuf,
    /// Public URL base under which `output_dir` is served
    pub output_url: String,
    /// Public base URL of the REST API
    pub base_url: String,
    /// Path of the WPS-1 endpoint relative to `base_url`
    pub wps_path: String,
    /// Scratch directory for resolved sub-packages
    pub scratch_dir: PathBuf,
    /// Number of Tier-2 job workers
    pub worker_count: usize,
    /// Remote HTTP connect timeout
    pub connect_timeout: Duration,
    /// Remote HTTP read timeout
    pub read_timeout: Duration,
    /// Retry policy for remote dispatch
    pub retry: RetryPolicy,
    /// Polling schedule for remote job status
    pub poll: PollSchedule,
    /// Optional per-job polling ceiling
    pub job_timeout: Option<Duration>,
    /// OpenSearch catalogue endpoint for EO-image input resolution
    pub opensearch_url: Option<String>,
}

impl EngineConfig {
    /// Load configuration from the environment, with defaults for anything
    /// unset. `TELLUS_ROLE` ∈ {ems, ades, hybrid}.
    pub fn from_env() -> Self {
        let role = match std::env::var("TELLUS_ROLE").as_deref() {
            Ok("ems") => EngineRole::Ems,
            Ok("ades") => EngineRole::Ades,
            _ => EngineRole::Hybrid,
        };
        let base_url = std::env::var("TELLUS_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:4001".to_string());
        let output_dir = std::env::var("TELLUS_OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir().join("tellus-outputs"));
        let output_url = std::env::var("TELLUS_OUTPUT_URL")
            .unwrap_or_else(|_| format!("{}/outputs", base_url.trim_end_matches('/')));
        let scratch_dir = std::env::var("TELLUS_SCRATCH_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir().join("tellus-packages"));
        let worker_count = std::env::var("TELLUS_WORKERS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(4);

        Self {
            role,
            output_dir,
            output_url,
            base_url,
            wps_path: "/ows/wps".to_string(),
            scratch_dir,
            worker_count,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            poll: PollSchedule::default(),
            job_timeout: None,
            opensearch_url: std::env::var("TELLUS_OPENSEARCH_URL").ok(),
        }
    }

    /// Absolute URL of the WPS-1 endpoint
    pub fn wps_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.wps_path)
    }

    /// Public URL under which a job's outputs are served
    pub fn job_output_url(&self, job_id: &uuid::Uuid) -> String {
        format!("{}/{}", self.output_url.trim_end_matches('/'), job_id)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            role: EngineRole::Hybrid,
            output_dir: std::env::temp_dir().join("tellus-outputs"),
            output_url: "http://localhost:4001/outputs".to_string(),
            base_url: "http://localhost:4001".to_string(),
            wps_path: "/ows/wps".to_string(),
            scratch_dir: std::env::temp_dir().join("tellus-packages"),
            worker_count: 4,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            poll: PollSchedule::default(),
            job_timeout: None,
            opensearch_url: None,
        }
    }
}
