// Job lifecycle HTTP routes

use crate::error::{ApiError, ApiResult};
use crate::services::JobService;
use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tellus_core::EngineError;
use uuid::Uuid;

/// App state
#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<JobService>,
}

/// Create job routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/jobs/:job_id", get(get_job).delete(dismiss_job))
        .route("/jobs/:job_id/results", get(get_results))
        .route("/jobs/:job_id/exceptions", get(get_exceptions))
        .route("/jobs/:job_id/logs", get(get_logs))
        .with_state(state)
}

/// GET /jobs/{job_id} - job status
#[utoipa::path(
    get,
    path = "/jobs/{job_id}",
    params(("job_id" = Uuid, Path, description = "Job identifier")),
    responses(
        (status = 200, description = "Job status document"),
        (status = 404, description = "Job not found")
    ),
    tag = "jobs"
)]
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let job = state.jobs.fetch(job_id).await?;
    Ok(Json(job.status_json(&state.jobs.job_location(job_id))))
}

/// DELETE /jobs/{job_id} - dismiss
#[utoipa::path(
    delete,
    path = "/jobs/{job_id}",
    params(("job_id" = Uuid, Path, description = "Job identifier")),
    responses(
        (status = 200, description = "Job dismissed"),
        (status = 404, description = "Job not found")
    ),
    tag = "jobs"
)]
pub async fn dismiss_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let job = match state.jobs.dismiss(job_id).await {
        Ok(job) => job,
        // succeeded/failed jobs are not cancellable
        Err(EngineError::PackageExecution(message)) => {
            return Err(ApiError::bad_request(message))
        }
        Err(other) => return Err(other.into()),
    };
    Ok(Json(json!({
        "jobID": job.id,
        "status": job.status,
        "message": "Job dismissed",
    })))
}

/// GET /jobs/{job_id}/results
#[utoipa::path(
    get,
    path = "/jobs/{job_id}/results",
    params(("job_id" = Uuid, Path, description = "Job identifier")),
    responses(
        (status = 200, description = "Job results"),
        (status = 404, description = "Job not found")
    ),
    tag = "jobs"
)]
pub async fn get_results(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    Ok(Json(state.jobs.results(job_id).await?))
}

/// GET /jobs/{job_id}/exceptions
#[utoipa::path(
    get,
    path = "/jobs/{job_id}/exceptions",
    params(("job_id" = Uuid, Path, description = "Job identifier")),
    responses(
        (status = 200, description = "Job exceptions"),
        (status = 404, description = "Job not found")
    ),
    tag = "jobs"
)]
pub async fn get_exceptions(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    Ok(Json(state.jobs.exceptions(job_id).await?))
}

/// GET /jobs/{job_id}/logs
#[utoipa::path(
    get,
    path = "/jobs/{job_id}/logs",
    params(("job_id" = Uuid, Path, description = "Job identifier")),
    responses(
        (status = 200, description = "Job log lines"),
        (status = 404, description = "Job not found")
    ),
    tag = "jobs"
)]
pub async fn get_logs(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let logs = state.jobs.logs(job_id).await?;
    Ok(Json(json!({"logs": logs})))
}
