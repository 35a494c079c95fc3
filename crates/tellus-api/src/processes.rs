// Process CRUD and job-submission HTTP routes

use crate::error::{ApiError, ApiResult};
use crate::services::{JobService, ProcessService};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tellus_core::Visibility;
use tellus_storage::JobFilter;
use utoipa::ToSchema;

/// App state
#[derive(Clone)]
pub struct AppState {
    pub processes: Arc<ProcessService>,
    pub jobs: Arc<JobService>,
}

/// Query parameters for deployment
#[derive(Debug, Deserialize, ToSchema)]
pub struct DeployParams {
    #[serde(default)]
    pub overwrite: bool,
}

/// Body for changing a process visibility
#[derive(Debug, Deserialize, ToSchema)]
pub struct VisibilityBody {
    pub value: Visibility,
}

/// Query parameters for listing a process's jobs
#[derive(Debug, Deserialize, ToSchema)]
pub struct ListJobsParams {
    pub status: Option<String>,
    #[serde(default)]
    pub page: usize,
    pub limit: Option<usize>,
}

/// Create process routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/processes", get(list_processes).post(deploy_process))
        .route(
            "/processes/:process_id",
            get(describe_process).delete(undeploy_process),
        )
        .route("/processes/:process_id/package", get(get_package))
        .route(
            "/processes/:process_id/visibility",
            get(get_visibility).put(set_visibility),
        )
        .route(
            "/processes/:process_id/jobs",
            get(list_process_jobs).post(submit_job),
        )
        .with_state(state)
}

/// GET /processes - list deployed processes
#[utoipa::path(
    get,
    path = "/processes",
    responses(
        (status = 200, description = "List of process summaries"),
        (status = 500, description = "Internal server error")
    ),
    tag = "processes"
)]
pub async fn list_processes(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let processes = state.processes.list(None).await?;
    let summaries: Vec<Value> = processes
        .iter()
        .map(|p| {
            json!({
                "id": p.id,
                "title": p.title,
                "abstract": p.abstract_,
                "version": p.version,
                "keywords": p.keywords,
                "type": p.process_type,
            })
        })
        .collect();
    Ok(Json(json!({ "processes": summaries })))
}

/// POST /processes - deploy a process
#[utoipa::path(
    post,
    path = "/processes",
    params(("overwrite" = Option<bool>, Query, description = "Replace an existing process")),
    responses(
        (status = 201, description = "Process deployed"),
        (status = 400, description = "Invalid identifier"),
        (status = 409, description = "Duplicate process without overwrite"),
        (status = 422, description = "Invalid package")
    ),
    tag = "processes"
)]
pub async fn deploy_process(
    State(state): State<AppState>,
    Query(params): Query<DeployParams>,
    Json(payload): Json<Value>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let process = state.processes.deploy(payload, params.overwrite).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": process.id,
            "deploymentDone": true,
            "processSummary": {"id": process.id, "title": process.title},
        })),
    ))
}

/// GET /processes/{process_id} - process description
#[utoipa::path(
    get,
    path = "/processes/{process_id}",
    params(("process_id" = String, Path, description = "Process identifier")),
    responses(
        (status = 200, description = "Process description"),
        (status = 404, description = "Process not found")
    ),
    tag = "processes"
)]
pub async fn describe_process(
    State(state): State<AppState>,
    Path(process_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let process = state.processes.fetch(&process_id).await?;
    Ok(Json(process.describe_json()))
}

/// DELETE /processes/{process_id} - undeploy
#[utoipa::path(
    delete,
    path = "/processes/{process_id}",
    params(("process_id" = String, Path, description = "Process identifier")),
    responses(
        (status = 200, description = "Process undeployed"),
        (status = 403, description = "Builtin process protected"),
        (status = 404, description = "Process not found")
    ),
    tag = "processes"
)]
pub async fn undeploy_process(
    State(state): State<AppState>,
    Path(process_id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.processes.undeploy(&process_id).await?;
    Ok(Json(json!({"id": process_id, "undeploymentDone": true})))
}

/// GET /processes/{process_id}/package - raw application package
#[utoipa::path(
    get,
    path = "/processes/{process_id}/package",
    params(("process_id" = String, Path, description = "Process identifier")),
    responses(
        (status = 200, description = "Verbatim application package"),
        (status = 404, description = "Process not found")
    ),
    tag = "processes"
)]
pub async fn get_package(
    State(state): State<AppState>,
    Path(process_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let process = state.processes.fetch(&process_id).await?;
    Ok(Json(process.package))
}

/// GET /processes/{process_id}/visibility
#[utoipa::path(
    get,
    path = "/processes/{process_id}/visibility",
    params(("process_id" = String, Path, description = "Process identifier")),
    responses(
        (status = 200, description = "Current visibility"),
        (status = 404, description = "Process not found")
    ),
    tag = "processes"
)]
pub async fn get_visibility(
    State(state): State<AppState>,
    Path(process_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let visibility = state.processes.get_visibility(&process_id).await?;
    Ok(Json(json!({"value": visibility})))
}

/// PUT /processes/{process_id}/visibility
#[utoipa::path(
    put,
    path = "/processes/{process_id}/visibility",
    params(("process_id" = String, Path, description = "Process identifier")),
    request_body = VisibilityBody,
    responses(
        (status = 200, description = "Visibility changed"),
        (status = 403, description = "Builtin process protected"),
        (status = 404, description = "Process not found")
    ),
    tag = "processes"
)]
pub async fn set_visibility(
    State(state): State<AppState>,
    Path(process_id): Path<String>,
    Json(body): Json<VisibilityBody>,
) -> ApiResult<Json<Value>> {
    let visibility = state
        .processes
        .set_visibility(&process_id, body.value)
        .await?;
    Ok(Json(json!({"value": visibility})))
}

/// POST /processes/{process_id}/jobs - submit a job
#[utoipa::path(
    post,
    path = "/processes/{process_id}/jobs",
    params(("process_id" = String, Path, description = "Process identifier")),
    responses(
        (status = 201, description = "Job accepted", headers(("Location" = String, description = "Job status URL"))),
        (status = 404, description = "Process not found")
    ),
    tag = "jobs"
)]
pub async fn submit_job(
    State(state): State<AppState>,
    Path(process_id): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<impl IntoResponse> {
    let job = state.jobs.submit(&process_id, None, &body).await?;
    let location = state.jobs.job_location(job.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location.clone())],
        Json(json!({
            "jobID": job.id,
            "processID": job.process,
            "status": job.status,
            "location": location,
        })),
    ))
}

/// GET /processes/{process_id}/jobs - list jobs of one process
#[utoipa::path(
    get,
    path = "/processes/{process_id}/jobs",
    params(
        ("process_id" = String, Path, description = "Process identifier"),
        ("status" = Option<String>, Query, description = "Filter by status"),
        ("page" = Option<usize>, Query, description = "Page number"),
        ("limit" = Option<usize>, Query, description = "Page size")
    ),
    responses(
        (status = 200, description = "Job listing"),
        (status = 404, description = "Process not found")
    ),
    tag = "jobs"
)]
pub async fn list_process_jobs(
    State(state): State<AppState>,
    Path(process_id): Path<String>,
    Query(params): Query<ListJobsParams>,
) -> ApiResult<Json<Value>> {
    // unknown process id yields an empty page rather than leaking ids
    state.processes.fetch(&process_id).await?;
    let status = match params.status.as_deref() {
        Some(status) => Some(
            status
                .parse()
                .map_err(|e: String| ApiError::bad_request(e))?,
        ),
        None => None,
    };
    let filter = JobFilter {
        process: Some(process_id),
        status,
        page: params.page,
        limit: params.limit,
        ..Default::default()
    };
    let jobs = state.jobs.list(&filter).await?;
    let entries: Vec<Value> = jobs
        .iter()
        .map(|job| job.status_json(&state.jobs.job_location(job.id)))
        .collect();
    Ok(Json(json!({
        "jobs": entries,
        "page": params.page,
        "count": entries.len(),
    })))
}
