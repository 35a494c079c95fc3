// Remote provider (service) HTTP routes
//
// Registration checks the endpoint by fetching its capabilities; the
// remote process listing and description go straight to the provider, and
// provider jobs run through the regular queue with `service` set.

use crate::error::ApiResult;
use crate::services::JobService;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tellus_core::{EngineError, Service, ServiceType};
use tellus_storage::ServiceStore;
use tellus_wps1::Wps1Client;
use utoipa::ToSchema;

/// App state
#[derive(Clone)]
pub struct AppState {
    pub services: Arc<dyn ServiceStore>,
    pub jobs: Arc<JobService>,
}

/// Request to register a provider
#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterProviderRequest {
    pub id: String,
    pub url: String,
    #[serde(rename = "type", default)]
    pub service_type: Option<ServiceType>,
    #[serde(default)]
    pub public: bool,
}

/// Create provider routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/providers", get(list_providers).post(register_provider))
        .route("/providers/:provider_id/processes", get(list_remote_processes))
        .route(
            "/providers/:provider_id/processes/:process_id",
            get(describe_remote_process),
        )
        .route(
            "/providers/:provider_id/processes/:process_id/jobs",
            axum::routing::post(submit_provider_job),
        )
        .with_state(state)
}

async fn fetch_service(state: &AppState, provider_id: &str) -> ApiResult<Service> {
    Ok(state
        .services
        .fetch_by_name(provider_id)
        .await?
        .ok_or_else(|| EngineError::ServiceNotFound(provider_id.to_string()))?)
}

/// GET /providers - list registered providers
#[utoipa::path(
    get,
    path = "/providers",
    responses((status = 200, description = "Registered providers")),
    tag = "providers"
)]
pub async fn list_providers(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let services = state.services.list_services().await?;
    let summaries: Vec<Value> = services.iter().map(Service::summary_json).collect();
    Ok(Json(json!({"providers": summaries})))
}

/// POST /providers - register a provider
#[utoipa::path(
    post,
    path = "/providers",
    request_body = RegisterProviderRequest,
    responses(
        (status = 201, description = "Provider registered"),
        (status = 400, description = "Invalid provider name"),
        (status = 503, description = "Provider unreachable")
    ),
    tag = "providers"
)]
pub async fn register_provider(
    State(state): State<AppState>,
    Json(request): Json<RegisterProviderRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let mut service = Service::new(
        &request.id,
        &request.url,
        request.service_type.unwrap_or(ServiceType::Wps),
    )?;
    service.public = request.public;

    // reject endpoints that do not answer a GetCapabilities
    let client = Wps1Client::new(&service.url)?;
    let capabilities = client.get_capabilities().await?;
    tracing::info!(
        provider = %service.name,
        processes = capabilities.processes.len(),
        "Registered remote provider"
    );

    state.services.save_service(service.clone(), false).await?;
    Ok((StatusCode::CREATED, Json(service.summary_json())))
}

/// GET /providers/{provider_id}/processes - processes offered remotely
#[utoipa::path(
    get,
    path = "/providers/{provider_id}/processes",
    params(("provider_id" = String, Path, description = "Provider identifier")),
    responses(
        (status = 200, description = "Remote process listing"),
        (status = 404, description = "Provider not found")
    ),
    tag = "providers"
)]
pub async fn list_remote_processes(
    State(state): State<AppState>,
    Path(provider_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let service = fetch_service(&state, &provider_id).await?;
    let client = Wps1Client::new(&service.url)?;
    let capabilities = client.get_capabilities().await?;
    let processes: Vec<Value> = capabilities
        .processes
        .iter()
        .map(|p| {
            json!({
                "id": p.id,
                "title": p.title,
                "abstract": p.abstract_,
                "version": p.version,
            })
        })
        .collect();
    Ok(Json(json!({"processes": processes})))
}

/// GET /providers/{provider_id}/processes/{process_id} - remote description
#[utoipa::path(
    get,
    path = "/providers/{provider_id}/processes/{process_id}",
    params(
        ("provider_id" = String, Path, description = "Provider identifier"),
        ("process_id" = String, Path, description = "Remote process identifier")
    ),
    responses(
        (status = 200, description = "Remote process description"),
        (status = 404, description = "Provider or process not found")
    ),
    tag = "providers"
)]
pub async fn describe_remote_process(
    State(state): State<AppState>,
    Path((provider_id, process_id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    let service = fetch_service(&state, &provider_id).await?;
    let client = Wps1Client::new(&service.url)?;
    let description = client.describe_process(&process_id).await?;
    Ok(Json(json!({"process": description.description})))
}

/// POST /providers/{provider_id}/processes/{process_id}/jobs - dispatch a
/// job to the provider
#[utoipa::path(
    post,
    path = "/providers/{provider_id}/processes/{process_id}/jobs",
    params(
        ("provider_id" = String, Path, description = "Provider identifier"),
        ("process_id" = String, Path, description = "Remote process identifier")
    ),
    responses(
        (status = 201, description = "Job accepted"),
        (status = 404, description = "Provider not found")
    ),
    tag = "providers"
)]
pub async fn submit_provider_job(
    State(state): State<AppState>,
    Path((provider_id, process_id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> ApiResult<impl IntoResponse> {
    fetch_service(&state, &provider_id).await?;
    let job = state
        .jobs
        .submit(&process_id, Some(provider_id), &body)
        .await?;
    let location = state.jobs.job_location(job.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location.clone())],
        Json(json!({
            "jobID": job.id,
            "processID": job.process,
            "providerID": job.service,
            "status": job.status,
            "location": location,
        })),
    ))
}
