// Tellus API server
//
// Tier 1: deploy/describe/submit/dismiss handlers over axum, the OWS WPS-1
// endpoint, and the Swagger UI. Tier 2 (the worker pool) runs in-process;
// submit enqueues and returns 201 with the job location.

mod error;
mod jobs;
mod ows;
mod processes;
mod providers;
mod services;

use anyhow::{Context, Result};
use axum::{routing::get, Router};
use services::{JobService, ProcessService};
use std::sync::Arc;
use tellus_core::EngineConfig;
use tellus_storage::Repositories;
use tellus_worker::{ExecutionEngine, WorkerPool};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        processes::list_processes,
        processes::deploy_process,
        processes::describe_process,
        processes::undeploy_process,
        processes::get_package,
        processes::get_visibility,
        processes::set_visibility,
        processes::submit_job,
        processes::list_process_jobs,
        jobs::get_job,
        jobs::dismiss_job,
        jobs::get_results,
        jobs::get_exceptions,
        jobs::get_logs,
        providers::list_providers,
        providers::register_provider,
        providers::list_remote_processes,
        providers::describe_remote_process,
        providers::submit_provider_job,
    ),
    components(
        schemas(
            error::ErrorEnvelope,
            processes::DeployParams,
            processes::VisibilityBody,
            processes::ListJobsParams,
            providers::RegisterProviderRequest,
        )
    ),
    tags(
        (name = "processes", description = "Process deployment and description"),
        (name = "jobs", description = "Job lifecycle endpoints"),
        (name = "providers", description = "Remote provider registry")
    ),
    info(
        title = "Tellus API",
        description = "Hybrid geospatial compute orchestrator (EMS/ADES)",
        license(name = "Apache-2.0")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tellus=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = EngineConfig::from_env();
    tracing::info!(
        role = ?config.role,
        output_dir = %config.output_dir.display(),
        workers = config.worker_count,
        "tellus-api starting"
    );
    tokio::fs::create_dir_all(&config.output_dir)
        .await
        .context("Cannot create output directory")?;
    tokio::fs::create_dir_all(&config.scratch_dir)
        .await
        .context("Cannot create scratch directory")?;

    // repositories (in-memory dev mode; a document store plugs in behind
    // the same traits)
    let repos = Repositories::in_memory();

    // Tier 2: execution engine + worker pool
    let engine = ExecutionEngine::new(config.clone(), repos.clone());
    let pool = WorkerPool::start(engine.clone());
    tracing::info!(workers = config.worker_count, "Worker pool started");

    // services
    let process_service = Arc::new(ProcessService::new(engine.clone()));
    let job_service = Arc::new(JobService::new(engine.clone(), pool));
    process_service.seed_builtins().await;

    // module states
    let processes_state = processes::AppState {
        processes: process_service.clone(),
        jobs: job_service.clone(),
    };
    let jobs_state = jobs::AppState {
        jobs: job_service.clone(),
    };
    let providers_state = providers::AppState {
        services: repos.services.clone(),
        jobs: job_service.clone(),
    };
    let ows_state = ows::AppState {
        processes: process_service,
        jobs: job_service,
        config: Arc::new(config.clone()),
    };

    // Build router
    let app = Router::new()
        .route("/", get(ows::landing).with_state(ows_state.clone()))
        .merge(processes::routes(processes_state))
        .merge(jobs::routes(jobs_state))
        .merge(providers::routes(providers_state))
        .merge(ows::routes(ows_state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = std::env::var("TELLUS_BIND").unwrap_or_else(|_| "0.0.0.0:4001".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
