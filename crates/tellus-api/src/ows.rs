// WPS 1.0 KVP endpoint
//
// The same engine answers OGC WPS GET requests at /ows/wps. Callers here
// are anonymous: private processes are omitted from the capabilities,
// described as unknown, and refused execution.

use crate::error::ApiResult;
use crate::services::{JobService, ProcessService};
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tellus_core::{EngineConfig, Process, Visibility};
use tellus_wps1::{capabilities_xml, describe_xml, exception_xml, execute_response_xml};
use tracing::debug;

/// App state
#[derive(Clone)]
pub struct AppState {
    pub processes: Arc<ProcessService>,
    pub jobs: Arc<JobService>,
    pub config: Arc<EngineConfig>,
}

/// Create the OWS route
pub fn routes(state: AppState) -> Router {
    let path = state.config.wps_path.clone();
    Router::new().route(&path, get(handle_wps)).with_state(state)
}

fn xml_response(status: StatusCode, body: String) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "text/xml; charset=UTF-8")],
        body,
    )
        .into_response()
}

fn ows_exception(status: StatusCode, code: &str, locator: Option<&str>, text: &str) -> Response {
    xml_response(status, exception_xml(code, locator, text))
}

/// Case-insensitive KVP lookup
fn param<'a>(params: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

pub async fn handle_wps(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if !param(&params, "service")
        .map(|s| s.eq_ignore_ascii_case("wps"))
        .unwrap_or(false)
    {
        return ows_exception(
            StatusCode::BAD_REQUEST,
            "MissingParameterValue",
            Some("service"),
            "service=WPS is required",
        );
    }
    let request = param(&params, "request").unwrap_or("").to_ascii_lowercase();
    debug!(request = %request, "OWS WPS request");
    match request.as_str() {
        "getcapabilities" => get_capabilities(&state).await,
        "describeprocess" => describe_process(&state, &params).await,
        "execute" => execute(&state, &params).await,
        other => ows_exception(
            StatusCode::BAD_REQUEST,
            "OperationNotSupported",
            Some("request"),
            &format!("unsupported request '{other}'"),
        ),
    }
}

async fn public_processes(state: &AppState) -> ApiResult<Vec<Process>> {
    Ok(state.processes.list(Some(Visibility::Public)).await?)
}

async fn get_capabilities(state: &AppState) -> Response {
    match public_processes(state).await {
        Ok(processes) => xml_response(
            StatusCode::OK,
            capabilities_xml("Tellus WPS", &state.config.wps_url(), &processes),
        ),
        Err(_) => ows_exception(
            StatusCode::INTERNAL_SERVER_ERROR,
            "NoApplicableCode",
            None,
            "capabilities unavailable",
        ),
    }
}

async fn describe_process(state: &AppState, params: &HashMap<String, String>) -> Response {
    let Some(identifiers) = param(params, "identifier") else {
        return ows_exception(
            StatusCode::BAD_REQUEST,
            "MissingParameterValue",
            Some("identifier"),
            "identifier is required",
        );
    };
    let mut described = Vec::new();
    for id in identifiers.split(',').map(str::trim) {
        match state.processes.fetch(id).await {
            Ok(process) if process.visibility == Visibility::Public => described.push(process),
            // private processes are indistinguishable from unknown ones
            _ => {
                return ows_exception(
                    StatusCode::BAD_REQUEST,
                    "InvalidParameterValue",
                    Some(id),
                    "Unknown process",
                )
            }
        }
    }
    xml_response(StatusCode::OK, describe_xml(&described))
}

async fn execute(state: &AppState, params: &HashMap<String, String>) -> Response {
    let Some(identifier) = param(params, "identifier") else {
        return ows_exception(
            StatusCode::BAD_REQUEST,
            "MissingParameterValue",
            Some("identifier"),
            "identifier is required",
        );
    };
    let process = match state.processes.fetch(identifier).await {
        Ok(process) => process,
        Err(_) => {
            return ows_exception(
                StatusCode::BAD_REQUEST,
                "InvalidParameterValue",
                Some(identifier),
                "Unknown process",
            )
        }
    };
    if process.visibility != Visibility::Public {
        return ows_exception(
            StatusCode::FORBIDDEN,
            "AccessForbidden",
            Some(identifier),
            "process is not accessible",
        );
    }

    let inputs: Vec<serde_json::Value> = param(params, "datainputs")
        .map(parse_data_inputs)
        .unwrap_or_default();
    let body = json!({"inputs": inputs, "mode": "sync"});
    match state.jobs.submit(identifier, None, &body).await {
        Ok(job) => {
            let status_url = format!("{}/{}.xml", state.config.job_output_url(&job.id), job.id);
            xml_response(StatusCode::OK, execute_response_xml(&job, &status_url))
        }
        Err(e) => ows_exception(
            StatusCode::BAD_REQUEST,
            "NoApplicableCode",
            Some(identifier),
            &e.to_string(),
        ),
    }
}

/// `k1=v1;k2=v2` data inputs
fn parse_data_inputs(datainputs: &str) -> Vec<serde_json::Value> {
    datainputs
        .split(';')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some(json!({"id": key, "data": value}))
        })
        .collect()
}

// landing document for the API root
pub async fn landing(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "title": "Tellus",
        "description": "Hybrid geospatial compute orchestrator (EMS/ADES)",
        "links": [
            {"rel": "processes", "href": format!("{}/processes", state.config.base_url.trim_end_matches('/'))},
            {"rel": "providers", "href": format!("{}/providers", state.config.base_url.trim_end_matches('/'))},
            {"rel": "service", "href": state.config.wps_url()},
            {"rel": "api-doc", "href": format!("{}/api-doc/openapi.json", state.config.base_url.trim_end_matches('/'))},
        ]
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_data_inputs() {
        let inputs = parse_data_inputs("message=Dummy message;count=3");
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0], json!({"id": "message", "data": "Dummy message"}));
        assert_eq!(inputs[1], json!({"id": "count", "data": "3"}));
    }

    #[test]
    fn test_parse_data_inputs_tolerates_noise() {
        let inputs = parse_data_inputs(";=x;ok=1");
        assert_eq!(inputs, vec![json!({"id": "ok", "data": "1"})]);
    }
}
