// ESGF-CWT execution client
//
// ESGF compute nodes speak WPS 1.0 with two twists: requests carry an API
// key, and inputs are packed into a single `document` literal holding a
// JSON structure of domain/variable/operation. Status documents are plain
// WPS, so polling reuses the WPS-1 parser.

use serde_json::{json, Value};
use std::time::Duration;
use tellus_core::{EngineError, Result};
use tellus_wps1::execute::{build_execute_request, parse_execute_response, ExecuteInput};
use tellus_wps1::ExecuteStatus;
use tracing::debug;

/// ESGF operation inputs packed into the execute document
#[derive(Debug, Clone, Default)]
pub struct EsgfOperation {
    /// Dataset/variable references (`uri|var_name` pairs)
    pub variables: Vec<Value>,
    /// Spatial/temporal domains
    pub domains: Vec<Value>,
    /// Remaining literal parameters
    pub parameters: Vec<(String, Value)>,
}

impl EsgfOperation {
    /// Serialize into the three stacked JSON documents the CWT API expects
    pub fn to_inputs(&self, process: &str) -> Vec<ExecuteInput> {
        let operation = json!([{
            "name": process,
            "input": self.variables.iter().filter_map(|v| v.get("name")).collect::<Vec<_>>(),
            "domain": self.domains.first().and_then(|d| d.get("name")),
            "parameters": self.parameters.iter().map(|(k, v)| json!({k: v})).collect::<Vec<_>>(),
        }]);
        vec![
            ExecuteInput::Literal {
                id: "variable".into(),
                value: json!(self.variables).to_string(),
            },
            ExecuteInput::Literal {
                id: "domain".into(),
                value: json!(self.domains).to_string(),
            },
            ExecuteInput::Literal {
                id: "operation".into(),
                value: operation.to_string(),
            },
        ]
    }
}

/// Client for one ESGF-CWT compute endpoint
#[derive(Clone)]
pub struct EsgfClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl EsgfClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        Self::with_timeouts(
            base_url,
            api_key,
            Duration::from_secs(10),
            Duration::from_secs(60),
        )
    }

    pub fn with_timeouts(
        base_url: impl Into<String>,
        api_key: Option<String>,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(read_timeout)
            .build()
            .map_err(|e| EngineError::communication(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key,
        })
    }

    /// Submit an asynchronous execute request for an ESGF operation
    pub async fn execute(&self, process: &str, operation: &EsgfOperation) -> Result<ExecuteStatus> {
        let inputs = operation.to_inputs(process);
        let body = build_execute_request(process, &inputs, &["output".to_string()]);
        debug!(process, url = %self.base_url, "Dispatching ESGF-CWT execute");
        let mut request = self
            .http
            .post(&self.base_url)
            .header(reqwest::header::CONTENT_TYPE, "text/xml")
            .body(body);
        if let Some(api_key) = &self.api_key {
            request = request.header("COMPUTE-TOKEN", api_key.clone());
        }
        let response = request
            .send()
            .await
            .map_err(|e| EngineError::communication(e.to_string()))?;
        let xml = response
            .text()
            .await
            .map_err(|e| EngineError::communication(e.to_string()))?;
        parse_execute_response(&xml)
    }

    /// Fetch a stored status document
    pub async fn fetch_status(&self, status_location: &str) -> Result<ExecuteStatus> {
        let mut request = self.http.get(status_location);
        if let Some(api_key) = &self.api_key {
            request = request.header("COMPUTE-TOKEN", api_key.clone());
        }
        let response = request
            .send()
            .await
            .map_err(|e| EngineError::communication(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::communication(format!(
                "HTTP status {} from {status_location}",
                status.as_u16()
            )));
        }
        let xml = response
            .text()
            .await
            .map_err(|e| EngineError::communication(e.to_string()))?;
        parse_execute_response(&xml)
    }
}
