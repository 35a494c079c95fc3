// WPS-1 HTTP client
//
// Thin transport layer: the worker drives retries and polling; this client
// does single request/response exchanges with the configured timeouts.

use crate::capabilities::{parse_capabilities, Capabilities};
use crate::describe::{parse_describe_process, RemoteProcessDescription};
use crate::execute::{build_execute_request, parse_execute_response, ExecuteInput, ExecuteStatus};
use std::time::Duration;
use tellus_core::{EngineError, Result};
use tracing::debug;

/// Client for one WPS-1 provider endpoint
#[derive(Clone)]
pub struct Wps1Client {
    http: reqwest::Client,
    base_url: String,
}

impl Wps1Client {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeouts(base_url, Duration::from_secs(10), Duration::from_secs(60))
    }

    pub fn with_timeouts(
        base_url: impl Into<String>,
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
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GetCapabilities` request
    pub async fn get_capabilities(&self) -> Result<Capabilities> {
        let xml = self
            .get_kvp(&[("service", "wps"), ("request", "getcapabilities"), ("version", "1.0.0")])
            .await?;
        parse_capabilities(&xml)
    }

    /// `DescribeProcess` request for one process
    pub async fn describe_process(&self, process_id: &str) -> Result<RemoteProcessDescription> {
        let xml = self
            .get_kvp(&[
                ("service", "wps"),
                ("request", "describeprocess"),
                ("version", "1.0.0"),
                ("identifier", process_id),
            ])
            .await?;
        let mut parsed = parse_describe_process(&xml)?;
        match parsed.len() {
            1 => Ok(parsed.remove(0)),
            0 => Err(EngineError::ProcessNotFound(process_id.to_string())),
            n => Err(EngineError::communication(format!(
                "DescribeProcess for '{process_id}' returned {n} descriptions"
            ))),
        }
    }

    /// Raw `DescribeProcess` XML (used by the importer)
    pub async fn describe_process_xml(&self, process_id: &str) -> Result<String> {
        self.get_kvp(&[
            ("service", "wps"),
            ("request", "describeprocess"),
            ("version", "1.0.0"),
            ("identifier", process_id),
        ])
        .await
    }

    /// Submit an asynchronous Execute request
    pub async fn execute(
        &self,
        process_id: &str,
        inputs: &[ExecuteInput],
        output_ids: &[String],
    ) -> Result<ExecuteStatus> {
        let body = build_execute_request(process_id, inputs, output_ids);
        debug!(process = process_id, url = %self.base_url, "Dispatching WPS-1 execute");
        let response = self
            .http
            .post(&self.base_url)
            .header(reqwest::header::CONTENT_TYPE, "text/xml")
            .body(body)
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        let xml = response.text().await.map_err(transport_error)?;
        if !status.is_success() && xml.is_empty() {
            return Err(EngineError::communication(format!(
                "execute returned {status}"
            )));
        }
        parse_execute_response(&xml)
    }

    /// Fetch a stored status document
    pub async fn fetch_status(&self, status_location: &str) -> Result<ExecuteStatus> {
        let response = self
            .http
            .get(status_location)
            .send()
            .await
            .map_err(transport_error)?;
        let xml = check_status(response)?.text().await.map_err(transport_error)?;
        parse_execute_response(&xml)
    }

    async fn get_kvp(&self, params: &[(&str, &str)]) -> Result<String> {
        let response = self
            .http
            .get(&self.base_url)
            .query(params)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response)?.text().await.map_err(transport_error)
    }
}

fn transport_error(e: reqwest::Error) -> EngineError {
    EngineError::communication(e.to_string())
}

/// Reject non-success responses with the status stamped for the retry
/// classifier
pub(crate) fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(EngineError::communication(format!(
            "HTTP status {} from {}",
            status.as_u16(),
            response.url()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CAPS: &str = r#"<wps:Capabilities xmlns:wps="http://www.opengis.net/wps/1.0.0" xmlns:ows="http://www.opengis.net/ows/1.1">
      <wps:ProcessOfferings>
        <wps:Process><ows:Identifier>averager</ows:Identifier><ows:Title>Averager</ows:Title></wps:Process>
      </wps:ProcessOfferings>
    </wps:Capabilities>"#;

    #[tokio::test]
    async fn test_get_capabilities_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("request", "getcapabilities"))
            .respond_with(ResponseTemplate::new(200).set_body_string(CAPS))
            .mount(&server)
            .await;

        let client = Wps1Client::new(server.uri()).unwrap();
        let caps = client.get_capabilities().await.unwrap();
        assert_eq!(caps.processes.len(), 1);
        assert_eq!(caps.processes[0].id, "averager");
    }

    #[tokio::test]
    async fn test_transport_error_is_communication_failure() {
        let client = Wps1Client::new("http://127.0.0.1:1/wps").unwrap();
        let err = client.get_capabilities().await.unwrap_err();
        assert!(matches!(err, EngineError::CommunicationFailure(_)));
    }
}
