// Remote WPS-1 backend
//
// Dispatches an Execute request to the provider, then polls the stored
// status document until terminal. Outputs come back as references or
// literals; the dispatcher maps them onto the job results.

use crate::marshal::{InputValue, ResolvedInput};
use crate::poller::{poll_until_terminal, StatusFetcher};
use crate::queue::CancelToken;
use crate::retry::with_retries;
use crate::tracker::ProgressSender;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tellus_core::{EngineConfig, EngineError, JobStatus, Result};
use tellus_wps1::{ExecuteInput, ExecuteStatus, Wps1Client};
use tracing::info;

/// Execute a process on a remote WPS-1 provider and wait for its outcome
pub async fn run_remote(
    provider: &str,
    process: &str,
    inputs: &[ResolvedInput],
    output_ids: &[String],
    config: &EngineConfig,
    progress: &ProgressSender,
    cancel: &CancelToken,
) -> Result<Map<String, Value>> {
    let client = Wps1Client::with_timeouts(provider, config.connect_timeout, config.read_timeout)?;
    let execute_inputs = to_execute_inputs(inputs);

    let submitted = with_retries(&config.retry, "wps1-execute", || {
        client.execute(process, &execute_inputs, output_ids)
    })
    .await?;
    info!(
        provider,
        process,
        status_location = ?submitted.status_location,
        "Remote WPS-1 execution submitted"
    );
    progress.send(
        JobStatus::Running,
        tellus_core::status::PROGRESS_CONVERT_INPUT,
        format!("Remote execution submitted to {provider}"),
    );

    let terminal = if submitted.is_terminal() {
        submitted
    } else {
        let status_location = submitted.status_location.clone().ok_or_else(|| {
            EngineError::communication("remote response carries no statusLocation to poll")
        })?;
        let fetcher = ClientFetcher { client };
        poll_until_terminal(&fetcher, &status_location, config, progress, cancel).await?
    };

    finish(terminal)
}

/// Turn a terminal remote status into the produced-output map
pub fn finish(terminal: ExecuteStatus) -> Result<Map<String, Value>> {
    match terminal.status.effective() {
        JobStatus::Succeeded => {
            let mut produced = Map::new();
            for output in terminal.outputs {
                let value = match (output.reference, output.data) {
                    (Some(href), _) => {
                        let mut obj = Map::new();
                        obj.insert("location".into(), json!(href));
                        obj.insert("class".into(), json!("File"));
                        if let Some(mime_type) = output.mime_type {
                            obj.insert("format".into(), json!(mime_type));
                        }
                        Value::Object(obj)
                    }
                    (None, Some(data)) => json!(data),
                    (None, None) => Value::Null,
                };
                produced.insert(output.id, value);
            }
            Ok(produced)
        }
        _ => {
            let detail = if terminal.exceptions.is_empty() {
                terminal.message.clone()
            } else {
                terminal.exceptions.join("; ")
            };
            Err(EngineError::execution(format!(
                "remote execution failed: {detail}"
            )))
        }
    }
}

/// Marshalled inputs as WPS-1 execute inputs (one entry per occurrence)
pub fn to_execute_inputs(inputs: &[ResolvedInput]) -> Vec<ExecuteInput> {
    let mut execute_inputs = Vec::new();
    for input in inputs {
        for value in &input.values {
            execute_inputs.push(match value {
                InputValue::Literal(v) => ExecuteInput::Literal {
                    id: input.io.id.clone(),
                    value: match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    },
                },
                InputValue::Href { href, .. } => ExecuteInput::Reference {
                    id: input.io.id.clone(),
                    href: href.clone(),
                },
            });
        }
    }
    execute_inputs
}

struct ClientFetcher {
    client: Wps1Client,
}

#[async_trait]
impl StatusFetcher for ClientFetcher {
    async fn fetch(&self, status_location: &str) -> Result<ExecuteStatus> {
        self.client.fetch_status(status_location).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tellus_core::{IoDescription, LiteralType, PollSchedule};
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn resolved_literal(id: &str, value: &str) -> ResolvedInput {
        ResolvedInput {
            io: IoDescription::literal(id, LiteralType::String),
            values: vec![InputValue::Literal(json!(value))],
        }
    }

    #[tokio::test]
    async fn test_remote_round_trip() {
        let server = MockServer::start().await;
        let status_url = format!("{}/status/j1.xml", server.uri());
        let accepted = format!(
            r#"<wps:ExecuteResponse xmlns:wps="http://www.opengis.net/wps/1.0.0" xmlns:ows="http://www.opengis.net/ows/1.1" statusLocation="{status_url}">
            <wps:Status><wps:ProcessAccepted>queued</wps:ProcessAccepted></wps:Status>
            </wps:ExecuteResponse>"#
        );
        let succeeded = r#"<wps:ExecuteResponse xmlns:wps="http://www.opengis.net/wps/1.0.0" xmlns:ows="http://www.opengis.net/ows/1.1" xmlns:xlink="http://www.w3.org/1999/xlink">
            <wps:Status><wps:ProcessSucceeded>done</wps:ProcessSucceeded></wps:Status>
            <wps:ProcessOutputs><wps:Output>
              <ows:Identifier>output</ows:Identifier>
              <wps:Reference xlink:href="http://remote/out/r.nc" mimeType="application/x-netcdf"/>
            </wps:Output></wps:ProcessOutputs>
            </wps:ExecuteResponse>"#;

        Mock::given(method("POST"))
            .and(body_string_contains("subsetter"))
            .respond_with(ResponseTemplate::new(200).set_body_string(accepted))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/status/j1.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(succeeded))
            .mount(&server)
            .await;

        let config = EngineConfig {
            poll: PollSchedule::new(vec![Duration::from_millis(1)]),
            ..EngineConfig::default()
        };
        let (progress, _rx) = ProgressSender::channel();
        let produced = run_remote(
            &server.uri(),
            "subsetter",
            &[resolved_literal("variable", "tas")],
            &["output".to_string()],
            &config,
            &progress,
            &CancelToken::none(),
        )
        .await
        .unwrap();
        assert_eq!(produced["output"]["location"], "http://remote/out/r.nc");
        assert_eq!(produced["output"]["format"], "application/x-netcdf");
    }

    #[test]
    fn test_failed_remote_is_execution_error() {
        let status = ExecuteStatus {
            process_id: None,
            status: tellus_core::map_status("failed"),
            progress: None,
            message: "broken".into(),
            status_location: None,
            outputs: vec![],
            exceptions: vec!["disk full".into()],
        };
        let err = finish(status).unwrap_err();
        assert!(err.to_string().contains("disk full"));
    }
}
