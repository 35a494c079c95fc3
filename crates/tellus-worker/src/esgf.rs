// Remote ESGF-CWT backend
//
// Marshalled inputs are regrouped into the variable/domain/operation
// documents the CWT API expects: complex references become variables,
// a bounding-box or domain literal becomes the domain, everything else is
// an operation parameter.

use crate::marshal::{InputValue, ResolvedInput};
use crate::poller::{poll_until_terminal, StatusFetcher};
use crate::queue::CancelToken;
use crate::retry::with_retries;
use crate::tracker::ProgressSender;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tellus_core::{EngineConfig, EngineError, IoKind, JobStatus, Result};
use tellus_esgf::{EsgfClient, EsgfOperation};
use tellus_wps1::ExecuteStatus;
use tracing::info;

/// Execute a process on a remote ESGF-CWT provider and wait for its outcome
pub async fn run_remote(
    provider: &str,
    process: &str,
    api_key: Option<&str>,
    inputs: &[ResolvedInput],
    config: &EngineConfig,
    progress: &ProgressSender,
    cancel: &CancelToken,
) -> Result<Map<String, Value>> {
    let client = EsgfClient::with_timeouts(
        provider,
        api_key.map(String::from),
        config.connect_timeout,
        config.read_timeout,
    )?;
    let operation = build_operation(inputs);

    let submitted = with_retries(&config.retry, "esgf-execute", || {
        client.execute(process, &operation)
    })
    .await?;
    info!(
        provider,
        process,
        status_location = ?submitted.status_location,
        "Remote ESGF-CWT execution submitted"
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

    // terminal documents are plain WPS; reuse the WPS-1 output mapping
    crate::wps1::finish(terminal)
}

/// Regroup marshalled inputs into the CWT variable/domain/parameter model
pub fn build_operation(inputs: &[ResolvedInput]) -> EsgfOperation {
    let mut operation = EsgfOperation::default();
    let mut variable_idx = 0usize;
    for input in inputs {
        match &input.io.kind {
            IoKind::Complex { .. } => {
                for value in &input.values {
                    if let InputValue::Href { href, .. } = value {
                        operation.variables.push(json!({
                            "uri": href,
                            "id": input.io.id,
                            "name": format!("v{variable_idx}"),
                        }));
                        variable_idx += 1;
                    }
                }
            }
            IoKind::BoundingBox { .. } => {
                for value in &input.values {
                    if let InputValue::Literal(v) = value {
                        operation.domains.push(domain_from_value(&input.io.id, v));
                    }
                }
            }
            IoKind::Literal { .. } => {
                for value in &input.values {
                    if let InputValue::Literal(v) = value {
                        if input.io.id == "domain" {
                            operation.domains.push(domain_from_value(&input.io.id, v));
                        } else {
                            operation.parameters.push((input.io.id.clone(), v.clone()));
                        }
                    }
                }
            }
        }
    }
    operation
}

fn domain_from_value(id: &str, value: &Value) -> Value {
    match value {
        Value::Object(obj) => {
            let mut domain = obj.clone();
            domain.entry("name".to_string()).or_insert(json!(id));
            Value::Object(domain)
        }
        other => json!({"name": id, "value": other}),
    }
}

struct ClientFetcher {
    client: EsgfClient,
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
    use tellus_core::{Format, IoDescription, LiteralType};

    #[test]
    fn test_operation_grouping() {
        let inputs = vec![
            ResolvedInput {
                io: IoDescription::complex("tas", vec![Format::new("application/x-netcdf")]),
                values: vec![InputValue::Href {
                    href: "http://esgf/data/tas.nc".into(),
                    mime_type: None,
                }],
            },
            ResolvedInput {
                io: IoDescription::literal("domain", LiteralType::String),
                values: vec![InputValue::Literal(
                    json!({"lat": {"start": 40, "end": 60}}),
                )],
            },
            ResolvedInput {
                io: IoDescription::literal("axes", LiteralType::String),
                values: vec![InputValue::Literal(json!("time"))],
            },
        ];
        let operation = build_operation(&inputs);
        assert_eq!(operation.variables.len(), 1);
        assert_eq!(operation.variables[0]["uri"], "http://esgf/data/tas.nc");
        assert_eq!(operation.domains.len(), 1);
        assert_eq!(operation.parameters, vec![("axes".to_string(), json!("time"))]);
    }
}
