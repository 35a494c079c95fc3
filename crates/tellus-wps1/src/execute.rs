// WPS-1 Execute: request building and response/status parsing

use crate::xml::{escape, Element};
use tellus_core::{map_status, RemoteStatus, Result};

/// One input of an Execute request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecuteInput {
    Literal { id: String, value: String },
    Reference { id: String, href: String },
}

/// One output of an ExecuteResponse document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteOutput {
    pub id: String,
    pub reference: Option<String>,
    pub mime_type: Option<String>,
    pub data: Option<String>,
}

/// Parsed ExecuteResponse / status document
#[derive(Debug, Clone)]
pub struct ExecuteStatus {
    pub process_id: Option<String>,
    pub status: RemoteStatus,
    pub progress: Option<u8>,
    pub message: String,
    pub status_location: Option<String>,
    pub outputs: Vec<RemoteOutput>,
    pub exceptions: Vec<String>,
}

impl ExecuteStatus {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Render an Execute request document (POST body). Outputs are requested as
/// references with a stored, asynchronous status document.
pub fn build_execute_request(
    process_id: &str,
    inputs: &[ExecuteInput],
    output_ids: &[String],
) -> String {
    let mut doc = String::with_capacity(1024);
    doc.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    doc.push_str(
        r#"<wps:Execute service="WPS" version="1.0.0" xmlns:wps="http://www.opengis.net/wps/1.0.0" xmlns:ows="http://www.opengis.net/ows/1.1" xmlns:xlink="http://www.w3.org/1999/xlink">"#,
    );
    doc.push_str(&format!(
        "<ows:Identifier>{}</ows:Identifier>",
        escape(process_id)
    ));
    doc.push_str("<wps:DataInputs>");
    for input in inputs {
        match input {
            ExecuteInput::Literal { id, value } => {
                doc.push_str(&format!(
                    "<wps:Input><ows:Identifier>{}</ows:Identifier><wps:Data><wps:LiteralData>{}</wps:LiteralData></wps:Data></wps:Input>",
                    escape(id),
                    escape(value)
                ));
            }
            ExecuteInput::Reference { id, href } => {
                doc.push_str(&format!(
                    r#"<wps:Input><ows:Identifier>{}</ows:Identifier><wps:Reference xlink:href="{}"/></wps:Input>"#,
                    escape(id),
                    escape(href)
                ));
            }
        }
    }
    doc.push_str("</wps:DataInputs>");
    doc.push_str(r#"<wps:ResponseForm><wps:ResponseDocument storeExecuteResponse="true" status="true">"#);
    for output_id in output_ids {
        doc.push_str(&format!(
            r#"<wps:Output asReference="true"><ows:Identifier>{}</ows:Identifier></wps:Output>"#,
            escape(output_id)
        ));
    }
    doc.push_str("</wps:ResponseDocument></wps:ResponseForm></wps:Execute>");
    doc
}

/// Parse an ExecuteResponse (or stored status) document
pub fn parse_execute_response(xml: &str) -> Result<ExecuteStatus> {
    let root = Element::parse(xml)?;
    if root.name == "ExceptionReport" {
        let text = crate::describe::exception_text(&root);
        return Ok(ExecuteStatus {
            process_id: None,
            status: map_status("failed"),
            progress: None,
            message: text.clone(),
            status_location: None,
            outputs: Vec::new(),
            exceptions: vec![text],
        });
    }

    let process_id = root
        .child("Process")
        .and_then(|p| p.child_text("Identifier"));
    let status_location = root.attr("statusLocation").map(String::from);

    let (status, progress, message, exceptions) = match root.child("Status") {
        Some(status_el) => parse_status_element(status_el),
        None => (map_status("accepted"), None, String::new(), Vec::new()),
    };

    let outputs = root
        .child("ProcessOutputs")
        .map(|section| {
            section
                .children_named("Output")
                .filter_map(parse_output)
                .collect()
        })
        .unwrap_or_default();

    Ok(ExecuteStatus {
        process_id,
        status,
        progress,
        message,
        status_location,
        outputs,
        exceptions,
    })
}

fn parse_status_element(status_el: &Element) -> (RemoteStatus, Option<u8>, String, Vec<String>) {
    for child in &status_el.children {
        let status = map_status(&child.name);
        if status == RemoteStatus::Unknown {
            continue;
        }
        let progress = child
            .attr("percentCompleted")
            .and_then(|p| p.parse::<u8>().ok());
        let mut exceptions: Vec<String> = child
            .descendants("ExceptionText")
            .iter()
            .map(|e| e.trimmed_text())
            .filter(|t| !t.is_empty())
            .collect();
        if exceptions.is_empty() {
            for exception in child.descendants("Exception") {
                if let Some(code) = exception.attr("exceptionCode") {
                    exceptions.push(code.to_string());
                }
            }
        }
        let message = if child.trimmed_text().is_empty() {
            exceptions.first().cloned().unwrap_or_else(|| child.name.clone())
        } else {
            child.trimmed_text()
        };
        return (status, progress, message, exceptions);
    }
    (RemoteStatus::Unknown, None, "unknown status".to_string(), Vec::new())
}

fn parse_output(output: &Element) -> Option<RemoteOutput> {
    let id = output.child_text("Identifier")?;
    let reference = output.child("Reference");
    let data = output
        .child("Data")
        .and_then(|d| d.child("LiteralData").or_else(|| d.child("ComplexData")))
        .map(Element::trimmed_text);
    Some(RemoteOutput {
        id,
        reference: reference.and_then(|r| r.attr("href").map(String::from)),
        mime_type: reference.and_then(|r| r.attr("mimeType").map(String::from)),
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tellus_core::JobStatus;

    #[test]
    fn test_build_execute_request_escapes_values() {
        let request = build_execute_request(
            "subsetter",
            &[
                ExecuteInput::Literal {
                    id: "expr".into(),
                    value: "a < b & c".into(),
                },
                ExecuteInput::Reference {
                    id: "resource".into(),
                    href: "http://data/x.nc".into(),
                },
            ],
            &["output".to_string()],
        );
        assert!(request.contains("<ows:Identifier>subsetter</ows:Identifier>"));
        assert!(request.contains("a &lt; b &amp; c"));
        assert!(request.contains(r#"xlink:href="http://data/x.nc""#));
        assert!(request.contains(r#"storeExecuteResponse="true""#));
    }

    const STARTED_XML: &str = r#"<?xml version="1.0"?>
<wps:ExecuteResponse xmlns:wps="http://www.opengis.net/wps/1.0.0"
    xmlns:ows="http://www.opengis.net/ows/1.1"
    statusLocation="http://provider/status/abc.xml">
  <wps:Process><ows:Identifier>subsetter</ows:Identifier></wps:Process>
  <wps:Status creationTime="2019-02-01T01:00:00Z">
    <wps:ProcessStarted percentCompleted="42">Subsetting in progress</wps:ProcessStarted>
  </wps:Status>
</wps:ExecuteResponse>"#;

    #[test]
    fn test_parse_started_status() {
        let status = parse_execute_response(STARTED_XML).unwrap();
        assert_eq!(status.process_id.as_deref(), Some("subsetter"));
        assert_eq!(status.status.effective(), JobStatus::Running);
        assert_eq!(status.progress, Some(42));
        assert_eq!(status.message, "Subsetting in progress");
        assert_eq!(
            status.status_location.as_deref(),
            Some("http://provider/status/abc.xml")
        );
        assert!(!status.is_terminal());
    }

    const SUCCEEDED_XML: &str = r#"<?xml version="1.0"?>
<wps:ExecuteResponse xmlns:wps="http://www.opengis.net/wps/1.0.0"
    xmlns:ows="http://www.opengis.net/ows/1.1" xmlns:xlink="http://www.w3.org/1999/xlink">
  <wps:Status><wps:ProcessSucceeded>Done</wps:ProcessSucceeded></wps:Status>
  <wps:ProcessOutputs>
    <wps:Output>
      <ows:Identifier>output</ows:Identifier>
      <wps:Reference xlink:href="http://provider/out/result.nc" mimeType="application/x-netcdf"/>
    </wps:Output>
    <wps:Output>
      <ows:Identifier>count</ows:Identifier>
      <wps:Data><wps:LiteralData>3</wps:LiteralData></wps:Data>
    </wps:Output>
  </wps:ProcessOutputs>
</wps:ExecuteResponse>"#;

    #[test]
    fn test_parse_succeeded_with_outputs() {
        let status = parse_execute_response(SUCCEEDED_XML).unwrap();
        assert!(status.is_terminal());
        assert_eq!(status.status.effective(), JobStatus::Succeeded);
        assert_eq!(status.outputs.len(), 2);
        assert_eq!(
            status.outputs[0].reference.as_deref(),
            Some("http://provider/out/result.nc")
        );
        assert_eq!(status.outputs[1].data.as_deref(), Some("3"));
    }

    const FAILED_XML: &str = r#"<?xml version="1.0"?>
<wps:ExecuteResponse xmlns:wps="http://www.opengis.net/wps/1.0.0"
    xmlns:ows="http://www.opengis.net/ows/1.1">
  <wps:Status>
    <wps:ProcessFailed>
      <wps:ExceptionReport>
        <ows:Exception exceptionCode="NoApplicableCode">
          <ows:ExceptionText>Process error: disk full</ows:ExceptionText>
        </ows:Exception>
      </wps:ExceptionReport>
    </wps:ProcessFailed>
  </wps:Status>
</wps:ExecuteResponse>"#;

    #[test]
    fn test_parse_failed_with_exceptions() {
        let status = parse_execute_response(FAILED_XML).unwrap();
        assert_eq!(status.status.effective(), JobStatus::Failed);
        assert_eq!(status.exceptions, vec!["Process error: disk full"]);
    }

    #[test]
    fn test_exception_report_maps_to_failed() {
        let xml = r#"<ows:ExceptionReport xmlns:ows="http://www.opengis.net/ows/1.1">
          <ows:Exception exceptionCode="ServerBusy">
            <ows:ExceptionText>try later</ows:ExceptionText>
          </ows:Exception></ows:ExceptionReport>"#;
        let status = parse_execute_response(xml).unwrap();
        assert_eq!(status.status.effective(), JobStatus::Failed);
        assert_eq!(status.exceptions, vec!["try later"]);
    }
}
