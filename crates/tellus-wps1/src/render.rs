// Server-side WPS 1.0 response rendering
//
// The REST engine also answers at the OWS endpoint; these templates render
// GetCapabilities, DescribeProcess, ExecuteResponse and ExceptionReport
// documents for our own processes. Private processes never appear here; the
// caller filters before rendering.

use crate::xml::escape;
use tellus_core::{
    AllowedValues, IoDescription, IoKind, Job, JobStatus, Process,
};

const WPS_NAMESPACES: &str = concat!(
    r#"xmlns:wps="http://www.opengis.net/wps/1.0.0" "#,
    r#"xmlns:ows="http://www.opengis.net/ows/1.1" "#,
    r#"xmlns:xlink="http://www.w3.org/1999/xlink" "#,
    r#"service="WPS" version="1.0.0""#
);

/// Render a GetCapabilities document over the given (already
/// visibility-filtered) processes
pub fn capabilities_xml(title: &str, wps_url: &str, processes: &[Process]) -> String {
    let mut doc = xml_header();
    doc.push_str(&format!("<wps:Capabilities {WPS_NAMESPACES}>"));
    doc.push_str(&format!(
        "<ows:ServiceIdentification><ows:Title>{}</ows:Title><ows:ServiceType>WPS</ows:ServiceType><ows:ServiceTypeVersion>1.0.0</ows:ServiceTypeVersion></ows:ServiceIdentification>",
        escape(title)
    ));
    doc.push_str(&format!(
        r#"<ows:OperationsMetadata><ows:Operation name="GetCapabilities"><ows:DCP><ows:HTTP><ows:Get xlink:href="{url}"/></ows:HTTP></ows:DCP></ows:Operation><ows:Operation name="DescribeProcess"><ows:DCP><ows:HTTP><ows:Get xlink:href="{url}"/></ows:HTTP></ows:DCP></ows:Operation><ows:Operation name="Execute"><ows:DCP><ows:HTTP><ows:Get xlink:href="{url}"/></ows:HTTP></ows:DCP></ows:Operation></ows:OperationsMetadata>"#,
        url = escape(wps_url)
    ));
    doc.push_str("<wps:ProcessOfferings>");
    for process in processes {
        doc.push_str(&format!(
            r#"<wps:Process wps:processVersion="{}">"#,
            escape(process.version.as_deref().unwrap_or("1.0"))
        ));
        doc.push_str(&format!(
            "<ows:Identifier>{}</ows:Identifier>",
            escape(&process.id)
        ));
        doc.push_str(&format!(
            "<ows:Title>{}</ows:Title>",
            escape(process.title.as_deref().unwrap_or(&process.id))
        ));
        if let Some(abstract_) = &process.abstract_ {
            doc.push_str(&format!(
                "<ows:Abstract>{}</ows:Abstract>",
                escape(abstract_)
            ));
        }
        doc.push_str("</wps:Process>");
    }
    doc.push_str("</wps:ProcessOfferings></wps:Capabilities>");
    doc
}

/// Render a DescribeProcess document for the given processes
pub fn describe_xml(processes: &[Process]) -> String {
    let mut doc = xml_header();
    doc.push_str(&format!(
        r#"<wps:ProcessDescriptions {WPS_NAMESPACES} xml:lang="en-US">"#
    ));
    for process in processes {
        doc.push_str(&format!(
            r#"<ProcessDescription wps:processVersion="{}" storeSupported="true" statusSupported="true">"#,
            escape(process.version.as_deref().unwrap_or("1.0"))
        ));
        doc.push_str(&format!(
            "<ows:Identifier>{}</ows:Identifier>",
            escape(&process.id)
        ));
        doc.push_str(&format!(
            "<ows:Title>{}</ows:Title>",
            escape(process.title.as_deref().unwrap_or(&process.id))
        ));
        if let Some(abstract_) = &process.abstract_ {
            doc.push_str(&format!(
                "<ows:Abstract>{}</ows:Abstract>",
                escape(abstract_)
            ));
        }
        doc.push_str("<DataInputs>");
        for input in &process.inputs {
            doc.push_str(&render_io(input, true));
        }
        doc.push_str("</DataInputs><ProcessOutputs>");
        for output in &process.outputs {
            doc.push_str(&render_io(output, false));
        }
        doc.push_str("</ProcessOutputs></ProcessDescription>");
    }
    doc.push_str("</wps:ProcessDescriptions>");
    doc
}

fn render_io(io: &IoDescription, is_input: bool) -> String {
    let mut out = String::new();
    if is_input {
        let max = match io.max_occurs {
            tellus_core::MaxOccurs::Count(n) => n.to_string(),
            tellus_core::MaxOccurs::Unbounded => "1000".to_string(),
        };
        out.push_str(&format!(
            r#"<Input minOccurs="{}" maxOccurs="{}">"#,
            io.min_occurs, max
        ));
    } else {
        out.push_str("<Output>");
    }
    out.push_str(&format!(
        "<ows:Identifier>{}</ows:Identifier>",
        escape(&io.id)
    ));
    out.push_str(&format!(
        "<ows:Title>{}</ows:Title>",
        escape(io.title.as_deref().unwrap_or(&io.id))
    ));
    if let Some(abstract_) = &io.abstract_ {
        out.push_str(&format!(
            "<ows:Abstract>{}</ows:Abstract>",
            escape(abstract_)
        ));
    }
    match &io.kind {
        IoKind::Literal {
            data_type,
            allowed_values,
            default,
        } => {
            let tag = if is_input { "LiteralData" } else { "LiteralOutput" };
            out.push_str(&format!("<{tag}>"));
            out.push_str(&format!(
                "<ows:DataType>{}</ows:DataType>",
                escape(data_type.as_str())
            ));
            match allowed_values {
                Some(AllowedValues::Values(values)) => {
                    out.push_str("<ows:AllowedValues>");
                    for value in values {
                        let text = match value {
                            serde_json::Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        out.push_str(&format!("<ows:Value>{}</ows:Value>", escape(&text)));
                    }
                    out.push_str("</ows:AllowedValues>");
                }
                _ => out.push_str("<ows:AnyValue/>"),
            }
            if let Some(default) = default {
                let text = match default {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                out.push_str(&format!("<DefaultValue>{}</DefaultValue>", escape(&text)));
            }
            out.push_str(&format!("</{tag}>"));
        }
        IoKind::BoundingBox { supported_crs } => {
            let tag = if is_input {
                "BoundingBoxData"
            } else {
                "BoundingBoxOutput"
            };
            out.push_str(&format!("<{tag}><Supported>"));
            for crs in supported_crs {
                out.push_str(&format!("<CRS>{}</CRS>", escape(crs)));
            }
            out.push_str(&format!("</Supported></{tag}>"));
        }
        IoKind::Complex { formats } => {
            let tag = if is_input { "ComplexData" } else { "ComplexOutput" };
            out.push_str(&format!("<{tag}>"));
            if let Some(default) = io.default_format() {
                out.push_str("<Default>");
                out.push_str(&render_format(default));
                out.push_str("</Default>");
            }
            out.push_str("<Supported>");
            for format in formats {
                out.push_str(&render_format(format));
            }
            out.push_str(&format!("</Supported></{tag}>"));
        }
    }
    out.push_str(if is_input { "</Input>" } else { "</Output>" });
    out
}

fn render_format(format: &tellus_core::Format) -> String {
    let mut out = String::from("<Format>");
    out.push_str(&format!(
        "<MimeType>{}</MimeType>",
        escape(&format.mime_type)
    ));
    if let Some(encoding) = &format.encoding {
        out.push_str(&format!("<Encoding>{}</Encoding>", escape(encoding)));
    }
    if let Some(schema) = &format.schema {
        out.push_str(&format!("<Schema>{}</Schema>", escape(schema)));
    }
    out.push_str("</Format>");
    out
}

/// Render an ExecuteResponse/status document for a job
pub fn execute_response_xml(job: &Job, status_location: &str) -> String {
    let mut doc = xml_header();
    doc.push_str(&format!(
        r#"<wps:ExecuteResponse {WPS_NAMESPACES} statusLocation="{}">"#,
        escape(status_location)
    ));
    doc.push_str(&format!(
        "<wps:Process><ows:Identifier>{}</ows:Identifier></wps:Process>",
        escape(&job.process)
    ));
    doc.push_str(&format!(
        r#"<wps:Status creationTime="{}">"#,
        job.created.to_rfc3339()
    ));
    match job.status {
        JobStatus::Accepted => doc.push_str(&format!(
            "<wps:ProcessAccepted>{}</wps:ProcessAccepted>",
            escape(&job.message)
        )),
        JobStatus::Running => doc.push_str(&format!(
            r#"<wps:ProcessStarted percentCompleted="{}">{}</wps:ProcessStarted>"#,
            job.progress,
            escape(&job.message)
        )),
        JobStatus::Succeeded => doc.push_str(&format!(
            "<wps:ProcessSucceeded>{}</wps:ProcessSucceeded>",
            escape(&job.message)
        )),
        JobStatus::Failed | JobStatus::Dismissed => {
            doc.push_str("<wps:ProcessFailed><wps:ExceptionReport>");
            if job.exceptions.is_empty() {
                doc.push_str(&format!(
                    r#"<ows:Exception exceptionCode="NoApplicableCode"><ows:ExceptionText>{}</ows:ExceptionText></ows:Exception>"#,
                    escape(&job.message)
                ));
            }
            for exception in &job.exceptions {
                doc.push_str(&format!(
                    r#"<ows:Exception exceptionCode="{}"><ows:ExceptionText>{}</ows:ExceptionText></ows:Exception>"#,
                    escape(&exception.code),
                    escape(&exception.text)
                ));
            }
            doc.push_str("</wps:ExceptionReport></wps:ProcessFailed>");
        }
    }
    doc.push_str("</wps:Status>");
    if job.status == JobStatus::Succeeded && !job.results.is_empty() {
        doc.push_str("<wps:ProcessOutputs>");
        for result in &job.results {
            let id = result
                .get("id")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("output");
            doc.push_str("<wps:Output>");
            doc.push_str(&format!("<ows:Identifier>{}</ows:Identifier>", escape(id)));
            if let Some(href) = result.get("href").and_then(serde_json::Value::as_str) {
                doc.push_str(&format!(r#"<wps:Reference xlink:href="{}"/>"#, escape(href)));
            } else if let Some(value) = result.get("value") {
                let text = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                doc.push_str(&format!(
                    "<wps:Data><wps:LiteralData>{}</wps:LiteralData></wps:Data>",
                    escape(&text)
                ));
            }
            doc.push_str("</wps:Output>");
        }
        doc.push_str("</wps:ProcessOutputs>");
    }
    doc.push_str("</wps:ExecuteResponse>");
    doc
}

/// Render an OWS ExceptionReport
pub fn exception_xml(code: &str, locator: Option<&str>, text: &str) -> String {
    let locator_attr = locator
        .map(|l| format!(r#" locator="{}""#, escape(l)))
        .unwrap_or_default();
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            r#"<ows:ExceptionReport xmlns:ows="http://www.opengis.net/ows/1.1" version="1.0.0">"#,
            r#"<ows:Exception exceptionCode="{code}"{locator}>"#,
            r#"<ows:ExceptionText>{text}</ows:ExceptionText>"#,
            r#"</ows:Exception></ows:ExceptionReport>"#
        ),
        code = escape(code),
        locator = locator_attr,
        text = escape(text),
    )
}

fn xml_header() -> String {
    String::from(r#"<?xml version="1.0" encoding="UTF-8"?>"#)
}
