// Remote-provider process importer
//
// Turns a WPS-1 DescribeProcess document into (a) a canonical process
// description and (b) a synthetic application package that, when executed,
// dispatches back to the same remote provider through the WPS1Requirement
// hint.

use crate::describe::parse_describe_process;
use serde_json::{json, Map, Value};
use tellus_core::package::APP_WPS1;
use tellus_core::{
    sanitize_identifier, EngineError, ImportedProcess, IoKind, RemoteProcessImporter, Result,
};
use url::Url;

/// Importer for WPS-1 DescribeProcess documents
#[derive(Debug, Default, Clone)]
pub struct Wps1Importer;

impl Wps1Importer {
    pub fn new() -> Self {
        Self
    }

    /// Import a DescribeProcess XML document fetched from `url`
    pub fn import(&self, url: &str, xml: &str) -> Result<ImportedProcess> {
        let mut descriptions = parse_describe_process(xml)?;
        if descriptions.len() != 1 {
            return Err(EngineError::registration(format!(
                "expected exactly one ProcessDescription, found {}",
                descriptions.len()
            )));
        }
        let remote = descriptions.remove(0);
        let provider_url = base_provider_url(url);

        // "{provider_host}_{process_id}", squeezed through the lenient slug
        let host = Url::parse(&provider_url)
            .ok()
            .and_then(|u| u.host_str().map(String::from))
            .unwrap_or_else(|| "remote".to_string());
        let process_id = sanitize_identifier(&format!("{host}_{}", remote.id))?;

        let package = synthesize_package(&remote.description, &provider_url, &remote.id)?;

        let mut description = remote
            .description
            .as_object()
            .cloned()
            .unwrap_or_default();
        description.insert("id".into(), json!(process_id));
        description.insert("processDescriptionURL".into(), json!(url));
        description.insert("executeEndpoint".into(), json!(provider_url));

        Ok(ImportedProcess {
            package,
            description: Value::Object(description),
        })
    }
}

impl RemoteProcessImporter for Wps1Importer {
    fn import_describe_process(&self, url: &str, xml: &str) -> Result<ImportedProcess> {
        self.import(url, xml)
    }
}

/// Strip the query part of a DescribeProcess URL, leaving the provider
/// endpoint
fn base_provider_url(url: &str) -> String {
    url.split('?').next().unwrap_or(url).to_string()
}

/// Build the CommandLineTool package dispatching back to the provider
fn synthesize_package(description: &Value, provider: &str, process: &str) -> Result<Value> {
    let inputs = package_io_record(description.get("inputs"), true)?;
    let outputs = package_io_record(description.get("outputs"), false)?;
    Ok(json!({
        "cwlVersion": "v1.0",
        "class": "CommandLineTool",
        "hints": {
            APP_WPS1: {
                "provider": provider,
                "process": process,
            }
        },
        "inputs": inputs,
        "outputs": outputs,
    }))
}

/// Convert JSON-dialect I/O descriptions into package records: complex
/// becomes File (format from the first supported MIME type), literals with
/// allowed values become enums, occurrence bounds become nullable/array
/// shapes.
fn package_io_record(ios: Option<&Value>, is_input: bool) -> Result<Value> {
    let mut record = Map::new();
    let Some(list) = ios.and_then(Value::as_array) else {
        return Ok(Value::Object(record));
    };
    for io_json in list {
        let io = tellus_core::io_from_json(io_json)?;
        let mut entry = Map::new();
        let base_type: Value = match &io.kind {
            IoKind::Complex { formats } => {
                if let Some(format) = formats.first() {
                    entry.insert("format".into(), json!(format.mime_type));
                }
                json!("File")
            }
            IoKind::BoundingBox { .. } => json!("string"),
            IoKind::Literal {
                data_type,
                allowed_values,
                default,
            } => {
                if let Some(default) = default {
                    entry.insert("default".into(), default.clone());
                }
                match allowed_values {
                    Some(tellus_core::AllowedValues::Values(symbols)) => {
                        json!({"type": "enum", "symbols": symbols})
                    }
                    _ => json!(package_literal_type(*data_type)),
                }
            }
        };
        let type_value = shape_type(base_type, io.min_occurs == 0, io.max_occurs.allows_multiple());
        entry.insert("type".into(), type_value);
        if let Some(title) = &io.title {
            entry.insert("label".into(), json!(title));
        }
        if is_input {
            entry.insert("inputBinding".into(), json!({}));
        }
        record.insert(io.id.clone(), Value::Object(entry));
    }
    Ok(Value::Object(record))
}

fn package_literal_type(data_type: tellus_core::LiteralType) -> &'static str {
    match data_type {
        tellus_core::LiteralType::Integer => "int",
        tellus_core::LiteralType::Float => "double",
        tellus_core::LiteralType::Boolean => "boolean",
        _ => "string",
    }
}

/// Wrap a base type expression for optionality and multiplicity
fn shape_type(base: Value, nullable: bool, multiple: bool) -> Value {
    let shaped = if multiple {
        match base {
            Value::String(name) => json!(format!("{name}[]")),
            other => json!({"type": "array", "items": other}),
        }
    } else {
        base
    };
    if nullable {
        json!(["null", shaped])
    } else {
        shaped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tellus_core::{ApplicationKind, Package};

    fn sample_import() -> ImportedProcess {
        let importer = Wps1Importer::new();
        importer
            .import(
                "https://remote.example.org/wps?service=wps&request=describeprocess&identifier=subsetter",
                crate::describe::DESCRIBE_XML,
            )
            .unwrap()
    }

    #[test]
    fn test_identifier_stamping() {
        let imported = sample_import();
        assert_eq!(
            imported.description["id"],
            "remote_example_org_subsetter"
        );
        assert_eq!(
            imported.description["executeEndpoint"],
            "https://remote.example.org/wps"
        );
    }

    #[test]
    fn test_synthesized_package_dispatches_back() {
        let imported = sample_import();
        let package = Package::from_value(&imported.package).unwrap();
        assert_eq!(
            package.application_kind().unwrap(),
            ApplicationKind::Wps1 {
                provider: "https://remote.example.org/wps".into(),
                process: "subsetter".into(),
            }
        );
    }

    #[test]
    fn test_package_io_round_trip() {
        let imported = sample_import();
        let package = Package::from_value(&imported.package).unwrap();
        let inputs = package.input_descriptions().unwrap();
        // resource: File array (maxOccurs 1000), variable: optional string,
        // freq: enum over day/mon/yr
        let resource = inputs.iter().find(|i| i.id == "resource").unwrap();
        assert!(resource.is_complex());
        assert!(resource.max_occurs.allows_multiple());
        assert_eq!(
            resource.default_format().unwrap().mime_type,
            "application/x-netcdf"
        );

        let variable = inputs.iter().find(|i| i.id == "variable").unwrap();
        assert_eq!(variable.min_occurs, 0);

        let freq = inputs.iter().find(|i| i.id == "freq").unwrap();
        match &freq.kind {
            IoKind::Literal {
                allowed_values: Some(tellus_core::AllowedValues::Values(symbols)),
                ..
            } => assert_eq!(symbols.len(), 3),
            other => panic!("freq should be an enum literal: {other:?}"),
        }

        let outputs = package.output_descriptions().unwrap();
        assert_eq!(outputs.len(), 1);
        assert!(outputs[0].is_complex());
    }

    #[test]
    fn test_multi_description_rejected() {
        let xml = r#"<ProcessDescriptions>
          <ProcessDescription><Identifier>one</Identifier></ProcessDescription>
          <ProcessDescription><Identifier>two</Identifier></ProcessDescription>
        </ProcessDescriptions>"#;
        let importer = Wps1Importer::new();
        assert!(importer.import("https://x/wps", xml).is_err());
    }
}
