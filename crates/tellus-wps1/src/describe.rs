// WPS-1 DescribeProcess parsing
//
// Produces JSON-dialect process descriptions (canonical field spellings)
// from the XML document; the I/O converters in tellus-core take it from
// there.

use crate::xml::Element;
use serde_json::{json, Map, Value};
use tellus_core::{EngineError, Result};

/// One parsed `ProcessDescription` element as a JSON process description
#[derive(Debug, Clone)]
pub struct RemoteProcessDescription {
    pub id: String,
    pub description: Value,
}

/// Parse a `DescribeProcess` response document
pub fn parse_describe_process(xml: &str) -> Result<Vec<RemoteProcessDescription>> {
    let root = Element::parse(xml)?;
    if root.name == "ExceptionReport" {
        return Err(EngineError::communication(exception_text(&root)));
    }
    let descriptions = if root.name == "ProcessDescription" {
        vec![&root]
    } else {
        root.descendants("ProcessDescription")
    };
    descriptions.into_iter().map(parse_description).collect()
}

/// Text of the first exception in an `ows:ExceptionReport`
pub fn exception_text(root: &Element) -> String {
    root.descendant("ExceptionText")
        .map(Element::trimmed_text)
        .or_else(|| {
            root.descendant("Exception")
                .and_then(|e| e.attr("exceptionCode").map(String::from))
        })
        .unwrap_or_else(|| "remote WPS exception".to_string())
}

fn parse_description(element: &Element) -> Result<RemoteProcessDescription> {
    let id = element.child_text("Identifier").ok_or_else(|| {
        EngineError::communication("ProcessDescription is missing ows:Identifier")
    })?;

    let inputs: Vec<Value> = element
        .child("DataInputs")
        .map(|section| {
            section
                .children_named("Input")
                .map(|input| parse_io(input, true))
                .collect::<Result<Vec<_>>>()
        })
        .transpose()?
        .unwrap_or_default();

    let outputs: Vec<Value> = element
        .child("ProcessOutputs")
        .map(|section| {
            section
                .children_named("Output")
                .map(|output| parse_io(output, false))
                .collect::<Result<Vec<_>>>()
        })
        .transpose()?
        .unwrap_or_default();

    let mut description = Map::new();
    description.insert("id".into(), json!(id));
    if let Some(title) = element.child_text("Title") {
        description.insert("title".into(), json!(title));
    }
    if let Some(abstract_) = element.child_text("Abstract") {
        description.insert("abstract".into(), json!(abstract_));
    }
    if let Some(version) = element.attr("processVersion") {
        description.insert("version".into(), json!(version));
    }
    description.insert("inputs".into(), Value::Array(inputs));
    description.insert("outputs".into(), Value::Array(outputs));

    Ok(RemoteProcessDescription {
        id,
        description: Value::Object(description),
    })
}

fn parse_io(element: &Element, is_input: bool) -> Result<Value> {
    let id = element
        .child_text("Identifier")
        .ok_or_else(|| EngineError::communication("I/O element is missing ows:Identifier"))?;

    let mut io = Map::new();
    io.insert("id".into(), json!(id));
    if let Some(title) = element.child_text("Title") {
        io.insert("title".into(), json!(title));
    }
    if let Some(abstract_) = element.child_text("Abstract") {
        io.insert("abstract".into(), json!(abstract_));
    }
    if is_input {
        let min = element.attr("minOccurs").unwrap_or("1");
        let max = element.attr("maxOccurs").unwrap_or("1");
        io.insert("min_occurs".into(), json!(min.parse::<u32>().unwrap_or(1)));
        io.insert(
            "max_occurs".into(),
            match max.parse::<u32>() {
                Ok(n) => json!(n),
                Err(_) => json!("unbounded"),
            },
        );
    }

    let complex = element
        .child("ComplexData")
        .or_else(|| element.child("ComplexOutput"));
    let literal = element
        .child("LiteralData")
        .or_else(|| element.child("LiteralOutput"));
    let bbox = element
        .child("BoundingBoxData")
        .or_else(|| element.child("BoundingBoxOutput"));

    if let Some(complex) = complex {
        io.insert("supported_formats".into(), parse_formats(complex));
    } else if let Some(bbox) = bbox {
        let crs: Vec<String> = bbox
            .descendants("CRS")
            .iter()
            .map(|c| c.trimmed_text())
            .filter(|t| !t.is_empty())
            .collect();
        io.insert("supported_crs".into(), json!(crs));
    } else if let Some(literal) = literal {
        let data_type = literal
            .child("DataType")
            .map(|dt| {
                let name = dt.trimmed_text();
                if name.is_empty() {
                    dt.attr("reference").map(String::from).unwrap_or_default()
                } else {
                    name
                }
            })
            .unwrap_or_default();
        io.insert(
            "data_type".into(),
            json!(map_ows_data_type(&data_type)),
        );
        if let Some(allowed) = literal.child("AllowedValues") {
            let values: Vec<Value> = allowed
                .children_named("Value")
                .map(|v| json!(v.trimmed_text()))
                .collect();
            if !values.is_empty() {
                io.insert("allowed_values".into(), Value::Array(values));
            }
        }
        if let Some(default) = literal.child_text("DefaultValue") {
            io.insert("default".into(), json!(default));
        }
    } else {
        // literal with no domain declaration
        io.insert("data_type".into(), json!("string"));
    }

    Ok(Value::Object(io))
}

fn parse_formats(complex: &Element) -> Value {
    let mut formats: Vec<Value> = Vec::new();
    let default_format = complex
        .child("Default")
        .and_then(|d| d.child("Format"))
        .map(format_entry);
    if let Some(supported) = complex.child("Supported") {
        for format in supported.children_named("Format") {
            let mut entry = format_entry(format);
            if let (Some(default), Some(obj)) = (&default_format, entry.as_object_mut()) {
                let matches = default.get("mime_type") == obj.get("mime_type")
                    && default.get("encoding") == obj.get("encoding");
                if matches {
                    obj.insert("default".into(), json!(true));
                }
            }
            formats.push(entry);
        }
    }
    if formats.is_empty() {
        if let Some(mut default) = default_format {
            if let Some(obj) = default.as_object_mut() {
                obj.insert("default".into(), json!(true));
            }
            formats.push(default);
        }
    }
    Value::Array(formats)
}

fn format_entry(format: &Element) -> Value {
    let mut entry = Map::new();
    entry.insert(
        "mime_type".into(),
        json!(format
            .child_text("MimeType")
            .unwrap_or_else(|| "text/plain".to_string())),
    );
    if let Some(encoding) = format.child_text("Encoding") {
        entry.insert("encoding".into(), json!(encoding));
    }
    if let Some(schema) = format.child_text("Schema") {
        entry.insert("schema".into(), json!(schema));
    }
    Value::Object(entry)
}

/// Map OWS literal data-type names/URIs onto internal literal types
pub fn map_ows_data_type(data_type: &str) -> &'static str {
    let name = data_type
        .rsplit('#')
        .next()
        .unwrap_or(data_type)
        .trim()
        .to_ascii_lowercase();
    match name.as_str() {
        "integer" | "int" | "long" | "short" | "nonnegativeinteger" | "positiveinteger" => {
            "integer"
        }
        "float" | "double" | "decimal" => "float",
        "boolean" | "bool" => "boolean",
        // dateTime and anyURI degrade to string
        _ => "string",
    }
}

/// Shared DescribeProcess fixture for the crate's tests
#[cfg(test)]
pub(crate) const DESCRIBE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<wps:ProcessDescriptions xmlns:wps="http://www.opengis.net/wps/1.0.0"
    xmlns:ows="http://www.opengis.net/ows/1.1" service="WPS" version="1.0.0" xml:lang="en-US">
  <ProcessDescription wps:processVersion="0.1" storeSupported="true" statusSupported="true">
    <ows:Identifier>subsetter</ows:Identifier>
    <ows:Title>Subsetter</ows:Title>
    <ows:Abstract>Subset a NetCDF file.</ows:Abstract>
    <DataInputs>
      <Input minOccurs="1" maxOccurs="1000">
        <ows:Identifier>resource</ows:Identifier>
        <ows:Title>Resource</ows:Title>
        <ComplexData>
          <Default>
            <Format><MimeType>application/x-netcdf</MimeType><Encoding>base64</Encoding></Format>
          </Default>
          <Supported>
            <Format><MimeType>application/x-netcdf</MimeType><Encoding>base64</Encoding></Format>
            <Format><MimeType>application/x-ogc-dods</MimeType></Format>
          </Supported>
        </ComplexData>
      </Input>
      <Input minOccurs="0" maxOccurs="1">
        <ows:Identifier>variable</ows:Identifier>
        <ows:Title>Variable</ows:Title>
        <LiteralData>
          <ows:DataType ows:reference="http://www.w3.org/TR/xmlschema-2/#string">string</ows:DataType>
          <ows:AnyValue/>
        </LiteralData>
      </Input>
      <Input minOccurs="1" maxOccurs="1">
        <ows:Identifier>freq</ows:Identifier>
        <ows:Title>Frequency</ows:Title>
        <LiteralData>
          <ows:DataType>string</ows:DataType>
          <ows:AllowedValues>
            <ows:Value>day</ows:Value>
            <ows:Value>mon</ows:Value>
            <ows:Value>yr</ows:Value>
          </ows:AllowedValues>
          <DefaultValue>yr</DefaultValue>
        </LiteralData>
      </Input>
    </DataInputs>
    <ProcessOutputs>
      <Output>
        <ows:Identifier>output</ows:Identifier>
        <ows:Title>Output</ows:Title>
        <ComplexOutput>
          <Default>
            <Format><MimeType>application/x-netcdf</MimeType></Format>
          </Default>
          <Supported>
            <Format><MimeType>application/x-netcdf</MimeType></Format>
          </Supported>
        </ComplexOutput>
      </Output>
    </ProcessOutputs>
  </ProcessDescription>
</wps:ProcessDescriptions>"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_describe_process() {
        let parsed = parse_describe_process(DESCRIBE_XML).unwrap();
        assert_eq!(parsed.len(), 1);
        let process = &parsed[0];
        assert_eq!(process.id, "subsetter");
        assert_eq!(process.description["title"], "Subsetter");
        assert_eq!(process.description["version"], "0.1");

        let inputs = process.description["inputs"].as_array().unwrap();
        assert_eq!(inputs.len(), 3);

        let resource = &inputs[0];
        assert_eq!(resource["id"], "resource");
        assert_eq!(resource["max_occurs"], 1000);
        let formats = resource["supported_formats"].as_array().unwrap();
        assert_eq!(formats.len(), 2);
        assert_eq!(formats[0]["mime_type"], "application/x-netcdf");
        assert_eq!(formats[0]["encoding"], "base64");
        assert_eq!(formats[0]["default"], true);

        let variable = &inputs[1];
        assert_eq!(variable["min_occurs"], 0);
        assert_eq!(variable["data_type"], "string");

        let freq = &inputs[2];
        assert_eq!(
            freq["allowed_values"],
            serde_json::json!(["day", "mon", "yr"])
        );
        assert_eq!(freq["default"], "yr");

        let outputs = process.description["outputs"].as_array().unwrap();
        assert_eq!(outputs[0]["id"], "output");
    }

    #[test]
    fn test_json_description_feeds_core_converter() {
        let parsed = parse_describe_process(DESCRIBE_XML).unwrap();
        let inputs = parsed[0].description["inputs"].as_array().unwrap();
        for input in inputs {
            let io = tellus_core::io_from_json(input).unwrap();
            assert!(!io.id.is_empty());
        }
    }

    #[test]
    fn test_missing_identifier_rejected() {
        let xml = r#"<ProcessDescriptions><ProcessDescription>
            <Title>No id</Title></ProcessDescription></ProcessDescriptions>"#;
        assert!(parse_describe_process(xml).is_err());
    }

    #[test]
    fn test_ows_data_type_mapping() {
        assert_eq!(map_ows_data_type("integer"), "integer");
        assert_eq!(
            map_ows_data_type("http://www.w3.org/TR/xmlschema-2/#double"),
            "float"
        );
        assert_eq!(map_ows_data_type("boolean"), "boolean");
        assert_eq!(map_ows_data_type("dateTime"), "string");
        assert_eq!(map_ows_data_type("anyURI"), "string");
        assert_eq!(map_ows_data_type(""), "string");
    }

    #[test]
    fn test_exception_report_surfaces_text() {
        let xml = r#"<ows:ExceptionReport xmlns:ows="http://www.opengis.net/ows/1.1">
          <ows:Exception exceptionCode="InvalidParameterValue">
            <ows:ExceptionText>Unknown process</ows:ExceptionText>
          </ows:Exception>
        </ows:ExceptionReport>"#;
        let err = parse_describe_process(xml).unwrap_err();
        assert!(err.to_string().contains("Unknown process"));
    }
}
