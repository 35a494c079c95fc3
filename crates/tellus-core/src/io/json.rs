// JSON process-description I/O <-> canonical descriptions
//
// Parsing runs through alias normalization first, so only canonical keys are
// handled here. Emission always writes explicit min/max occurs and applies
// default-format election.

use super::{
    alias::normalize_fields, elect_default_format, AllowedValues, Format, IoDescription, IoKind,
    LiteralType, MaxOccurs, Metadata, ValueRange,
};
use crate::error::{EngineError, Result};
use serde_json::{json, Map, Value};

/// Parse one I/O description object of the JSON dialect
pub fn io_from_json(value: &Value) -> Result<IoDescription> {
    let obj = value
        .as_object()
        .ok_or_else(|| EngineError::package_type("I/O description must be an object"))?;
    let fields = normalize_fields(obj);

    let id = fields
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| EngineError::package_type("I/O description is missing an identifier"))?
        .to_string();

    let kind = parse_kind(&id, &fields)?;

    let min_occurs = fields
        .get("min_occurs")
        .and_then(parse_occurs)
        .unwrap_or(1);
    let max_occurs = fields
        .get("max_occurs")
        .and_then(MaxOccurs::from_value)
        .unwrap_or(MaxOccurs::Count(1));

    Ok(IoDescription {
        id,
        title: fields.get("title").and_then(Value::as_str).map(String::from),
        abstract_: fields
            .get("abstract")
            .and_then(Value::as_str)
            .map(String::from),
        keywords: fields
            .get("keywords")
            .and_then(Value::as_array)
            .map(|kw| {
                kw.iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default(),
        metadata: parse_metadata(&fields),
        min_occurs,
        max_occurs,
        kind,
    })
}

fn parse_occurs(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().map(|n| n as u32),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn parse_kind(id: &str, fields: &Map<String, Value>) -> Result<IoKind> {
    if let Some(formats) = fields.get("supported_formats") {
        let mut parsed = parse_formats(id, formats)?;
        let declared = parsed.iter().find(|f| f.default).cloned();
        elect_default_format(&mut parsed, declared.as_ref());
        return Ok(IoKind::Complex { formats: parsed });
    }
    if let Some(crs) = fields.get("supported_crs") {
        let supported_crs = crs
            .as_array()
            .map(|list| {
                list.iter()
                    .filter_map(|v| match v {
                        Value::String(s) => Some(s.clone()),
                        Value::Object(obj) => obj
                            .get("crs")
                            .and_then(Value::as_str)
                            .map(String::from),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();
        return Ok(IoKind::BoundingBox { supported_crs });
    }
    let data_type = fields
        .get("data_type")
        .and_then(Value::as_str)
        .and_then(LiteralType::parse)
        .unwrap_or(LiteralType::String);
    let allowed_values = fields
        .get("allowed_values")
        .map(|v| parse_allowed_values(id, v))
        .transpose()?;
    Ok(IoKind::Literal {
        data_type,
        allowed_values,
        default: fields.get("default").cloned(),
    })
}

fn parse_formats(id: &str, value: &Value) -> Result<Vec<Format>> {
    let list = value.as_array().ok_or_else(|| {
        EngineError::package_type(format!("'{id}' supported_formats must be a list"))
    })?;
    list.iter()
        .map(|entry| {
            let obj = entry.as_object().ok_or_else(|| {
                EngineError::package_type(format!("'{id}' format entries must be objects"))
            })?;
            let mime_type = obj
                .get("mime_type")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    EngineError::package_type(format!("'{id}' format entry is missing mime_type"))
                })?
                .to_string();
            Ok(Format {
                mime_type,
                encoding: obj.get("encoding").and_then(Value::as_str).map(String::from),
                schema: obj.get("schema").and_then(Value::as_str).map(String::from),
                default: obj.get("default").and_then(Value::as_bool).unwrap_or(false),
            })
        })
        .collect()
}

fn parse_allowed_values(id: &str, value: &Value) -> Result<AllowedValues> {
    match value {
        Value::Array(items) => {
            let ranges: Vec<&Map<String, Value>> = items
                .iter()
                .filter_map(Value::as_object)
                .filter(|obj| obj.contains_key("minimum") || obj.contains_key("maximum"))
                .collect();
            if !ranges.is_empty() {
                if ranges.len() != items.len() {
                    return Err(EngineError::package_type(format!(
                        "'{id}' mixes plain allowed values and ranges"
                    )));
                }
                return Ok(AllowedValues::Ranges(
                    ranges
                        .into_iter()
                        .map(|obj| ValueRange {
                            minimum: obj.get("minimum").cloned(),
                            maximum: obj.get("maximum").cloned(),
                            spacing: obj.get("spacing").cloned(),
                            closure: obj
                                .get("closure")
                                .and_then(Value::as_str)
                                .map(String::from),
                        })
                        .collect(),
                ));
            }
            Ok(AllowedValues::Values(items.clone()))
        }
        Value::Object(obj) => {
            if obj.get("any_value").and_then(Value::as_bool).unwrap_or(false)
                || obj.get("anyValue").and_then(Value::as_bool).unwrap_or(false)
            {
                return Ok(AllowedValues::AnyValue);
            }
            if let Some(reference) = obj
                .get("values_reference")
                .or_else(|| obj.get("valuesReference"))
                .and_then(Value::as_str)
            {
                return Ok(AllowedValues::Reference(reference.to_string()));
            }
            if let Some(values) = obj.get("allowed_values") {
                return parse_allowed_values(id, values);
            }
            Err(EngineError::package_type(format!(
                "'{id}' has unrecognized allowed_values object"
            )))
        }
        other => Err(EngineError::package_type(format!(
            "'{id}' has unrecognized allowed_values: {other}"
        ))),
    }
}

fn parse_metadata(fields: &Map<String, Value>) -> Vec<Metadata> {
    fields
        .get("metadata")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(Value::as_object)
                .map(|obj| Metadata {
                    title: obj.get("title").and_then(Value::as_str).map(String::from),
                    href: obj.get("href").and_then(Value::as_str).map(String::from),
                    role: obj.get("role").and_then(Value::as_str).map(String::from),
                    value: obj.get("value").and_then(Value::as_str).map(String::from),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Emit one canonical description as a JSON dialect object.
///
/// Emission uses only canonical keys; min/max occurs are always written
/// explicitly, even when they hold the defaults.
pub fn io_to_json(io: &IoDescription) -> Value {
    let mut obj = Map::new();
    obj.insert("id".into(), json!(io.id));
    if let Some(title) = &io.title {
        obj.insert("title".into(), json!(title));
    }
    if let Some(abstract_) = &io.abstract_ {
        obj.insert("abstract".into(), json!(abstract_));
    }
    if !io.keywords.is_empty() {
        obj.insert("keywords".into(), json!(io.keywords));
    }
    if !io.metadata.is_empty() {
        obj.insert(
            "metadata".into(),
            Value::Array(
                io.metadata
                    .iter()
                    .map(|m| serde_json::to_value(m).unwrap_or(Value::Null))
                    .collect(),
            ),
        );
    }
    obj.insert("min_occurs".into(), json!(io.min_occurs));
    obj.insert("max_occurs".into(), io.max_occurs.to_value());

    match &io.kind {
        IoKind::Literal {
            data_type,
            allowed_values,
            default,
        } => {
            obj.insert("data_type".into(), json!(data_type.as_str()));
            if let Some(allowed) = allowed_values {
                obj.insert("allowed_values".into(), allowed_values_to_json(allowed));
            }
            if let Some(default) = default {
                obj.insert("default".into(), default.clone());
            }
        }
        IoKind::BoundingBox { supported_crs } => {
            obj.insert("supported_crs".into(), json!(supported_crs));
        }
        IoKind::Complex { formats } => {
            let mut formats = formats.clone();
            let declared = formats.iter().find(|f| f.default).cloned();
            elect_default_format(&mut formats, declared.as_ref());
            obj.insert(
                "supported_formats".into(),
                Value::Array(
                    formats
                        .iter()
                        .map(|f| {
                            let mut entry = Map::new();
                            entry.insert("mime_type".into(), json!(f.mime_type));
                            if let Some(encoding) = &f.encoding {
                                entry.insert("encoding".into(), json!(encoding));
                            }
                            if let Some(schema) = &f.schema {
                                entry.insert("schema".into(), json!(schema));
                            }
                            entry.insert("default".into(), json!(f.default));
                            Value::Object(entry)
                        })
                        .collect(),
                ),
            );
        }
    }
    Value::Object(obj)
}

fn allowed_values_to_json(allowed: &AllowedValues) -> Value {
    match allowed {
        AllowedValues::AnyValue => json!({"any_value": true}),
        AllowedValues::Values(values) => Value::Array(values.clone()),
        AllowedValues::Ranges(ranges) => Value::Array(
            ranges
                .iter()
                .map(|r| serde_json::to_value(r).unwrap_or(Value::Null))
                .collect(),
        ),
        AllowedValues::Reference(url) => json!({"values_reference": url}),
    }
}
