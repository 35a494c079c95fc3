// Input marshalling and output collection
//
// Submitted execute inputs are validated against the frozen I/O
// descriptions and normalized for the backends: literals pass as-is,
// complex values become location objects, multiple occurrences become
// arrays only when the declared max_occurs allows them.

use serde_json::{json, Map, Value};
use tellus_core::{
    EngineConfig, EngineError, IoDescription, IoKind, MaxOccurs, Result,
};
use uuid::Uuid;

/// One submitted value of an input
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    Literal(Value),
    Href {
        href: String,
        mime_type: Option<String>,
    },
}

/// A validated input with its declared description
#[derive(Debug, Clone)]
pub struct ResolvedInput {
    pub io: IoDescription,
    pub values: Vec<InputValue>,
}

impl ResolvedInput {
    /// Location object(s) passed to the backend: a single object, or an
    /// array only when `max_occurs > 1`.
    pub fn backend_value(&self) -> Value {
        let rendered: Vec<Value> = self
            .values
            .iter()
            .map(|value| match value {
                InputValue::Literal(v) => v.clone(),
                InputValue::Href { href, mime_type } => {
                    let mut obj = Map::new();
                    obj.insert("location".into(), json!(href));
                    obj.insert("class".into(), json!(location_class(href)));
                    if let Some(mime_type) = mime_type {
                        obj.insert("format".into(), json!(mime_type));
                    }
                    Value::Object(obj)
                }
            })
            .collect();
        if self.io.max_occurs.allows_multiple() {
            Value::Array(rendered)
        } else {
            rendered.into_iter().next().unwrap_or(Value::Null)
        }
    }
}

fn location_class(href: &str) -> &'static str {
    if href.ends_with('/') {
        "Directory"
    } else {
        "File"
    }
}

/// Parse the submitted execute inputs into `(id, value)` occurrences.
/// Accepts the list form `[{id, data|value|href}]` and the map form
/// `{id: value}`.
pub fn parse_submitted_inputs(raw: &Value) -> Result<Vec<(String, InputValue)>> {
    let mut occurrences = Vec::new();
    match raw {
        Value::Null => {}
        Value::Array(list) => {
            for entry in list {
                let obj = entry.as_object().ok_or_else(|| {
                    EngineError::execution("execute inputs must be objects")
                })?;
                let id = obj
                    .get("id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| EngineError::execution("execute input is missing 'id'"))?;
                occurrences.push((id.to_string(), parse_value_object(id, obj)?));
            }
        }
        Value::Object(map) => {
            for (id, value) in map {
                match value {
                    Value::Object(obj) if obj.contains_key("href") || obj.contains_key("data") => {
                        occurrences.push((id.clone(), parse_value_object(id, obj)?));
                    }
                    Value::Array(values) => {
                        for value in values {
                            occurrences.push((id.clone(), InputValue::Literal(value.clone())));
                        }
                    }
                    other => occurrences.push((id.clone(), InputValue::Literal(other.clone()))),
                }
            }
        }
        _ => {
            return Err(EngineError::execution(
                "execute inputs must be a list or a map",
            ))
        }
    }
    Ok(occurrences)
}

fn parse_value_object(id: &str, obj: &Map<String, Value>) -> Result<InputValue> {
    let href = obj.get("href").and_then(Value::as_str);
    let data = obj.get("data").or_else(|| obj.get("value"));
    if href.is_some() && data.is_some() {
        return Err(EngineError::package_type(format!(
            "input '{id}' declares both 'href' and 'data'"
        )));
    }
    if let Some(href) = href {
        return Ok(InputValue::Href {
            href: href.to_string(),
            mime_type: obj
                .get("format")
                .and_then(|f| {
                    f.as_str().map(String::from).or_else(|| {
                        f.get("mime_type")
                            .or_else(|| f.get("mimeType"))
                            .and_then(Value::as_str)
                            .map(String::from)
                    })
                }),
        });
    }
    match data {
        Some(value) => Ok(InputValue::Literal(value.clone())),
        None => Err(EngineError::execution(format!(
            "input '{id}' carries neither 'href' nor 'data'"
        ))),
    }
}

/// Validate submitted occurrences against the declared inputs.
///
/// Defaults fill absent optional literals; cardinality is checked against
/// min/max occurs.
pub fn marshal_inputs(
    declared: &[IoDescription],
    raw: &Value,
) -> Result<Vec<ResolvedInput>> {
    let occurrences = parse_submitted_inputs(raw)?;
    let mut resolved = Vec::with_capacity(declared.len());
    for io in declared {
        let mut values: Vec<InputValue> = occurrences
            .iter()
            .filter(|(id, _)| id == &io.id)
            .map(|(_, value)| value.clone())
            .collect();
        if values.is_empty() {
            if let IoKind::Literal {
                default: Some(default),
                ..
            } = &io.kind
            {
                values.push(InputValue::Literal(default.clone()));
            }
        }
        let count = values.len() as u32;
        if count < io.min_occurs {
            return Err(EngineError::execution(format!(
                "input '{}' requires at least {} value(s), got {count}",
                io.id, io.min_occurs
            )));
        }
        if let MaxOccurs::Count(max) = io.max_occurs {
            if count > max {
                return Err(EngineError::execution(format!(
                    "input '{}' accepts at most {max} value(s), got {count}",
                    io.id
                )));
            }
        }
        if !values.is_empty() {
            resolved.push(ResolvedInput {
                io: io.clone(),
                values,
            });
        }
    }
    Ok(resolved)
}

/// Map backend output values onto the job results list.
///
/// `file://` locations under the output directory are rewritten to
/// publicly-servable URLs; a single-element list on a scalar-declared
/// output unwraps to the scalar.
pub fn collect_outputs(
    declared: &[IoDescription],
    produced: &Map<String, Value>,
    config: &EngineConfig,
    job_id: &Uuid,
) -> Result<Vec<Value>> {
    let mut results = Vec::with_capacity(declared.len());
    for io in declared {
        let Some(value) = produced.get(&io.id) else {
            if io.min_occurs > 0 {
                return Err(EngineError::execution(format!(
                    "backend produced no value for output '{}'",
                    io.id
                )));
            }
            continue;
        };
        let value = unwrap_single(io, value);
        results.push(render_result(io, &value, config, job_id));
    }
    Ok(results)
}

fn unwrap_single(io: &IoDescription, value: &Value) -> Value {
    match value {
        Value::Array(items) if items.len() == 1 && !io.max_occurs.allows_multiple() => {
            items[0].clone()
        }
        other => other.clone(),
    }
}

fn render_result(
    io: &IoDescription,
    value: &Value,
    config: &EngineConfig,
    job_id: &Uuid,
) -> Value {
    let location = value
        .get("location")
        .and_then(Value::as_str)
        .map(String::from)
        .or_else(|| match value {
            Value::String(s) if s.starts_with("file://") => Some(s.clone()),
            _ => None,
        });
    match location {
        Some(location) => {
            let href = public_output_url(&location, config, job_id);
            let mut result = json!({"id": io.id, "href": href});
            if let Some(format) = io.default_format() {
                result["mimeType"] = json!(format.mime_type);
            }
            result
        }
        None => json!({"id": io.id, "value": value}),
    }
}

/// Rewrite a `file://` output location under the configured output
/// directory to its public URL; anything else passes through.
pub fn public_output_url(location: &str, config: &EngineConfig, job_id: &Uuid) -> String {
    let Some(path) = location.strip_prefix("file://") else {
        return location.to_string();
    };
    let output_root = config.output_dir.to_string_lossy().to_string();
    if let Some(relative) = path.strip_prefix(&output_root) {
        return format!(
            "{}{}",
            config.output_url.trim_end_matches('/'),
            if relative.starts_with('/') {
                relative.to_string()
            } else {
                format!("/{relative}")
            }
        );
    }
    // outside the output tree: serve by file name under the job folder
    let name = path.rsplit('/').next().unwrap_or(path);
    format!("{}/{}", config.job_output_url(job_id), name)
}
