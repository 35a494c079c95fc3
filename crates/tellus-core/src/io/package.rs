// Application-package (CWL dialect) I/O records -> canonical descriptions
//
// Elevation rules:
//   "float"                      -> {type: "float"}
//   ["null", T] and "T?"         -> T with min_occurs = 0
//   {type: array, items: T}, "T[]" -> T with max_occurs = unbounded
//   {type: enum, symbols: [...]} -> literal with inferred base type

use super::{
    elect_default_format, AllowedValues, Format, IoDescription, IoKind, LiteralType, MaxOccurs,
};
use crate::error::{EngineError, Result};
use serde_json::{Map, Value};

/// Element types legal inside an array declaration
const ARRAY_ITEM_TYPES: &[&str] = &[
    "string", "boolean", "int", "long", "float", "double", "File", "Directory",
];

/// Parsed shape of a package type expression
struct ElevatedType {
    base: BaseType,
    nullable: bool,
    array: bool,
    allowed_values: Option<AllowedValues>,
}

enum BaseType {
    Literal(LiteralType),
    File,
    Directory,
}

/// Convert one package input record to a canonical description.
///
/// `record` is the body of an `inputs` entry; shorthand string types are
/// accepted in place of the record.
pub fn io_from_package_input(id: &str, record: &Value) -> Result<IoDescription> {
    let (type_value, body) = split_record(record);
    let elevated = elevate_type(id, &type_value)?;
    let mut io = build_io(id, elevated, body)?;
    if let Some(body) = body {
        if body.contains_key("href") && body.contains_key("data") {
            return Err(EngineError::package_type(format!(
                "input '{id}' declares both 'href' and 'data'"
            )));
        }
        if let IoKind::Literal { default, .. } = &mut io.kind {
            if let Some(value) = body.get("default") {
                *default = Some(value.clone());
                io.min_occurs = 0;
            }
        }
    }
    Ok(io)
}

/// Convert one package output record to a canonical description
pub fn io_from_package_output(id: &str, record: &Value) -> Result<IoDescription> {
    let (type_value, body) = split_record(record);
    let elevated = elevate_type(id, &type_value)?;
    build_io(id, elevated, body)
}

fn split_record(record: &Value) -> (Value, Option<&Map<String, Value>>) {
    match record {
        Value::Object(obj) => {
            let type_value = obj.get("type").cloned().unwrap_or(Value::Null);
            (type_value, Some(obj))
        }
        // shorthand: "msg": "string"
        other => (other.clone(), None),
    }
}

fn build_io(
    id: &str,
    elevated: ElevatedType,
    body: Option<&Map<String, Value>>,
) -> Result<IoDescription> {
    let mut io = match elevated.base {
        BaseType::Literal(data_type) => {
            let mut io = IoDescription::literal(id, data_type);
            if let IoKind::Literal { allowed_values, .. } = &mut io.kind {
                *allowed_values = elevated.allowed_values;
            }
            io
        }
        BaseType::File | BaseType::Directory => {
            let mut formats = body
                .map(|b| formats_from_record(b))
                .unwrap_or_default();
            elect_default_format(&mut formats, None);
            IoDescription::complex(id, formats)
        }
    };
    if elevated.nullable {
        io.min_occurs = 0;
    }
    if elevated.array {
        io.max_occurs = MaxOccurs::Unbounded;
    }
    if let Some(body) = body {
        if let Some(title) = body.get("label").and_then(Value::as_str) {
            io.title = Some(title.to_string());
        }
        if let Some(doc) = body.get("doc").and_then(Value::as_str) {
            io.abstract_ = Some(doc.to_string());
        }
    }
    Ok(io)
}

/// CWL `format` entries carry ontology IRIs or plain media types; anything
/// with a known media-type shape becomes a format hint.
fn formats_from_record(body: &Map<String, Value>) -> Vec<Format> {
    let format_value = match body.get("format") {
        Some(v) => v,
        None => return Vec::new(),
    };
    let entries: Vec<&Value> = match format_value {
        Value::Array(items) => items.iter().collect(),
        single => vec![single],
    };
    entries
        .iter()
        .filter_map(|v| v.as_str())
        .map(format_from_reference)
        .collect()
}

/// Resolve a format IRI (e.g. `edam:format_3989` or a plain media type) to a
/// MIME format hint. Unknown IRIs keep the raw reference in `schema`.
fn format_from_reference(reference: &str) -> Format {
    if reference.contains('/') && !reference.contains(':') {
        return Format::new(reference);
    }
    let mut format = Format::new("application/octet-stream");
    format.schema = Some(reference.to_string());
    format
}

fn elevate_type(id: &str, type_value: &Value) -> Result<ElevatedType> {
    match type_value {
        Value::String(name) => elevate_type_name(id, name),
        Value::Array(union) => elevate_nullable_union(id, union),
        Value::Object(obj) => elevate_type_object(id, obj, false),
        Value::Null => Err(EngineError::package_type(format!(
            "input '{id}' is missing a type"
        ))),
        other => Err(EngineError::package_type(format!(
            "input '{id}' has unsupported type expression: {other}"
        ))),
    }
}

/// Shorthands: "T?" nullable, "T[]" array, "T[]?" both
fn elevate_type_name(id: &str, name: &str) -> Result<ElevatedType> {
    let (name, nullable) = match name.strip_suffix('?') {
        Some(rest) => (rest, true),
        None => (name, false),
    };
    let (name, array) = match name.strip_suffix("[]") {
        Some(rest) => (rest, true),
        None => (name, false),
    };
    if array && !ARRAY_ITEM_TYPES.contains(&name) {
        return Err(EngineError::package_type(format!(
            "input '{id}' declares array of unsupported element type '{name}'"
        )));
    }
    let base = base_type(id, name)?;
    Ok(ElevatedType {
        base,
        nullable,
        array,
        allowed_values: None,
    })
}

/// `["null", T]` is equivalent to T with min_occurs = 0
fn elevate_nullable_union(id: &str, union: &[Value]) -> Result<ElevatedType> {
    let mut nullable = false;
    let mut inner: Option<ElevatedType> = None;
    for member in union {
        match member {
            Value::String(s) if s == "null" => nullable = true,
            other => {
                if inner.is_some() {
                    return Err(EngineError::package_type(format!(
                        "input '{id}' union holds more than one non-null type"
                    )));
                }
                inner = Some(elevate_type(id, other)?);
            }
        }
    }
    let mut elevated = inner.ok_or_else(|| {
        EngineError::package_type(format!("input '{id}' union holds no usable type"))
    })?;
    elevated.nullable = elevated.nullable || nullable;
    Ok(elevated)
}

fn elevate_type_object(
    id: &str,
    obj: &Map<String, Value>,
    inside_array: bool,
) -> Result<ElevatedType> {
    match obj.get("type").and_then(Value::as_str) {
        Some("array") => {
            if inside_array {
                return Err(EngineError::package_type(format!(
                    "input '{id}' nests arrays of arrays"
                )));
            }
            let items = obj.get("items").ok_or_else(|| {
                EngineError::package_type(format!("input '{id}' array is missing 'items'"))
            })?;
            let mut elevated = match items {
                Value::String(name) => {
                    if !ARRAY_ITEM_TYPES.contains(&name.as_str()) {
                        return Err(EngineError::package_type(format!(
                            "input '{id}' declares array of unsupported element type '{name}'"
                        )));
                    }
                    elevate_type_name(id, name)?
                }
                Value::Object(inner) => elevate_type_object(id, inner, true)?,
                other => {
                    return Err(EngineError::package_type(format!(
                        "input '{id}' has unsupported array items: {other}"
                    )))
                }
            };
            elevated.array = true;
            Ok(elevated)
        }
        Some("enum") => elevate_enum(id, obj),
        Some(name) => elevate_type_name(id, name),
        None => Err(EngineError::package_type(format!(
            "input '{id}' type object is missing 'type'"
        ))),
    }
}

/// Enums become literals with an explicit allowed-values list; the base type
/// is inferred from the symbols (string > int > float precedence, mixed
/// symbol kinds rejected).
fn elevate_enum(id: &str, obj: &Map<String, Value>) -> Result<ElevatedType> {
    let symbols = obj
        .get("symbols")
        .and_then(Value::as_array)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            EngineError::package_type(format!("input '{id}' enum declares no symbols"))
        })?;

    let all_strings = symbols.iter().all(Value::is_string);
    let all_ints = symbols.iter().all(|v| v.is_i64() || v.is_u64());
    let all_numeric = symbols.iter().all(Value::is_number);
    let data_type = if all_strings {
        LiteralType::String
    } else if all_ints {
        LiteralType::Integer
    } else if all_numeric {
        LiteralType::Float
    } else {
        return Err(EngineError::package_type(format!(
            "input '{id}' enum mixes symbol types"
        )));
    };

    Ok(ElevatedType {
        base: BaseType::Literal(data_type),
        nullable: false,
        array: false,
        allowed_values: Some(AllowedValues::Values(symbols.clone())),
    })
}

fn base_type(id: &str, name: &str) -> Result<BaseType> {
    match name {
        "File" => Ok(BaseType::File),
        "Directory" => Ok(BaseType::Directory),
        other => LiteralType::parse(other)
            .map(BaseType::Literal)
            .ok_or_else(|| {
                EngineError::package_type(format!("input '{id}' has unknown type '{other}'"))
            }),
    }
}
