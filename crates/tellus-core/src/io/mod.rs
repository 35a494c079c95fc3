// Canonical I/O description model
//
// Every process input/output, whatever dialect it arrives in (application
// package record, JSON process description, remote WPS-1 XML), is normalized
// into IoDescription before the engine looks at it. Converters live in the
// sibling modules; each returns Result and preserves every semantic field
// through round-trips.

mod alias;
mod json;
mod merge;
mod package;

pub use alias::{canonical_field, normalize_fields};
pub use json::{io_from_json, io_to_json};
pub use merge::merge_io_descriptions;
pub use package::{io_from_package_input, io_from_package_output};

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Literal data types understood by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiteralType {
    #[serde(rename = "string")]
    String,
    #[serde(rename = "integer")]
    Integer,
    #[serde(rename = "float")]
    Float,
    #[serde(rename = "boolean")]
    Boolean,
    #[serde(rename = "dateTime")]
    DateTime,
    #[serde(rename = "anyURI")]
    AnyUri,
}

impl LiteralType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LiteralType::String => "string",
            LiteralType::Integer => "integer",
            LiteralType::Float => "float",
            LiteralType::Boolean => "boolean",
            LiteralType::DateTime => "dateTime",
            LiteralType::AnyUri => "anyURI",
        }
    }

    /// Parse a literal type name in any of the accepted dialects
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "string" => Some(LiteralType::String),
            "int" | "integer" | "long" => Some(LiteralType::Integer),
            "float" | "double" => Some(LiteralType::Float),
            "boolean" | "bool" => Some(LiteralType::Boolean),
            "dateTime" | "datetime" | "date-time" => Some(LiteralType::DateTime),
            "anyURI" => Some(LiteralType::AnyUri),
            _ => None,
        }
    }
}

impl fmt::Display for LiteralType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upper occurrence bound: a count or the "unbounded" sentinel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxOccurs {
    Count(u32),
    Unbounded,
}

impl MaxOccurs {
    pub fn allows_multiple(&self) -> bool {
        match self {
            MaxOccurs::Count(n) => *n > 1,
            MaxOccurs::Unbounded => true,
        }
    }

    /// Parse from a JSON value: integer, numeric string, or "unbounded"
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_u64().map(|n| MaxOccurs::Count(n as u32)),
            Value::String(s) if s.eq_ignore_ascii_case("unbounded") => {
                Some(MaxOccurs::Unbounded)
            }
            Value::String(s) => s.parse::<u32>().ok().map(MaxOccurs::Count),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            MaxOccurs::Count(n) => Value::from(*n),
            MaxOccurs::Unbounded => Value::from("unbounded"),
        }
    }
}

impl Serialize for MaxOccurs {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for MaxOccurs {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        MaxOccurs::from_value(&value)
            .ok_or_else(|| serde::de::Error::custom("expected integer or \"unbounded\""))
    }
}

/// One allowed-value range for a literal domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spacing: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closure: Option<String>,
}

/// Literal-domain constraint
#[derive(Debug, Clone, PartialEq)]
pub enum AllowedValues {
    AnyValue,
    Values(Vec<Value>),
    Ranges(Vec<ValueRange>),
    Reference(String),
}

/// One supported format of a complex I/O
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Format {
    pub mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default)]
    pub default: bool,
}

impl Format {
    pub fn new(mime_type: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            encoding: None,
            schema: None,
            default: false,
        }
    }
}

/// Metadata link attached to a process or I/O
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Kind-specific payload of an I/O description
#[derive(Debug, Clone, PartialEq)]
pub enum IoKind {
    Literal {
        data_type: LiteralType,
        allowed_values: Option<AllowedValues>,
        default: Option<Value>,
    },
    BoundingBox {
        supported_crs: Vec<String>,
    },
    Complex {
        formats: Vec<Format>,
    },
}

impl IoKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            IoKind::Literal { .. } => "literal",
            IoKind::BoundingBox { .. } => "bbox",
            IoKind::Complex { .. } => "complex",
        }
    }
}

/// Canonical description of a process input or output.
///
/// Built at deploy time by merging package-derived and payload-supplied
/// descriptions; frozen thereafter, never mutated by execution.
#[derive(Debug, Clone, PartialEq)]
pub struct IoDescription {
    pub id: String,
    pub title: Option<String>,
    pub abstract_: Option<String>,
    pub keywords: Vec<String>,
    pub metadata: Vec<Metadata>,
    pub min_occurs: u32,
    pub max_occurs: MaxOccurs,
    pub kind: IoKind,
}

impl IoDescription {
    pub fn literal(id: impl Into<String>, data_type: LiteralType) -> Self {
        Self {
            id: id.into(),
            title: None,
            abstract_: None,
            keywords: Vec::new(),
            metadata: Vec::new(),
            min_occurs: 1,
            max_occurs: MaxOccurs::Count(1),
            kind: IoKind::Literal {
                data_type,
                allowed_values: None,
                default: None,
            },
        }
    }

    pub fn complex(id: impl Into<String>, formats: Vec<Format>) -> Self {
        Self {
            id: id.into(),
            title: None,
            abstract_: None,
            keywords: Vec::new(),
            metadata: Vec::new(),
            min_occurs: 1,
            max_occurs: MaxOccurs::Count(1),
            kind: IoKind::Complex { formats },
        }
    }

    pub fn is_complex(&self) -> bool {
        matches!(self.kind, IoKind::Complex { .. })
    }

    /// The format elected as default, if any (see `elect_default_format`)
    pub fn default_format(&self) -> Option<&Format> {
        match &self.kind {
            IoKind::Complex { formats } => formats
                .iter()
                .find(|f| f.default)
                .or_else(|| formats.first()),
            _ => None,
        }
    }
}

/// Mark the default entry of a format list.
///
/// The format matching both `mime_type` and `encoding` of the declared
/// default is marked. If none matches and the list has exactly one entry,
/// that entry is the default. Otherwise no format is marked.
pub fn elect_default_format(formats: &mut [Format], declared: Option<&Format>) {
    for f in formats.iter_mut() {
        f.default = false;
    }
    if let Some(declared) = declared {
        if let Some(found) = formats
            .iter_mut()
            .find(|f| f.mime_type == declared.mime_type && f.encoding == declared.encoding)
        {
            found.default = true;
            return;
        }
    }
    if formats.len() == 1 {
        formats[0].default = true;
    }
}

/// Check that every I/O id is unique within its list
pub fn check_unique_ids(ios: &[IoDescription]) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for io in ios {
        if !seen.insert(io.id.as_str()) {
            return Err(EngineError::package_type(format!(
                "duplicate I/O identifier '{}'",
                io.id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_max_occurs_parsing() {
        assert_eq!(
            MaxOccurs::from_value(&json!(3)),
            Some(MaxOccurs::Count(3))
        );
        assert_eq!(
            MaxOccurs::from_value(&json!("4")),
            Some(MaxOccurs::Count(4))
        );
        assert_eq!(
            MaxOccurs::from_value(&json!("unbounded")),
            Some(MaxOccurs::Unbounded)
        );
        assert_eq!(MaxOccurs::from_value(&json!(null)), None);
    }

    #[test]
    fn test_elect_default_format_by_match() {
        let mut formats = vec![
            Format::new("application/json"),
            Format {
                mime_type: "application/x-netcdf".into(),
                encoding: Some("base64".into()),
                schema: None,
                default: false,
            },
        ];
        let declared = Format {
            mime_type: "application/x-netcdf".into(),
            encoding: Some("base64".into()),
            schema: None,
            default: false,
        };
        elect_default_format(&mut formats, Some(&declared));
        assert!(!formats[0].default);
        assert!(formats[1].default);
    }

    #[test]
    fn test_elect_default_format_singleton_fallback() {
        let mut formats = vec![Format::new("text/plain")];
        let declared = Format::new("application/json");
        elect_default_format(&mut formats, Some(&declared));
        assert!(formats[0].default);
    }

    #[test]
    fn test_elect_default_format_no_match_multiple() {
        let mut formats = vec![Format::new("text/plain"), Format::new("text/csv")];
        let declared = Format::new("application/json");
        elect_default_format(&mut formats, Some(&declared));
        assert!(formats.iter().all(|f| !f.default));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let ios = vec![
            IoDescription::literal("a01", LiteralType::String),
            IoDescription::literal("a01", LiteralType::Integer),
        ];
        assert!(check_unique_ids(&ios).is_err());
    }
}
