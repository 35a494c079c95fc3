// Field-name alias normalization for the JSON description dialect
//
// The JSON layer accepts multiple spellings per logical field (minOccurs,
// MinOccurs, min_occurs, ...) but every parser in this crate sees only the
// canonical spelling. Lookup is case- and separator-tolerant; emission is
// single-canonical. All alias handling lives here and nowhere else.

use serde_json::{Map, Value};

/// Canonical spellings, in emission order. The fold key (lowercase,
/// separators stripped) of any alias matches the fold key of its canonical
/// form, so one table covers every accepted spelling.
const CANONICAL_FIELDS: &[&str] = &[
    "id",
    "title",
    "abstract",
    "keywords",
    "metadata",
    "min_occurs",
    "max_occurs",
    "data_type",
    "allowed_values",
    "default",
    "supported_formats",
    "mime_type",
    "encoding",
    "schema",
    "supported_crs",
    "additional_parameters",
];

/// Aliases whose fold key differs from the canonical fold key
fn folded_alias(folded: &str) -> Option<&'static str> {
    match folded {
        "identifier" => Some("id"),
        "formats" => Some("supported_formats"),
        "type" => Some("data_type"),
        "literaldatadomains" => Some("allowed_values"),
        "crs" | "crss" => Some("supported_crs"),
        _ => None,
    }
}

/// Fold a key for tolerant comparison: lowercase, `_`/`-` stripped
fn fold_key(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Canonical spelling for a field name in any accepted alias, or None when
/// the field is not aliased (unknown fields pass through unchanged).
pub fn canonical_field(key: &str) -> Option<&'static str> {
    let folded = fold_key(key);
    if let Some(canonical) = folded_alias(&folded) {
        return Some(canonical);
    }
    CANONICAL_FIELDS
        .iter()
        .find(|c| fold_key(c) == folded)
        .copied()
}

/// Normalize every aliased key of a JSON object (and of nested objects in
/// `supported_formats`, `allowed_values` and `metadata` lists) to its
/// canonical spelling. Unknown keys are kept verbatim. Idempotent:
/// `normalize(normalize(x)) == normalize(x)`.
pub fn normalize_fields(obj: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::with_capacity(obj.len());
    for (key, value) in obj {
        let canonical = canonical_field(key).map(str::to_string).unwrap_or_else(|| key.clone());
        let value = match canonical.as_str() {
            "supported_formats" | "metadata" | "allowed_values" => normalize_list(value),
            _ => value.clone(),
        };
        // first spelling wins when two aliases of one field collide
        out.entry(canonical).or_insert(value);
    }
    out
}

fn normalize_list(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| match item {
                    Value::Object(obj) => Value::Object(normalize_fields(obj)),
                    other => other.clone(),
                })
                .collect(),
        ),
        Value::Object(obj) => Value::Object(normalize_fields(obj)),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn normalize(value: Value) -> Value {
        Value::Object(normalize_fields(value.as_object().unwrap()))
    }

    #[test]
    fn test_identifier_aliases() {
        for alias in ["id", "identifier", "Id", "ID", "Identifier"] {
            assert_eq!(canonical_field(alias), Some("id"), "alias {alias}");
        }
    }

    #[test]
    fn test_occurs_aliases() {
        for alias in ["minOccurs", "MinOccurs", "Min_Occurs", "min_occurs", "minoccurs"] {
            assert_eq!(canonical_field(alias), Some("min_occurs"), "alias {alias}");
        }
        for alias in ["maxOccurs", "MaxOccurs", "Max_Occurs", "max_occurs", "maxoccurs"] {
            assert_eq!(canonical_field(alias), Some("max_occurs"), "alias {alias}");
        }
    }

    #[test]
    fn test_format_and_type_aliases() {
        for alias in ["formats", "supportedFormats", "SupportedFormats", "supported_formats"] {
            assert_eq!(canonical_field(alias), Some("supported_formats"));
        }
        for alias in ["type", "dataType", "DataType", "data_type"] {
            assert_eq!(canonical_field(alias), Some("data_type"));
        }
        for alias in ["mimeType", "MimeType", "mime-type", "Mime-Type", "mime_type"] {
            assert_eq!(canonical_field(alias), Some("mime_type"));
        }
        for alias in ["allowedValues", "AllowedValues", "allowed_values", "allowedvalues"] {
            assert_eq!(canonical_field(alias), Some("allowed_values"));
        }
    }

    #[test]
    fn test_unknown_fields_pass_through() {
        assert_eq!(canonical_field("somethingElse"), None);
        let normalized = normalize(json!({"customField": 1, "Identifier": "x"}));
        assert_eq!(normalized, json!({"customField": 1, "id": "x"}));
    }

    #[test]
    fn test_nested_formats_normalized() {
        let normalized = normalize(json!({
            "Identifier": "data",
            "SupportedFormats": [{"mimeType": "application/json", "Encoding": "utf-8"}]
        }));
        assert_eq!(
            normalized,
            json!({
                "id": "data",
                "supported_formats": [{"mime_type": "application/json", "encoding": "utf-8"}]
            })
        );
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let input = json!({
            "Identifier": "data",
            "minOccurs": "0",
            "MaxOccurs": "unbounded",
            "formats": [{"mime-type": "text/plain"}],
            "extra": {"keep": true}
        });
        let once = normalize(input);
        let twice = normalize(once.clone());
        assert_eq!(once, twice);
    }
}
