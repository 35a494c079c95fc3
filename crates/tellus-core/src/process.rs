// Process entity
//
// A process is a deployed, describable, executable unit: its identity and
// descriptive fields, its frozen I/O descriptions, the verbatim package and
// deploy payload it came from, and its visibility.

use crate::error::{EngineError, Result};
use crate::ident::validate_identifier;
use crate::io::{check_unique_ids, io_to_json, IoDescription, Metadata};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// Per-process access control: private processes are invisible to non-owners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        })
    }
}

impl std::str::FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            other => Err(format!("unknown visibility: {other}")),
        }
    }
}

/// How a process executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum ProcessType {
    #[serde(rename = "application")]
    Application,
    #[serde(rename = "workflow")]
    Workflow,
    #[serde(rename = "builtin")]
    Builtin,
    #[serde(rename = "remote-wps")]
    RemoteWps,
    #[serde(rename = "remote-esgf")]
    RemoteEsgf,
}

/// A deployed process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Process {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "abstract", skip_serializing_if = "Option::is_none")]
    pub abstract_: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub metadata: Vec<Metadata>,
    #[serde(skip)]
    pub inputs: Vec<IoDescription>,
    #[serde(skip)]
    pub outputs: Vec<IoDescription>,
    pub visibility: Visibility,
    #[serde(rename = "type")]
    pub process_type: ProcessType,
    /// Verbatim application-package document
    pub package: Value,
    /// Verbatim deploy request
    pub payload: Value,
    #[serde(rename = "executeEndpoint", skip_serializing_if = "Option::is_none")]
    pub execute_endpoint: Option<String>,
    #[serde(rename = "processDescriptionURL", skip_serializing_if = "Option::is_none")]
    pub process_description_url: Option<String>,
}

impl Process {
    /// Create a process with a validated identifier and default fields
    pub fn new(id: impl Into<String>, process_type: ProcessType) -> Result<Self> {
        let id = id.into();
        validate_identifier(&id)?;
        Ok(Self {
            id,
            version: None,
            title: None,
            abstract_: None,
            keywords: Vec::new(),
            metadata: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            visibility: Visibility::Private,
            process_type,
            package: Value::Null,
            payload: Value::Null,
            execute_endpoint: None,
            process_description_url: None,
        })
    }

    /// Install I/O lists, enforcing unique identifiers within each
    pub fn with_io(
        mut self,
        inputs: Vec<IoDescription>,
        outputs: Vec<IoDescription>,
    ) -> Result<Self> {
        check_unique_ids(&inputs)?;
        check_unique_ids(&outputs)?;
        self.inputs = inputs;
        self.outputs = outputs;
        Ok(self)
    }

    /// Builtin processes cannot be undeployed nor change visibility
    pub fn is_builtin(&self) -> bool {
        self.process_type == ProcessType::Builtin
    }

    pub fn is_workflow(&self) -> bool {
        self.process_type == ProcessType::Workflow
    }

    /// JSON process description served by describe endpoints
    pub fn describe_json(&self) -> Value {
        let mut obj = serde_json::Map::new();
        obj.insert("id".into(), json!(self.id));
        obj.insert("visibility".into(), json!(self.visibility));
        obj.insert(
            "jobControlOptions".into(),
            json!(["async-execute", "sync-execute"]),
        );
        obj.insert(
            "outputTransmission".into(),
            json!(["reference", "value"]),
        );
        obj.insert(
            "inputs".into(),
            Value::Array(self.inputs.iter().map(io_to_json).collect()),
        );
        obj.insert(
            "outputs".into(),
            Value::Array(self.outputs.iter().map(io_to_json).collect()),
        );
        if let Some(version) = &self.version {
            obj.insert("version".into(), json!(version));
        }
        if let Some(title) = &self.title {
            obj.insert("title".into(), json!(title));
        }
        if let Some(abstract_) = &self.abstract_ {
            obj.insert("abstract".into(), json!(abstract_));
        }
        if !self.keywords.is_empty() {
            obj.insert("keywords".into(), json!(self.keywords));
        }
        if !self.metadata.is_empty() {
            obj.insert("metadata".into(), json!(self.metadata));
        }
        if let Some(endpoint) = &self.execute_endpoint {
            obj.insert("executeEndpoint".into(), json!(endpoint));
        }
        if let Some(url) = &self.process_description_url {
            obj.insert("processDescriptionURL".into(), json!(url));
        }
        json!({ "process": Value::Object(obj) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::LiteralType;

    #[test]
    fn test_new_validates_identifier() {
        assert!(Process::new("ok-process", ProcessType::Application).is_ok());
        assert!(Process::new("no", ProcessType::Application).is_err());
        assert!(Process::new("bad--slug", ProcessType::Application).is_err());
    }

    #[test]
    fn test_with_io_rejects_duplicates() {
        let process = Process::new("proc-a", ProcessType::Application).unwrap();
        let duplicated = vec![
            IoDescription::literal("x01", LiteralType::String),
            IoDescription::literal("x01", LiteralType::String),
        ];
        assert!(process.with_io(duplicated, vec![]).is_err());
    }

    #[test]
    fn test_describe_json_shape() {
        let process = Process::new("stacker", ProcessType::Application)
            .unwrap()
            .with_io(
                vec![IoDescription::literal("msg", LiteralType::String)],
                vec![],
            )
            .unwrap();
        let doc = process.describe_json();
        assert_eq!(doc["process"]["id"], "stacker");
        assert_eq!(doc["process"]["inputs"][0]["id"], "msg");
        assert_eq!(doc["process"]["inputs"][0]["data_type"], "string");
    }
}
