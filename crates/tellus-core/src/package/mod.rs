// Application-package document model
//
// A package is a CWL-style document: CommandLineTool, ExpressionTool or
// Workflow, with inputs/outputs records and class-tagged requirement/hint
// bags. The dispatcher selects exactly one application class per
// CommandLineTool from the hint bag.

pub mod loader;

pub use loader::{
    ImportedProcess, LoadedPackage, PackageLoader, RemoteProcessImporter, SubProcessResolver,
    PACKAGE_EXTENSIONS,
};

use crate::error::{EngineError, Result};
use crate::io::{io_from_package_input, io_from_package_output, IoDescription};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Top-level package classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackageClass {
    CommandLineTool,
    ExpressionTool,
    Workflow,
}

impl fmt::Display for PackageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PackageClass::CommandLineTool => "CommandLineTool",
            PackageClass::ExpressionTool => "ExpressionTool",
            PackageClass::Workflow => "Workflow",
        };
        f.write_str(name)
    }
}

/// Application-class hint suffixes recognized in requirement/hint bags
pub const APP_DOCKER: &str = "DockerRequirement";
pub const APP_WPS1: &str = "WPS1Requirement";
pub const APP_ESGF: &str = "ESGF-CWTRequirement";
pub const APP_BUILTIN: &str = "BuiltinRequirement";

const APP_CLASSES: &[&str] = &[APP_DOCKER, APP_WPS1, APP_ESGF, APP_BUILTIN];

/// Backend a package dispatches to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplicationKind {
    /// Local command-line execution, containerized when an image is declared
    Command { image: Option<String> },
    /// Dispatch to a remote WPS-1 provider
    Wps1 { provider: String, process: String },
    /// Dispatch to a remote ESGF-CWT provider
    Esgf {
        provider: String,
        process: String,
        api_key: Option<String>,
    },
    /// Invoke a named local script
    Builtin { process: String },
    /// Delegate to the workflow step engine
    Workflow,
}

/// One step of a workflow package
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowStep {
    pub id: String,
    pub run: String,
    /// step input id -> binding
    pub inputs: BTreeMap<String, StepInput>,
    pub outputs: Vec<String>,
}

/// Binding of one workflow step input
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StepInput {
    /// Reference to a workflow input or an upstream `step/output`
    pub source: Option<String>,
    pub default: Option<Value>,
}

/// Parsed application-package document. `extra` keeps every field this model
/// does not interpret, so emission stays faithful to the source document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    #[serde(rename = "cwlVersion")]
    pub cwl_version: String,
    pub class: PackageClass,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "baseCommand", default, skip_serializing_if = "Option::is_none")]
    pub base_command: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
    #[serde(default)]
    pub inputs: Value,
    #[serde(default)]
    pub outputs: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirements: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hints: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<Value>,
    #[serde(rename = "successCodes", default, skip_serializing_if = "Option::is_none")]
    pub success_codes: Option<Vec<i64>>,
    #[serde(
        rename = "temporaryFailCodes",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub temporary_fail_codes: Option<Vec<i64>>,
    #[serde(
        rename = "permanentFailCodes",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub permanent_fail_codes: Option<Vec<i64>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Package {
    /// Parse a package document, validating `cwlVersion` and `class` before
    /// structural deserialization so the error taxonomy stays precise.
    pub fn from_value(doc: &Value) -> Result<Package> {
        let obj = doc
            .as_object()
            .ok_or_else(|| EngineError::registration("package document must be an object"))?;
        if !obj.contains_key("cwlVersion") {
            return Err(EngineError::registration(
                "package document is missing 'cwlVersion'",
            ));
        }
        match obj.get("class").and_then(Value::as_str) {
            Some("CommandLineTool") | Some("ExpressionTool") | Some("Workflow") => {}
            Some(other) => {
                return Err(EngineError::package_type(format!(
                    "unsupported package class '{other}'"
                )))
            }
            None => {
                return Err(EngineError::package_type(
                    "package document is missing 'class'",
                ))
            }
        }
        serde_json::from_value(doc.clone())
            .map_err(|e| EngineError::registration(format!("malformed package document: {e}")))
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Entries of the `inputs`/`outputs` records, accepting both the
    /// map form `{id: record}` and the list form `[{id: ..., ...}]`.
    fn record_entries(record: &Value, section: &str) -> Result<Vec<(String, Value)>> {
        match record {
            Value::Null => Ok(Vec::new()),
            Value::Object(map) => Ok(map
                .iter()
                .map(|(id, body)| (id.clone(), body.clone()))
                .collect()),
            Value::Array(list) => list
                .iter()
                .map(|entry| {
                    let obj = entry.as_object().ok_or_else(|| {
                        EngineError::registration(format!("{section} list entries must be objects"))
                    })?;
                    let id = obj
                        .get("id")
                        .and_then(Value::as_str)
                        .ok_or_else(|| {
                            EngineError::registration(format!(
                                "{section} list entry is missing 'id'"
                            ))
                        })?
                        .to_string();
                    Ok((id, entry.clone()))
                })
                .collect(),
            _ => Err(EngineError::registration(format!(
                "{section} must be a map or a list"
            ))),
        }
    }

    /// Canonical descriptions of the package inputs, in document order
    pub fn input_descriptions(&self) -> Result<Vec<IoDescription>> {
        Self::record_entries(&self.inputs, "inputs")?
            .iter()
            .map(|(id, body)| io_from_package_input(id, body))
            .collect()
    }

    /// Canonical descriptions of the package outputs, in document order
    pub fn output_descriptions(&self) -> Result<Vec<IoDescription>> {
        Self::record_entries(&self.outputs, "outputs")?
            .iter()
            .map(|(id, body)| io_from_package_output(id, body))
            .collect()
    }

    /// All requirement and hint entries as `(class, body)` pairs. Both bags
    /// accept the map form `{class: body}` and the list form
    /// `[{class: ..., ...}]`.
    pub fn requirement_entries(&self) -> Vec<(String, Map<String, Value>)> {
        let mut entries = Vec::new();
        for bag in [&self.requirements, &self.hints] {
            let Some(bag) = bag else { continue };
            match bag {
                Value::Object(map) => {
                    for (class, body) in map {
                        let body = body.as_object().cloned().unwrap_or_default();
                        entries.push((class.clone(), body));
                    }
                }
                Value::Array(list) => {
                    for entry in list {
                        let Some(obj) = entry.as_object() else { continue };
                        let Some(class) = obj.get("class").and_then(Value::as_str) else {
                            continue;
                        };
                        entries.push((class.to_string(), obj.clone()));
                    }
                }
                _ => {}
            }
        }
        entries
    }

    /// Select the application class of this package.
    ///
    /// More than one application hint in a single CommandLineTool is an
    /// error; none at all runs the command directly.
    pub fn application_kind(&self) -> Result<ApplicationKind> {
        if self.class == PackageClass::Workflow {
            return Ok(ApplicationKind::Workflow);
        }
        let app_hints: Vec<(String, Map<String, Value>)> = self
            .requirement_entries()
            .into_iter()
            .filter(|(class, _)| APP_CLASSES.iter().any(|app| class.ends_with(app)))
            .collect();
        if app_hints.len() > 1 {
            let classes: Vec<&str> = app_hints.iter().map(|(c, _)| c.as_str()).collect();
            return Err(EngineError::package_type(format!(
                "package declares more than one application hint ({}); only one permitted",
                classes.join(", ")
            )));
        }
        let Some((class, body)) = app_hints.into_iter().next() else {
            return Ok(ApplicationKind::Command { image: None });
        };
        if class.ends_with(APP_DOCKER) {
            return Ok(ApplicationKind::Command {
                image: body
                    .get("dockerPull")
                    .and_then(Value::as_str)
                    .map(String::from),
            });
        }
        if class.ends_with(APP_ESGF) {
            let (provider, process) = provider_process(&class, &body)?;
            let api_key = body
                .get("api_key")
                .or_else(|| body.get("apiKey"))
                .and_then(Value::as_str)
                .map(String::from);
            return Ok(ApplicationKind::Esgf {
                provider,
                process,
                api_key,
            });
        }
        if class.ends_with(APP_WPS1) {
            let (provider, process) = provider_process(&class, &body)?;
            return Ok(ApplicationKind::Wps1 { provider, process });
        }
        let process = body
            .get("process")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                EngineError::package_type(format!("'{class}' hint is missing 'process'"))
            })?
            .to_string();
        Ok(ApplicationKind::Builtin { process })
    }

    /// Parsed workflow steps, in step-name order
    pub fn workflow_steps(&self) -> Result<Vec<WorkflowStep>> {
        let steps = self.steps.as_ref().ok_or_else(|| {
            EngineError::package_type("workflow package declares no steps")
        })?;
        let entries = Self::record_entries(steps, "steps")?;
        entries
            .iter()
            .map(|(id, body)| parse_step(id, body))
            .collect()
    }

    /// Rewrite the `run` reference of one step (used by the loader to point
    /// steps at their resolved sub-package files)
    pub fn set_step_run(&mut self, step_id: &str, run: &str) -> Result<()> {
        let steps = self
            .steps
            .as_mut()
            .ok_or_else(|| EngineError::package_type("workflow package declares no steps"))?;
        let body = match steps {
            Value::Object(map) => map.get_mut(step_id),
            Value::Array(list) => list.iter_mut().find(|entry| {
                entry.get("id").and_then(Value::as_str) == Some(step_id)
            }),
            _ => None,
        };
        let body = body.ok_or_else(|| {
            EngineError::PackageNotFound(format!("workflow step '{step_id}'"))
        })?;
        if let Some(obj) = body.as_object_mut() {
            obj.insert("run".into(), Value::String(run.to_string()));
            Ok(())
        } else {
            Err(EngineError::registration(format!(
                "workflow step '{step_id}' must be an object"
            )))
        }
    }
}

/// Order workflow steps by their `in(step).source` dependencies.
///
/// A source `"{step}/{output}"` makes this step depend on `{step}`; plain
/// sources reference workflow inputs. Dependency cycles are rejected.
pub fn topological_order(steps: Vec<WorkflowStep>) -> Result<Vec<WorkflowStep>> {
    let step_ids: std::collections::HashSet<String> =
        steps.iter().map(|s| s.id.clone()).collect();
    let mut remaining = steps;
    let mut ordered: Vec<WorkflowStep> = Vec::with_capacity(remaining.len());
    let mut placed: std::collections::HashSet<String> = std::collections::HashSet::new();

    while !remaining.is_empty() {
        let ready_idx = remaining.iter().position(|step| {
            step.inputs.values().all(|input| {
                match input.source.as_deref().and_then(|s| s.split_once('/')) {
                    Some((upstream, _)) => {
                        !step_ids.contains(upstream) || placed.contains(upstream)
                    }
                    None => true,
                }
            })
        });
        match ready_idx {
            Some(idx) => {
                let step = remaining.remove(idx);
                placed.insert(step.id.clone());
                ordered.push(step);
            }
            None => {
                let stuck: Vec<String> = remaining.iter().map(|s| s.id.clone()).collect();
                return Err(EngineError::registration(format!(
                    "workflow step dependency cycle among: {}",
                    stuck.join(", ")
                )));
            }
        }
    }
    Ok(ordered)
}

fn provider_process(class: &str, body: &Map<String, Value>) -> Result<(String, String)> {
    let provider = body
        .get("provider")
        .and_then(Value::as_str)
        .ok_or_else(|| EngineError::package_type(format!("'{class}' hint is missing 'provider'")))?
        .to_string();
    let process = body
        .get("process")
        .and_then(Value::as_str)
        .ok_or_else(|| EngineError::package_type(format!("'{class}' hint is missing 'process'")))?
        .to_string();
    Ok((provider, process))
}

fn parse_step(id: &str, body: &Value) -> Result<WorkflowStep> {
    let obj = body.as_object().ok_or_else(|| {
        EngineError::registration(format!("workflow step '{id}' must be an object"))
    })?;
    let run = obj
        .get("run")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            EngineError::registration(format!("workflow step '{id}' is missing 'run'"))
        })?
        .to_string();

    let mut inputs = BTreeMap::new();
    if let Some(step_in) = obj.get("in").or_else(|| obj.get("inputs")) {
        let entries = Package::record_entries(step_in, "step inputs")?;
        for (input_id, binding) in entries {
            let input = match binding {
                Value::String(source) => StepInput {
                    source: Some(source),
                    default: None,
                },
                Value::Object(map) => StepInput {
                    source: map.get("source").and_then(Value::as_str).map(String::from),
                    default: map.get("default").cloned(),
                },
                _ => StepInput::default(),
            };
            inputs.insert(input_id, input);
        }
    }

    let outputs = match obj.get("out").or_else(|| obj.get("outputs")) {
        Some(Value::Array(list)) => list
            .iter()
            .filter_map(|entry| match entry {
                Value::String(s) => Some(s.clone()),
                Value::Object(map) => map.get("id").and_then(Value::as_str).map(String::from),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };

    Ok(WorkflowStep {
        id: id.to_string(),
        run,
        inputs,
        outputs,
    })
}
