// Workflow step engine
//
// Walks the steps of a workflow package in dependency order, wiring each
// step's inputs from the workflow's external inputs or from upstream step
// outputs, dispatching every step through the engine, and mapping the
// declared workflow outputs from their source step-output references.
//
// Steps run sequentially in topological order; the wiring is independent
// of the scheduler, so a parallel scheduler can replace the loop.

use crate::dispatcher::ExecutionEngine;
use crate::marshal::{marshal_inputs, InputValue, ResolvedInput};
use crate::queue::CancelToken;
use crate::tracker::ProgressSender;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::path::Path;
use tellus_core::{topological_order, EngineError, JobStatus, LoadedPackage, Result};
use tracing::info;

/// Execute a workflow package
pub async fn run_workflow(
    engine: &ExecutionEngine,
    loaded: &LoadedPackage,
    external_inputs: &[ResolvedInput],
    workdir: &Path,
    progress: &ProgressSender,
    cancel: &CancelToken,
) -> Result<Map<String, Value>> {
    let steps = topological_order(loaded.package.workflow_steps()?)?;
    let step_count = steps.len().max(1);

    // step id -> output id -> produced value
    let mut step_outputs: HashMap<String, Map<String, Value>> = HashMap::new();

    for (idx, step) in steps.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(EngineError::execution("job dismissed"));
        }
        let scoped = progress.for_step(idx, step_count);
        scoped.send(
            JobStatus::Running,
            0,
            format!("Running workflow step '{}'", step.id),
        );
        info!(step = %step.id, run = %step.run, "Executing workflow step");

        let step_loaded = engine
            .loader()
            .load_reference(&step.run)
            .await
            .map_err(|e| step_error(&step.id, e))?;
        let declared_inputs = step_loaded
            .package
            .input_descriptions()
            .map_err(|e| step_error(&step.id, e))?;
        let declared_outputs = step_loaded
            .package
            .output_descriptions()
            .map_err(|e| step_error(&step.id, e))?;

        let raw = wire_step_inputs(step, external_inputs, &step_outputs)?;
        let inputs =
            marshal_inputs(&declared_inputs, &raw).map_err(|e| step_error(&step.id, e))?;

        let produced = engine
            .execute_package(
                &step_loaded,
                inputs,
                &declared_outputs,
                &workdir.join(&step.id),
                &scoped,
                cancel,
            )
            .await
            .map_err(|e| step_error(&step.id, e))?;

        scoped.send(
            JobStatus::Running,
            100,
            format!("Workflow step '{}' succeeded", step.id),
        );
        step_outputs.insert(step.id.clone(), produced);
    }

    map_workflow_outputs(loaded, &step_outputs)
}

fn step_error(step_id: &str, error: EngineError) -> EngineError {
    match error {
        EngineError::PackageNotFound(reference) => {
            EngineError::PackageNotFound(format!("step '{step_id}': {reference}"))
        }
        other => EngineError::execution(format!("step '{step_id}': {other}")),
    }
}

/// Build the submitted-input document of one step from its bindings
fn wire_step_inputs(
    step: &tellus_core::WorkflowStep,
    external_inputs: &[ResolvedInput],
    step_outputs: &HashMap<String, Map<String, Value>>,
) -> Result<Value> {
    let mut occurrences: Vec<Value> = Vec::new();
    for (input_id, binding) in &step.inputs {
        match binding.source.as_deref() {
            Some(source) => match source.split_once('/') {
                Some((upstream, output_id)) if step_outputs.contains_key(upstream) => {
                    let outputs = &step_outputs[upstream];
                    let value = outputs.get(output_id).ok_or_else(|| {
                        EngineError::execution(format!(
                            "step '{}' wires '{input_id}' from missing upstream output '{source}'",
                            step.id
                        ))
                    })?;
                    push_produced(&mut occurrences, input_id, value);
                }
                _ => {
                    // workflow external input
                    let external = external_inputs
                        .iter()
                        .find(|input| input.io.id == source)
                        .ok_or_else(|| {
                            EngineError::execution(format!(
                                "step '{}' wires '{input_id}' from unknown workflow input '{source}'",
                                step.id
                            ))
                        })?;
                    for value in &external.values {
                        occurrences.push(submitted_occurrence(input_id, value));
                    }
                }
            },
            None => {
                if let Some(default) = &binding.default {
                    occurrences.push(json!({"id": input_id, "data": default}));
                }
            }
        }
    }
    Ok(Value::Array(occurrences))
}

/// Produced values (location objects, literals, arrays of either) become
/// submitted occurrences for the downstream step
fn push_produced(occurrences: &mut Vec<Value>, input_id: &str, value: &Value) {
    match value {
        Value::Array(items) => {
            for item in items {
                push_produced(occurrences, input_id, item);
            }
        }
        Value::Object(obj) if obj.contains_key("location") => {
            occurrences.push(json!({
                "id": input_id,
                "href": obj["location"],
            }));
        }
        other => occurrences.push(json!({"id": input_id, "data": other})),
    }
}

fn submitted_occurrence(input_id: &str, value: &InputValue) -> Value {
    match value {
        InputValue::Literal(v) => json!({"id": input_id, "data": v}),
        InputValue::Href { href, mime_type } => match mime_type {
            Some(mime_type) => json!({"id": input_id, "href": href, "format": mime_type}),
            None => json!({"id": input_id, "href": href}),
        },
    }
}

/// Map declared workflow outputs from their `outputSource` references
fn map_workflow_outputs(
    loaded: &LoadedPackage,
    step_outputs: &HashMap<String, Map<String, Value>>,
) -> Result<Map<String, Value>> {
    let mut produced = Map::new();
    let outputs = match &loaded.package.outputs {
        Value::Object(map) => map
            .iter()
            .map(|(id, body)| (id.clone(), body.clone()))
            .collect::<Vec<_>>(),
        Value::Array(list) => list
            .iter()
            .filter_map(|entry| {
                entry
                    .get("id")
                    .and_then(Value::as_str)
                    .map(|id| (id.to_string(), entry.clone()))
            })
            .collect(),
        _ => Vec::new(),
    };
    for (output_id, body) in outputs {
        let source = body
            .get("outputSource")
            .or_else(|| body.get("outputsource"))
            .and_then(Value::as_str);
        let Some(source) = source else { continue };
        let Some((step_id, step_output)) = source.split_once('/') else {
            continue;
        };
        let value = step_outputs
            .get(step_id)
            .and_then(|outputs| outputs.get(step_output))
            .ok_or_else(|| {
                EngineError::execution(format!(
                    "workflow output '{output_id}' references missing '{source}'"
                ))
            })?;
        produced.insert(output_id, value.clone());
    }
    Ok(produced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tellus_core::{IoDescription, LiteralType, Package, WorkflowStep};

    fn step(id: &str, bindings: &[(&str, &str)]) -> WorkflowStep {
        let doc = json!({
            "run": format!("{id}.cwl"),
            "in": bindings
                .iter()
                .map(|(k, v)| (k.to_string(), json!(v)))
                .collect::<Map<String, Value>>(),
            "out": ["out"]
        });
        let package = Package::from_value(&json!({
            "cwlVersion": "v1.0",
            "class": "Workflow",
            "inputs": {},
            "outputs": {},
            "steps": {id: doc}
        }))
        .unwrap();
        package.workflow_steps().unwrap().remove(0)
    }

    #[test]
    fn test_wire_from_external_input() {
        let step = step("first", &[("x", "region")]);
        let external = vec![ResolvedInput {
            io: IoDescription::literal("region", LiteralType::String),
            values: vec![InputValue::Literal(json!("alps"))],
        }];
        let raw = wire_step_inputs(&step, &external, &HashMap::new()).unwrap();
        assert_eq!(raw, json!([{"id": "x", "data": "alps"}]));
    }

    #[test]
    fn test_wire_from_upstream_output() {
        let step = step("second", &[("data", "first/out")]);
        let mut upstream = Map::new();
        upstream.insert(
            "out".into(),
            json!({"location": "file:///tmp/out.nc", "class": "File"}),
        );
        let mut outputs = HashMap::new();
        outputs.insert("first".to_string(), upstream);
        let raw = wire_step_inputs(&step, &[], &outputs).unwrap();
        assert_eq!(
            raw,
            json!([{"id": "data", "href": "file:///tmp/out.nc"}])
        );
    }

    #[test]
    fn test_wire_unknown_source_fails() {
        let step = step("second", &[("data", "first/out")]);
        let err = wire_step_inputs(&step, &[], &HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("unknown workflow input"));
    }
}
