// Builtin processes
//
// Builtins are shipped with the engine, seeded public at startup, cannot be
// undeployed and cannot change visibility. They run natively instead of
// spawning a container.

use serde_json::{json, Map, Value};
use tellus_core::package::APP_BUILTIN;
use tellus_core::{
    EngineError, Format, IoDescription, MaxOccurs, Process, ProcessType, Result, Visibility,
};
use tracing::info;

/// Identifier of the file-to-string-array builtin
pub const FILE2STRING_ARRAY: &str = "file2string-array";

/// Package + process definitions for every builtin, ready for seeding into
/// the registry
pub fn builtin_processes() -> Vec<Process> {
    vec![file2string_array_process()]
}

fn file2string_array_process() -> Process {
    let package = json!({
        "cwlVersion": "v1.0",
        "class": "CommandLineTool",
        "hints": {
            APP_BUILTIN: {"process": FILE2STRING_ARRAY}
        },
        "inputs": {
            "input": {"type": "File"}
        },
        "outputs": {
            "output": {"type": "string[]"}
        }
    });
    let mut input = IoDescription::complex("input", vec![Format::new("text/plain")]);
    input.title = Some("Input file".to_string());
    let mut output = IoDescription::literal("output", tellus_core::LiteralType::String);
    output.max_occurs = MaxOccurs::Unbounded;

    let mut process = Process::new(FILE2STRING_ARRAY, ProcessType::Builtin)
        .expect("builtin identifier is a valid slug")
        .with_io(vec![input], vec![output])
        .expect("builtin I/O ids are unique");
    process.title = Some("File to string-array".to_string());
    process.abstract_ =
        Some("Wraps a file reference into an array-of-strings output document.".to_string());
    process.visibility = Visibility::Public;
    process.package = package;
    process
}

/// Execute a builtin by name over the backend input values
pub async fn run_builtin(
    name: &str,
    inputs: &Map<String, Value>,
) -> Result<Map<String, Value>> {
    info!(builtin = name, "Running builtin process");
    match name {
        FILE2STRING_ARRAY => run_file2string_array(inputs),
        other => Err(EngineError::PackageNotFound(format!(
            "builtin process '{other}'"
        ))),
    }
}

/// `{"input": <file>}` -> `{"output": [<location>]}`
fn run_file2string_array(inputs: &Map<String, Value>) -> Result<Map<String, Value>> {
    let input = inputs
        .get("input")
        .ok_or_else(|| EngineError::execution("builtin requires an 'input' file"))?;
    let location = input
        .get("location")
        .and_then(Value::as_str)
        .or_else(|| input.as_str())
        .ok_or_else(|| EngineError::execution("'input' carries no file location"))?;
    let mut produced = Map::new();
    produced.insert("output".into(), json!([location]));
    Ok(produced)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_are_public_and_typed() {
        let builtins = builtin_processes();
        assert!(!builtins.is_empty());
        for process in &builtins {
            assert_eq!(process.visibility, Visibility::Public);
            assert!(process.is_builtin());
            assert!(process.package.get("cwlVersion").is_some());
        }
    }

    #[tokio::test]
    async fn test_file2string_array_wraps_location() {
        let mut inputs = Map::new();
        inputs.insert(
            "input".into(),
            json!({"location": "http://data/f.nc", "class": "File"}),
        );
        let produced = run_builtin(FILE2STRING_ARRAY, &inputs).await.unwrap();
        assert_eq!(produced["output"], json!(["http://data/f.nc"]));
    }

    #[tokio::test]
    async fn test_unknown_builtin_not_found() {
        let err = run_builtin("no-such-builtin", &Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::PackageNotFound(_)));
    }
}
