// Local command-line execution, containerized when the package declares an
// image
//
// Complex inputs are staged into the job working directory, the command is
// assembled from baseCommand/arguments/inputBinding positions, stdout is
// streamed into the job log, and the exit code is honored per the package
// successCodes/temporaryFailCodes/permanentFailCodes lists.

use crate::marshal::{InputValue, ResolvedInput};
use crate::retry::with_retries;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tellus_core::status::PROGRESS_EXEC_DONE;
use tellus_core::{
    EngineConfig, EngineError, IoDescription, JobStatus, Package, Result,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::tracker::ProgressSender;

/// Name of the structured-output file a tool may leave in its working
/// directory (CWL convention, also used by the builtin scripts)
pub const OUTPUT_JSON: &str = "cwl.output.json";

/// Run a CommandLineTool package locally
pub async fn run_tool(
    package: &Package,
    image: Option<&str>,
    inputs: &[ResolvedInput],
    outputs: &[IoDescription],
    workdir: &Path,
    config: &EngineConfig,
    progress: &ProgressSender,
) -> Result<Map<String, Value>> {
    tokio::fs::create_dir_all(workdir)
        .await
        .map_err(|e| EngineError::execution(format!("cannot create work dir: {e}")))?;

    let staged = stage_inputs(inputs, workdir, config).await?;
    let argv = build_argv(package, &staged)?;
    if argv.is_empty() {
        return Err(EngineError::execution("package declares no command"));
    }
    let policy = ExitPolicy::from_package(package);

    let mut attempt = 0u32;
    loop {
        match run_once(image, &argv, workdir, &policy, progress).await? {
            CommandResult::Success => break,
            CommandResult::TemporaryFail(code) if attempt < config.retry.count => {
                attempt += 1;
                let backoff = config.retry.backoff(attempt);
                info!(code, attempt, "temporaryFail exit code, retrying command");
                tokio::time::sleep(backoff).await;
            }
            CommandResult::TemporaryFail(code) => {
                return Err(EngineError::execution(format!(
                    "permanentFail: temporary failures exhausted retries (exit code {code})"
                )))
            }
            CommandResult::PermanentFail(code) => {
                return Err(EngineError::execution(format!(
                    "permanentFail: exit code {code}"
                )))
            }
        }
    }

    collect_tool_outputs(package, outputs, workdir).await
}

enum CommandResult {
    Success,
    TemporaryFail(i64),
    PermanentFail(i64),
}

async fn run_once(
    image: Option<&str>,
    argv: &[String],
    workdir: &Path,
    policy: &ExitPolicy,
    progress: &ProgressSender,
) -> Result<CommandResult> {
    let mut command = match image {
        Some(image) => {
            let volume = format!("{}:{}", workdir.display(), workdir.display());
            let mut cmd = Command::new("docker");
            cmd.args(["run", "--rm", "-v", &volume, "-w"])
                .arg(workdir)
                .arg(image)
                .args(argv);
            cmd
        }
        None => {
            let mut cmd = Command::new(&argv[0]);
            cmd.args(&argv[1..]).current_dir(workdir);
            cmd
        }
    };
    debug!(?argv, image = ?image, "Spawning tool command");
    let mut child = command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| EngineError::execution(format!("permanentFail: {e}")))?;

    // stream tool stdout into the job log from its own task, so stderr is
    // drained concurrently and a chatty tool cannot deadlock on a full pipe
    let stdout_reader = child.stdout.take().map(|stdout| {
        let progress = progress.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if !line.trim().is_empty() {
                    progress.send(JobStatus::Running, PROGRESS_EXEC_DONE, line);
                }
            }
        })
    });
    let output = child
        .wait_with_output()
        .await
        .map_err(|e| EngineError::execution(format!("permanentFail: {e}")))?;
    if let Some(reader) = stdout_reader {
        let _ = reader.await;
    }
    let code = i64::from(output.status.code().unwrap_or(-1));
    if !output.stderr.is_empty() {
        for line in String::from_utf8_lossy(&output.stderr).lines() {
            progress.send(JobStatus::Running, PROGRESS_EXEC_DONE, line.to_string());
        }
    }
    Ok(policy.classify(code, output.status.success()))
}

/// Exit-code policy from the package lists; with none declared, 0 is
/// success and anything else is a permanent failure.
#[derive(Clone, Default)]
struct ExitPolicy {
    success: Option<Vec<i64>>,
    temporary: Vec<i64>,
}

impl ExitPolicy {
    fn from_package(package: &Package) -> Self {
        Self {
            success: package.success_codes.clone(),
            temporary: package.temporary_fail_codes.clone().unwrap_or_default(),
        }
    }

    fn classify(&self, code: i64, default_success: bool) -> CommandResult {
        match &self.success {
            Some(success) => {
                if success.contains(&code) {
                    CommandResult::Success
                } else if self.temporary.contains(&code) {
                    CommandResult::TemporaryFail(code)
                } else {
                    CommandResult::PermanentFail(code)
                }
            }
            None if self.temporary.contains(&code) => CommandResult::TemporaryFail(code),
            None => {
                if default_success {
                    CommandResult::Success
                } else {
                    CommandResult::PermanentFail(code)
                }
            }
        }
    }
}

/// Stage complex input values into the working directory; literals pass
/// through as strings.
async fn stage_inputs(
    inputs: &[ResolvedInput],
    workdir: &Path,
    config: &EngineConfig,
) -> Result<Vec<StagedInput>> {
    let staging = workdir.join("inputs");
    tokio::fs::create_dir_all(&staging)
        .await
        .map_err(|e| EngineError::execution(format!("cannot create staging dir: {e}")))?;
    let http = reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .timeout(config.read_timeout)
        .build()
        .map_err(|e| EngineError::execution(e.to_string()))?;

    let mut staged = Vec::with_capacity(inputs.len());
    for input in inputs {
        let mut values = Vec::with_capacity(input.values.len());
        for value in &input.values {
            match value {
                InputValue::Literal(v) => values.push(literal_to_arg(v)),
                InputValue::Href { href, .. } => {
                    values.push(stage_file(&http, href, &staging, config).await?)
                }
            }
        }
        staged.push(StagedInput {
            id: input.io.id.clone(),
            values,
        });
    }
    Ok(staged)
}

struct StagedInput {
    id: String,
    values: Vec<String>,
}

fn literal_to_arg(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

async fn stage_file(
    http: &reqwest::Client,
    href: &str,
    staging: &Path,
    config: &EngineConfig,
) -> Result<String> {
    if let Some(path) = href.strip_prefix("file://") {
        return Ok(path.to_string());
    }
    if !href.starts_with("http://") && !href.starts_with("https://") {
        // already a local path
        return Ok(href.to_string());
    }
    let name = href
        .split('?')
        .next()
        .unwrap_or(href)
        .rsplit('/')
        .next()
        .filter(|n| !n.is_empty())
        .unwrap_or("input.dat");
    let target = staging.join(name);
    let bytes = with_retries(&config.retry, "stage-input", || async {
        let response = http
            .get(href)
            .send()
            .await
            .map_err(|e| EngineError::communication(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::communication(format!(
                "HTTP status {} from {href}",
                status.as_u16()
            )));
        }
        response
            .bytes()
            .await
            .map_err(|e| EngineError::communication(e.to_string()))
    })
    .await?;
    tokio::fs::write(&target, &bytes)
        .await
        .map_err(|e| EngineError::execution(format!("cannot stage input: {e}")))?;
    debug!(href, target = %target.display(), "Staged input file");
    Ok(target.display().to_string())
}

/// Assemble the command line: baseCommand, then fixed arguments, then
/// inputs ordered by inputBinding position with optional prefixes.
fn build_argv(package: &Package, staged: &[StagedInput]) -> Result<Vec<String>> {
    let mut argv: Vec<String> = Vec::new();
    match &package.base_command {
        Some(Value::String(cmd)) => argv.push(cmd.clone()),
        Some(Value::Array(parts)) => {
            argv.extend(parts.iter().filter_map(Value::as_str).map(String::from))
        }
        _ => {}
    }
    if let Some(Value::Array(arguments)) = &package.arguments {
        argv.extend(arguments.iter().map(literal_to_arg));
    }

    // bindings from the package input records
    let mut bound: Vec<(i64, Option<String>, &StagedInput)> = Vec::new();
    for input in staged {
        let (position, prefix) = input_binding(package, &input.id);
        bound.push((position, prefix, input));
    }
    bound.sort_by_key(|(position, _, input)| (*position, input.id.clone()));
    for (_, prefix, input) in bound {
        for value in &input.values {
            if let Some(prefix) = &prefix {
                argv.push(prefix.clone());
            }
            argv.push(value.clone());
        }
    }

    Ok(argv)
}

fn input_binding(package: &Package, input_id: &str) -> (i64, Option<String>) {
    let record = match &package.inputs {
        Value::Object(map) => map.get(input_id).cloned(),
        Value::Array(list) => list
            .iter()
            .find(|entry| entry.get("id").and_then(Value::as_str) == Some(input_id))
            .cloned(),
        _ => None,
    };
    let binding = record.as_ref().and_then(|r| r.get("inputBinding").cloned());
    let position = binding
        .as_ref()
        .and_then(|b| b.get("position"))
        .and_then(Value::as_i64)
        .unwrap_or(i64::MAX);
    let prefix = binding
        .as_ref()
        .and_then(|b| b.get("prefix"))
        .and_then(Value::as_str)
        .map(String::from);
    (position, prefix)
}

/// Read tool outputs: the structured output file when present, otherwise
/// outputBinding globs over the working directory.
async fn collect_tool_outputs(
    package: &Package,
    outputs: &[IoDescription],
    workdir: &Path,
) -> Result<Map<String, Value>> {
    let output_json = workdir.join(OUTPUT_JSON);
    if let Ok(text) = tokio::fs::read_to_string(&output_json).await {
        let parsed: Value = serde_json::from_str(&text)
            .map_err(|e| EngineError::execution(format!("unreadable {OUTPUT_JSON}: {e}")))?;
        let map = parsed
            .as_object()
            .cloned()
            .ok_or_else(|| EngineError::execution(format!("{OUTPUT_JSON} must be an object")))?;
        return Ok(normalize_output_map(map, workdir));
    }

    let mut produced = Map::new();
    for output in outputs {
        let glob = output_glob(package, &output.id);
        let Some(glob) = glob else { continue };
        let matches = match_glob(workdir, &glob).await?;
        let rendered: Vec<Value> = matches
            .iter()
            .map(|path| json!({"location": format!("file://{}", path.display()), "class": "File"}))
            .collect();
        if rendered.is_empty() {
            continue;
        }
        let value = if rendered.len() == 1 {
            rendered.into_iter().next().unwrap_or(Value::Null)
        } else {
            Value::Array(rendered)
        };
        produced.insert(output.id.clone(), value);
    }
    Ok(produced)
}

/// Path-like strings in a structured output map become location objects
fn normalize_output_map(map: Map<String, Value>, workdir: &Path) -> Map<String, Value> {
    map.into_iter()
        .map(|(id, value)| (id, normalize_output_value(value, workdir)))
        .collect()
}

fn normalize_output_value(value: Value, workdir: &Path) -> Value {
    match value {
        Value::String(s) if s.starts_with("file://") => {
            json!({"location": s, "class": "File"})
        }
        Value::String(s)
            if Path::new(&s).is_absolute() && Path::new(&s).exists() =>
        {
            json!({"location": format!("file://{s}"), "class": "File"})
        }
        Value::String(s) if workdir.join(&s).exists() => {
            json!({"location": format!("file://{}", workdir.join(&s).display()), "class": "File"})
        }
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| normalize_output_value(v, workdir))
                .collect(),
        ),
        other => other,
    }
}

fn output_glob(package: &Package, output_id: &str) -> Option<String> {
    let record = match &package.outputs {
        Value::Object(map) => map.get(output_id).cloned(),
        Value::Array(list) => list
            .iter()
            .find(|entry| entry.get("id").and_then(Value::as_str) == Some(output_id))
            .cloned(),
        _ => None,
    }?;
    record
        .get("outputBinding")?
        .get("glob")
        .and_then(Value::as_str)
        .map(String::from)
}

/// Match a single-level glob against the working directory: literal names
/// match exactly, `*suffix`/`prefix*` patterns match by affix.
async fn match_glob(workdir: &Path, glob: &str) -> Result<Vec<PathBuf>> {
    if !glob.contains('*') {
        let exact = workdir.join(glob);
        return Ok(if exact.exists() { vec![exact] } else { Vec::new() });
    }
    let (prefix, suffix) = glob.split_once('*').unwrap_or(("", ""));
    let mut matches = Vec::new();
    let mut entries = tokio::fs::read_dir(workdir)
        .await
        .map_err(|e| EngineError::execution(format!("cannot list work dir: {e}")))?;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with(prefix) && name.ends_with(suffix) && name != OUTPUT_JSON {
            matches.push(entry.path());
        }
    }
    matches.sort();
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marshal::marshal_inputs;
    use tellus_core::{IoDescription, LiteralType};

    fn echo_package() -> Package {
        Package::from_value(&json!({
            "cwlVersion": "v1.0",
            "class": "CommandLineTool",
            "baseCommand": "echo",
            "inputs": {
                "message": {"type": "string", "inputBinding": {"position": 1}}
            },
            "outputs": {}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_echo_streams_stdout_into_log() {
        let tmp = tempfile::tempdir().unwrap();
        let package = echo_package();
        let declared = vec![IoDescription::literal("message", LiteralType::String)];
        let inputs =
            marshal_inputs(&declared, &json!([{"id": "message", "data": "Dummy message"}]))
                .unwrap();
        let (progress, mut rx) = ProgressSender::channel();
        let produced = run_tool(
            &package,
            None,
            &inputs,
            &[],
            tmp.path(),
            &EngineConfig::default(),
            &progress,
        )
        .await
        .unwrap();
        assert!(produced.is_empty());
        drop(progress);

        let mut saw_message = false;
        while let Some(update) = rx.recv().await {
            if update.message.ends_with("Dummy message") {
                saw_message = true;
            }
        }
        assert!(saw_message, "stdout should be streamed as log messages");
    }

    #[tokio::test]
    async fn test_missing_command_is_permanent_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let package = Package::from_value(&json!({
            "cwlVersion": "v1.0",
            "class": "CommandLineTool",
            "baseCommand": "not_existing_command",
            "inputs": {},
            "outputs": {}
        }))
        .unwrap();
        let (progress, _rx) = ProgressSender::channel();
        let err = run_tool(
            &package,
            None,
            &[],
            &[],
            tmp.path(),
            &EngineConfig::default(),
            &progress,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("permanentFail"));
    }

    #[tokio::test]
    async fn test_argv_ordering_and_prefixes() {
        let package = Package::from_value(&json!({
            "cwlVersion": "v1.0",
            "class": "CommandLineTool",
            "baseCommand": ["tool", "sub"],
            "arguments": ["--quiet"],
            "inputs": {
                "second": {"type": "string", "inputBinding": {"position": 2, "prefix": "-b"}},
                "first": {"type": "string", "inputBinding": {"position": 1}}
            },
            "outputs": {}
        }))
        .unwrap();
        let staged = vec![
            StagedInput {
                id: "second".into(),
                values: vec!["two".into()],
            },
            StagedInput {
                id: "first".into(),
                values: vec!["one".into()],
            },
        ];
        let argv = build_argv(&package, &staged).unwrap();
        assert_eq!(argv, vec!["tool", "sub", "--quiet", "one", "-b", "two"]);
    }

    #[tokio::test]
    async fn test_glob_collection() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("result.json"), "{}").unwrap();
        std::fs::write(tmp.path().join("other.txt"), "x").unwrap();
        let package = Package::from_value(&json!({
            "cwlVersion": "v1.0",
            "class": "CommandLineTool",
            "baseCommand": "true",
            "inputs": {},
            "outputs": {
                "result": {"type": "File", "outputBinding": {"glob": "*.json"}}
            }
        }))
        .unwrap();
        let outputs = vec![IoDescription::complex("result", vec![])];
        let produced = collect_tool_outputs(&package, &outputs, tmp.path())
            .await
            .unwrap();
        let location = produced["result"]["location"].as_str().unwrap();
        assert!(location.ends_with("result.json"));
        assert!(location.starts_with("file://"));
    }

    #[tokio::test]
    async fn test_structured_output_file_wins() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join(OUTPUT_JSON),
            r#"{"output": ["http://data/x.nc"], "count": 2}"#,
        )
        .unwrap();
        let package = echo_package();
        let produced = collect_tool_outputs(&package, &[], tmp.path()).await.unwrap();
        assert_eq!(produced["count"], json!(2));
        assert_eq!(produced["output"], json!(["http://data/x.nc"]));
    }
}
