// Workflow execution through the dispatcher: step resolution, input
// wiring, output mapping.

use serde_json::json;
use tellus_core::{
    EngineConfig, Format, IoDescription, Job, LiteralType, MaxOccurs, Process, ProcessType,
};
use tellus_storage::Repositories;
use tellus_worker::{CancelToken, ExecutionEngine, ProgressSender};

#[tokio::test]
async fn test_workflow_wires_step_outputs_into_results() {
    let tmp = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        role: tellus_core::EngineRole::Ems,
        output_dir: tmp.path().join("outputs"),
        scratch_dir: tmp.path().join("scratch"),
        ..EngineConfig::default()
    };
    let repos = Repositories::in_memory();

    // the wrapped step is the file2string-array builtin, referenced as a
    // co-located package file
    let builtin_package = json!({
        "cwlVersion": "v1.0",
        "class": "CommandLineTool",
        "hints": {"BuiltinRequirement": {"process": "file2string-array"}},
        "inputs": {"input": {"type": "File"}},
        "outputs": {"output": {"type": "string[]"}}
    });
    let step_file = tmp.path().join("wrap-tool.json");
    std::fs::write(&step_file, serde_json::to_vec(&builtin_package).unwrap()).unwrap();

    let workflow_package = json!({
        "cwlVersion": "v1.0",
        "class": "Workflow",
        "inputs": {"src": "File"},
        "outputs": {"names": {"type": "string[]", "outputSource": "wrap/output"}},
        "steps": {
            "wrap": {
                "run": step_file.to_string_lossy(),
                "in": {"input": "src"},
                "out": ["output"]
            }
        }
    });

    let mut src = IoDescription::complex("src", vec![Format::new("application/x-netcdf")]);
    src.min_occurs = 1;
    let mut names = IoDescription::literal("names", LiteralType::String);
    names.max_occurs = MaxOccurs::Unbounded;
    let mut process = Process::new("wrap-flow", ProcessType::Workflow)
        .unwrap()
        .with_io(vec![src], vec![names])
        .unwrap();
    process.package = workflow_package;
    repos.processes.save_process(process, false).await.unwrap();

    let job = Job::new(
        "wrap-flow",
        json!([{"id": "src", "href": "http://data/products/scene.nc"}]),
    );
    let job_id = job.id;
    repos.jobs.save_job(job).await.unwrap();

    let engine = ExecutionEngine::new(config, repos);
    let (progress, mut rx) = ProgressSender::channel();
    let results = engine
        .run_job(job_id, &progress, &CancelToken::none())
        .await
        .unwrap();
    drop(progress);

    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["id"], "names");
    assert_eq!(results[0]["value"], json!(["http://data/products/scene.nc"]));

    // step progress stays inside the execute slice
    let mut saw_step_message = false;
    while let Some(update) = rx.recv().await {
        if update.message.contains("workflow step 'wrap'") {
            saw_step_message = true;
            assert!(update.progress >= 10 && update.progress <= 95);
        }
    }
    assert!(saw_step_message);
}
