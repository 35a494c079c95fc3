// End-to-end worker pool tests: submit through the queue, observe the job
// lifecycle through the store.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tellus_core::{
    EngineConfig, IoDescription, Job, JobStatus, LiteralType, Process, ProcessType,
};
use tellus_storage::Repositories;
use tellus_worker::{ExecutionEngine, JobRunner, WorkerPool};

struct Fixture {
    repos: Repositories,
    pool: Arc<WorkerPool>,
    _tmp: tempfile::TempDir,
}

fn fixture() -> Fixture {
    let tmp = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        output_dir: tmp.path().join("outputs"),
        scratch_dir: tmp.path().join("scratch"),
        worker_count: 2,
        ..EngineConfig::default()
    };
    let repos = Repositories::in_memory();
    let engine = ExecutionEngine::new(config, repos.clone());
    let pool = WorkerPool::start(engine);
    Fixture {
        repos,
        pool,
        _tmp: tmp,
    }
}

async fn deploy_tool(repos: &Repositories, id: &str, base_command: &str) {
    let mut process = Process::new(id, ProcessType::Application)
        .unwrap()
        .with_io(
            vec![IoDescription::literal("message", LiteralType::String)],
            vec![],
        )
        .unwrap();
    process.package = json!({
        "cwlVersion": "v1.0",
        "class": "CommandLineTool",
        "baseCommand": base_command,
        "inputs": {"message": {"type": "string", "inputBinding": {"position": 1}}},
        "outputs": {}
    });
    repos.processes.save_process(process, false).await.unwrap();
}

async fn await_terminal(repos: &Repositories, job_id: uuid::Uuid) -> Job {
    for _ in 0..200 {
        let job = repos.jobs.fetch_by_id(job_id).await.unwrap().unwrap();
        if job.is_terminal() {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("job {job_id} did not reach a terminal state");
}

#[tokio::test]
async fn test_submit_executes_and_captures_logs() {
    let fx = fixture();
    deploy_tool(&fx.repos, "echo-tool", "echo").await;

    let job = Job::new(
        "echo-tool",
        json!([{"id": "message", "data": "Dummy message"}]),
    );
    fx.repos.jobs.save_job(job.clone()).await.unwrap();
    let task_id = fx.pool.submit(job.id).await.unwrap();
    assert!(task_id.starts_with("task-"));

    let done = await_terminal(&fx.repos, job.id).await;
    assert_eq!(done.status, JobStatus::Succeeded);
    assert_eq!(done.progress, 100);
    assert!(
        done.logs.iter().any(|l| l.ends_with("Dummy message")),
        "logs: {:?}",
        done.logs
    );
}

#[tokio::test]
async fn test_failing_command_records_permanent_fail_exception() {
    let fx = fixture();
    deploy_tool(&fx.repos, "broken-tool", "not_existing_command").await;

    let job = Job::new("broken-tool", json!([{"id": "message", "data": "x"}]));
    fx.repos.jobs.save_job(job.clone()).await.unwrap();
    fx.pool.submit(job.id).await.unwrap();

    let done = await_terminal(&fx.repos, job.id).await;
    assert_eq!(done.status, JobStatus::Failed);
    assert!(
        done.exceptions.iter().any(|e| e.text.contains("permanentFail")),
        "exceptions: {:?}",
        done.exceptions
    );
}

#[tokio::test]
async fn test_cancel_before_pickup_skips_execution() {
    let fx = fixture();
    deploy_tool(&fx.repos, "late-tool", "echo").await;

    let mut job = Job::new("late-tool", json!([{"id": "message", "data": "x"}]));
    // dismissed by Tier 1 before any worker picks it up
    job.apply_update(JobStatus::Dismissed, 0, "Job dismissed");
    fx.repos.jobs.save_job(job.clone()).await.unwrap();
    fx.pool.submit(job.id).await.unwrap();
    fx.pool.cancel(job.id).await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    let stored = fx.repos.jobs.fetch_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Dismissed);
    // no further progress updates appear after dismissal
    assert!(stored.logs.is_empty());
    assert_eq!(stored.progress, 0);
}
