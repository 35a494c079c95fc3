// Integration tests for the Tellus API
// Run with a server listening on localhost:4001:
//   cargo run -p tellus-api &
//   cargo test -p tellus-api --test integration_test -- --ignored

use serde_json::{json, Value};
use std::time::Duration;

const API_BASE_URL: &str = "http://localhost:4001";

fn deploy_payload(id: &str, base_command: &str) -> Value {
    json!({
        "processDescription": {"process": {"id": id}},
        "executionUnit": [{"unit": {
            "cwlVersion": "v1.0",
            "class": "CommandLineTool",
            "baseCommand": base_command,
            "inputs": {"message": {"type": "string", "inputBinding": {"position": 1}}},
            "outputs": {}
        }}],
        "deploymentProfileName": "http://www.opengis.net/profiles/eoc/wpsApplication"
    })
}

async fn await_terminal(client: &reqwest::Client, location: &str) -> Value {
    for _ in 0..100 {
        let status: Value = client
            .get(location)
            .send()
            .await
            .expect("Failed to poll job")
            .json()
            .await
            .expect("Failed to parse job status");
        let state = status["status"].as_str().unwrap_or_default().to_string();
        if ["succeeded", "failed", "dismissed"].contains(&state.as_str()) {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("job at {location} did not reach a terminal state");
}

#[tokio::test]
#[ignore]
async fn test_deploy_and_describe_happy_path() {
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{API_BASE_URL}/processes"))
        .query(&[("overwrite", "true")])
        .json(&deploy_payload("stacker", "echo"))
        .send()
        .await
        .expect("Failed to deploy");
    assert_eq!(response.status(), 201);

    let described: Value = client
        .get(format!("{API_BASE_URL}/processes/stacker"))
        .send()
        .await
        .expect("Failed to describe")
        .json()
        .await
        .expect("Failed to parse description");
    assert_eq!(described["process"]["id"], "stacker");
    assert_eq!(described["process"]["inputs"][0]["id"], "message");
    assert_eq!(described["process"]["inputs"][0]["data_type"], "string");
}

#[tokio::test]
#[ignore]
async fn test_visibility_filtering_on_wps_surface() {
    let client = reqwest::Client::new();

    for (id, visibility) in [("proc-pub", "public"), ("proc-priv", "private")] {
        let response = client
            .post(format!("{API_BASE_URL}/processes"))
            .query(&[("overwrite", "true")])
            .json(&deploy_payload(id, "echo"))
            .send()
            .await
            .expect("Failed to deploy");
        assert_eq!(response.status(), 201);
        let response = client
            .put(format!("{API_BASE_URL}/processes/{id}/visibility"))
            .json(&json!({"value": visibility}))
            .send()
            .await
            .expect("Failed to set visibility");
        assert_eq!(response.status(), 200);
    }

    let capabilities = client
        .get(format!(
            "{API_BASE_URL}/ows/wps?service=wps&request=getcapabilities"
        ))
        .send()
        .await
        .expect("Failed to fetch capabilities")
        .text()
        .await
        .expect("Failed to read capabilities");
    assert!(capabilities.contains("proc-pub"));
    assert!(!capabilities.contains("proc-priv"));

    let describe = client
        .get(format!(
            "{API_BASE_URL}/ows/wps?service=wps&request=describeprocess&version=1.0.0&identifier=proc-priv"
        ))
        .send()
        .await
        .expect("Failed to describe private process");
    assert_eq!(describe.status(), 400);
    let body = describe.text().await.expect("Failed to read body");
    assert!(body.contains("<ows:ExceptionText>Unknown process</ows:ExceptionText>"));
}

#[tokio::test]
#[ignore]
async fn test_execute_with_log_capture() {
    let client = reqwest::Client::new();
    client
        .post(format!("{API_BASE_URL}/processes"))
        .query(&[("overwrite", "true")])
        .json(&deploy_payload("echo-logger", "echo"))
        .send()
        .await
        .expect("Failed to deploy");

    let submitted = client
        .post(format!("{API_BASE_URL}/processes/echo-logger/jobs"))
        .json(&json!({"inputs": [{"id": "message", "data": "Dummy message"}]}))
        .send()
        .await
        .expect("Failed to submit");
    assert_eq!(submitted.status(), 201);
    let location = submitted
        .headers()
        .get("location")
        .expect("missing Location header")
        .to_str()
        .unwrap()
        .to_string();

    let done = await_terminal(&client, &location).await;
    assert_eq!(done["status"], "succeeded");

    let logs: Value = client
        .get(format!("{location}/logs"))
        .send()
        .await
        .expect("Failed to fetch logs")
        .json()
        .await
        .expect("Failed to parse logs");
    let lines = logs["logs"].as_array().expect("logs must be a list");
    assert!(
        lines
            .iter()
            .any(|l| l.as_str().unwrap_or("").ends_with("Dummy message")),
        "no log line ends with the echoed message: {lines:?}"
    );
}

#[tokio::test]
#[ignore]
async fn test_execute_failure_records_permanent_fail() {
    let client = reqwest::Client::new();
    client
        .post(format!("{API_BASE_URL}/processes"))
        .query(&[("overwrite", "true")])
        .json(&deploy_payload("broken-tool", "not_existing_command"))
        .send()
        .await
        .expect("Failed to deploy");

    let submitted = client
        .post(format!("{API_BASE_URL}/processes/broken-tool/jobs"))
        .json(&json!({"inputs": [{"id": "message", "data": "x"}]}))
        .send()
        .await
        .expect("Failed to submit");
    let location = submitted.headers()["location"].to_str().unwrap().to_string();

    let done = await_terminal(&client, &location).await;
    assert_eq!(done["status"], "failed");

    let exceptions: Value = client
        .get(format!("{location}/exceptions"))
        .send()
        .await
        .expect("Failed to fetch exceptions")
        .json()
        .await
        .expect("Failed to parse exceptions");
    let entries = exceptions["exceptions"].as_array().unwrap();
    assert!(
        entries
            .iter()
            .any(|e| e["text"].as_str().unwrap_or("").contains("permanentFail")),
        "exceptions: {entries:?}"
    );
}

#[tokio::test]
#[ignore]
async fn test_workflow_with_missing_step_is_rejected() {
    let client = reqwest::Client::new();
    let payload = json!({
        "processDescription": {"process": {"id": "wf-broken"}},
        "executionUnit": [{"unit": {
            "cwlVersion": "v1.0",
            "class": "Workflow",
            "inputs": {"x": "string"},
            "outputs": {},
            "steps": {"only": {"run": "does-not-exist", "in": {"x": "x"}, "out": []}}
        }}]
    });
    let response = client
        .post(format!("{API_BASE_URL}/processes"))
        .json(&payload)
        .send()
        .await
        .expect("Failed to deploy");
    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.expect("Failed to parse error");
    assert_eq!(body["code"], "PackageNotFound");
}

#[tokio::test]
#[ignore]
async fn test_dismiss_long_running_job() {
    let client = reqwest::Client::new();
    let payload = json!({
        "processDescription": {"process": {"id": "sleeper"}},
        "executionUnit": [{"unit": {
            "cwlVersion": "v1.0",
            "class": "CommandLineTool",
            "baseCommand": "sleep",
            "inputs": {"seconds": {"type": "string", "inputBinding": {"position": 1}}},
            "outputs": {}
        }}]
    });
    client
        .post(format!("{API_BASE_URL}/processes"))
        .query(&[("overwrite", "true")])
        .json(&payload)
        .send()
        .await
        .expect("Failed to deploy");

    let submitted = client
        .post(format!("{API_BASE_URL}/processes/sleeper/jobs"))
        .json(&json!({"inputs": [{"id": "seconds", "data": "30"}]}))
        .send()
        .await
        .expect("Failed to submit");
    let location = submitted.headers()["location"].to_str().unwrap().to_string();

    tokio::time::sleep(Duration::from_millis(500)).await;
    let dismissed = client
        .delete(&location)
        .send()
        .await
        .expect("Failed to dismiss");
    assert_eq!(dismissed.status(), 200);
    let body: Value = dismissed.json().await.expect("Failed to parse dismissal");
    assert_eq!(body["status"], "dismissed");
    assert_eq!(body["message"], "Job dismissed");

    let status: Value = client
        .get(&location)
        .send()
        .await
        .expect("Failed to fetch status")
        .json()
        .await
        .expect("Failed to parse status");
    assert_eq!(status["status"], "dismissed");
}
