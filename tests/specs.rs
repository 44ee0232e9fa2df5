// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Black-box scenario tests (spec.md §8 "Concrete end-to-end scenarios"),
//! driven over real HTTP against an in-process `celld` router. The
//! in-sandbox agent is a `wiremock` server; `FakeSandboxBackend` is pointed
//! at it so the pool's real replenish/readiness-probe machinery and the
//! `RemoteExecutor`'s real wire calls both run, exactly as they would
//! against a genuine Docker/K8s-backed agent.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use cellrun_adapters::FakeSandboxBackend;
use cellrun_core::{Clock, Event, ExecutionConfig, PoolConfig, Principal, SystemClock};
use cellrun_engine::{Orchestrator, RemoteExecutor, SandboxManager, SandboxPool};
use cellrun_http::AppState;
use cellrun_storage::{InMemoryObjectStore, MokaSessionRegistry, ObjectFileStore, TieredStateStore};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Returns a fixed sequence of JSON bodies, one per matching request, then
/// repeats the last body for any request beyond the sequence. Used instead
/// of stacking same-route mocks with `up_to_n_times`, which would make the
/// baseline-vs-after ordering depend on wiremock's same-priority tie-break
/// rule rather than on an explicit, observable sequence.
struct SequencedJson {
    bodies: std::sync::Mutex<std::collections::VecDeque<Value>>,
    last: Value,
}

impl SequencedJson {
    fn new(bodies: Vec<Value>) -> Self {
        let last = bodies.last().cloned().unwrap_or(Value::Null);
        Self { bodies: std::sync::Mutex::new(bodies.into()), last }
    }
}

impl Respond for SequencedJson {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let mut bodies = self.bodies.lock().expect("sequenced responder mutex poisoned");
        let body = bodies.pop_front().unwrap_or_else(|| self.last.clone());
        ResponseTemplate::new(200).set_body_json(body)
    }
}

/// Everything a scenario needs: a live `celld` router on a local port and
/// the mock agent standing in for the sandbox's side-car.
struct Harness {
    base_url: String,
    agent: MockServer,
}

async fn spin_up(pool_target: usize) -> Harness {
    let agent = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ready"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&agent)
        .await;

    let backend = Arc::new(FakeSandboxBackend::new());
    backend.set_endpoint(agent.uri());

    let clock = SystemClock;
    let mut target = HashMap::new();
    if pool_target > 0 {
        target.insert("py".to_string(), pool_target);
    }
    let pool_config = PoolConfig {
        target,
        parallel_batch: 2,
        startup_deadline_s: 2,
        replenish_interval_s: 1,
        ..Default::default()
    };

    let (events_tx, events_rx) = broadcast::channel::<Event>(64);
    tokio::spawn(drain_events(events_rx));

    let pool = Arc::new(SandboxPool::new(Arc::clone(&backend), clock.clone(), pool_config.clone(), events_tx.clone()));
    if pool_target > 0 {
        pool.warmup(cellrun_core::Language::Py).await;
    }

    let manager = Arc::new(SandboxManager::new(Arc::clone(&backend), Duration::from_secs(2)));
    let executor = Arc::new(RemoteExecutor::new());
    let sessions = Arc::new(MokaSessionRegistry::new(clock.clone(), Duration::from_secs(3600)));
    let object_store = Arc::new(InMemoryObjectStore::new());
    let files = Arc::new(ObjectFileStore::new(object_store.clone(), Default::default()));
    let state_store = Arc::new(TieredStateStore::new(
        object_store,
        Duration::from_secs(3600),
        Duration::from_secs(30),
        50 * 1024 * 1024,
    ));

    let orchestrator = Arc::new(Orchestrator::new(
        backend,
        pool,
        manager,
        executor,
        sessions,
        files.clone(),
        state_store.clone(),
        clock.clone(),
        ExecutionConfig::default(),
        pool_config,
        events_tx,
    ));

    let app_state = Arc::new(AppState {
        orchestrator,
        files,
        state_store,
        clock,
        execution: ExecutionConfig::default(),
        state_config: Default::default(),
    });

    let app = cellrun_http::router(app_state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    Harness { base_url: format!("http://{addr}"), agent }
}

async fn drain_events(mut rx: broadcast::Receiver<Event>) {
    while rx.recv().await.is_ok() {}
}

async fn mock_agent_files(agent: &MockServer, entries: &[&str]) {
    let body: Vec<Value> = entries.iter().map(|n| json!({"name": n})).collect();
    Mock::given(method("GET"))
        .and(path("/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(agent)
        .await;
}

async fn mock_agent_execute(agent: &MockServer, response: Value) {
    Mock::given(method("POST"))
        .and(path("/execute"))
        .respond_with(ResponseTemplate::new(200).set_body_json(response))
        .mount(agent)
        .await;
}

/// Scenario 1 — stateless roundtrip (spec.md §8 #1).
#[tokio::test]
async fn stateless_roundtrip_returns_captured_stdout_and_a_session_id() {
    let h = spin_up(1).await;
    mock_agent_files(&h.agent, &[]).await;
    mock_agent_execute(&h.agent, json!({"stdout": "5\n", "stderr": "", "exit_code": 0, "produced_files": []})).await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/exec", h.base_url))
        .json(&json!({"lang": "py", "code": "print(2+3)"}))
        .send()
        .await
        .expect("request sent");

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.expect("json body");
    assert_eq!(body["exit_code"], 0);
    assert_eq!(body["stdout"], "5\n");
    assert!(body["session_id"].as_str().is_some_and(|s| !s.is_empty()));
}

/// Scenario 2 — state carry-over across two calls in the same session
/// (spec.md §8 #2). The agent isn't a real Python interpreter here, so the
/// test asserts what the core itself guarantees: the second call's
/// `prior_state` field carries exactly the bytes the first call saved.
#[tokio::test]
async fn state_from_first_call_is_forwarded_to_the_second_call_in_session() {
    let h = spin_up(1).await;
    mock_agent_files(&h.agent, &[]).await;
    Mock::given(method("POST"))
        .and(path("/execute"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "stdout": "", "stderr": "", "exit_code": 0, "produced_files": [],
            "updated_state": cellrun_storage::encode_base64url(b"x=10"),
        })))
        .up_to_n_times(1)
        .mount(&h.agent)
        .await;

    let client = reqwest::Client::new();
    let first = client
        .post(format!("{}/exec", h.base_url))
        .json(&json!({"lang": "py", "code": "x=10"}))
        .send()
        .await
        .expect("first request sent")
        .json::<Value>()
        .await
        .expect("first json body");

    assert_eq!(first["has_state"], true);
    let session_id = first["session_id"].as_str().expect("session id").to_string();

    // Second call's `/execute` body must carry the state saved by the first.
    Mock::given(method("POST"))
        .and(path("/execute"))
        .and(wiremock::matchers::body_partial_json(json!({
            "prior_state": cellrun_storage::encode_base64url(b"x=10"),
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "stdout": "100\n", "stderr": "", "exit_code": 0, "produced_files": [],
        })))
        .mount(&h.agent)
        .await;

    let second = client
        .post(format!("{}/exec", h.base_url))
        .json(&json!({"lang": "py", "code": "print(x*x)", "session_id": session_id}))
        .send()
        .await
        .expect("second request sent")
        .json::<Value>()
        .await
        .expect("second json body");

    assert_eq!(second["stdout"], "100\n");
}

/// Scenario 3 — a produced file is retrievable via `/download` (spec.md
/// §8 #3).
#[tokio::test]
async fn a_produced_file_is_retrievable_by_download() {
    let h = spin_up(1).await;
    // Baseline listing (pre-execute) sees an empty directory; the
    // post-execute listing sees the file the "execution" produced. A
    // sequenced responder pins this to call order explicitly rather than
    // relying on mock-matching precedence between two overlapping mocks.
    Mock::given(method("GET"))
        .and(path("/files"))
        .respond_with(SequencedJson::new(vec![json!([]), json!([{"name": "out.txt"}])]))
        .mount(&h.agent)
        .await;
    mock_agent_execute(
        &h.agent,
        json!({"stdout": "", "stderr": "", "exit_code": 0, "produced_files": ["out.txt"]}),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/files/out.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hi".to_vec()))
        .mount(&h.agent)
        .await;

    let client = reqwest::Client::new();
    let body: Value = client
        .post(format!("{}/exec", h.base_url))
        .json(&json!({"lang": "py", "code": "open('out.txt','w').write('hi')"}))
        .send()
        .await
        .expect("request sent")
        .json()
        .await
        .expect("json body");

    let files = body["files"].as_array().expect("files array");
    assert_eq!(files.len(), 1);
    assert_eq!(files[0]["name"], "out.txt");
    let session_id = body["session_id"].as_str().unwrap();
    let file_id = files[0]["file_id"].as_str().unwrap();

    let downloaded = client
        .get(format!("{}/download/{session_id}/{file_id}", h.base_url))
        .send()
        .await
        .expect("download sent");
    assert_eq!(downloaded.status(), 200);
    assert_eq!(downloaded.bytes().await.unwrap(), bytes::Bytes::from_static(b"hi"));
}

/// Invalid request: empty code is rejected before any side effects
/// (spec.md §4.1 step 1, §7 Validation -> HTTP 400).
#[tokio::test]
async fn empty_code_is_rejected_with_http_400() {
    let h = spin_up(1).await;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/exec", h.base_url))
        .json(&json!({"lang": "py", "code": ""}))
        .send()
        .await
        .expect("request sent");
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.expect("json body");
    assert_eq!(body["error"], "invalid_request");
}

/// Unsupported language -> structured 400, not axum's raw 422 JSON
/// rejection (spec.md §7 Validation -> HTTP 400).
#[tokio::test]
async fn unknown_language_is_rejected_with_http_400() {
    let h = spin_up(1).await;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/exec", h.base_url))
        .json(&json!({"lang": "ruby", "code": "1"}))
        .send()
        .await
        .expect("request sent");
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.expect("json body");
    assert_eq!(body["error"], "invalid_request");
}

/// Unknown session id -> 404 (spec.md §7 NotFound).
#[tokio::test]
async fn unknown_session_id_is_http_404() {
    let h = spin_up(1).await;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/exec", h.base_url))
        .json(&json!({"lang": "py", "code": "1", "session_id": "does-not-exist"}))
        .send()
        .await
        .expect("request sent");
    assert_eq!(resp.status(), 404);
}

/// Cold path: a language with no pool target still executes, just
/// through `SandboxManager::provision_cold` instead of the pool (spec.md
/// §4.1 step 4 "fall back to cold spawn ... if the pool is disabled").
#[tokio::test]
async fn a_language_with_no_pool_target_executes_via_the_cold_path() {
    let h = spin_up(0).await;
    mock_agent_files(&h.agent, &[]).await;
    mock_agent_execute(&h.agent, json!({"stdout": "ok\n", "stderr": "", "exit_code": 0, "produced_files": []})).await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/exec", h.base_url))
        .json(&json!({"lang": "py", "code": "print('ok')"}))
        .send()
        .await
        .expect("request sent");
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.expect("json body");
    assert_eq!(body["stdout"], "ok\n");
}

/// State round trip via the `/state` endpoints directly (spec.md §8 R1,
/// §6 state endpoint family).
#[tokio::test]
async fn state_info_and_delete_round_trip_through_the_state_endpoints() {
    let h = spin_up(1).await;
    mock_agent_files(&h.agent, &[]).await;
    mock_agent_execute(
        &h.agent,
        json!({
            "stdout": "", "stderr": "", "exit_code": 0, "produced_files": [],
            "updated_state": cellrun_storage::encode_base64url(b"namespace-bytes"),
        }),
    )
    .await;

    let client = reqwest::Client::new();
    let exec_body: Value = client
        .post(format!("{}/exec", h.base_url))
        .json(&json!({"lang": "py", "code": "x=1"}))
        .send()
        .await
        .expect("exec sent")
        .json()
        .await
        .expect("exec json");
    let session_id = exec_body["session_id"].as_str().unwrap();

    let info: Value = client
        .get(format!("{}/state/{session_id}/info", h.base_url))
        .send()
        .await
        .expect("info sent")
        .json()
        .await
        .expect("info json");
    assert_eq!(info["exists"], true);
    assert_eq!(info["tier"], "hot");

    let del = client.delete(format!("{}/state/{session_id}", h.base_url)).send().await.expect("delete sent");
    assert_eq!(del.status(), 204);

    let info_after = client
        .get(format!("{}/state/{session_id}/info", h.base_url))
        .send()
        .await
        .expect("info-after sent");
    assert_eq!(info_after.status(), 404);
}
