// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `RemoteExecutor` (spec.md §4.4) — the wire protocol to the in-sandbox
//! agent: staging input files, submitting code, harvesting produced files
//! by diffing the working directory before and after.

use std::time::Duration;

use bytes::Bytes;
use cellrun_core::RemoteError;
use serde::{Deserialize, Serialize};

const DEFAULT_FILE_TIMEOUT: Duration = Duration::from_secs(30);
const WATCHDOG_GRACE: Duration = Duration::from_secs(5);

/// Body of `POST /execute` (spec.md §4.4).
#[derive(Debug, Serialize)]
struct ExecuteRequest<'a> {
    code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    prior_state: Option<String>,
    capture_state: bool,
    working_dir: &'a str,
    timeout_s: u64,
}

/// Response body of `POST /execute` (spec.md §4.4).
#[derive(Debug, Deserialize)]
pub struct AgentExecuteResponse {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub produced_files: Vec<String>,
    #[serde(default)]
    pub updated_state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AgentFileEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct AgentErrorBody {
    message: Option<String>,
}

/// Thin, stateless wrapper over a `reqwest::Client`. Every call is keyed
/// purely by `agent_endpoint` — the executor holds no per-sandbox state,
/// a clients-don't-carry-session shape.
pub struct RemoteExecutor {
    client: reqwest::Client,
}

impl Default for RemoteExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteExecutor {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }

    /// `POST /files` — multipart upload of one file into the sandbox's
    /// shared working directory (spec.md §4.4).
    pub async fn upload_file(
        &self,
        agent_endpoint: &str,
        name: &str,
        bytes: Bytes,
    ) -> Result<(), RemoteError> {
        let part = reqwest::multipart::Part::bytes(bytes.to_vec()).file_name(name.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);
        let resp = self
            .client
            .post(format!("{agent_endpoint}/files"))
            .timeout(DEFAULT_FILE_TIMEOUT)
            .multipart(form)
            .send()
            .await
            .map_err(network_err)?;
        map_status(resp).await.map(|_| ())
    }

    /// `GET /files` — list the sandbox's current working directory, used
    /// both to record the pre-execute baseline and to diff after
    /// (spec.md §4.4 "Harvesting").
    pub async fn list_files(&self, agent_endpoint: &str) -> Result<Vec<String>, RemoteError> {
        let resp = self
            .client
            .get(format!("{agent_endpoint}/files"))
            .timeout(DEFAULT_FILE_TIMEOUT)
            .send()
            .await
            .map_err(network_err)?;
        let resp = map_status(resp).await?;
        let entries: Vec<AgentFileEntry> =
            resp.json().await.map_err(|e| RemoteError::AgentUnavailable(e.to_string()))?;
        Ok(entries.into_iter().map(|e| e.name).collect())
    }

    /// `GET /files/{name}` — download one produced file's bytes.
    pub async fn download_file(&self, agent_endpoint: &str, name: &str) -> Result<Bytes, RemoteError> {
        let resp = self
            .client
            .get(format!("{agent_endpoint}/files/{name}"))
            .timeout(DEFAULT_FILE_TIMEOUT)
            .send()
            .await
            .map_err(network_err)?;
        let resp = map_status(resp).await?;
        resp.bytes().await.map_err(|e| RemoteError::AgentUnavailable(e.to_string()))
    }

    /// `POST /execute`, watchdog-wrapped at `timeout + grace` (spec.md
    /// §4.4 "Timeouts"). A non-zero exit or an agent-captured exception is
    /// not an error here — it comes back in the ordinary response fields;
    /// only a malformed request, an unreachable agent, or the watchdog
    /// itself firing are errors.
    pub async fn execute(
        &self,
        agent_endpoint: &str,
        code: &str,
        prior_state: Option<String>,
        capture_state: bool,
        working_dir: &str,
        timeout: Duration,
    ) -> Result<AgentExecuteResponse, RemoteError> {
        let body = ExecuteRequest {
            code,
            prior_state,
            capture_state,
            working_dir,
            timeout_s: timeout.as_secs().max(1),
        };

        let call = self
            .client
            .post(format!("{agent_endpoint}/execute"))
            .json(&body)
            .send();

        let resp = tokio::time::timeout(timeout + WATCHDOG_GRACE, call)
            .await
            .map_err(|_| RemoteError::Timeout)?
            .map_err(network_err)?;

        let resp = map_status(resp).await?;
        resp.json().await.map_err(|e| RemoteError::AgentUnavailable(e.to_string()))
    }

    /// Harvest every file present after `/execute` that was not present in
    /// `baseline`, downloading each (spec.md §4.4 "Harvesting" — never
    /// trusts the agent's own `produced_files` list for *what* is new,
    /// only uses it as a hint for *which* names to fetch).
    pub async fn harvest_new_files(
        &self,
        agent_endpoint: &str,
        baseline: &[String],
        after_execute: &[String],
    ) -> Result<Vec<(String, Bytes)>, RemoteError> {
        let mut out = Vec::new();
        for name in after_execute {
            if baseline.iter().any(|b| b == name) {
                continue;
            }
            let bytes = self.download_file(agent_endpoint, name).await?;
            out.push((name.clone(), bytes));
        }
        Ok(out)
    }
}

fn network_err(e: reqwest::Error) -> RemoteError {
    RemoteError::AgentUnavailable(e.to_string())
}

async fn map_status(resp: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp
        .json::<AgentErrorBody>()
        .await
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| status.to_string());
    if status.is_client_error() {
        Err(RemoteError::InvalidRequest(message))
    } else {
        Err(RemoteError::AgentUnavailable(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn execute_returns_the_agents_response_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/execute"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "stdout": "hi\n",
                "stderr": "",
                "exit_code": 0,
                "produced_files": ["out.txt"],
            })))
            .mount(&server)
            .await;

        let executor = RemoteExecutor::new();
        let result = executor
            .execute(&server.uri(), "print('hi')", None, false, "/workdir", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, "hi\n");
    }

    #[tokio::test]
    async fn execute_maps_4xx_to_invalid_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/execute"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(serde_json::json!({"message": "bad code"})),
            )
            .mount(&server)
            .await;

        let executor = RemoteExecutor::new();
        let err = executor
            .execute(&server.uri(), "!!!", None, false, "/workdir", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn execute_maps_5xx_to_agent_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/execute"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let executor = RemoteExecutor::new();
        let err = executor
            .execute(&server.uri(), "code", None, false, "/workdir", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::AgentUnavailable(_)));
    }

    #[tokio::test]
    async fn execute_against_an_unreachable_endpoint_is_agent_unavailable() {
        let executor = RemoteExecutor::new();
        let err = executor
            .execute("http://127.0.0.1:1", "code", None, false, "/workdir", Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::AgentUnavailable(_)));
    }

    #[tokio::test]
    async fn harvest_skips_names_present_in_the_baseline() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/new.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"fresh".to_vec()))
            .mount(&server)
            .await;

        let executor = RemoteExecutor::new();
        let baseline = vec!["old.txt".to_string()];
        let after = vec!["old.txt".to_string(), "new.txt".to_string()];
        let harvested = executor.harvest_new_files(&server.uri(), &baseline, &after).await.unwrap();
        assert_eq!(harvested.len(), 1);
        assert_eq!(harvested[0].0, "new.txt");
        assert_eq!(harvested[0].1, Bytes::from_static(b"fresh"));
    }

    #[tokio::test]
    async fn list_files_parses_the_agents_directory_listing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"name": "a.txt"},
                {"name": "b.txt"},
            ])))
            .mount(&server)
            .await;

        let executor = RemoteExecutor::new();
        let names = executor.list_files(&server.uri()).await.unwrap();
        assert_eq!(names, vec!["a.txt".to_string(), "b.txt".to_string()]);
    }
}
