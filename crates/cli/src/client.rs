// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A thin HTTP client for `celld`'s public surface (spec.md §6): one small
//! typed wrapper per request shape, no business logic, errors bubble up as
//! `anyhow::Error` for `main` to render.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Serialize, Default)]
pub struct ExecRequest {
    pub lang: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FileRef {
    pub session_id: String,
    pub file_id: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ExecResponse {
    pub session_id: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub files: Vec<ProducedFile>,
    #[serde(default)]
    pub has_state: Option<bool>,
    #[serde(default)]
    pub state_size: Option<u64>,
    #[serde(default)]
    pub state_hash: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ProducedFile {
    pub session_id: String,
    pub file_id: String,
    pub name: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct StoredFile {
    pub file_id: String,
    pub name: String,
    pub size: u64,
    pub content_type: Option<String>,
    pub created_at_ms: u64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct StateInfo {
    pub exists: bool,
    pub size: u64,
    pub hash: String,
    pub created_at_ms: u64,
    pub expires_at_ms: u64,
    pub tier: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: String,
    message: String,
}

impl Client {
    pub fn new(base_url: String, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_string() })
    }

    async fn check(resp: reqwest::Response) -> anyhow::Result<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if let Ok(err) = serde_json::from_str::<ApiErrorBody>(&body) {
            anyhow::bail!("{} ({}): {}", err.error, status, err.message);
        }
        anyhow::bail!("daemon returned {status}: {body}");
    }

    pub async fn exec(&self, req: ExecRequest) -> anyhow::Result<ExecResponse> {
        let resp = self.http.post(format!("{}/exec", self.base_url)).json(&req).send().await?;
        let resp = Self::check(resp).await?;
        Ok(resp.json().await?)
    }

    pub async fn upload(&self, session_id: &str, path: &Path) -> anyhow::Result<StoredFile> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "upload.bin".into());
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
        let form = reqwest::multipart::Form::new().text("session_id", session_id.to_string()).part("file", part);
        let resp = self.http.post(format!("{}/upload", self.base_url)).multipart(form).send().await?;
        let resp = Self::check(resp).await?;
        Ok(resp.json().await?)
    }

    pub async fn list_files(&self, session_id: &str) -> anyhow::Result<Vec<StoredFile>> {
        let resp = self.http.get(format!("{}/files/{}", self.base_url, session_id)).send().await?;
        let resp = Self::check(resp).await?;
        Ok(resp.json().await?)
    }

    pub async fn download_file(&self, session_id: &str, file_id: &str) -> anyhow::Result<bytes::Bytes> {
        let resp = self.http.get(format!("{}/download/{}/{}", self.base_url, session_id, file_id)).send().await?;
        let resp = Self::check(resp).await?;
        Ok(resp.bytes().await?)
    }

    pub async fn delete_file(&self, session_id: &str, file_id: &str) -> anyhow::Result<()> {
        let resp = self.http.delete(format!("{}/files/{}/{}", self.base_url, session_id, file_id)).send().await?;
        Self::check(resp).await?;
        Ok(())
    }

    pub async fn state_info(&self, session_id: &str) -> anyhow::Result<StateInfo> {
        let resp = self.http.get(format!("{}/state/{}/info", self.base_url, session_id)).send().await?;
        let resp = Self::check(resp).await?;
        Ok(resp.json().await?)
    }

    pub async fn get_state(&self, session_id: &str) -> anyhow::Result<bytes::Bytes> {
        let resp = self.http.get(format!("{}/state/{}", self.base_url, session_id)).send().await?;
        let resp = Self::check(resp).await?;
        Ok(resp.bytes().await?)
    }

    pub async fn delete_state(&self, session_id: &str) -> anyhow::Result<()> {
        let resp = self.http.delete(format!("{}/state/{}", self.base_url, session_id)).send().await?;
        Self::check(resp).await?;
        Ok(())
    }
}
