// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire-format JSON shapes for the `/exec`, file, and state endpoints
//! (spec.md §6). Conversion to/from the Orchestrator's Rust-native
//! `ExecutionRequest`/`ExecutionResult` happens entirely in this module —
//! the engine crate never sees JSON.

use cellrun_core::{ExecError, ExecutionRequest, FileId, SessionId};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct ExecRequestDto {
    pub lang: String,
    pub code: String,
    pub session_id: Option<String>,
    #[serde(default)]
    pub files: Vec<FileRefDto>,
    pub timeout: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct FileRefDto {
    pub session_id: String,
    pub file_id: String,
}

impl ExecRequestDto {
    /// Fails with `ExecError::InvalidRequest` for an unrecognized `lang`
    /// string, so an unsupported code reaches the caller as a structured
    /// 400 rather than a raw 422 from the JSON extractor (spec.md §7).
    pub fn into_request(self) -> Result<ExecutionRequest, ExecError> {
        let lang = cellrun_core::Language::from_str(&self.lang)
            .map_err(|e| ExecError::InvalidRequest(format!("unknown language: {}", e.0)))?;
        let mut req = ExecutionRequest::new(lang, self.code);
        if let Some(id) = self.session_id {
            req = req.session_id(Some(SessionId::from_string(id)));
        }
        if let Some(secs) = self.timeout {
            req = req.timeout(Some(Duration::from_secs(secs)));
        }
        Ok(req.input_files(
            self.files
                .into_iter()
                .map(|f| cellrun_core::FileRef {
                    session_id: SessionId::from_string(f.session_id),
                    file_id: FileId::from_string(f.file_id),
                })
                .collect(),
        ))
    }
}

#[derive(Debug, Serialize)]
pub struct ProducedFileDto {
    pub session_id: String,
    pub file_id: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct ExecResponseDto {
    pub session_id: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub files: Vec<ProducedFileDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_state: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_hash: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StoredFileDto {
    pub file_id: String,
    pub name: String,
    pub size: u64,
    pub content_type: Option<String>,
    pub created_at_ms: u64,
}

impl From<cellrun_core::StoredFile> for StoredFileDto {
    fn from(f: cellrun_core::StoredFile) -> Self {
        Self {
            file_id: f.file_id.to_string(),
            name: f.name,
            size: f.size,
            content_type: f.content_type,
            created_at_ms: f.created_at_ms,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StateInfoDto {
    pub exists: bool,
    pub size: u64,
    pub hash: String,
    pub created_at_ms: u64,
    pub expires_at_ms: u64,
    pub tier: &'static str,
}

impl From<cellrun_core::StateInfo> for StateInfoDto {
    fn from(i: cellrun_core::StateInfo) -> Self {
        Self {
            exists: i.exists,
            size: i.size,
            hash: i.hash,
            created_at_ms: i.created_at_ms,
            expires_at_ms: i.expires_at_ms,
            tier: match i.tier {
                cellrun_core::StateTier::Hot => "hot",
                cellrun_core::StateTier::Cold => "cold",
            },
        }
    }
}
