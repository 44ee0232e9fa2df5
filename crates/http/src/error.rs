// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Maps the error taxonomy (spec.md §7) onto HTTP status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use cellrun_core::{ExecError, FileStoreError, RegistryError};
use cellrun_storage::StateStoreError;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

/// The HTTP-facing error type every handler returns. Wraps whichever
/// layer error reached the handler directly (file/state endpoints act on
/// the storage crate without going through the Orchestrator) or the
/// composed `ExecError` from `/exec`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self { status, code, message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, code = self.code, message = %self.message, "request failed");
        }
        (self.status, Json(ErrorBody { error: self.code, message: self.message })).into_response()
    }
}

impl From<ExecError> for ApiError {
    fn from(e: ExecError) -> Self {
        let status = match &e {
            ExecError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ExecError::SessionNotFound | ExecError::FileNotFound => StatusCode::NOT_FOUND,
            ExecError::PoolTimeout => StatusCode::TOO_MANY_REQUESTS,
            ExecError::StateTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ExecError::RemoteAgentError(_) | ExecError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            // Execution timeouts never reach here as an error — the
            // Orchestrator only returns `ExecutionTimeout` when the agent
            // call itself times out, which is an internal-server signal,
            // not the normal EXIT_TIMEOUT result path (spec.md §7).
            ExecError::ExecutionTimeout => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e.kind(), e.to_string())
    }
}

impl From<FileStoreError> for ApiError {
    fn from(e: FileStoreError) -> Self {
        let status = match &e {
            FileStoreError::NotFound => StatusCode::NOT_FOUND,
            FileStoreError::TooLarge { .. } | FileStoreError::SessionQuotaExceeded { .. } => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            FileStoreError::TooManyFiles(_) | FileStoreError::InvalidFilename(_) => StatusCode::BAD_REQUEST,
            FileStoreError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let code = match &e {
            FileStoreError::NotFound => "file_not_found",
            FileStoreError::TooLarge { .. } => "file_too_large",
            FileStoreError::SessionQuotaExceeded { .. } => "session_quota_exceeded",
            FileStoreError::TooManyFiles(_) => "too_many_files",
            FileStoreError::InvalidFilename(_) => "invalid_filename",
            FileStoreError::Store(_) => "internal",
        };
        Self::new(status, code, e.to_string())
    }
}

impl From<StateStoreError> for ApiError {
    fn from(e: StateStoreError) -> Self {
        match e {
            StateStoreError::TooLarge { size, limit } => Self::new(
                StatusCode::PAYLOAD_TOO_LARGE,
                "state_too_large",
                format!("state blob of {size} bytes exceeds the {limit} byte limit"),
            ),
            StateStoreError::Store(inner) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", inner.to_string())
            }
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotFound => Self::not_found("session not found"),
            RegistryError::Store(msg) => Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", msg),
        }
    }
}
