// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The axum router (spec.md §6). `AppState` is the `ListenCtx`-style shared
//! context every handler borrows — cloneable `Arc` handles into each
//! component, nothing handler-local.

use std::sync::Arc;

use axum::body::Bytes as AxumBytes;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use cellrun_adapters::SandboxBackend;
use cellrun_core::{Clock, ExecutionConfig, FileId, Principal, SessionId, StateConfig};
use cellrun_engine::Orchestrator;
use cellrun_storage::{FileStore, StateStore};
use tokio_util::sync::CancellationToken;

use crate::dto::{ExecRequestDto, ExecResponseDto, ProducedFileDto, StateInfoDto, StoredFileDto};
use crate::error::ApiError;

/// Shared handles threaded into every handler. Held behind an `Arc` and
/// cloned into each `axum::Router` route (spec.md §9 / REDESIGN FLAGS:
/// a listener-context shape that carries over even though the wire
/// format does not).
pub struct AppState<B: SandboxBackend, C: Clock> {
    pub orchestrator: Arc<Orchestrator<B, C>>,
    pub files: Arc<dyn FileStore>,
    pub state_store: Arc<dyn StateStore>,
    pub clock: C,
    pub execution: ExecutionConfig,
    pub state_config: StateConfig,
}

type SharedState<B, C> = Arc<AppState<B, C>>;

pub fn router<B, C>(state: SharedState<B, C>) -> Router
where
    B: SandboxBackend,
    C: Clock,
{
    Router::new()
        .route("/exec", post(exec::<B, C>))
        .route("/upload", post(upload::<B, C>))
        .route("/files/:session_id", get(list_files::<B, C>))
        .route("/download/:session_id/:file_id", get(download_file::<B, C>))
        .route("/files/:session_id/:file_id", delete(delete_file::<B, C>))
        .route("/state/:session_id", get(get_state::<B, C>).post(post_state::<B, C>).delete(delete_state::<B, C>))
        .route("/state/:session_id/info", get(state_info::<B, C>))
        .with_state(state)
}

/// `POST /exec` (spec.md §6). The request carries no authenticated
/// principal yet — tenant/user resolution at the edge is out of scope for
/// this core (spec.md §1 Non-goals); a fixed anonymous principal stands in
/// until an auth layer is wired in front of this router.
async fn exec<B, C>(
    State(state): State<SharedState<B, C>>,
    Json(body): Json<ExecRequestDto>,
) -> Result<Json<ExecResponseDto>, ApiError>
where
    B: SandboxBackend,
    C: Clock,
{
    let principal = Principal::new("default", "default");
    let request = body.into_request()?;
    let cancel = CancellationToken::new();
    let result = state.orchestrator.execute(principal, request, &cancel).await?;

    let stored = state.files.list(result.session_id).await;
    let files = result
        .files
        .into_iter()
        .map(|f| {
            let name = stored
                .iter()
                .find(|s| s.file_id == f.file_id)
                .map(|s| s.name.clone())
                .unwrap_or_default();
            ProducedFileDto { session_id: f.session_id.to_string(), file_id: f.file_id.to_string(), name }
        })
        .collect();

    Ok(Json(ExecResponseDto {
        session_id: result.session_id.to_string(),
        stdout: result.stdout,
        stderr: result.stderr,
        exit_code: result.exit_code,
        files,
        has_state: result.state.has_state.then_some(true),
        state_size: result.state.state_size,
        state_hash: result.state.state_hash,
    }))
}

/// `POST /upload` (spec.md §6), multipart with a single `file` part and
/// the session it belongs to carried as a `session_id` text field.
async fn upload<B, C>(
    State(state): State<SharedState<B, C>>,
    mut form: Multipart,
) -> Result<Json<StoredFileDto>, ApiError>
where
    B: SandboxBackend,
    C: Clock,
{
    let mut session_id: Option<SessionId> = None;
    let mut file_bytes: Option<AxumBytes> = None;
    let mut file_name = String::from("upload.bin");
    let mut content_type = None;

    while let Some(field) = form.next_field().await.map_err(|e| ApiError::bad_request(e.to_string()))? {
        match field.name() {
            Some("session_id") => {
                let text = field.text().await.map_err(|e| ApiError::bad_request(e.to_string()))?;
                session_id = Some(SessionId::from_string(text));
            }
            Some("file") => {
                if let Some(name) = field.file_name() {
                    file_name = name.to_string();
                }
                content_type = field.content_type().map(str::to_string);
                file_bytes = Some(field.bytes().await.map_err(|e| ApiError::bad_request(e.to_string()))?);
            }
            _ => {}
        }
    }

    let session_id = session_id.ok_or_else(|| ApiError::bad_request("missing session_id field"))?;
    let bytes = file_bytes.ok_or_else(|| ApiError::bad_request("missing file field"))?;
    let now_ms = state.clock.epoch_ms();

    let stored = state.files.upload(session_id, &file_name, content_type, bytes, now_ms).await?;
    Ok(Json(stored.into()))
}

/// `GET /files/{session_id}` (spec.md §6). Forces `Connection: close`
/// (spec.md §9 design notes): a long-idle keep-alive connection sitting on
/// a listing response is a scarce-connection hazard under the daemon's
/// bounded worker pool, so this endpoint opts the connection out rather
/// than rely on a global idle timeout tuned for the rest of the surface.
async fn list_files<B, C>(
    State(state): State<SharedState<B, C>>,
    Path(session_id): Path<String>,
) -> Response
where
    B: SandboxBackend,
    C: Clock,
{
    let session_id = SessionId::from_string(session_id);
    let files: Vec<StoredFileDto> = state.files.list(session_id).await.into_iter().map(Into::into).collect();
    let mut response = Json(files).into_response();
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
    response
}

/// `GET /download/{session_id}/{file_id}` (spec.md §6) — binary body.
async fn download_file<B, C>(
    State(state): State<SharedState<B, C>>,
    Path((session_id, file_id)): Path<(String, String)>,
) -> Result<Response, ApiError>
where
    B: SandboxBackend,
    C: Clock,
{
    let session_id = SessionId::from_string(session_id);
    let file_id = FileId::from_string(file_id);
    let bytes = state.files.download(session_id, file_id).await?;
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], bytes).into_response())
}

/// `DELETE /files/{session_id}/{file_id}` (spec.md §6).
async fn delete_file<B, C>(
    State(state): State<SharedState<B, C>>,
    Path((session_id, file_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError>
where
    B: SandboxBackend,
    C: Clock,
{
    let session_id = SessionId::from_string(session_id);
    let file_id = FileId::from_string(file_id);
    state.files.delete(session_id, file_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /state/{session_id}` (spec.md §6) — raw blob with `ETag` set to
/// the content hash, honoring `If-None-Match` for a cheap 304 round trip.
async fn get_state<B, C>(
    State(state): State<SharedState<B, C>>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError>
where
    B: SandboxBackend,
    C: Clock,
{
    let session_id = SessionId::from_string(session_id);
    let info = state.state_store.info(session_id).await?;
    let Some(info) = info else {
        return Err(ApiError::not_found("no state stored for this session"));
    };

    if let Some(if_none_match) = headers.get(header::IF_NONE_MATCH) {
        if if_none_match.to_str().map(|v| v.trim_matches('"') == info.hash).unwrap_or(false) {
            return Ok(StatusCode::NOT_MODIFIED.into_response());
        }
    }

    let Some(bytes) = state.state_store.load(session_id, state.clock.epoch_ms()).await? else {
        return Err(ApiError::not_found("no state stored for this session"));
    };

    let etag = HeaderValue::from_str(&format!("\"{}\"", info.hash))
        .unwrap_or_else(|_| HeaderValue::from_static("\"\""));
    Ok((
        [(header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream")), (header::ETAG, etag)],
        bytes,
    )
        .into_response())
}

/// `POST /state/{session_id}` (spec.md §6) — raw octet-stream client
/// upload, size-checked against `state_max_size_mib` before anything is
/// written (same invariant as `StateStore::client_upload`'s own check).
async fn post_state<B, C>(
    State(state): State<SharedState<B, C>>,
    Path(session_id): Path<String>,
    body: AxumBytes,
) -> Result<StatusCode, ApiError>
where
    B: SandboxBackend,
    C: Clock,
{
    let session_id = SessionId::from_string(session_id);
    if body.len() as u64 > state.state_config.max_size_bytes() {
        return Err(ApiError::from(cellrun_core::ExecError::StateTooLarge {
            size: body.len() as u64,
            limit: state.state_config.max_size_bytes(),
        }));
    }
    let hash = cellrun_core::hash_hex(&body);
    state.state_store.client_upload(session_id, body, &hash, state.clock.epoch_ms()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /state/{session_id}/info` (spec.md §6).
async fn state_info<B, C>(
    State(state): State<SharedState<B, C>>,
    Path(session_id): Path<String>,
) -> Result<Json<StateInfoDto>, ApiError>
where
    B: SandboxBackend,
    C: Clock,
{
    let session_id = SessionId::from_string(session_id);
    let info = state.state_store.info(session_id).await?;
    match info {
        Some(info) => Ok(Json(info.into())),
        None => Err(ApiError::not_found("no state stored for this session")),
    }
}

/// `DELETE /state/{session_id}` (spec.md §6).
async fn delete_state<B, C>(
    State(state): State<SharedState<B, C>>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError>
where
    B: SandboxBackend,
    C: Clock,
{
    let session_id = SessionId::from_string(session_id);
    state.state_store.delete(session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

