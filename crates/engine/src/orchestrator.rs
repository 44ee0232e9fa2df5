// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `Orchestrator` (spec.md §4.1) — the end-to-end pipeline for one
//! execution request: resolve session, load state, acquire a sandbox,
//! stage files, submit code, harvest output, persist state, destroy.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cellrun_adapters::SandboxBackend;
use cellrun_core::{
    hash_hex, Clock, Event, ExecError, ExecutionConfig, ExecutionRequest, ExecutionResult, FileRef,
    Language, PoolConfig, Principal, SandboxHandle, StateSummary,
};
use cellrun_storage::{decode_base64url, encode_base64url, FileStore, SessionRegistry, StateStore};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::executor::RemoteExecutor;
use crate::lease::SandboxLease;
use crate::manager::SandboxManager;
use crate::pool::SandboxPool;

/// Working directory every sandbox agent shares with its main process
/// (spec.md §4.3 "ephemeral working directory mounted").
const WORKING_DIR: &str = "/workdir";

pub struct Orchestrator<B: SandboxBackend, C: Clock> {
    backend: Arc<B>,
    pool: Arc<SandboxPool<B, C>>,
    manager: Arc<SandboxManager<B>>,
    executor: Arc<RemoteExecutor>,
    sessions: Arc<dyn SessionRegistry>,
    files: Arc<dyn FileStore>,
    state: Arc<dyn StateStore>,
    clock: C,
    execution: ExecutionConfig,
    pool_config: PoolConfig,
    events: broadcast::Sender<Event>,
    /// Consecutive `PoolTimeout`s per language, reset on any success
    /// (spec.md §9 Open Questions: `fallback_after_timeouts` resolved as a
    /// per-language counter decided here, not threaded through `PoolConfig`
    /// beyond the threshold itself — see DESIGN.md).
    pool_timeouts: Mutex<HashMap<Language, AtomicU32>>,
}

impl<B: SandboxBackend, C: Clock> Orchestrator<B, C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        backend: Arc<B>,
        pool: Arc<SandboxPool<B, C>>,
        manager: Arc<SandboxManager<B>>,
        executor: Arc<RemoteExecutor>,
        sessions: Arc<dyn SessionRegistry>,
        files: Arc<dyn FileStore>,
        state: Arc<dyn StateStore>,
        clock: C,
        execution: ExecutionConfig,
        pool_config: PoolConfig,
        events: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            backend,
            pool,
            manager,
            executor,
            sessions,
            files,
            state,
            clock,
            execution,
            pool_config,
            events,
            pool_timeouts: Mutex::new(HashMap::new()),
        }
    }

    /// Run one request end to end (spec.md §4.1, steps 1-10). `cancel` is
    /// propagated from the HTTP layer's client-disconnect signal; code
    /// already submitted to the agent is never recalled, but harvesting and
    /// state persistence are skipped once it fires (spec.md §5
    /// "Cancellation").
    pub async fn execute(
        &self,
        principal: Principal,
        req: ExecutionRequest,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, ExecError> {
        let start = self.clock.now();
        let result = self.execute_inner(principal, &req, cancel).await;

        let (exit_code, error_kind) = match &result {
            Ok(r) => (r.exit_code, None),
            Err(e) => (-2, Some(e.kind())),
        };
        let _ = self.events.send(Event::ExecutionCompleted {
            session_id: req.session_id.unwrap_or_default(),
            language: req.language,
            provenance: cellrun_core::Provenance::Pool,
            exit_code,
            duration_ms: self.clock.now().duration_since(start).as_millis() as u64,
            error_kind,
        });
        result
    }

    async fn execute_inner(
        &self,
        principal: Principal,
        req: &ExecutionRequest,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, ExecError> {
        // 1. Validate.
        if req.code.is_empty() {
            return Err(ExecError::InvalidRequest("code must not be empty".into()));
        }
        if req.code.len() > self.execution.max_code_bytes {
            return Err(ExecError::InvalidRequest(format!(
                "code of {} bytes exceeds the {} byte limit",
                req.code.len(),
                self.execution.max_code_bytes
            )));
        }
        let timeout = self.execution.clamp_timeout(req.timeout);

        // 2. Resolve session.
        let (session_id, existing) = match req.session_id {
            Some(id) => {
                self.sessions.get(id).await?;
                self.sessions.touch(id).await?;
                (id, true)
            }
            None => (self.sessions.create(principal, Some(req.language)).await, false),
        };

        let now_ms = self.clock.epoch_ms();

        // 3. Load prior state for stateful languages on an existing session.
        let prior_state = if req.language.is_stateful() && existing {
            self.state.load(session_id, now_ms).await?
        } else {
            None
        };

        if cancel.is_cancelled() {
            return Err(ExecError::Internal("cancelled before sandbox acquisition".into()));
        }

        // 4. Acquire a sandbox, pool first, cold fallback on disable or
        // repeated timeouts.
        let handle = self.acquire_handle(req.language, now_ms).await?;
        let lease = SandboxLease::new(handle, Arc::clone(&self.backend));
        let endpoint = lease.handle().agent_endpoint.clone();

        // 5. Stage input files.
        for file_ref in &req.input_files {
            self.stage_file(&endpoint, file_ref).await?;
        }

        let baseline = self.executor.list_files(&endpoint).await?;

        // 6. Submit code.
        let prior_state_b64 = prior_state.as_deref().map(encode_base64url);
        let agent_response = self
            .executor
            .execute(
                &endpoint,
                &req.code,
                prior_state_b64,
                req.language.is_stateful(),
                WORKING_DIR,
                timeout,
            )
            .await?;

        if let Some(message) = agent_response.error {
            return Err(ExecError::RemoteAgentError(message));
        }

        let mut produced_files = Vec::new();
        let mut state_summary = StateSummary::default();

        if !cancel.is_cancelled() {
            // 7. Harvest newly produced files.
            let after = self.executor.list_files(&endpoint).await?;
            let harvested = self.executor.harvest_new_files(&endpoint, &baseline, &after).await?;
            for (name, bytes) in harvested {
                let stored = self.files.upload(session_id, &name, None, bytes, now_ms).await?;
                produced_files.push(FileRef { session_id, file_id: stored.file_id });
            }

            // 8. Persist updated state.
            if req.language.is_stateful() {
                if let Some(state_b64) = agent_response.updated_state {
                    let bytes = decode_base64url(&state_b64)
                        .map_err(|e| ExecError::InvalidRequest(format!("invalid state encoding: {e}")))?;
                    let hash = hash_hex(&bytes);
                    let size = bytes.len() as u64;
                    self.state.save(session_id, bytes::Bytes::from(bytes), now_ms).await?;
                    state_summary = StateSummary { has_state: true, state_size: Some(size), state_hash: Some(hash) };
                } else if existing {
                    if let Some(info) = self.state.info(session_id).await? {
                        state_summary = StateSummary {
                            has_state: true,
                            state_size: Some(info.size),
                            state_hash: Some(info.hash),
                        };
                    }
                }
            }
        }

        // 9. Schedule sandbox destruction — dropping the lease spawns it.
        drop(lease);

        // 10. Build response (event publication happens in `execute`).
        Ok(ExecutionResult {
            session_id,
            stdout: agent_response.stdout,
            stderr: agent_response.stderr,
            exit_code: agent_response.exit_code,
            files: produced_files,
            state: state_summary,
        })
    }

    async fn stage_file(&self, endpoint: &str, file_ref: &FileRef) -> Result<(), ExecError> {
        let metadata = self.files.list(file_ref.session_id).await;
        let stored = metadata
            .into_iter()
            .find(|f| f.file_id == file_ref.file_id)
            .ok_or(ExecError::FileNotFound)?;
        let bytes = self.files.download(file_ref.session_id, file_ref.file_id).await?;
        self.executor.upload_file(endpoint, &stored.name, bytes).await?;
        Ok(())
    }

    async fn acquire_handle(&self, language: Language, now_ms: u64) -> Result<SandboxHandle, ExecError> {
        if self.pool_config.is_pool_disabled(language) {
            return Ok(self.manager.provision_cold(language, now_ms).await?);
        }

        let deadline = Duration::from_secs(self.pool_config.startup_deadline_s.max(1));
        match Arc::clone(&self.pool).acquire(language, deadline).await {
            Ok(handle) => {
                self.reset_timeouts(language);
                Ok(handle)
            }
            Err(cellrun_core::PoolError::Timeout) => {
                if self.bump_timeouts(language) >= self.pool_config.fallback_after_timeouts {
                    self.reset_timeouts(language);
                    tracing::warn!(%language, "pool timed out repeatedly, falling back to cold spawn");
                    Ok(self.manager.provision_cold(language, now_ms).await?)
                } else {
                    Err(ExecError::PoolTimeout)
                }
            }
            Err(other) => Err(other.into()),
        }
    }

    fn bump_timeouts(&self, language: Language) -> u32 {
        let mut map = self.pool_timeouts.lock();
        let counter = map.entry(language).or_insert_with(|| AtomicU32::new(0));
        counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn reset_timeouts(&self, language: Language) {
        if let Some(counter) = self.pool_timeouts.lock().get(&language) {
            counter.store(0, Ordering::SeqCst);
        }
    }
}
