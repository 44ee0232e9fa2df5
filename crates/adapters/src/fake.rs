// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory `SandboxBackend` for engine-crate tests — no container runtime
//! or cluster required.

use crate::backend::SandboxBackend;
use async_trait::async_trait;
use cellrun_core::{Language, ManagerError, Provenance, SandboxHandle};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

pub struct FakeSandboxBackend {
    live: Arc<Mutex<HashSet<cellrun_core::SandboxId>>>,
    fail_create: std::sync::atomic::AtomicBool,
    /// Agent endpoint stamped onto every handle this backend creates.
    /// Defaults to an address that resolves but never answers, so tests
    /// that don't care about the wire protocol see a clean readiness
    /// timeout rather than a DNS error. Integration tests that exercise a
    /// full pipeline point this at a `wiremock` server via
    /// [`Self::set_endpoint`].
    endpoint: Mutex<String>,
}

impl Default for FakeSandboxBackend {
    fn default() -> Self {
        Self {
            live: Arc::new(Mutex::new(HashSet::new())),
            fail_create: std::sync::atomic::AtomicBool::new(false),
            endpoint: Mutex::new("http://fake-sandbox.invalid".to_string()),
        }
    }
}

impl FakeSandboxBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `create` call fail, for pool/manager error-path tests.
    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    /// Point every sandbox this backend creates hereafter at `endpoint`
    /// (e.g. a `wiremock::MockServer` standing in for the in-sandbox
    /// agent), enabling end-to-end pipeline tests against the real
    /// replenish/readiness-probe/execute code paths.
    pub fn set_endpoint(&self, endpoint: impl Into<String>) {
        *self.endpoint.lock() = endpoint.into();
    }

    pub fn live_count(&self) -> usize {
        self.live.lock().len()
    }
}

#[async_trait]
impl SandboxBackend for FakeSandboxBackend {
    async fn create(
        &self,
        language: Language,
        provenance: Provenance,
        now_ms: u64,
    ) -> Result<SandboxHandle, ManagerError> {
        if self.fail_create.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(ManagerError::CreateFailed("fake backend configured to fail".into()));
        }
        let endpoint = self.endpoint.lock().clone();
        let handle = SandboxHandle::new(language, endpoint, provenance, now_ms);
        self.live.lock().insert(handle.id);
        Ok(handle)
    }

    async fn destroy(&self, handle: &SandboxHandle) {
        self.live.lock().remove(&handle.id);
    }

    async fn sweep_orphans(&self) -> usize {
        0
    }
}
