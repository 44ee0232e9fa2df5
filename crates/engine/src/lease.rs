// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `SandboxLease` — a scope guard over a [`SandboxHandle`] that destroys
//! the sandbox on `Drop`, regardless of how the scope is exited (success,
//! `?`-propagated error, cancellation, or panic).
//!
//! A scoped-resource idiom (the same shape as a lock-file or worktree
//! guard): destruction is "fire and forget" — `Drop` spawns the
//! async teardown rather than blocking, since `Drop` cannot be async and
//! the Orchestrator's response path must not wait on it (spec.md §4.1
//! "Cleanup discipline", §9).

use std::sync::Arc;

use cellrun_adapters::SandboxBackend;
use cellrun_core::SandboxHandle;

/// Owns a `SandboxHandle` for the duration of one request pipeline. The
/// sandbox is destroyed only when the lease itself is dropped.
pub struct SandboxLease<B: SandboxBackend> {
    handle: SandboxHandle,
    backend: Arc<B>,
}

impl<B: SandboxBackend> SandboxLease<B> {
    pub fn new(handle: SandboxHandle, backend: Arc<B>) -> Self {
        Self { handle, backend }
    }

    pub fn handle(&self) -> &SandboxHandle {
        &self.handle
    }
}

impl<B: SandboxBackend> Drop for SandboxLease<B> {
    fn drop(&mut self) {
        let handle = self.handle.clone();
        let backend = Arc::clone(&self.backend);
        tokio::spawn(async move {
            backend.destroy(&handle).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellrun_adapters::FakeSandboxBackend;
    use cellrun_core::{Language, Provenance};

    #[tokio::test]
    async fn dropping_the_lease_destroys_the_sandbox() {
        let backend = Arc::new(FakeSandboxBackend::new());
        let handle = backend.create(Language::Py, Provenance::Pool, 0).await.unwrap();
        assert_eq!(backend.live_count(), 1);

        {
            let _lease = SandboxLease::new(handle, Arc::clone(&backend));
        }
        // Destruction is spawned, not synchronous — give the task a turn.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(backend.live_count(), 0);
    }

    #[tokio::test]
    async fn lease_survives_an_early_return_via_question_mark() {
        let backend = Arc::new(FakeSandboxBackend::new());

        async fn pipeline(backend: Arc<FakeSandboxBackend>) -> Result<(), String> {
            let handle = backend.create(Language::Py, Provenance::Pool, 0).await.unwrap();
            let _lease = SandboxLease::new(handle, backend);
            Err("downstream failure".to_string())?;
            Ok(())
        }

        let result = pipeline(Arc::clone(&backend)).await;
        assert!(result.is_err());
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(backend.live_count(), 0);
    }
}
