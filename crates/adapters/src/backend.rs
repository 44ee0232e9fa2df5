// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `SandboxBackend` trait that makes `SandboxManager` (engine crate)
//! platform-agnostic (spec.md §4.3) — which backend is active is a
//! `Config` field, not a compile-time feature, so the process can pick
//! among its docker/k8s/fake adapters at runtime.

use async_trait::async_trait;
use cellrun_core::{Language, ManagerError, Provenance, SandboxHandle};

/// Platform-level sandbox lifecycle (spec.md §4.3). Implementations
/// provision a two-process sandbox — a main runtime process and an agent
/// side-car sharing a working directory — and tear it down unconditionally
/// on `destroy`.
#[async_trait]
pub trait SandboxBackend: Send + Sync + 'static {
    /// Provision a sandbox for `language`. Returns once the platform
    /// reports the sandbox *scheduled*, not yet ready — the caller (the
    /// pool's replenisher, or `execute_cold`) probes `/ready` itself.
    async fn create(
        &self,
        language: Language,
        provenance: Provenance,
        now_ms: u64,
    ) -> Result<SandboxHandle, ManagerError>;

    /// Unconditional teardown. Idempotent; must never panic out of the
    /// caller's exit path — implementations log failures instead of
    /// propagating them where the caller cannot act on them anyway.
    async fn destroy(&self, handle: &SandboxHandle);

    /// Sweep orphaned sandboxes by the platform label/annotation this
    /// backend stamps onto everything it creates (spec.md §5 "Orphan
    /// sandbox detection"). Returns the number of orphans destroyed.
    async fn sweep_orphans(&self) -> usize;
}

/// Label/annotation stamped on every sandbox this crate creates, used by
/// `sweep_orphans` to distinguish our sandboxes from unrelated containers
/// or pods in the same cluster/host.
pub const MANAGED_LABEL: &str = "cellrun.io/managed";
pub const MANAGED_LABEL_VALUE: &str = "true";
