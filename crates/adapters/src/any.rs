// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `AnyBackend` — picks between `DockerBackend` and `KubernetesBackend` at
//! startup from `Config::ambient.sandbox_backend` (spec.md §6), a
//! single-process-wide choice made once, since a deployment runs one
//! backend for its whole fleet.

use async_trait::async_trait;
use cellrun_core::{Language, ManagerError, Provenance, SandboxHandle};

use crate::backend::SandboxBackend;
use crate::docker::DockerBackend;
use crate::k8s::KubernetesBackend;

pub enum AnyBackend {
    Docker(DockerBackend),
    Kubernetes(KubernetesBackend),
}

#[async_trait]
impl SandboxBackend for AnyBackend {
    async fn create(
        &self,
        language: Language,
        provenance: Provenance,
        now_ms: u64,
    ) -> Result<SandboxHandle, ManagerError> {
        match self {
            Self::Docker(b) => b.create(language, provenance, now_ms).await,
            Self::Kubernetes(b) => b.create(language, provenance, now_ms).await,
        }
    }

    async fn destroy(&self, handle: &SandboxHandle) {
        match self {
            Self::Docker(b) => b.destroy(handle).await,
            Self::Kubernetes(b) => b.destroy(handle).await,
        }
    }

    async fn sweep_orphans(&self) -> usize {
        match self {
            Self::Docker(b) => b.sweep_orphans().await,
            Self::Kubernetes(b) => b.sweep_orphans().await,
        }
    }
}
