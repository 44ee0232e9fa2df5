// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Docker `SandboxBackend` — runs each sandbox as a container, reached over
//! TCP on a mapped host port.
//!
//! One container holds both the language runtime and the agent side-car
//! listening on `8080`; the host port is allocated from an `AtomicU16`
//! counter, one per container.

use crate::backend::{SandboxBackend, MANAGED_LABEL};
use async_trait::async_trait;
use cellrun_core::{Language, ManagerError, Provenance, SandboxHandle};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

/// Docker image tagged per language, e.g. `cellrun-agent:py`.
fn image_for(prefix: &str, language: Language) -> String {
    format!("{prefix}:{}", language.code())
}

#[derive(Clone)]
pub struct DockerBackend {
    image_prefix: String,
    base_port: u16,
    port_counter: Arc<AtomicU16>,
}

impl DockerBackend {
    pub fn new(image_prefix: impl Into<String>, base_port: u16) -> Self {
        Self {
            image_prefix: image_prefix.into(),
            base_port,
            port_counter: Arc::new(AtomicU16::new(base_port)),
        }
    }

    fn next_port(&self) -> u16 {
        self.port_counter.fetch_add(1, Ordering::Relaxed)
    }

    fn container_name(id: &cellrun_core::SandboxId) -> String {
        format!("cellrun-{id}")
    }
}

#[async_trait]
impl SandboxBackend for DockerBackend {
    async fn create(
        &self,
        language: Language,
        provenance: Provenance,
        now_ms: u64,
    ) -> Result<SandboxHandle, ManagerError> {
        let host_port = self.next_port();
        let image = image_for(&self.image_prefix, language);
        let handle = SandboxHandle::new(language, format!("http://127.0.0.1:{host_port}"), provenance, now_ms);
        let container_name = Self::container_name(&handle.id);
        let port_mapping = format!("{host_port}:8080");
        let label = format!("{MANAGED_LABEL}={}", crate::backend::MANAGED_LABEL_VALUE);

        run_docker(&[
            "run",
            "-d",
            "--rm",
            "--name",
            &container_name,
            "-l",
            &label,
            "-p",
            &port_mapping,
            &image,
        ])
        .await
        .map_err(ManagerError::CreateFailed)?;

        tracing::info!(sandbox_id = %handle.id, %container_name, host_port, %language, "docker sandbox created");
        Ok(handle)
    }

    async fn destroy(&self, handle: &SandboxHandle) {
        let container_name = Self::container_name(&handle.id);
        if let Err(e) = run_docker(&["rm", "-f", &container_name]).await {
            tracing::warn!(sandbox_id = %handle.id, %container_name, error = %e, "failed to remove docker sandbox");
        }
    }

    async fn sweep_orphans(&self) -> usize {
        let label_filter = format!("label={MANAGED_LABEL}={}", crate::backend::MANAGED_LABEL_VALUE);
        let output = match run_docker(&["ps", "-q", "--filter", &label_filter]).await {
            Ok(out) => out,
            Err(e) => {
                tracing::warn!(error = %e, "failed to list docker sandboxes for orphan sweep");
                return 0;
            }
        };
        let ids: Vec<&str> = output.lines().filter(|l| !l.is_empty()).collect();
        let mut removed = 0;
        for id in ids {
            if run_docker(&["rm", "-f", id]).await.is_ok() {
                removed += 1;
            }
        }
        removed
    }
}

async fn run_docker(args: &[&str]) -> Result<String, String> {
    let output = tokio::process::Command::new("docker")
        .args(args)
        .output()
        .await
        .map_err(|e| format!("failed to exec docker: {e}"))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(format!("docker {} failed: {}", args.first().unwrap_or(&""), stderr.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_is_namespaced_by_language_code() {
        assert_eq!(image_for("cellrun-agent", Language::Py), "cellrun-agent:py");
    }

    #[test]
    fn port_counter_advances_monotonically() {
        let backend = DockerBackend::new("cellrun-agent", 20000);
        assert_eq!(backend.next_port(), 20000);
        assert_eq!(backend.next_port(), 20001);
    }
}
