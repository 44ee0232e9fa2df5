// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Kubernetes `SandboxBackend` — runs each sandbox as a pod, reached over
//! the pod's cluster IP.
//!
//! `create` returns once the pod has an IP assigned, which is the closest
//! analogue to "scheduled" that the Kubernetes API offers cheaply — it does
//! not wait for the container to report Ready; that's the caller's job via
//! the agent's `/ready` probe.

use crate::backend::{SandboxBackend, MANAGED_LABEL, MANAGED_LABEL_VALUE};
use async_trait::async_trait;
use cellrun_core::{Language, ManagerError, Provenance, SandboxHandle};
use k8s_openapi::api::core::v1::{Container, ContainerPort, Pod, PodSpec};
use kube::api::{Api, DeleteParams, ListParams, ObjectMeta, PostParams};
use kube::Client;
use std::collections::BTreeMap;
use std::time::Duration;

fn image_for(image: &str, language: Language) -> String {
    format!("{image}:{}", language.code())
}

fn pod_name(id: &cellrun_core::SandboxId) -> String {
    format!("cellrun-{id}")
}

fn build_pod(name: &str, image: &str) -> Pod {
    let mut labels = BTreeMap::new();
    labels.insert(MANAGED_LABEL.to_string(), MANAGED_LABEL_VALUE.to_string());
    labels.insert("app".to_string(), "cellrun-sandbox".to_string());

    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![Container {
                name: "agent".to_string(),
                image: Some(image.to_string()),
                ports: Some(vec![ContainerPort { container_port: 8080, ..Default::default() }]),
                ..Default::default()
            }],
            restart_policy: Some("Never".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub struct KubernetesBackend {
    client: Client,
    namespace: String,
    image: String,
    ready_poll: Duration,
    ready_attempts: usize,
}

impl KubernetesBackend {
    pub async fn new(namespace: impl Into<String>, image: impl Into<String>) -> Result<Self, ManagerError> {
        let client = Client::try_default()
            .await
            .map_err(|e| ManagerError::CreateFailed(format!("kube client init failed: {e}")))?;
        Ok(Self {
            client,
            namespace: namespace.into(),
            image: image.into(),
            ready_poll: Duration::from_millis(500),
            ready_attempts: 120,
        })
    }

    fn pods(&self) -> Api<Pod> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    async fn wait_for_ip(&self, name: &str) -> Result<String, ManagerError> {
        let pods = self.pods();
        for attempt in 0..self.ready_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.ready_poll).await;
            }
            if let Ok(pod) = pods.get(name).await {
                if let Some(ip) = pod.status.as_ref().and_then(|s| s.pod_ip.as_ref()) {
                    if !ip.is_empty() {
                        return Ok(ip.clone());
                    }
                }
            }
        }
        Err(ManagerError::ReadinessTimeout)
    }
}

#[async_trait]
impl SandboxBackend for KubernetesBackend {
    async fn create(
        &self,
        language: Language,
        provenance: Provenance,
        now_ms: u64,
    ) -> Result<SandboxHandle, ManagerError> {
        let image = image_for(&self.image, language);
        let handle_id = cellrun_core::SandboxId::new();
        let name = pod_name(&handle_id);
        let pod_spec = build_pod(&name, &image);

        let pods = self.pods();
        pods.create(&PostParams::default(), &pod_spec)
            .await
            .map_err(|e| ManagerError::CreateFailed(format!("pod creation failed: {e}")))?;

        let ip = match self.wait_for_ip(&name).await {
            Ok(ip) => ip,
            Err(e) => {
                let _ = pods.delete(&name, &DeleteParams::default()).await;
                return Err(e);
            }
        };

        tracing::info!(sandbox_id = %handle_id, pod = %name, %ip, %language, "k8s sandbox created");
        Ok(SandboxHandle {
            id: handle_id,
            language,
            agent_endpoint: format!("http://{ip}:8080"),
            provenance,
            created_at_ms: now_ms,
        })
    }

    async fn destroy(&self, handle: &SandboxHandle) {
        let name = pod_name(&handle.id);
        if let Err(e) = self.pods().delete(&name, &DeleteParams::default()).await {
            tracing::warn!(sandbox_id = %handle.id, pod = %name, error = %e, "failed to delete k8s sandbox");
        }
    }

    async fn sweep_orphans(&self) -> usize {
        let lp = ListParams::default().labels(&format!("{MANAGED_LABEL}={MANAGED_LABEL_VALUE}"));
        let pods = self.pods();
        let list = match pods.list(&lp).await {
            Ok(list) => list,
            Err(e) => {
                tracing::warn!(error = %e, "failed to list k8s sandboxes for orphan sweep");
                return 0;
            }
        };
        let mut removed = 0;
        for pod in list {
            if let Some(name) = pod.metadata.name {
                if pods.delete(&name, &DeleteParams::default()).await.is_ok() {
                    removed += 1;
                }
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_is_namespaced_by_language_code() {
        assert_eq!(image_for("cellrun-agent", Language::Rs), "cellrun-agent:rs");
    }

    #[test]
    fn pod_spec_carries_the_managed_label() {
        let pod = build_pod("cellrun-sbx-test", "cellrun-agent:py");
        let labels = pod.metadata.labels.unwrap();
        assert_eq!(labels.get(MANAGED_LABEL).map(String::as_str), Some(MANAGED_LABEL_VALUE));
    }

    #[test]
    fn pod_spec_exposes_container_port_8080() {
        let pod = build_pod("cellrun-sbx-test", "cellrun-agent:py");
        let spec = pod.spec.unwrap();
        let ports = spec.containers[0].ports.as_ref().unwrap();
        assert_eq!(ports[0].container_port, 8080);
    }
}
