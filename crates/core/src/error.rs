// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy (spec.md §7). One `thiserror` enum per layer, composed
//! into [`ExecError`] at the Orchestrator boundary.

use thiserror::Error;

/// Pool acquisition failures (spec.md §4.2).
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("no sandbox became ready before the acquisition deadline")]
    Timeout,
    #[error("pool is disabled for this language")]
    Disabled,
    #[error("pool is shutting down")]
    ShuttingDown,
}

/// Platform-level sandbox lifecycle failures (spec.md §4.3).
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("sandbox creation failed: {0}")]
    CreateFailed(String),
    #[error("sandbox did not become ready within the startup deadline")]
    ReadinessTimeout,
    #[error("cold execution failed: {0}")]
    ColdExecFailed(String),
}

/// Agent wire-protocol failures (spec.md §4.4).
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("agent rejected the request: {0}")]
    InvalidRequest(String),
    #[error("agent unreachable or returned a server error: {0}")]
    AgentUnavailable(String),
    #[error("call to agent timed out")]
    Timeout,
}

/// Tiered state-store failures (spec.md §4.5).
#[derive(Debug, Error)]
pub enum StateError {
    #[error("state blob of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: u64, limit: u64 },
    #[error("stored hash does not match blob content")]
    HashMismatch,
    #[error("hot store I/O error: {0}")]
    Hot(String),
    #[error("cold store I/O error: {0}")]
    Cold(String),
}

/// Session registry failures (spec.md §4.6).
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("session not found")]
    NotFound,
    #[error("registry store error: {0}")]
    Store(String),
}

/// File storage failures.
#[derive(Debug, Error)]
pub enum FileStoreError {
    #[error("file not found")]
    NotFound,
    #[error("file of {size} bytes exceeds the per-file limit of {limit} bytes")]
    TooLarge { size: u64, limit: u64 },
    #[error("session aggregate size of {size} bytes exceeds the total limit of {limit} bytes")]
    SessionQuotaExceeded { size: u64, limit: u64 },
    #[error("session already holds the maximum of {0} files")]
    TooManyFiles(usize),
    #[error("invalid filename: {0}")]
    InvalidFilename(#[from] crate::file::InvalidFilename),
    #[error("object store I/O error: {0}")]
    Store(String),
}

/// Top-level error returned by `Orchestrator::execute` (spec.md §4.1, §7).
///
/// Every variant guarantees sandbox destruction — enforced by the
/// `SandboxLease` scope guard at the call site, not by this type.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("session not found")]
    SessionNotFound,
    #[error("file not found")]
    FileNotFound,
    #[error("no sandbox acquirable within the pool deadline")]
    PoolTimeout,
    #[error("the in-sandbox agent misbehaved or was unreachable: {0}")]
    RemoteAgentError(String),
    #[error("execution exceeded its wall-clock timeout")]
    ExecutionTimeout,
    #[error("state blob of {size} bytes exceeds the {limit} byte limit")]
    StateTooLarge { size: u64, limit: u64 },
    #[error("internal error: {0}")]
    Internal(String),
}

impl ExecError {
    /// Stable string discriminant carried on `ExecutionCompleted` events for
    /// downstream observers (spec.md §7 propagation policy).
    pub fn kind(&self) -> &'static str {
        match self {
            ExecError::InvalidRequest(_) => "invalid_request",
            ExecError::SessionNotFound => "session_not_found",
            ExecError::FileNotFound => "file_not_found",
            ExecError::PoolTimeout => "pool_timeout",
            ExecError::RemoteAgentError(_) => "remote_agent_error",
            ExecError::ExecutionTimeout => "execution_timeout",
            ExecError::StateTooLarge { .. } => "state_too_large",
            ExecError::Internal(_) => "internal",
        }
    }
}

impl From<PoolError> for ExecError {
    fn from(e: PoolError) -> Self {
        match e {
            PoolError::Timeout => ExecError::PoolTimeout,
            PoolError::Disabled => ExecError::PoolTimeout,
            PoolError::ShuttingDown => ExecError::Internal("pool is shutting down".into()),
        }
    }
}

impl From<ManagerError> for ExecError {
    fn from(e: ManagerError) -> Self {
        match e {
            ManagerError::CreateFailed(msg) => ExecError::RemoteAgentError(msg),
            ManagerError::ReadinessTimeout => {
                ExecError::RemoteAgentError("sandbox never became ready".into())
            }
            ManagerError::ColdExecFailed(msg) => ExecError::RemoteAgentError(msg),
        }
    }
}

impl From<RemoteError> for ExecError {
    fn from(e: RemoteError) -> Self {
        match e {
            RemoteError::InvalidRequest(msg) => ExecError::InvalidRequest(msg),
            RemoteError::AgentUnavailable(msg) => ExecError::RemoteAgentError(msg),
            RemoteError::Timeout => ExecError::ExecutionTimeout,
        }
    }
}

impl From<StateError> for ExecError {
    fn from(e: StateError) -> Self {
        match e {
            StateError::TooLarge { size, limit } => ExecError::StateTooLarge { size, limit },
            other => ExecError::Internal(other.to_string()),
        }
    }
}

impl From<RegistryError> for ExecError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotFound => ExecError::SessionNotFound,
            RegistryError::Store(msg) => ExecError::Internal(msg),
        }
    }
}

impl From<FileStoreError> for ExecError {
    fn from(e: FileStoreError) -> Self {
        match e {
            FileStoreError::NotFound => ExecError::FileNotFound,
            other => ExecError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_timeout_maps_to_exec_pool_timeout() {
        assert!(matches!(ExecError::from(PoolError::Timeout), ExecError::PoolTimeout));
    }

    #[test]
    fn state_too_large_carries_size_and_limit_through() {
        let e = ExecError::from(StateError::TooLarge { size: 100, limit: 50 });
        match e {
            ExecError::StateTooLarge { size, limit } => {
                assert_eq!(size, 100);
                assert_eq!(limit, 50);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn registry_not_found_maps_to_session_not_found() {
        assert!(matches!(ExecError::from(RegistryError::NotFound), ExecError::SessionNotFound));
    }

    #[test]
    fn kind_discriminants_are_stable_strings() {
        assert_eq!(ExecError::PoolTimeout.kind(), "pool_timeout");
        assert_eq!(ExecError::SessionNotFound.kind(), "session_not_found");
        assert_eq!(
            ExecError::StateTooLarge { size: 1, limit: 1 }.kind(),
            "state_too_large"
        );
    }
}
