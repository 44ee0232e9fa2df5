// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Immutable configuration record threaded explicitly into the
//! constructors of C1-C6 at startup (spec.md §9 "Global configuration
//! singleton" — replaced here with no ambient state).
//!
//! Precedence: built-in defaults < optional TOML file < environment
//! variables. Loading happens once at process start in the daemon
//! binary; everything downstream receives an already-built, immutable
//! `Config`.

use crate::language::Language;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub enabled: bool,
    pub warmup_on_startup: bool,
    /// Per-language target size. 0 (or absent) disables the pool for that
    /// language, routing it to cold-spawn.
    pub target: HashMap<String, usize>,
    pub parallel_batch: usize,
    pub replenish_interval_s: u64,
    pub exhaustion_trigger: bool,
    pub startup_deadline_s: u64,
    pub health_interval_s: u64,
    /// Consecutive `PoolTimeout`s for a language before the Orchestrator
    /// falls back to cold-spawn even though the pool is nominally enabled
    /// (spec.md §9 Open Questions: left as deployment policy).
    pub fallback_after_timeouts: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            warmup_on_startup: true,
            target: HashMap::new(),
            parallel_batch: 5,
            replenish_interval_s: 2,
            exhaustion_trigger: true,
            startup_deadline_s: 10,
            health_interval_s: 15,
            fallback_after_timeouts: 3,
        }
    }
}

impl PoolConfig {
    pub fn target_for(&self, lang: Language) -> usize {
        self.target.get(lang.code()).copied().unwrap_or(0)
    }

    pub fn is_pool_disabled(&self, lang: Language) -> bool {
        !self.enabled || self.target_for(lang) == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub max_execution_time_s: u64,
    pub max_memory_mib: u64,
    pub max_pids: u32,
    pub max_open_files: u32,
    pub max_concurrent_executions: usize,
    pub max_code_bytes: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_execution_time_s: 30,
            max_memory_mib: 512,
            max_pids: 64,
            max_open_files: 256,
            max_concurrent_executions: 256,
            max_code_bytes: 1_000_000,
        }
    }
}

impl ExecutionConfig {
    /// Clamp a per-request timeout override to `[1s, max_execution_time_s]`
    /// (spec.md §4.1).
    pub fn clamp_timeout(&self, requested: Option<Duration>) -> Duration {
        let default = Duration::from_secs(self.max_execution_time_s.min(30).max(1));
        let requested = requested.unwrap_or(default);
        let min = Duration::from_secs(1);
        let max = Duration::from_secs(self.max_execution_time_s);
        requested.clamp(min, max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    pub max_file_size_mib: u64,
    pub max_total_file_size_mib: u64,
    pub max_files_per_session: usize,
    pub max_output_files: usize,
    pub max_filename_length: usize,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            max_file_size_mib: 100,
            max_total_file_size_mib: 1024,
            max_files_per_session: 200,
            max_output_files: 50,
            max_filename_length: 255,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub ttl_hours: u64,
    pub cleanup_interval_minutes: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { ttl_hours: 24, cleanup_interval_minutes: 10 }
    }
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_hours * 3600)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    pub enabled: bool,
    pub ttl_s: u64,
    pub max_size_mib: u64,
    pub archive_enabled: bool,
    pub archive_after_s: u64,
    pub archive_ttl_days: u64,
    pub archive_check_interval_s: u64,
    pub restore_grace_s: u64,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_s: 2 * 3600,
            max_size_mib: 50,
            archive_enabled: true,
            archive_after_s: 3600,
            archive_ttl_days: 7,
            archive_check_interval_s: 5 * 60,
            restore_grace_s: 30,
        }
    }
}

impl StateConfig {
    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_mib * 1024 * 1024
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxBackendKind {
    Docker,
    Kubernetes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmbientConfig {
    pub bind_addr: String,
    pub log_format: LogFormat,
    pub sandbox_backend: SandboxBackendKind,
    pub s3_bucket: String,
    pub s3_endpoint: Option<String>,
    pub docker_image_prefix: String,
    pub k8s_namespace: String,
    pub k8s_image: String,
}

impl Default for AmbientConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8088".to_string(),
            log_format: LogFormat::Pretty,
            sandbox_backend: SandboxBackendKind::Docker,
            s3_bucket: "cellrun-artifacts".to_string(),
            s3_endpoint: None,
            docker_image_prefix: "cellrun/sandbox".to_string(),
            k8s_namespace: "cellrun".to_string(),
            k8s_image: "cellrun/sandbox:latest".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// The full configuration surface (spec.md §6), threaded explicitly into
/// every component's constructor. No global singleton.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pool: PoolConfig,
    pub execution: ExecutionConfig,
    pub files: FilesConfig,
    pub session: SessionConfig,
    pub state: StateConfig,
    pub ambient: AmbientConfig,
}

impl Config {
    /// Parse a TOML document into a `Config`, falling back to defaults for
    /// any field/table the document omits.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Overlay environment variables onto an already-parsed config,
    /// precedence order: defaults < file < env. Recognized variables are
    /// prefixed `CELL_` and named after the dotted config path, e.g.
    /// `CELL_POOL_PARALLEL_BATCH`, `CELL_STATE_TTL_S`,
    /// `CELL_POOL_TARGET_PY`.
    pub fn apply_env_overlay(mut self) -> Self {
        macro_rules! env_u64 {
            ($var:expr, $field:expr) => {
                if let Some(v) = parse_env::<u64>($var) {
                    $field = v;
                }
            };
        }
        macro_rules! env_bool {
            ($var:expr, $field:expr) => {
                if let Some(v) = parse_env::<bool>($var) {
                    $field = v;
                }
            };
        }
        macro_rules! env_usize {
            ($var:expr, $field:expr) => {
                if let Some(v) = parse_env::<usize>($var) {
                    $field = v;
                }
            };
        }

        env_bool!("CELL_POOL_ENABLED", self.pool.enabled);
        env_bool!("CELL_POOL_WARMUP_ON_STARTUP", self.pool.warmup_on_startup);
        env_usize!("CELL_POOL_PARALLEL_BATCH", self.pool.parallel_batch);
        env_u64!("CELL_POOL_REPLENISH_INTERVAL_S", self.pool.replenish_interval_s);
        env_bool!("CELL_POOL_EXHAUSTION_TRIGGER", self.pool.exhaustion_trigger);
        env_u64!("CELL_POOL_STARTUP_DEADLINE_S", self.pool.startup_deadline_s);
        env_u64!("CELL_POOL_HEALTH_INTERVAL_S", self.pool.health_interval_s);

        for lang in Language::ALL {
            let var = format!("CELL_POOL_TARGET_{}", lang.code().to_uppercase());
            if let Some(v) = parse_env::<usize>(&var) {
                self.pool.target.insert(lang.code().to_string(), v);
            }
        }

        env_u64!("CELL_MAX_EXECUTION_TIME_S", self.execution.max_execution_time_s);
        env_u64!("CELL_MAX_MEMORY_MIB", self.execution.max_memory_mib);
        env_usize!("CELL_MAX_CONCURRENT_EXECUTIONS", self.execution.max_concurrent_executions);

        env_u64!("CELL_MAX_FILE_SIZE_MIB", self.files.max_file_size_mib);
        env_u64!("CELL_MAX_TOTAL_FILE_SIZE_MIB", self.files.max_total_file_size_mib);
        env_usize!("CELL_MAX_FILES_PER_SESSION", self.files.max_files_per_session);

        env_u64!("CELL_SESSION_TTL_HOURS", self.session.ttl_hours);
        env_u64!(
            "CELL_SESSION_CLEANUP_INTERVAL_MINUTES",
            self.session.cleanup_interval_minutes
        );

        env_bool!("CELL_STATE_ENABLED", self.state.enabled);
        env_u64!("CELL_STATE_TTL_S", self.state.ttl_s);
        env_u64!("CELL_STATE_MAX_SIZE_MIB", self.state.max_size_mib);
        env_bool!("CELL_STATE_ARCHIVE_ENABLED", self.state.archive_enabled);
        env_u64!("CELL_STATE_ARCHIVE_AFTER_S", self.state.archive_after_s);
        env_u64!("CELL_STATE_RESTORE_GRACE_S", self.state.restore_grace_s);

        if let Ok(v) = std::env::var("CELL_BIND_ADDR") {
            self.ambient.bind_addr = v;
        }
        if let Ok(v) = std::env::var("CELL_S3_BUCKET") {
            self.ambient.s3_bucket = v;
        }
        if let Ok(v) = std::env::var("CELL_S3_ENDPOINT") {
            self.ambient.s3_endpoint = Some(v);
        }

        self
    }

    /// Load config with the full defaults < file < env precedence.
    pub fn load(toml_path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let base = match toml_path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .map_err(|e| ConfigError::Io(e.to_string()))?;
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };
        Ok(base.apply_env_overlay())
    }
}

fn parse_env<T: std::str::FromStr>(var: &str) -> Option<T> {
    std::env::var(var).ok().and_then(|s| s.parse().ok())
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(String),
    #[error("failed to parse config TOML: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Serializes env-mutating tests: std::env::set_var is process-global.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn defaults_disable_no_language_pools_by_default() {
        let cfg = Config::default();
        assert!(cfg.pool.is_pool_disabled(Language::Py));
        assert_eq!(cfg.pool.target_for(Language::Py), 0);
    }

    #[test]
    fn toml_overlay_sets_pool_targets() {
        let toml = r#"
            [pool.target]
            py = 10
            js = 5
        "#;
        let cfg = Config::from_toml_str(toml).expect("parses");
        assert_eq!(cfg.pool.target_for(Language::Py), 10);
        assert!(!cfg.pool.is_pool_disabled(Language::Py));
    }

    #[test]
    fn env_overlay_wins_over_file_value() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("CELL_POOL_TARGET_PY", "7");
        let cfg = Config::from_toml_str("[pool.target]\npy = 1\n")
            .expect("parses")
            .apply_env_overlay();
        assert_eq!(cfg.pool.target_for(Language::Py), 7);
        std::env::remove_var("CELL_POOL_TARGET_PY");
    }

    #[test]
    fn clamp_timeout_respects_bounds() {
        let cfg = ExecutionConfig { max_execution_time_s: 30, ..Default::default() };
        assert_eq!(cfg.clamp_timeout(Some(Duration::from_secs(0))), Duration::from_secs(1));
        assert_eq!(cfg.clamp_timeout(Some(Duration::from_secs(60))), Duration::from_secs(30));
        assert_eq!(cfg.clamp_timeout(Some(Duration::from_secs(5))), Duration::from_secs(5));
    }

    #[test]
    fn clamp_timeout_defaults_to_thirty_seconds() {
        let cfg = ExecutionConfig::default();
        assert_eq!(cfg.clamp_timeout(None), Duration::from_secs(30));
    }
}
