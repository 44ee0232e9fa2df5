// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transport-shaped records for one execution (spec.md §3
//! "ExecutionRequest / ExecutionResult", §4.1, §6).
//!
//! These are the Orchestrator's Rust-native request/result types. The
//! `cellrun-http` crate owns the JSON shapes the HTTP surface actually
//! speaks and converts to/from these at the edge.

use crate::ids::{FileId, SessionId};
use crate::language::Language;
use std::time::Duration;

/// A reference to a file already stored under some session, supplied as
/// input to an execution (spec.md §4.1 "optional list of input file
/// references").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileRef {
    pub session_id: SessionId,
    pub file_id: FileId,
}

/// Exit status sentinel for a sandbox killed by wall-clock timeout
/// (spec.md §7 "Timeout ... returned as a normal result with a dedicated
/// exit status marker"). Never produced by a user process itself — the
/// agent cannot yield this value any other way.
pub const EXIT_TIMEOUT: i32 = -1;

/// Human-readable marker appended to `stderr` on a timeout, so callers
/// that only look at `stderr` text can still tell timeout apart from an
/// ordinary failing exit code.
pub const TIMEOUT_STDERR_MARKER: &str = "[cellrun] execution exceeded its wall-clock timeout";

/// Input to `Orchestrator::execute` (spec.md §4.1).
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub language: Language,
    pub code: String,
    pub session_id: Option<SessionId>,
    pub input_files: Vec<FileRef>,
    pub timeout: Option<Duration>,
}

impl ExecutionRequest {
    pub fn new(language: Language, code: impl Into<String>) -> Self {
        Self { language, code: code.into(), session_id: None, input_files: Vec::new(), timeout: None }
    }

    crate::setters! {
        set { session_id: Option<SessionId>, input_files: Vec<FileRef>, timeout: Option<Duration> }
    }
}

/// Stateful-language state metadata carried in a response (spec.md §4.1
/// "state metadata (presence flag, compressed size, content hash)").
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateSummary {
    pub has_state: bool,
    pub state_size: Option<u64>,
    pub state_hash: Option<String>,
}

/// Output of `Orchestrator::execute` (spec.md §4.1).
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub session_id: SessionId,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub files: Vec<FileRef>,
    pub state: StateSummary,
}

impl ExecutionResult {
    /// Whether this result represents a wall-clock timeout rather than a
    /// user-process exit (spec.md §7).
    pub fn is_timeout(&self) -> bool {
        self.exit_code == EXIT_TIMEOUT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_builder_sets_fields() {
        let session_id = SessionId::new();
        let req = ExecutionRequest::new(Language::Py, "print(1)")
            .session_id(Some(session_id))
            .timeout(Some(Duration::from_secs(5)));
        assert_eq!(req.session_id, Some(session_id));
        assert_eq!(req.timeout, Some(Duration::from_secs(5)));
        assert!(req.input_files.is_empty());
    }

    #[test]
    fn timeout_exit_code_is_recognized() {
        let result = ExecutionResult {
            session_id: SessionId::new(),
            stdout: String::new(),
            stderr: TIMEOUT_STDERR_MARKER.to_string(),
            exit_code: EXIT_TIMEOUT,
            files: Vec::new(),
            state: StateSummary::default(),
        };
        assert!(result.is_timeout());
    }

    #[test]
    fn zero_exit_is_not_a_timeout() {
        let result = ExecutionResult {
            session_id: SessionId::new(),
            stdout: "5\n".to_string(),
            stderr: String::new(),
            exit_code: 0,
            files: Vec::new(),
            state: StateSummary::default(),
        };
        assert!(!result.is_timeout());
    }
}
