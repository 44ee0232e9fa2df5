// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup/shutdown discipline: exclusive lock file, PID file,
//! directory layout under the resolved state directory (spec.md §9,
//! using a lock-then-PID-then-bind ordering, without WAL/snapshot
//! machinery — see SPEC_FULL.md REDESIGN FLAGS).

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use fs2::FileExt;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("could not determine state directory")]
    NoStateDir,
    #[error("failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolved on-disk layout for one daemon instance.
#[derive(Debug, Clone)]
pub struct Paths {
    pub state_dir: PathBuf,
    pub lock_path: PathBuf,
    pub log_path: PathBuf,
}

impl Paths {
    pub fn resolve(state_dir: PathBuf) -> Self {
        Self {
            lock_path: state_dir.join("celld.pid"),
            log_path: state_dir.join("celld.log"),
            state_dir,
        }
    }
}

/// Holds the exclusive lock file open for the process lifetime; releasing
/// it (via `Drop`) is how a crashed daemon's lock is recognized as stale by
/// the OS on the next start attempt.
pub struct LockGuard {
    file: File,
    lock_path: PathBuf,
}

/// Acquire the daemon's exclusive lock and record this process's PID in it.
/// Ordering matters: create the directory, open without truncating,
/// lock, THEN truncate and write the PID — so a failed lock
/// attempt never destroys the running daemon's PID record.
pub fn acquire_lock(paths: &Paths) -> Result<LockGuard, LifecycleError> {
    std::fs::create_dir_all(&paths.state_dir)?;

    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&paths.lock_path)?;
    lock_file.try_lock_exclusive().map_err(LifecycleError::LockFailed)?;

    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;

    Ok(LockGuard { file: lock_file, lock_path: paths.lock_path.clone() })
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
        let _ = std::fs::remove_file(&self.lock_path);
        info!(lock_path = %self.lock_path.display(), "released daemon lock");
    }
}
