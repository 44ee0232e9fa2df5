// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon binary.

use std::path::PathBuf;

use crate::lifecycle::LifecycleError;

/// Resolve the state directory: `CELL_STATE_DIR` > `XDG_STATE_HOME/cellrun`
/// > `~/.local/state/cellrun`.
pub fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Ok(dir) = std::env::var("CELL_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Some(xdg_state) = dirs::state_dir() {
        return Ok(xdg_state.join("cellrun"));
    }
    let home = dirs::home_dir().ok_or(LifecycleError::NoStateDir)?;
    Ok(home.join(".local/state/cellrun"))
}

/// Optional path to a TOML config file, checked before falling back to
/// built-in defaults (spec.md §6 "defaults < file < env").
pub fn config_path() -> Option<PathBuf> {
    std::env::var("CELL_CONFIG_PATH").ok().map(PathBuf::from)
}
