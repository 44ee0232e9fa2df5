// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `cell state` — inspect and clear persisted interpreter state
//! (spec.md §6 `/state/{session_id}` family, §4.5).

use std::path::PathBuf;

use clap::Subcommand;

use crate::client::Client;
use crate::color;
use crate::output::{format_or_json, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum StateCommand {
    /// Show state metadata for a session (existence, size, hash, tier).
    Info { session_id: String },
    /// Download the raw compressed state blob.
    Get {
        session_id: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Delete state for a session (idempotent).
    Rm { session_id: String },
}

pub async fn run(client: &Client, cmd: StateCommand, format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        StateCommand::Info { session_id } => {
            let info = client.state_info(&session_id).await?;
            format_or_json(format, &info, || {
                if !info.exists {
                    println!("no state stored for {session_id}");
                    return;
                }
                println!("{} {}", color::header("tier:"), info.tier);
                println!("{} {} bytes", color::header("size:"), info.size);
                println!("{} {}", color::header("hash:"), info.hash);
            })?;
        }
        StateCommand::Get { session_id, output } => {
            let bytes = client.get_state(&session_id).await?;
            let dest = output.unwrap_or_else(|| PathBuf::from(format!("{session_id}.state")));
            tokio::fs::write(&dest, &bytes).await?;
            println!("{} {} ({} bytes)", color::header("saved:"), dest.display(), bytes.len());
        }
        StateCommand::Rm { session_id } => {
            client.delete_state(&session_id).await?;
            println!("{} {}", color::header("deleted:"), session_id);
        }
    }
    Ok(())
}
