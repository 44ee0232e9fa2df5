// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `cell files` — upload/list/download/delete against the session file
//! storage surface (spec.md §6 `/upload`, `/files/...`, `/download/...`).

use std::path::PathBuf;

use clap::Subcommand;

use crate::client::Client;
use crate::color;
use crate::output::{handle_list, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum FilesCommand {
    /// Upload a local file into a session.
    Upload {
        session_id: String,
        path: PathBuf,
    },
    /// List files stored under a session.
    List {
        session_id: String,
    },
    /// Download a file to a local path (defaults to its stored name).
    Download {
        session_id: String,
        file_id: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Delete a file from a session.
    Rm {
        session_id: String,
        file_id: String,
    },
}

pub async fn run(client: &Client, cmd: FilesCommand, format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        FilesCommand::Upload { session_id, path } => {
            let stored = client.upload(&session_id, &path).await?;
            println!("{} {} ({} bytes)", color::header("uploaded:"), stored.name, stored.size);
        }
        FilesCommand::List { session_id } => {
            let files = client.list_files(&session_id).await?;
            handle_list(format, &files, "no files in this session", |files| {
                for f in files {
                    println!(
                        "{:<24} {:>10}  {}",
                        f.name,
                        f.size,
                        color::muted(f.content_type.as_deref().unwrap_or("-"))
                    );
                }
            })?;
        }
        FilesCommand::Download { session_id, file_id, output } => {
            let bytes = client.download_file(&session_id, &file_id).await?;
            let dest = output.unwrap_or_else(|| PathBuf::from(&file_id));
            tokio::fs::write(&dest, &bytes).await?;
            println!("{} {} ({} bytes)", color::header("saved:"), dest.display(), bytes.len());
        }
        FilesCommand::Rm { session_id, file_id } => {
            client.delete_file(&session_id, &file_id).await?;
            println!("{} {}", color::header("deleted:"), file_id);
        }
    }
    Ok(())
}
