// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `cell` — a thin operator/debug client for `celld`'s HTTP surface
//! (spec.md §6). Not part of the request hot path: it exists for manual
//! exec/file/state inspection against a running daemon over HTTP.

mod client;
mod color;
mod commands;
mod exit_error;
mod output;

use std::time::Duration;

use clap::Parser;

use client::Client;
use commands::{exec, files, state};
use exit_error::ExitError;
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "cell", version, about = "Operator client for celld", styles = color::styles())]
struct Cli {
    /// Base URL of a running `celld` (defaults to CELL_ADDR or http://127.0.0.1:8088).
    #[arg(long, global = true)]
    addr: Option<String>,

    /// Per-request HTTP timeout in seconds.
    #[arg(long, global = true, default_value_t = 60)]
    request_timeout: u64,

    #[arg(long, value_enum, global = true, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Submit code for execution (`POST /exec`).
    Exec(exec::ExecArgs),
    /// Manage session files.
    #[command(subcommand)]
    Files(files::FilesCommand),
    /// Inspect or clear persisted interpreter state.
    #[command(subcommand)]
    State(state::StateCommand),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = dispatch(cli).await {
        if let Some(exit) = e.downcast_ref::<ExitError>() {
            eprintln!("{}", exit.message);
            std::process::exit(exit.code);
        }
        eprintln!("cell: error: {e}");
        std::process::exit(1);
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let addr = cli.addr.or_else(|| std::env::var("CELL_ADDR").ok()).unwrap_or_else(|| "http://127.0.0.1:8088".to_string());
    let client = Client::new(addr, Duration::from_secs(cli.request_timeout))?;

    match cli.command {
        Command::Exec(args) => exec::run(&client, args, cli.output).await,
        Command::Files(cmd) => files::run(&client, cmd, cli.output).await,
        Command::State(cmd) => state::run(&client, cmd, cli.output).await,
    }
}
