// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `cell exec` — submit one request to `POST /exec` (spec.md §6) and print
//! the captured result. A debug/admin convenience, not a production client:
//! real callers integrate against the HTTP surface directly.

use std::str::FromStr;

use cellrun_core::Language;
use clap::Args;

use crate::client::{Client, ExecRequest, FileRef};
use crate::color;
use crate::output::{format_or_json, OutputFormat};

#[derive(Debug, Args)]
pub struct ExecArgs {
    /// Language code (spec.md §6 closed set: py, js, ts, go, java, c, cpp, rs, php, r, f90, d).
    #[arg(long)]
    lang: String,

    /// Source code to run. Mutually exclusive with `--file-path`.
    #[arg(long, conflicts_with = "code_path")]
    code: Option<String>,

    /// Read source code from a local file instead of `--code`.
    #[arg(long = "file-path", value_name = "PATH")]
    code_path: Option<std::path::PathBuf>,

    /// Existing session to run in; omit to start a fresh one.
    #[arg(long)]
    session: Option<String>,

    /// Input file reference as `session_id:file_id`; repeatable.
    #[arg(long = "input", value_name = "SESSION:FILE")]
    inputs: Vec<String>,

    /// Wall-clock timeout in seconds (clamped server-side to [1, max]).
    #[arg(long)]
    timeout: Option<u64>,
}

pub async fn run(client: &Client, args: ExecArgs, format: OutputFormat) -> anyhow::Result<()> {
    Language::from_str(&args.lang).map_err(|e| anyhow::anyhow!("{e}"))?;

    let code = match (args.code, args.code_path) {
        (Some(c), None) => c,
        (None, Some(path)) => tokio::fs::read_to_string(&path).await?,
        (Some(_), Some(_)) => anyhow::bail!("pass either --code or --file-path, not both"),
        (None, None) => anyhow::bail!("one of --code or --file-path is required"),
    };

    let files = args
        .inputs
        .iter()
        .map(|spec| {
            let (session_id, file_id) = spec
                .split_once(':')
                .ok_or_else(|| anyhow::anyhow!("--input must be SESSION:FILE, got `{spec}`"))?;
            Ok(FileRef { session_id: session_id.to_string(), file_id: file_id.to_string() })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let req = ExecRequest { lang: args.lang, code, session_id: args.session, files, timeout: args.timeout };
    let result = client.exec(req).await?;

    format_or_json(format, &result, || {
        println!("{} {}", color::header("session:"), result.session_id);
        if !result.stdout.is_empty() {
            print!("{}", result.stdout);
            if !result.stdout.ends_with('\n') {
                println!();
            }
        }
        if !result.stderr.is_empty() {
            eprint!("{}", result.stderr);
            if !result.stderr.ends_with('\n') {
                eprintln!();
            }
        }
        println!("{} {}", color::header("exit code:"), result.exit_code);
        for f in &result.files {
            println!("{} {} ({})", color::header("produced:"), f.name, color::muted(&f.file_id));
        }
        if result.has_state.unwrap_or(false) {
            println!(
                "{} {} bytes, sha256={}",
                color::header("state saved:"),
                result.state_size.unwrap_or_default(),
                result.state_hash.as_deref().unwrap_or("?"),
            );
        }
    })?;

    if result.exit_code != 0 {
        std::process::exit(1);
    }
    Ok(())
}
