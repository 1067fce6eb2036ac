// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The `moth` binary (spec §6.1): load a snapshot, boot the initial
//! isolate, run it to completion, install `SIGINT` → interrupt-all.
//!
//! Grounded on `original_source/src/vm/main.cc`: map the snapshot, install
//! the `SIGINT` handler, run the isolate, report its exit code. CLI
//! parsing itself is modeled after the retrieval pack's `nvm` crate, since
//! the teacher ships no binary crate of its own (`lona-lsp` is its only
//! executable, an LSP server rather than a general CLI).

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use moth_heap::HeapConfig;
use moth_interp::NullInterpreter;
use moth_isolate::Isolate;
use moth_pool::{PoolConfig, ThreadPool};
use moth_reactor::default_backend;
use tracing_subscriber::EnvFilter;

/// `moth <snapshot-path> [isolate args...]`.
#[derive(Parser, Debug)]
#[command(name = "moth", about = "Moth VM: a minimal isolate runtime")]
struct Cli {
    /// Path to the boot snapshot.
    snapshot_path: PathBuf,

    /// Arguments forwarded to the initial isolate.
    isolate_args: Vec<String>,

    /// Tracing filter, e.g. "info" or "moth_heap=debug".
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Override the heap's initial semispace size, in MiB.
    #[arg(long)]
    heap_initial_mib: Option<u64>,

    /// Override the heap's maximum semispace size, in MiB.
    #[arg(long)]
    heap_max_mib: Option<u64>,
}

const WORD_BYTES: u64 = 8;
const BYTES_PER_MIB: u64 = 1024 * 1024;

fn heap_config(cli: &Cli) -> HeapConfig {
    let mut config = HeapConfig::default();
    if let Some(mib) = cli.heap_initial_mib {
        config.initial_semispace_words = mib.saturating_mul(BYTES_PER_MIB) / WORD_BYTES;
    }
    if let Some(mib) = cli.heap_max_mib {
        config.max_semispace_words = mib.saturating_mul(BYTES_PER_MIB) / WORD_BYTES;
    }
    config
}

/// Usage error, matching spec §6.1's "-1 on usage error" (`original_source`'s
/// `main.cc` returns -1 the same way when `argc < 2`).
const USAGE_ERROR_EXIT_CODE: i32 = -1;

/// `main` returns [`ExitCode`] rather than calling `std::process::exit`
/// mid-function, so every path runs destructors (the pool's shutdown join,
/// in particular) on the way out.
fn to_exit_code(code: i32) -> ExitCode {
    #[expect(
        clippy::cast_sign_loss,
        clippy::cast_possible_truncation,
        reason = "replicates a C process's exit(-1) => 255 wraparound (spec §6.1)"
    )]
    let byte = code as u8;
    ExitCode::from(byte)
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            eprint!("{err}");
            return to_exit_code(USAGE_ERROR_EXIT_CODE);
        }
    };

    tracing_subscriber::fmt().with_env_filter(EnvFilter::new(cli.log_level.clone())).init();

    let snapshot = match std::fs::read(&cli.snapshot_path) {
        Ok(bytes) => bytes,
        Err(err) => {
            eprintln!("{}: {err}", cli.snapshot_path.display());
            return to_exit_code(USAGE_ERROR_EXIT_CODE);
        }
    };
    tracing::info!(
        path = %cli.snapshot_path.display(),
        bytes = snapshot.len(),
        args = ?cli.isolate_args,
        "snapshot loaded"
    );

    ctrlc::set_handler(moth_isolate::interrupt_all)
        .unwrap_or_else(|err| moth_platform::fatal!("failed to install SIGINT handler: {err}"));

    // A full class/bytecode schema is out of scope (spec §6.2: "the core
    // does not implement a full deserializer"). The initial isolate runs
    // with `NullInterpreter`, which drives every end-to-end scenario in
    // spec §8 that doesn't require real bytecode dispatch.
    let backend =
        default_backend().unwrap_or_else(|err| moth_platform::fatal!("failed to initialize reactor backend: {err}"));
    let isolate = Isolate::new(backend, heap_config(&cli), Box::new(NullInterpreter::new()))
        .unwrap_or_else(|err| moth_platform::fatal!("failed to create initial isolate: {err}"));

    let pool = ThreadPool::new(PoolConfig::default());
    let (exit_tx, exit_rx) = std::sync::mpsc::channel();
    pool.submit(move || {
        let code = isolate.run();
        let _ = exit_tx.send(code);
    })
    .unwrap_or_else(|err| moth_platform::fatal!("failed to schedule initial isolate: {err}"));

    let code = exit_rx
        .recv()
        .unwrap_or_else(|_| moth_platform::fatal!("initial isolate worker vanished without exiting"));
    pool.shutdown();
    to_exit_code(code)
}
