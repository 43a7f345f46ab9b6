// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! relais - autonomous workflow runner CLI
//!
//! Exit codes: 0 for normal completion (stop verdicts included), 130 on
//! interrupt, nonzero on internal errors. Verdicts are communicated
//! through REPORT.json, not exit codes.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use relais_adapters::SubprocessInvoker;
use relais_core::{Config, SystemClock};
use relais_engine::{
    report_config_failure, run_loop, CancelToken, GuardrailState, LoopMode, LoopStopReason,
    TickRunner,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

const EXIT_INTERRUPTED: i32 = 130;

#[derive(Parser)]
#[command(
    name = "relais",
    version,
    about = "relais - an autonomous software-development workflow runner"
)]
struct Cli {
    /// Change to <dir> before doing anything
    #[arg(short = 'C', global = true, value_name = "DIR")]
    directory: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run ticks in a loop until a stop condition fires
    Run(RunArgs),
    /// Run exactly one tick
    Tick,
}

#[derive(clap::Args)]
struct RunArgs {
    /// Loop mode
    #[arg(long, value_enum, default_value_t = ModeArg::Task)]
    mode: ModeArg,

    /// Cap on the number of ticks this invocation may execute
    #[arg(long, value_name = "N")]
    max_ticks: Option<u32>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Task,
    Milestone,
    Autonomous,
}

impl From<ModeArg> for LoopMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Task => LoopMode::Task,
            ModeArg::Milestone => LoopMode::Milestone,
            ModeArg::Autonomous => LoopMode::Autonomous,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let repo_root = match &cli.directory {
        Some(dir) => dir
            .canonicalize()
            .with_context(|| format!("cannot resolve directory {}", dir.display()))?,
        None => std::env::current_dir().context("cannot determine current directory")?,
    };

    // Preflight check (1): a missing or unparseable config is a blocked
    // verdict, not an internal error, and still gets its report artifacts.
    let config = match Config::load(&repo_root) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "config unavailable");
            let report = report_config_failure(&repo_root, &SystemClock, &e.to_string());
            info!(
                run_id = %report.run_id,
                code = %report.code,
                "blocked before any work"
            );
            std::process::exit(0);
        }
    };
    let cancel = CancelToken::new();
    install_signal_handlers(cancel.clone())?;

    let runner = TickRunner::new(
        config,
        &repo_root,
        SubprocessInvoker,
        Arc::new(SystemClock),
        cancel,
    );

    let exit_code = match cli.command {
        Commands::Run(args) => {
            let outcome = run_loop(&runner, args.mode.into(), args.max_ticks).await;
            info!(
                ticks = outcome.ticks_executed,
                reason = %outcome.stop_reason,
                verdict = ?outcome.final_verdict,
                "run finished"
            );
            if outcome.stop_reason == LoopStopReason::Sigint {
                EXIT_INTERRUPTED
            } else {
                0
            }
        }
        Commands::Tick => {
            let outcome = runner.run_tick(GuardrailState::default()).await;
            info!(
                run_id = %outcome.report.run_id,
                verdict = %outcome.report.verdict,
                code = %outcome.report.code,
                "tick finished"
            );
            if relais_core::is_stop_requested() {
                EXIT_INTERRUPTED
            } else {
                0
            }
        }
    };

    std::process::exit(exit_code);
}

/// First SIGINT/SIGTERM requests a cooperative stop; the second one
/// force-exits with the interrupt code.
fn install_signal_handlers(cancel: CancelToken) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt()).context("cannot install SIGINT handler")?;
    let mut sigterm =
        signal(SignalKind::terminate()).context("cannot install SIGTERM handler")?;

    tokio::spawn(async move {
        let mut seen = 0u32;
        loop {
            tokio::select! {
                _ = sigint.recv() => {}
                _ = sigterm.recv() => {}
            }
            seen += 1;
            if seen == 1 {
                warn!("interrupt received; finishing the current step");
                relais_core::request_stop();
                cancel.cancel();
            } else {
                warn!("second interrupt; exiting immediately");
                std::process::exit(EXIT_INTERRUPTED);
            }
        }
    });
    Ok(())
}
