// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! nw - NightWatch CLI

mod commands;
mod config;
mod output;

use clap::{Args, Parser, Subcommand};
use config::Settings;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "nw",
    version,
    about = "NightWatch - autonomous production-error triage"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze production errors (the default)
    Run(RunArgs),
    /// Validate config and connectivity to each collaborator
    Check,
}

#[derive(Args, Default)]
pub struct RunArgs {
    /// Lookback period (e.g. "24 hours", "30 minutes")
    #[arg(long)]
    since: Option<String>,

    /// Max errors to analyze
    #[arg(long)]
    max_errors: Option<usize>,

    /// Max tracker issues to create
    #[arg(long)]
    max_issues: Option<usize>,

    /// Analyze only: no issues, PRs, chat, or knowledge writes
    #[arg(long)]
    dry_run: bool,

    /// Show iteration details
    #[arg(long)]
    verbose: bool,

    /// Override the LLM model
    #[arg(long)]
    model: Option<String>,

    /// Agent config name
    #[arg(long, default_value = "base-analyzer")]
    agent: String,

    /// Comma-separated workflow names (default: errors)
    #[arg(long)]
    workflows: Option<String>,

    /// Write a guardrails file after the run
    #[arg(long, value_name = "PATH")]
    guardrails_output: Option<PathBuf>,

    /// Submit a triage batch instead of analyzing inline
    #[arg(long)]
    batch: bool,

    /// Collect a previously submitted triage batch
    #[arg(long)]
    collect: bool,

    /// Batch id for --collect (defaults to the most recent)
    #[arg(long, value_name = "ID")]
    batch_id: Option<String>,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("nw={default},nw_engine={default},nw_adapters={default},nw_storage={default}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Run(RunArgs::default()));

    match command {
        Commands::Check => {
            init_logging(false);
            ExitCode::from(commands::check::execute().await as u8)
        }
        Commands::Run(args) => {
            init_logging(args.verbose);

            let settings = match Settings::from_env() {
                Ok(settings) => settings,
                Err(e) => {
                    eprintln!("Error: {e}");
                    return ExitCode::from(1);
                }
            };

            tokio::select! {
                result = commands::run::execute(&args, settings) => match result {
                    Ok(_) => ExitCode::SUCCESS,
                    Err(e) => {
                        eprintln!("Error: {e}");
                        ExitCode::from(1)
                    }
                },
                _ = tokio::signal::ctrl_c() => {
                    eprintln!("\nInterrupted.");
                    ExitCode::from(130)
                }
            }
        }
    }
}
