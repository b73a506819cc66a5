// SPDX-License-Identifier: MIT

//! `forge` — a thin demo front door over the process manager, execution
//! engine, resilient executor, and workflow orchestrator. Carries no
//! business logic of its own; every command wires the library crates
//! together the same way a production embedder would.

mod commands;
mod exit_error;
mod process_template;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use exit_error::ExitError;

#[derive(Parser)]
#[command(name = "forge", version, about = "Resilient task execution engine demo CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a single shell-backed task through the resilient executor.
    Submit(commands::submit::SubmitArgs),
    /// Run a workflow definition (TOML) to completion.
    Run(commands::run::RunArgs),
    /// List saved workflow checkpoints.
    Checkpoints(commands::checkpoints::CheckpointsArgs),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "forge=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Submit(args) => commands::submit::run(args).await,
        Command::Run(args) => commands::run::run(args).await,
        Command::Checkpoints(args) => commands::checkpoints::run(args).await,
    };

    if let Err(err) = result {
        exit_with(err);
    }
}

fn exit_with(err: ExitError) -> ! {
    eprintln!("error: {err}");
    std::process::exit(err.code);
}
