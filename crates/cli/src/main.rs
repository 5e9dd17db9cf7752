// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! `pio`: execute commands on this Pioreactor.

mod commands;
mod run;
mod serve;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "pio", version, about = "Execute commands on this Pioreactor.")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a job on this node, in this process.
    Run(run::RunArgs),

    /// Send SIGTERM to running jobs selected by the filters.
    Kill(commands::KillArgs),

    /// Query the local job registry.
    Jobs {
        #[command(subcommand)]
        command: commands::JobsCommand,
    },

    /// Publish settings changes to a running job.
    UpdateSettings(commands::UpdateSettingsArgs),

    /// Ask the monitor job to flash the node's LED.
    Blink,

    /// Log a message from the CLI.
    Log(commands::LogArgs),

    /// Host this node's HTTP API (and the leader API on the leader).
    Serve(serve::ServeArgs),

    /// Print the Pioreactor software version.
    Version,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run::run(args),
        Command::Kill(args) => commands::kill(args),
        Command::Jobs { command } => commands::jobs(command),
        Command::UpdateSettings(args) => commands::update_settings(args),
        Command::Blink => commands::blink(),
        Command::Log(args) => commands::log(args),
        Command::Serve(args) => serve::serve(args),
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
