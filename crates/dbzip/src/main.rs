//! dbzip - back up, compress, verify and tidy, one run at a time per host
//!
//! This is the main entry point for the dbzip command-line interface.

mod cli;
mod commands;
mod exit_codes;
mod observer;
mod output;

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands};

/// How long blocking work may linger once a command has returned
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            output::error(&format!("Failed to start async runtime: {}", e));
            return ExitCode::from(exit_codes::USER_ERROR);
        }
    };

    let result = runtime.block_on(dispatch(cli));

    // Nothing the command started may outlive the process
    runtime.shutdown_timeout(SHUTDOWN_TIMEOUT);

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            output::error(&format!("{:#}", e));
            ExitCode::from(exit_codes::USER_ERROR)
        }
    }
}

async fn dispatch(cli: Cli) -> Result<u8> {
    let config = cli.config.as_deref();
    match cli.command {
        Commands::Run(args) => commands::run::run(args, config, cli.quiet).await,
        Commands::Verify(args) => commands::verify::run(args).await,
        Commands::Lock(args) => commands::lock::run(args, config),
        Commands::Config(args) => commands::config::run(args, config),
    }
}

/// Initialize tracing with appropriate verbosity
fn init_tracing(verbose: u8, quiet: bool) {
    let default_level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}
