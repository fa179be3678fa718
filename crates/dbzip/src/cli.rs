//! CLI argument parsing with clap

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

pub use crate::commands::config::ConfigCommands;
pub use crate::commands::lock::LockCommands;
pub use crate::commands::run::RunArgs;
pub use crate::commands::verify::VerifyArgs;

/// dbzip - back up a database, compress the dump, verify it and remove the original
#[derive(Parser, Debug)]
#[command(name = "dbzip")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to a dbzip config file (replaces ~/.dbzip/config.yaml)
    #[arg(short, long, global = true)]
    pub config: Option<Utf8PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Back up a target, compress and verify the artifact, then delete it
    Run(RunArgs),

    /// Check that an archive decodes cleanly
    Verify(VerifyArgs),

    /// Inspect the host-wide backup lock
    #[command(subcommand)]
    Lock(LockCommands),

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),
}
