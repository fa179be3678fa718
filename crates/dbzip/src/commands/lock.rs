//! Lock commands

use anyhow::Result;
use camino::Utf8Path;
use clap::{Args, Subcommand};
use dbzip_core::lock::{ExclusiveRegion, LockStatus};

use crate::exit_codes;
use crate::output;

#[derive(Subcommand, Debug)]
pub enum LockCommands {
    /// Show whether the backup lock is held, and by whom
    Status(LockStatusArgs),
}

#[derive(Args, Debug)]
pub struct LockStatusArgs {
    /// Lock identifier to inspect
    #[arg(long, env = "DBZIP_LOCK_ID")]
    pub lock_id: Option<String>,
}

pub fn run(command: LockCommands, config_path: Option<&Utf8Path>) -> Result<u8> {
    match command {
        LockCommands::Status(args) => status(args, config_path),
    }
}

fn status(args: LockStatusArgs, config_path: Option<&Utf8Path>) -> Result<u8> {
    let config = super::load_config(config_path)?;
    let region = ExclusiveRegion::new(config.lock.namespace());
    let id = args.lock_id.unwrap_or(config.lock.id);
    let name = region.namespace().name(Some(id.as_str()))?;

    output::kv("Lock", &name.to_string());
    output::kv(
        "File",
        &region.namespace().lock_path(&name).display().to_string(),
    );

    match region.probe(Some(id.as_str()))? {
        LockStatus::Free => output::success("Free"),
        LockStatus::Held { owner: Some(owner) } => {
            output::info(&format!("Held by {}", owner));
        }
        LockStatus::Held { owner: None } => output::info("Held"),
    }
    Ok(exit_codes::SUCCESS)
}
