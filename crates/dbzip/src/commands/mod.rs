//! CLI command implementations

pub mod config;
pub mod lock;
pub mod run;
pub mod verify;

use anyhow::Result;
use camino::Utf8Path;
use dbzip_core::config::{ConfigLoader, DbzipConfig};

/// Resolve the effective configuration for a command
pub fn load_config(path: Option<&Utf8Path>) -> Result<DbzipConfig> {
    let loader = ConfigLoader::new()?;
    Ok(loader.load(path)?)
}
