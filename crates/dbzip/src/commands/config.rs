//! Config commands

use anyhow::Result;
use camino::Utf8Path;
use clap::Subcommand;
use dbzip_core::config::ConfigLoader;

use crate::exit_codes;
use crate::output;

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration as YAML
    Show,
}

pub fn run(command: ConfigCommands, config_path: Option<&Utf8Path>) -> Result<u8> {
    match command {
        ConfigCommands::Show => show(config_path),
    }
}

fn show(config_path: Option<&Utf8Path>) -> Result<u8> {
    let loader = ConfigLoader::new()?;
    let config = loader.load(config_path)?;

    let source = match config_path {
        Some(path) => path.to_string(),
        None if loader.user_config_path().exists() => loader.user_config_path().to_string(),
        None => "built-in defaults".to_string(),
    };
    output::kv("Source", &source);
    println!("{}", serde_yaml_ng::to_string(&config)?);
    Ok(exit_codes::SUCCESS)
}
