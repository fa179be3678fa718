//! Verify command

use anyhow::Result;
use camino::Utf8PathBuf;
use clap::Args;
use dbzip_archive::{calculate_checksum, verify_archive};

use crate::exit_codes;
use crate::output;

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Archive to check (.gz or .tar.gz)
    pub archive: Utf8PathBuf,
}

pub async fn run(args: VerifyArgs) -> Result<u8> {
    let spinner = output::spinner(&format!("Verifying {}", args.archive));
    let path = args.archive.clone().into_std_path_buf();
    let result = tokio::task::spawn_blocking(move || -> Result<(bool, String)> {
        let valid = verify_archive(&path)?;
        let checksum = calculate_checksum(&path)?;
        Ok((valid, checksum))
    })
    .await?;
    spinner.finish_and_clear();

    let (valid, checksum) = result?;
    if valid {
        output::success(&format!("Verification passed: {}", args.archive));
        output::kv("SHA256", &checksum);
        Ok(exit_codes::SUCCESS)
    } else {
        output::error(&format!("Verification failed: {}", args.archive));
        Ok(exit_codes::RUN_FAILED)
    }
}
