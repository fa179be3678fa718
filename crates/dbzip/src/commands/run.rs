//! Run command: one pass through the backup pipeline

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use camino::Utf8Path;
use chrono::Utc;
use clap::{Args, ValueEnum};
use dbzip_archive::{ArchiveFormat, FileArchiver};
use dbzip_core::config::{DbzipConfig, ProducerKind};
use dbzip_core::{
    BackupKind, BackupProducer, ExclusiveRegion, PipelineOrchestrator, PipelineSettings,
    RunOutcome, RunReport, RunRequest,
};
use dbzip_producer::{CommandProducer, FileSnapshotProducer};

use crate::exit_codes;
use crate::observer::TerminalObserver;
use crate::output;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// What to back up (database name, or file name for the file producer)
    #[arg(short, long)]
    pub target: String,

    /// Wait for a running backup to finish instead of skipping
    #[arg(short, long)]
    pub wait: bool,

    /// Lock identifier for this class of job
    #[arg(long, env = "DBZIP_LOCK_ID")]
    pub lock_id: Option<String>,

    /// Back up the transaction log instead of taking a full backup
    #[arg(long)]
    pub transaction_log: bool,

    /// Directory for the artifact and archive
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Archive format
    #[arg(short, long, value_enum)]
    pub format: Option<FormatArg>,

    /// How the artifact is produced
    #[arg(short, long, value_enum)]
    pub producer: Option<ProducerArg>,

    /// Source directory for the file producer
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FormatArg {
    /// Bare gzip stream (.gz)
    Gzip,
    /// Single-entry tar in gzip (.tar.gz)
    TarGz,
}

impl From<FormatArg> for ArchiveFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Gzip => ArchiveFormat::Gzip,
            FormatArg::TarGz => ArchiveFormat::TarGz,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ProducerArg {
    /// Run the configured dump command
    Command,
    /// Copy a file from the data directory
    File,
}

impl From<ProducerArg> for ProducerKind {
    fn from(arg: ProducerArg) -> Self {
        match arg {
            ProducerArg::Command => ProducerKind::Command,
            ProducerArg::File => ProducerKind::File,
        }
    }
}

impl RunArgs {
    /// CLI flags win over every other configuration source
    fn apply_to(&self, config: &mut DbzipConfig) {
        if let Some(id) = &self.lock_id {
            config.lock.id = id.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.backup.output_dir = dir.clone();
        }
        if let Some(format) = self.format {
            config.archive.format = format.into();
        }
        if let Some(producer) = self.producer {
            config.backup.producer = producer.into();
        }
        if let Some(dir) = &self.data_dir {
            config.backup.data_dir = Some(dir.clone());
        }
    }

    fn kind(&self) -> BackupKind {
        if self.transaction_log {
            BackupKind::TransactionLog
        } else {
            BackupKind::Full
        }
    }
}

fn build_producer(config: &DbzipConfig) -> Result<Arc<dyn BackupProducer>> {
    match config.backup.producer {
        ProducerKind::Command => Ok(Arc::new(CommandProducer::new(
            config.backup.command.program.clone(),
            config.backup.command.args.clone(),
        ))),
        ProducerKind::File => match &config.backup.data_dir {
            Some(dir) => Ok(Arc::new(FileSnapshotProducer::new(dir))),
            None => bail!("The file producer needs --data-dir or backup.data-dir"),
        },
    }
}

pub async fn run(args: RunArgs, config_path: Option<&Utf8Path>, quiet: bool) -> Result<u8> {
    let mut config = super::load_config(config_path)?;
    args.apply_to(&mut config);

    let producer = build_producer(&config)?;
    let archiver = FileArchiver::new(config.archive.format)
        .with_compression_level(config.archive.level());
    let orchestrator = PipelineOrchestrator::new(
        ExclusiveRegion::new(config.lock.namespace()),
        producer,
        Arc::new(archiver),
        PipelineSettings {
            output_dir: config.backup.output_dir.clone(),
            max_lock_wait: config.lock.max_wait(),
        },
    );

    let kind = args.kind();
    let request = RunRequest::new(args.target.clone())
        .wait_for_lock(args.wait)
        .with_lock_name(config.lock.id.clone())
        .with_options(config.backup.options(kind, Utc::now())?);

    if !quiet {
        output::header("Backup");
        output::kv("Target", &request.target);
        output::kv("Kind", &kind.to_string());
        output::kv("Producer", &config.backup.producer.to_string());
        output::kv("Output", &config.backup.output_dir.display().to_string());
        output::kv("Archive", &config.archive.format.to_string());
        output::kv("Lock", &config.lock.id);
        println!();
    }

    let observer = TerminalObserver::new(quiet);
    let result = orchestrator.run(&request, &observer).await;
    observer.finish();

    let report = match result {
        Ok(report) => report,
        Err(e) if e.is_internal() => {
            output::error(&format!(
                "Internal error while backing up {}: {}",
                request.target, e
            ));
            return Ok(exit_codes::for_error(&e));
        }
        Err(e) => return Err(e.into()),
    };

    print_summary(&report);
    Ok(exit_codes::for_outcome(&report.outcome))
}

fn print_summary(report: &RunReport) {
    let elapsed = format!("{:.1}s", report.duration.as_secs_f64());
    match &report.outcome {
        RunOutcome::Completed {
            archive_path,
            deleted_original,
        } => {
            output::success(&format!("Backup of {} completed in {}", report.target, elapsed));
            output::kv("Archive", &archive_path.display().to_string());
            if !deleted_original {
                if let Some(artifact) = &report.artifact_path {
                    if artifact.exists() {
                        output::warning(&format!(
                            "Original {} could not be deleted",
                            artifact.display()
                        ));
                    }
                }
            }
        }
        RunOutcome::LockSkipped { lock } => {
            output::info(&format!(
                "Skipped: another backup holds lock {}",
                lock
            ));
        }
        RunOutcome::Failed { kind, message } => {
            output::error(&format!("Backup of {} failed ({}): {}", report.target, kind, message));
            if let Some(artifact) = report.artifact_path.as_ref().filter(|p| p.exists()) {
                output::kv("Kept", &artifact.display().to_string());
            }
        }
    }
}
