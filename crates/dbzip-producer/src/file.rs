//! Producer that snapshots a file from a data directory

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use dbzip_core::progress::{Progress, ProgressSink};
use dbzip_core::{BackupKind, BackupProducer, ProduceRequest};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const COPY_BUFFER_SIZE: usize = 256 * 1024;

/// Copies `{data_dir}/{target}` to the artifact path.
///
/// Only full backups are supported; there is no log to take incrementally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSnapshotProducer {
    data_dir: PathBuf,
}

impl FileSnapshotProducer {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Source file for `target`, rejecting names that would leave the data directory
    fn source_for(&self, target: &str) -> Result<PathBuf> {
        let target = target.trim();
        let escapes = Path::new(target)
            .components()
            .any(|c| !matches!(c, std::path::Component::Normal(_)));
        if target.is_empty() || escapes {
            bail!("cannot find a backup source named [{}]", target);
        }
        Ok(self.data_dir.join(target))
    }

    async fn copy(&self, source: &Path, dest: &Path, progress: &dyn ProgressSink) -> Result<()> {
        let mut reader = File::open(source)
            .await
            .with_context(|| format!("Failed to open {}", source.display()))?;
        let total = reader.metadata().await?.len();
        // Never overwrite: an existing file belongs to another run
        let mut writer = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(dest)
            .await
            .with_context(|| format!("Failed to create {}", dest.display()))?;

        let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
        let mut copied = 0u64;
        let mut last_percent = None;
        loop {
            let n = reader.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            writer.write_all(&buffer[..n]).await?;
            copied += n as u64;

            let percent = if total == 0 {
                100
            } else {
                (copied.min(total) * 100 / total) as u8
            };
            if last_percent != Some(percent) {
                last_percent = Some(percent);
                progress.emit(Progress::percent(percent, format!("{} percent processed.", percent)));
            }
        }
        writer.flush().await?;
        writer.sync_all().await?;

        if last_percent != Some(100) {
            progress.emit(Progress::percent(100, "100 percent processed."));
        }
        Ok(())
    }
}

#[async_trait]
impl BackupProducer for FileSnapshotProducer {
    fn name(&self) -> &str {
        "file-snapshot"
    }

    async fn produce(&self, request: &ProduceRequest, progress: &dyn ProgressSink) -> Result<PathBuf> {
        if request.options.kind == BackupKind::TransactionLog {
            bail!(
                "[{}] has no transaction log; only full backups of files are supported",
                request.target
            );
        }

        let source = self.source_for(&request.target)?;
        match tokio::fs::metadata(&source).await {
            Ok(meta) if meta.is_file() => {}
            _ => bail!("cannot find a backup source named [{}]", request.target.trim()),
        }

        tokio::fs::create_dir_all(&request.output_dir)
            .await
            .with_context(|| format!("Failed to create output directory {}", request.output_dir.display()))?;
        let dest = request.artifact_path();

        let copy = self.copy(&source, &dest, progress);
        match request.options.operation_timeout {
            Some(limit) => {
                let timed = tokio::time::timeout(limit, copy).await;
                match timed {
                    Ok(result) => result?,
                    Err(_) => bail!(
                        "Snapshot of [{}] timed out after {:?}",
                        request.target,
                        limit
                    ),
                }
            }
            None => copy.await?,
        }

        progress.emit(Progress::message(format!(
            "BACKUP of [{}] successfully processed",
            request.target
        )));
        Ok(dest)
    }
}
