//! [`Archiver`] backed by the files on local disk

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dbzip_core::config::ArchiveFormat;
use dbzip_core::naming;
use dbzip_core::progress::{Progress, ProgressSink};
use dbzip_core::Archiver;
use tokio::sync::mpsc;

use crate::archive::{create_tar_gz, verify_tar_gz};
use crate::compression::{compress_file, verify_gzip, CompressionStats, DEFAULT_COMPRESSION_LEVEL};

/// Compresses artifacts next to themselves, appending the format's extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileArchiver {
    format: ArchiveFormat,
    level: u32,
}

impl FileArchiver {
    pub fn new(format: ArchiveFormat) -> Self {
        Self {
            format,
            level: DEFAULT_COMPRESSION_LEVEL,
        }
    }

    /// Sets the compression level (1-9).
    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.level = level.clamp(1, 9);
        self
    }

    pub fn format(&self) -> ArchiveFormat {
        self.format
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    /// Where the archive for `artifact` goes
    pub fn archive_path(&self, artifact: &Path) -> PathBuf {
        naming::archive_path(artifact, self.format.extension())
    }
}

#[async_trait]
impl Archiver for FileArchiver {
    fn name(&self) -> &str {
        match self.format {
            ArchiveFormat::Gzip => "gzip",
            ArchiveFormat::TarGz => "tar-gz",
        }
    }

    async fn compress(
        &self,
        source: &Path,
        progress: &dyn ProgressSink,
    ) -> anyhow::Result<PathBuf> {
        let dest = self.archive_path(source);
        let (format, level) = (self.format, self.level);
        let (source_owned, dest_owned) = (source.to_path_buf(), dest.clone());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = tokio::task::spawn_blocking(move || {
            let mut on_progress = |percent: u8| {
                // the receiver only goes away if the caller stopped listening
                let _ = tx.send(Progress::percent(
                    percent,
                    format!("{} percent compressed", percent),
                ));
            };
            compress_to(format, &source_owned, &dest_owned, level, &mut on_progress)
        });

        while let Some(update) = rx.recv().await {
            progress.emit(update);
        }
        let stats = task.await??;

        tracing::info!(
            archive = %dest.display(),
            original = stats.original_size,
            compressed = stats.compressed_size,
            saved_pct = stats.compression_percentage(),
            sha256 = %stats.checksum,
            "archive written"
        );
        Ok(dest)
    }

    async fn verify(&self, archive: &Path) -> anyhow::Result<bool> {
        let format = self.format;
        let archive = archive.to_path_buf();
        tokio::task::spawn_blocking(move || verify_as(format, &archive)).await?
    }
}

fn compress_to(
    format: ArchiveFormat,
    source: &Path,
    dest: &Path,
    level: u32,
    on_progress: &mut dyn FnMut(u8),
) -> anyhow::Result<CompressionStats> {
    match format {
        ArchiveFormat::Gzip => compress_file(source, dest, level, on_progress),
        ArchiveFormat::TarGz => create_tar_gz(source, dest, level, on_progress),
    }
}

fn verify_as(format: ArchiveFormat, archive: &Path) -> anyhow::Result<bool> {
    match format {
        ArchiveFormat::Gzip => verify_gzip(archive),
        ArchiveFormat::TarGz => verify_tar_gz(archive),
    }
}

/// Infer the archive format from a file name
pub fn format_for_path(path: &Path) -> Option<ArchiveFormat> {
    let name = path.file_name()?.to_str()?.to_ascii_lowercase();
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        Some(ArchiveFormat::TarGz)
    } else if name.ends_with(".gz") {
        Some(ArchiveFormat::Gzip)
    } else {
        None
    }
}

/// Structurally verify an archive, picking the format from its extension
pub fn verify_archive(path: &Path) -> anyhow::Result<bool> {
    let format = format_for_path(path).ok_or_else(|| {
        anyhow::anyhow!(
            "Cannot tell the archive format of {} (expected .gz or .tar.gz)",
            path.display()
        )
    })?;
    verify_as(format, path)
}
