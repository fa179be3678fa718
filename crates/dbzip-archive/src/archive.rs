//! Single-entry tar.gz archives.
//!
//! The artifact is stored as the only entry, named by its file name, so the
//! archive unpacks to exactly the file that was backed up.

use crate::compression::{create_new, ChecksumWriter, CompressionStats, ProgressReader};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::Path;
use tar::{Archive, Builder as TarBuilder, Header};

/// Pack `source` as the single entry of a gzip-compressed tar at `dest`.
pub fn create_tar_gz(
    source: &Path,
    dest: &Path,
    level: u32,
    on_progress: &mut dyn FnMut(u8),
) -> anyhow::Result<CompressionStats> {
    let entry_name = source
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("Source {} has no file name", source.display()))?;

    let source_file = File::open(source)
        .map_err(|e| anyhow::anyhow!("Failed to open source file {}: {}", source.display(), e))?;
    let metadata = source_file.metadata()?;
    let original_size = metadata.len();

    let dest_file = create_new(dest)
        .map_err(|e| anyhow::anyhow!("Failed to create archive {}: {}", dest.display(), e))?;
    let encoder = GzEncoder::new(
        ChecksumWriter::new(BufWriter::new(dest_file)),
        Compression::new(level.clamp(1, 9)),
    );
    let mut tar = TarBuilder::new(encoder);

    let mut header = Header::new_gnu();
    header.set_metadata(&metadata);
    header.set_size(original_size);

    let mut reader = ProgressReader::new(source_file, original_size, on_progress);
    tar.append_data(&mut header, entry_name, &mut reader)
        .map_err(|e| anyhow::anyhow!("Failed to add {} to archive: {}", source.display(), e))?;
    reader.complete();

    let encoder = tar.into_inner()?;
    let checksum_writer = encoder.finish()?;
    let checksum = checksum_writer.checksum();
    let compressed_size = checksum_writer.finish()?;

    Ok(CompressionStats::new(original_size, compressed_size, checksum))
}

/// Read every entry of the tar.gz at `path` and the rest of the gzip stream.
///
/// Corrupt, truncated or empty archives are `Ok(false)`; a file that cannot be
/// opened is an error.
pub fn verify_tar_gz(path: &Path) -> anyhow::Result<bool> {
    let file = File::open(path)
        .map_err(|e| anyhow::anyhow!("Failed to open archive {}: {}", path.display(), e))?;
    if file.metadata()?.len() == 0 {
        tracing::debug!(path = %path.display(), "archive is empty");
        return Ok(false);
    }

    match read_all_entries(file) {
        Ok(0) => {
            tracing::debug!(path = %path.display(), "archive has no entries");
            Ok(false)
        }
        Ok(entries) => {
            tracing::debug!(path = %path.display(), entries, "archive verified");
            Ok(true)
        }
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "archive is corrupt");
            Ok(false)
        }
    }
}

fn read_all_entries(file: File) -> io::Result<usize> {
    let mut archive = Archive::new(GzDecoder::new(file));
    let mut count = 0;
    for entry in archive.entries()? {
        let mut entry = entry?;
        let expected = entry.header().size()?;
        let read = io::copy(&mut entry, &mut io::sink())?;
        if read != expected {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("entry holds {} of {} bytes", read, expected),
            ));
        }
        count += 1;
    }

    // tar stops at its end marker; drain the gzip stream so its trailer is checked
    let mut decoder = archive.into_inner();
    io::copy(&mut decoder, &mut io::sink())?;
    Ok(count)
}

/// Names of the entries in a tar.gz, for diagnostics
pub fn list_entries(path: &Path) -> anyhow::Result<Vec<String>> {
    let file = File::open(path)?;
    let mut archive = Archive::new(GzDecoder::new(file));
    let mut names = Vec::new();
    for entry in archive.entries()? {
        let entry = entry?;
        names.push(entry.path()?.to_string_lossy().into_owned());
    }
    Ok(names)
}
