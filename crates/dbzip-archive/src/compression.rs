//! Gzip compression and verification of single files.
//!
//! Compression streams the source through a gzip encoder; the SHA-256 of the
//! compressed bytes is computed on the way to disk.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

/// Default compression level (6 = balanced speed/ratio).
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Statistics about a compression operation.
#[derive(Debug, Clone, Serialize)]
pub struct CompressionStats {
    /// Original uncompressed size in bytes
    pub original_size: u64,

    /// Compressed size in bytes
    pub compressed_size: u64,

    /// Compression ratio (compressed / original)
    pub compression_ratio: f64,

    /// SHA256 checksum of the archive file
    pub checksum: String,
}

impl CompressionStats {
    pub fn new(original_size: u64, compressed_size: u64, checksum: String) -> Self {
        let compression_ratio = if original_size > 0 {
            compressed_size as f64 / original_size as f64
        } else {
            0.0
        };

        Self {
            original_size,
            compressed_size,
            compression_ratio,
            checksum,
        }
    }

    /// Returns compression percentage saved.
    pub fn compression_percentage(&self) -> u8 {
        ((1.0 - self.compression_ratio).clamp(0.0, 1.0) * 100.0) as u8
    }
}

/// Compresses `source` into a gzip file at `dest`.
///
/// `on_progress` receives the percentage of the source read so far, once per
/// whole-percent change, ending with 100.
pub fn compress_file(
    source: &Path,
    dest: &Path,
    level: u32,
    on_progress: &mut dyn FnMut(u8),
) -> anyhow::Result<CompressionStats> {
    let source_file = File::open(source)
        .map_err(|e| anyhow::anyhow!("Failed to open source file {}: {}", source.display(), e))?;
    let original_size = source_file.metadata()?.len();

    let dest_file = create_new(dest)
        .map_err(|e| anyhow::anyhow!("Failed to create archive {}: {}", dest.display(), e))?;

    let mut encoder = GzEncoder::new(
        ChecksumWriter::new(BufWriter::new(dest_file)),
        Compression::new(level.clamp(1, 9)),
    );
    let mut reader = ProgressReader::new(source_file, original_size, on_progress);

    io::copy(&mut reader, &mut encoder)
        .map_err(|e| anyhow::anyhow!("Failed to compress data: {}", e))?;
    reader.complete();

    let checksum_writer = encoder.finish()?;
    let checksum = checksum_writer.checksum();
    let compressed_size = checksum_writer.finish()?;

    Ok(CompressionStats::new(original_size, compressed_size, checksum))
}

/// Decodes the whole gzip stream at `path`, checking the CRC and length trailer.
///
/// Corrupt or truncated data is `Ok(false)`; a file that cannot be opened is an error.
pub fn verify_gzip(path: &Path) -> anyhow::Result<bool> {
    let file = File::open(path)
        .map_err(|e| anyhow::anyhow!("Failed to open archive {}: {}", path.display(), e))?;
    if file.metadata()?.len() == 0 {
        tracing::debug!(path = %path.display(), "archive is empty");
        return Ok(false);
    }

    let mut decoder = GzDecoder::new(file);
    match io::copy(&mut decoder, &mut io::sink()) {
        Ok(_) => Ok(true),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "gzip stream is corrupt");
            Ok(false)
        }
    }
}

/// Calculates SHA256 checksum of a file.
pub fn calculate_checksum(path: &Path) -> anyhow::Result<String> {
    let mut file = File::open(path)
        .map_err(|e| anyhow::anyhow!("Failed to open file for checksum: {}", e))?;

    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .map_err(|e| anyhow::anyhow!("Failed to calculate checksum: {}", e))?;

    Ok(format!("{:x}", hasher.finalize()))
}

/// Create a new archive file, refusing to replace one that already exists
pub(crate) fn create_new(path: &Path) -> io::Result<File> {
    OpenOptions::new().write(true).create_new(true).open(path)
}

/// Writer that calculates SHA256 checksum while writing.
pub(crate) struct ChecksumWriter<W: Write> {
    writer: W,
    hasher: Sha256,
    bytes_written: u64,
}

impl<W: Write> ChecksumWriter<W> {
    pub(crate) fn new(writer: W) -> Self {
        Self {
            writer,
            hasher: Sha256::new(),
            bytes_written: 0,
        }
    }

    /// Flush and return the number of bytes written
    pub(crate) fn finish(mut self) -> io::Result<u64> {
        self.writer.flush()?;
        Ok(self.bytes_written)
    }

    pub(crate) fn checksum(&self) -> String {
        format!("{:x}", self.hasher.clone().finalize())
    }
}

impl<W: Write> Write for ChecksumWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.writer.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.bytes_written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Reader that reports how much of a known-size input has been consumed
pub(crate) struct ProgressReader<'a, R: Read> {
    reader: R,
    total: u64,
    read: u64,
    last_percent: Option<u8>,
    on_progress: &'a mut dyn FnMut(u8),
}

impl<'a, R: Read> ProgressReader<'a, R> {
    pub(crate) fn new(reader: R, total: u64, on_progress: &'a mut dyn FnMut(u8)) -> Self {
        Self {
            reader,
            total,
            read: 0,
            last_percent: None,
            on_progress,
        }
    }

    fn report(&mut self, percent: u8) {
        if self.last_percent != Some(percent) {
            self.last_percent = Some(percent);
            (self.on_progress)(percent);
        }
    }

    /// Report 100 percent, for inputs that shrank or were empty
    pub(crate) fn complete(&mut self) {
        self.report(100);
    }
}

impl<R: Read> Read for ProgressReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.reader.read(buf)?;
        self.read += n as u64;
        if self.total > 0 && n > 0 {
            let percent = (self.read.min(self.total) * 100 / self.total) as u8;
            self.report(percent);
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn create_test_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_compress_file() {
        let temp_dir = TempDir::new().unwrap();
        let content = b"Repeated content that compresses very well! ".repeat(5000);
        let source = create_test_file(temp_dir.path(), "Orders.bak", &content);
        let dest = temp_dir.path().join("Orders.bak.gz");

        let stats = compress_file(&source, &dest, DEFAULT_COMPRESSION_LEVEL, &mut |_| {}).unwrap();

        assert_eq!(stats.original_size, content.len() as u64);
        assert!(stats.compressed_size < stats.original_size / 2);
        assert_eq!(stats.compressed_size, std::fs::metadata(&dest).unwrap().len());
        assert_eq!(stats.checksum, calculate_checksum(&dest).unwrap());
        assert!(verify_gzip(&dest).unwrap());
    }

    #[test]
    fn test_progress_is_monotonic_and_ends_at_100() {
        let temp_dir = TempDir::new().unwrap();
        let content = vec![7u8; 1024 * 1024];
        let source = create_test_file(temp_dir.path(), "big.bak", &content);
        let dest = temp_dir.path().join("big.bak.gz");

        let mut seen = Vec::new();
        compress_file(&source, &dest, 1, &mut |p| seen.push(p)).unwrap();

        assert!(!seen.is_empty());
        assert!(seen.windows(2).all(|w| w[0] < w[1]), "{:?}", seen);
        assert_eq!(seen.last(), Some(&100));
    }

    #[test]
    fn test_empty_source_still_reports_completion() {
        let temp_dir = TempDir::new().unwrap();
        let source = create_test_file(temp_dir.path(), "empty.bak", b"");
        let dest = temp_dir.path().join("empty.bak.gz");

        let mut seen = Vec::new();
        compress_file(&source, &dest, 6, &mut |p| seen.push(p)).unwrap();
        assert_eq!(seen, vec![100]);
        assert!(verify_gzip(&dest).unwrap());
    }

    #[test]
    fn test_verify_detects_truncation_and_corruption() {
        let temp_dir = TempDir::new().unwrap();
        let content = b"some backup pages ".repeat(2000);
        let source = create_test_file(temp_dir.path(), "Orders.bak", &content);
        let dest = temp_dir.path().join("Orders.bak.gz");
        compress_file(&source, &dest, 6, &mut |_| {}).unwrap();
        let good = std::fs::read(&dest).unwrap();

        let truncated = create_test_file(temp_dir.path(), "truncated.gz", &good[..good.len() / 2]);
        assert!(!verify_gzip(&truncated).unwrap());

        // flip a byte in the CRC trailer
        let mut bad_crc = good.clone();
        let at = bad_crc.len() - 6;
        bad_crc[at] ^= 0xFF;
        let bad_crc = create_test_file(temp_dir.path(), "bad_crc.gz", &bad_crc);
        assert!(!verify_gzip(&bad_crc).unwrap());

        let not_gzip = create_test_file(temp_dir.path(), "plain.gz", b"definitely not gzip");
        assert!(!verify_gzip(&not_gzip).unwrap());

        let empty = create_test_file(temp_dir.path(), "empty.gz", b"");
        assert!(!verify_gzip(&empty).unwrap());
    }

    #[test]
    fn test_verify_missing_file_is_error() {
        let temp_dir = TempDir::new().unwrap();
        assert!(verify_gzip(&temp_dir.path().join("missing.gz")).is_err());
    }

    #[test]
    fn test_compression_stats() {
        let stats = CompressionStats::new(1000, 500, "abc123".to_string());
        assert_eq!(stats.compression_ratio, 0.5);
        assert_eq!(stats.compression_percentage(), 50);

        let stats = CompressionStats::new(0, 20, "def456".to_string());
        assert_eq!(stats.compression_ratio, 0.0);
    }

    #[test]
    fn test_checksum_writer() {
        let mut buffer = Vec::new();
        let mut writer = ChecksumWriter::new(&mut buffer);
        writer.write_all(b"Hello, ").unwrap();
        writer.write_all(b"World!").unwrap();

        let checksum = writer.checksum();
        assert_eq!(writer.finish().unwrap(), 13);
        assert_eq!(checksum.len(), 64);
        assert_eq!(&buffer, b"Hello, World!");
    }

    #[test]
    fn test_existing_archive_is_not_overwritten() {
        let temp_dir = TempDir::new().unwrap();
        let source = create_test_file(temp_dir.path(), "Orders.bak", b"new run");
        let dest = create_test_file(temp_dir.path(), "Orders.bak.gz", b"earlier archive");

        let err = compress_file(&source, &dest, 6, &mut |_| {}).unwrap_err();
        assert!(err.to_string().contains("Failed to create archive"));
        assert_eq!(std::fs::read(&dest).unwrap(), b"earlier archive");
    }
}
