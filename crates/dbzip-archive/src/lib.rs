//! dbzip archiving
//!
//! Compresses backup artifacts into `.gz` or single-entry `.tar.gz` archives
//! and verifies them structurally by decoding the full stream.
//!
//! # Examples
//!
//! ```no_run
//! use dbzip_archive::{ArchiveFormat, FileArchiver};
//! use dbzip_core::progress::NullSink;
//! use dbzip_core::Archiver;
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let archiver = FileArchiver::new(ArchiveFormat::TarGz).with_compression_level(9);
//!     let archive = archiver
//!         .compress(Path::new("Orders_2024_01_02_030405.bak"), &NullSink)
//!         .await?;
//!     assert!(archiver.verify(&archive).await?);
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod archiver;
pub mod compression;

pub use archive::{create_tar_gz, list_entries, verify_tar_gz};
pub use archiver::{format_for_path, verify_archive, FileArchiver};
pub use compression::{
    calculate_checksum, compress_file, verify_gzip, CompressionStats, DEFAULT_COMPRESSION_LEVEL,
};
pub use dbzip_core::config::ArchiveFormat;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
