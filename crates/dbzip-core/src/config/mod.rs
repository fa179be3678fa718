//! Configuration loading

mod loader;
mod model;

pub use loader::ConfigLoader;
pub use model::{
    ArchiveConfig, ArchiveFormat, BackupConfig, CommandConfig, DbzipConfig, LockConfig,
    ProducerKind,
};
