//! dbzip backup producers
//!
//! - [`CommandProducer`] runs an external dump tool and relays its output as progress
//! - [`FileSnapshotProducer`] copies a file out of a data directory

pub mod command;
pub mod file;

pub use command::{parse_progress, CommandProducer};
pub use file::FileSnapshotProducer;
