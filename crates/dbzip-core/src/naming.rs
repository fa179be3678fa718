//! Deterministic artifact file names.
//!
//! Each run writes `{target}_{timestamp}.{ext}`, so runs for different targets,
//! or for the same target at different seconds, never share a file. Runs of
//! one target stamped in the same second are told apart by a sequence suffix,
//! `{target}_{timestamp}_{n}.{ext}`.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

/// Timestamp layout embedded in artifact names
pub const TIMESTAMP_FORMAT: &str = "%Y_%m_%d_%H%M%S";

/// File name for an artifact of `target` produced at `at`.
///
/// `sequence` 0 is the plain name; higher values append `_{sequence}`.
pub fn artifact_file_name(
    target: &str,
    at: &DateTime<Local>,
    extension: &str,
    sequence: u32,
) -> String {
    let suffix = match sequence {
        0 => String::new(),
        n => format!("_{}", n),
    };
    format!(
        "{}_{}{}.{}",
        file_safe(target),
        at.format(TIMESTAMP_FORMAT),
        suffix,
        extension.trim_start_matches('.')
    )
}

/// Full path of an artifact inside `dir`
pub fn artifact_path(
    dir: &Path,
    target: &str,
    at: &DateTime<Local>,
    extension: &str,
    sequence: u32,
) -> PathBuf {
    dir.join(artifact_file_name(target, at, extension, sequence))
}

/// Archive path for an artifact: the artifact path with `extension` appended
pub fn archive_path(artifact: &Path, extension: &str) -> PathBuf {
    let mut name = artifact.as_os_str().to_owned();
    name.push(".");
    name.push(extension.trim_start_matches('.'));
    PathBuf::from(name)
}

/// Lowest sequence whose artifact name is not used in `dir`, either by an
/// artifact or by an archive derived from one. A missing `dir` is empty.
pub fn next_free_sequence(
    dir: &Path,
    target: &str,
    at: &DateTime<Local>,
    extension: &str,
) -> io::Result<u32> {
    let taken: Vec<String> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    (0..=u32::MAX)
        .find(|&sequence| {
            let base = artifact_file_name(target, at, extension, sequence);
            !taken.iter().any(|name| {
                name.strip_prefix(base.as_str())
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
            })
        })
        .ok_or_else(|| io::Error::other(format!("no free artifact name for [{}]", target)))
}

/// Replace characters that are not safe in file names on any platform
fn file_safe(target: &str) -> String {
    target
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_whitespace() || c.is_control() => '_',
            c => c,
        })
        .collect()
}
