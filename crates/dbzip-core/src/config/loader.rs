//! Hierarchical configuration loader
//!
//! Precedence, low to high:
//! 1. Embedded defaults (built into binary)
//! 2. User config (~/.dbzip/config.yaml), or an explicit file
//! 3. Environment variables (DBZIP_* prefix)
//! 4. CLI flags (handled by caller)

use std::env;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use rust_embed::RustEmbed;
use serde_yaml_ng::Value;

use super::model::DbzipConfig;
use crate::error::{Error, Result};

/// Embedded configuration files
#[derive(RustEmbed)]
#[folder = "$CARGO_MANIFEST_DIR/../../embedded/config/"]
#[prefix = ""]
struct EmbeddedConfigs;

const DEFAULTS_FILE: &str = "dbzip-defaults.yaml";
const USER_CONFIG_FILE: &str = "config.yaml";

/// Loads [`DbzipConfig`] from every source in precedence order
pub struct ConfigLoader {
    config_dir: Utf8PathBuf,
}

impl ConfigLoader {
    /// Loader rooted at ~/.dbzip
    pub fn new() -> Result<Self> {
        let home = env::var("HOME")
            .or_else(|_| env::var("USERPROFILE"))
            .map_err(|_| Error::invalid_config("Could not determine home directory"))?;
        Ok(Self {
            config_dir: Utf8PathBuf::from(home).join(".dbzip"),
        })
    }

    /// Create a loader with a custom config directory
    pub fn with_dir(config_dir: Utf8PathBuf) -> Self {
        Self { config_dir }
    }

    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn user_config_path(&self) -> Utf8PathBuf {
        self.config_dir.join(USER_CONFIG_FILE)
    }

    /// Load the effective configuration.
    ///
    /// An explicit `path` must exist and replaces the user config file.
    pub fn load(&self, path: Option<&Utf8Path>) -> Result<DbzipConfig> {
        let mut merged = Self::load_embedded_defaults()?;

        let overlay = match path {
            Some(path) if !path.exists() => return Err(Error::config_not_found(path.as_str())),
            Some(path) => Some(path.to_owned()),
            None => Some(self.user_config_path()).filter(|p| p.exists()),
        };
        if let Some(overlay) = overlay {
            tracing::debug!(path = %overlay, "loading config file");
            merge_yaml(&mut merged, Self::load_yaml_file(&overlay)?);
        }

        let config: DbzipConfig = serde_yaml_ng::from_value(merged)
            .map_err(|e| Error::invalid_config(format!("Failed to apply configuration: {}", e)))?;

        apply_env_overrides(config)
    }

    fn load_embedded_defaults() -> Result<Value> {
        let embedded_file = EmbeddedConfigs::get(DEFAULTS_FILE).ok_or_else(|| {
            Error::config_not_found(format!("Embedded config not found: {}", DEFAULTS_FILE))
        })?;

        let content = std::str::from_utf8(&embedded_file.data).map_err(|_| {
            Error::invalid_config(format!("Invalid UTF-8 in embedded config: {}", DEFAULTS_FILE))
        })?;

        serde_yaml_ng::from_str(content).map_err(|e| {
            Error::invalid_config(format!(
                "Failed to parse embedded config {}: {}",
                DEFAULTS_FILE, e
            ))
        })
    }

    fn load_yaml_file(path: &Utf8Path) -> Result<Value> {
        let content = fs::read_to_string(path)?;
        let value: Value = serde_yaml_ng::from_str(&content)
            .map_err(|e| Error::invalid_config(format!("Failed to parse {}: {}", path, e)))?;
        // an empty file parses as null
        Ok(if value.is_null() {
            Value::Mapping(Default::default())
        } else {
            value
        })
    }
}

/// Deep-merge `overlay` into `base`; mappings merge key by key, anything else replaces
fn merge_yaml(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base), Value::Mapping(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_yaml(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(val) => val
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::invalid_config(format!("{} has an invalid value: {:?}", name, val))),
        Err(_) => Ok(None),
    }
}

fn apply_env_overrides(mut config: DbzipConfig) -> Result<DbzipConfig> {
    // Lock
    if let Ok(val) = env::var("DBZIP_LOCK_DIR") {
        config.lock.directory = Some(PathBuf::from(val));
    }
    if let Ok(val) = env::var("DBZIP_LOCK_ID") {
        config.lock.id = val;
    }
    if let Some(secs) = env_parse("DBZIP_LOCK_MAX_WAIT_SECS")? {
        config.lock.max_wait_secs = Some(secs);
    }

    // Backup
    if let Ok(val) = env::var("DBZIP_OUTPUT_DIR") {
        config.backup.output_dir = PathBuf::from(val);
    }
    if let Some(secs) = env_parse("DBZIP_OPERATION_TIMEOUT_SECS")? {
        config.backup.operation_timeout_secs = secs;
    }
    if let Some(days) = env_parse("DBZIP_EXPIRATION_DAYS")? {
        config.backup.expiration_days = days;
    }

    // Archive
    if let Ok(val) = env::var("DBZIP_ARCHIVE_FORMAT") {
        config.archive.format = val.parse().map_err(|_| {
            Error::invalid_config(format!("DBZIP_ARCHIVE_FORMAT has an invalid value: {:?}", val))
        })?;
    }
    if let Some(level) = env_parse("DBZIP_COMPRESSION_LEVEL")? {
        config.archive.compression_level = level;
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ArchiveFormat, ProducerKind};
    use serial_test::serial;
    use std::time::Duration;
    use tempfile::TempDir;

    const ENV_VARS: [&str; 8] = [
        "DBZIP_LOCK_DIR",
        "DBZIP_LOCK_ID",
        "DBZIP_LOCK_MAX_WAIT_SECS",
        "DBZIP_OUTPUT_DIR",
        "DBZIP_OPERATION_TIMEOUT_SECS",
        "DBZIP_EXPIRATION_DAYS",
        "DBZIP_ARCHIVE_FORMAT",
        "DBZIP_COMPRESSION_LEVEL",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            env::remove_var(var);
        }
    }

    fn create_temp_loader() -> (ConfigLoader, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config_dir =
            Utf8PathBuf::from_path_buf(temp_dir.path().to_path_buf()).expect("Invalid UTF-8 path");
        (ConfigLoader::with_dir(config_dir), temp_dir)
    }

    #[test]
    #[serial]
    fn test_embedded_defaults() {
        clear_env();
        let (loader, _temp) = create_temp_loader();
        let config = loader.load(None).unwrap();
        assert_eq!(config, DbzipConfig::default());
    }

    #[test]
    #[serial]
    fn test_user_file_overrides_only_what_it_names() {
        clear_env();
        let (loader, _temp) = create_temp_loader();
        fs::write(
            loader.user_config_path(),
            r#"
lock:
  id: nightly
  max-wait-secs: 30
backup:
  producer: file
  data-dir: /srv/data
"#,
        )
        .unwrap();

        let config = loader.load(None).unwrap();
        assert_eq!(config.lock.id, "nightly");
        assert_eq!(config.lock.max_wait(), Some(Duration::from_secs(30)));
        assert_eq!(config.lock.namespace_prefix, "Global");
        assert_eq!(config.backup.producer, ProducerKind::File);
        assert_eq!(config.backup.data_dir, Some(PathBuf::from("/srv/data")));
        assert_eq!(config.backup.command.program, "pg_dump");
        assert_eq!(config.archive.format, ArchiveFormat::TarGz);
    }

    #[test]
    #[serial]
    fn test_explicit_path_must_exist() {
        clear_env();
        let (loader, temp) = create_temp_loader();
        let missing = Utf8PathBuf::from_path_buf(temp.path().join("nope.yaml")).unwrap();
        assert!(matches!(
            loader.load(Some(missing.as_path())),
            Err(Error::ConfigNotFound { .. })
        ));

        let explicit = Utf8PathBuf::from_path_buf(temp.path().join("custom.yaml")).unwrap();
        fs::write(&explicit, "archive:\n  format: gzip\n").unwrap();
        // the user file is ignored when a path is given
        fs::write(loader.user_config_path(), "lock:\n  id: ignored\n").unwrap();

        let config = loader.load(Some(explicit.as_path())).unwrap();
        assert_eq!(config.archive.format, ArchiveFormat::Gzip);
        assert_eq!(config.lock.id, "dbzip-backup");
    }

    #[test]
    #[serial]
    fn test_empty_file_is_allowed() {
        clear_env();
        let (loader, _temp) = create_temp_loader();
        fs::write(loader.user_config_path(), "").unwrap();
        assert_eq!(loader.load(None).unwrap(), DbzipConfig::default());
    }

    #[test]
    #[serial]
    fn test_malformed_file_is_invalid_config() {
        clear_env();
        let (loader, _temp) = create_temp_loader();
        fs::write(loader.user_config_path(), "lock: [unclosed").unwrap();
        assert!(matches!(
            loader.load(None),
            Err(Error::InvalidConfig { .. })
        ));
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        let (loader, _temp) = create_temp_loader();

        env::set_var("DBZIP_LOCK_ID", "env-job");
        env::set_var("DBZIP_LOCK_MAX_WAIT_SECS", "90");
        env::set_var("DBZIP_OUTPUT_DIR", "/backups");
        env::set_var("DBZIP_ARCHIVE_FORMAT", "gzip");
        env::set_var("DBZIP_COMPRESSION_LEVEL", "9");

        let config = loader.load(None).unwrap();
        assert_eq!(config.lock.id, "env-job");
        assert_eq!(config.lock.max_wait_secs, Some(90));
        assert_eq!(config.backup.output_dir, PathBuf::from("/backups"));
        assert_eq!(config.archive.format, ArchiveFormat::Gzip);
        assert_eq!(config.archive.level(), 9);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_bad_env_value_names_variable() {
        clear_env();
        let (loader, _temp) = create_temp_loader();
        env::set_var("DBZIP_OPERATION_TIMEOUT_SECS", "soon");

        let err = loader.load(None).unwrap_err();
        assert!(err.to_string().contains("DBZIP_OPERATION_TIMEOUT_SECS"));

        clear_env();
    }

    #[test]
    fn test_merge_yaml_is_deep() {
        let mut base: Value = serde_yaml_ng::from_str("a:\n  b: 1\n  c: 2\nd: 3\n").unwrap();
        let overlay: Value = serde_yaml_ng::from_str("a:\n  c: 20\ne: 5\n").unwrap();
        merge_yaml(&mut base, overlay);

        let expected: Value =
            serde_yaml_ng::from_str("a:\n  b: 1\n  c: 20\nd: 3\ne: 5\n").unwrap();
        assert_eq!(base, expected);
    }
}
