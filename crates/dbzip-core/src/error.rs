//! Error types for dbzip-core

use thiserror::Error;

use crate::lifecycle::ArtifactState;
use crate::pipeline::Stage;

/// Result type alias using dbzip-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for dbzip
#[derive(Error, Debug)]
pub enum Error {
    /// The named lock is held by another run and the wait policy gave up
    #[error("Timeout waiting for exclusive access on lock {name}{}", holder_suffix(.holder))]
    LockTimeout {
        name: String,
        holder: Option<String>,
    },

    /// The lock file could not be opened or locked
    #[error("Failed to acquire lock {name}: {source}")]
    Lock {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Lock identifier has no usable characters
    #[error("Invalid lock name: {name:?}")]
    InvalidLockName { name: String },

    /// Pipeline stage transition that the state machine does not allow
    #[error("Illegal pipeline transition: {from} -> {to}")]
    IllegalStage { from: Stage, to: Stage },

    /// Artifact lifecycle transition that the bookkeeping does not allow
    #[error("Illegal artifact transition for {path}: {from} -> {to}")]
    IllegalTransition {
        path: String,
        from: ArtifactState,
        to: ArtifactState,
    },

    /// Caller supplied a malformed run request
    #[error("Invalid run request: {message}")]
    InvalidRequest { message: String },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Invalid configuration format
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml_ng::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn holder_suffix(holder: &Option<String>) -> String {
    match holder {
        Some(owner) => format!(" (held by {})", owner),
        None => String::new(),
    }
}

impl Error {
    /// Create a lock timeout error
    pub fn lock_timeout(name: impl Into<String>, holder: Option<String>) -> Self {
        Self::LockTimeout {
            name: name.into(),
            holder,
        }
    }

    /// Create a lock IO error
    pub fn lock(name: impl Into<String>, source: std::io::Error) -> Self {
        Self::Lock {
            name: name.into(),
            source,
        }
    }

    /// Create an invalid request error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Create a config not found error
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    /// Create an invalid config error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Whether this error means "another run owns the lock", as opposed to a defect
    pub fn is_lock_contention(&self) -> bool {
        matches!(self, Self::LockTimeout { .. })
    }

    /// Whether this error is an ordering bug in the pipeline itself rather than bad input
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::IllegalStage { .. } | Self::IllegalTransition { .. })
    }
}
