//! Error types for validation
//!
//! Discrepancies found while validating are data ([`crate::Issue`]); the
//! errors here are infrastructure failures that stop an operation outright:
//! - manifest directory cannot be read
//! - configuration cannot be loaded
//! - a validation command cannot be run
//! - a snapshot cannot be extracted or written

use maid_chain::ChainError;
use maid_manifest::ManifestError;
use std::path::PathBuf;
use std::time::Duration;

/// Validation infrastructure errors
#[derive(Debug, thiserror::Error)]
pub enum ValidateError {
    /// Manifest directory could not be loaded
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// Configuration error
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// No manifest creates, edits or targets the file
    #[error("no manifest references {0}")]
    Untracked(String),

    /// Path lies outside the project root
    #[error("{path} is outside the project root {root}")]
    OutsideRoot {
        /// Offending path
        path: PathBuf,
        /// Project root
        root: PathBuf,
    },

    /// File tree could not be walked
    #[error("walk error under {path}: {message}")]
    Walk {
        /// Directory being walked
        path: PathBuf,
        /// Underlying error
        message: String,
    },

    /// Supersession chain could not be resolved
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    /// File cannot be snapshotted
    #[error("cannot snapshot {file}: {message}")]
    Snapshot {
        /// Project-relative file
        file: String,
        /// Reason
        message: String,
    },

    /// Snapshot target exists and overwriting was not requested
    #[error("{0} already exists (use --force to overwrite)")]
    SnapshotExists(PathBuf),

    /// Output could not be written
    #[error("io error writing {path}: {source}")]
    Io {
        /// Output path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by a [`crate::CommandRunner`]
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// Command has no program
    #[error("empty command")]
    EmptyCommand,

    /// Process could not be started
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        /// Rendered command
        command: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Command exceeded its time budget
    #[error("`{command}` timed out after {}s", .timeout.as_secs())]
    Timeout {
        /// Rendered command
        command: String,
        /// Budget that expired
        timeout: Duration,
    },
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("io error reading {path}: {source}")]
    Io {
        /// Config path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for the config schema
    #[error("invalid config {path}: {source}")]
    Parse {
        /// Config path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: toml::de::Error,
    },

    /// Value out of range
    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Result alias for validation operations
pub type ValidateResult<T> = Result<T, ValidateError>;
