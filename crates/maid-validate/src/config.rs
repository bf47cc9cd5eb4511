//! Validator configuration
//!
//! Read from `maid.toml` in the project root when present. Every field has a
//! default, so an empty or missing file yields [`ValidatorConfig::default`].
//!
//! ```toml
//! manifest_dir = "manifests"
//! workers = 4
//! sweep_timeout_secs = 120
//! command_timeout_secs = 300
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file name looked up in the project root
pub const CONFIG_FILE: &str = "maid.toml";

/// Validator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidatorConfig {
    /// Manifest directory, relative to the project root
    pub manifest_dir: PathBuf,
    /// Concurrent per-file validations in a sweep
    pub workers: usize,
    /// Overall sweep budget; unfinished files are reported incomplete
    pub sweep_timeout_secs: Option<u64>,
    /// Budget for each validation command
    pub command_timeout_secs: u64,
}

impl ValidatorConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `maid.toml` from `root`, falling back to defaults if absent
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the file exists but cannot be read or parsed.
    pub fn discover(root: &Path) -> Result<Self, ConfigError> {
        let path = root.join(CONFIG_FILE);
        if path.is_file() {
            Self::load(&path)
        } else {
            tracing::debug!("no {} in {}, using defaults", CONFIG_FILE, root.display());
            Ok(Self::default())
        }
    }

    /// Load configuration from a TOML file
    ///
    /// # Errors
    /// Returns [`ConfigError`] on I/O, parse or range errors.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] for zero workers or zero timeouts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.command_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "command_timeout_secs must be at least 1".into(),
            ));
        }
        if self.sweep_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "sweep_timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// With manifest directory
    #[inline]
    #[must_use]
    pub fn with_manifest_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.manifest_dir = dir.into();
        self
    }

    /// With worker count (at least one)
    #[inline]
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// With overall sweep timeout
    #[inline]
    #[must_use]
    pub fn with_sweep_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.sweep_timeout_secs = timeout.map(|t| t.as_secs().max(1));
        self
    }

    /// With per-command timeout
    #[inline]
    #[must_use]
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Sweep timeout as a duration
    #[inline]
    #[must_use]
    pub fn sweep_timeout(&self) -> Option<Duration> {
        self.sweep_timeout_secs.map(Duration::from_secs)
    }

    /// Command timeout as a duration
    #[inline]
    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            manifest_dir: PathBuf::from("manifests"),
            workers: std::thread::available_parallelism().map_or(4, std::num::NonZeroUsize::get),
            sweep_timeout_secs: None,
            command_timeout_secs: 300,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults() {
        let config = ValidatorConfig::default();
        assert_eq!(config.manifest_dir, PathBuf::from("manifests"));
        assert!(config.workers >= 1);
        assert_eq!(config.sweep_timeout(), None);
        assert_eq!(config.command_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "workers = 2\nsweep_timeout_secs = 30\n",
        )
        .unwrap();

        let config = ValidatorConfig::discover(dir.path()).unwrap();
        assert_eq!(config.workers, 2);
        assert_eq!(config.sweep_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.manifest_dir, PathBuf::from("manifests"));
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            ValidatorConfig::discover(dir.path()).unwrap(),
            ValidatorConfig::default()
        );
    }

    #[test]
    fn rejects_unknown_keys_and_zero_workers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);

        std::fs::write(&path, "threads = 2\n").unwrap();
        assert!(matches!(
            ValidatorConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));

        std::fs::write(&path, "workers = 0\n").unwrap();
        assert!(matches!(
            ValidatorConfig::load(&path),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn builders_clamp_to_one() {
        let config = ValidatorConfig::new()
            .with_workers(0)
            .with_command_timeout(Duration::from_millis(10))
            .with_manifest_dir("specs");
        assert_eq!(config.workers, 1);
        assert_eq!(config.command_timeout_secs, 1);
        assert_eq!(config.manifest_dir, PathBuf::from("specs"));
    }
}
