//! Error types for manifest loading and normalization
//!
//! Every variant carries the manifest it concerns so that a rejected
//! manifest can be traced back to its file.

use crate::artifact::ArtifactKey;
use std::path::PathBuf;

/// Errors raised while loading or normalizing manifests
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// Manifest file could not be read
    #[error("io error reading {path}: {source}")]
    Io {
        /// Offending path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Manifest is not valid JSON or does not match the schema
    #[error("manifest {manifest}: schema violation: {message}")]
    Schema {
        /// Manifest name
        manifest: String,
        /// Parser message
        message: String,
    },

    /// Manifest parsed but breaks a structural invariant
    #[error("manifest {manifest}: {reason}")]
    Malformed {
        /// Manifest name
        manifest: String,
        /// What is wrong
        reason: String,
    },

    /// The same identity key appears twice in one manifest
    #[error("manifest {manifest}: duplicate artifact {artifact} for {file}")]
    DuplicateArtifact {
        /// Manifest name
        manifest: String,
        /// Target file
        file: String,
        /// Duplicated identity
        artifact: ArtifactKey,
    },

    /// A manifest with the same name is already in the set
    #[error("duplicate manifest name: {0}")]
    DuplicateManifest(String),

    /// Manifest file name does not yield an id
    #[error("invalid manifest name: {0:?}")]
    InvalidName(String),
}

impl ManifestError {
    /// Create malformed error
    pub fn malformed(manifest: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            manifest: manifest.into(),
            reason: reason.into(),
        }
    }

    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result alias for manifest operations
pub type ManifestResult<T> = Result<T, ManifestError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactKind;

    #[test]
    fn malformed_display() {
        let err = ManifestError::malformed("task-001", "goal must not be empty");
        assert_eq!(err.to_string(), "manifest task-001: goal must not be empty");
    }

    #[test]
    fn duplicate_display_names_artifact() {
        let err = ManifestError::DuplicateArtifact {
            manifest: "task-002".into(),
            file: "src/a.py".into(),
            artifact: ArtifactKey::new(ArtifactKind::Function, None, "f"),
        };
        assert!(err.to_string().contains("function f"));
        assert!(err.to_string().contains("src/a.py"));
    }
}
