//! Manifest store - loads a manifest directory
//!
//! Loading never stops at the first bad manifest: every `*.manifest.json`
//! file is either normalized into the [`ManifestSet`] or recorded as a
//! [`RejectedManifest`], together with the files it appears to reference so
//! that validation of those files can fail with a traceable cause.

use crate::error::{ManifestError, ManifestResult};
use crate::manifest::{normalize_path, ManifestId, ManifestSet};
use crate::schema::parse_manifest;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Suffix of manifest files inside a manifest directory
pub const MANIFEST_SUFFIX: &str = ".manifest.json";

/// A manifest file that could not be loaded
#[derive(Debug, Clone, Serialize)]
pub struct RejectedManifest {
    /// Manifest path
    pub path: PathBuf,
    /// Manifest id, when the file name yields one
    pub id: Option<ManifestId>,
    /// Files the document appears to reference
    pub files: Vec<String>,
    /// Rejection reason
    pub reason: String,
}

impl RejectedManifest {
    /// Whether the rejected document references `file`
    #[must_use]
    pub fn references(&self, file: &str) -> bool {
        let file = normalize_path(file);
        self.files.iter().any(|f| *f == file)
    }
}

/// Result of loading a manifest directory
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Successfully normalized manifests
    pub manifests: ManifestSet,
    /// Manifests that failed to load
    pub rejected: Vec<RejectedManifest>,
}

impl LoadReport {
    /// Whether every manifest loaded
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }

    /// Rejected manifests referencing `file`
    pub fn rejected_for<'s>(&'s self, file: &str) -> impl Iterator<Item = &'s RejectedManifest> + 's {
        let file = normalize_path(file);
        self.rejected.iter().filter(move |r| r.references(&file))
    }
}

/// Loader for a directory of manifests
#[derive(Debug, Clone)]
pub struct ManifestStore {
    dir: PathBuf,
}

impl ManifestStore {
    /// Create store rooted at `dir`
    #[inline]
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Manifest directory
    #[inline]
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Paths of all manifest files, sorted
    ///
    /// # Errors
    /// Returns [`ManifestError::Io`] if the directory cannot be listed.
    pub fn manifest_paths(&self) -> ManifestResult<Vec<PathBuf>> {
        let entries =
            std::fs::read_dir(&self.dir).map_err(|e| ManifestError::io_error(&self.dir, e))?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ManifestError::io_error(&self.dir, e))?;
            let path = entry.path();
            let is_manifest = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(MANIFEST_SUFFIX));
            if is_manifest && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Load every manifest in the directory
    ///
    /// # Errors
    /// Only directory-level I/O failures are errors; per-manifest problems
    /// are collected in [`LoadReport::rejected`].
    pub fn load(&self) -> ManifestResult<LoadReport> {
        let mut report = LoadReport::default();

        for path in self.manifest_paths()? {
            let bytes = match std::fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    report.rejected.push(reject(&path, &[], &ManifestError::io_error(&path, e)));
                    continue;
                }
            };

            let outcome =
                parse_manifest(&path, &bytes).and_then(|manifest| report.manifests.insert(manifest));
            if let Err(error) = outcome {
                tracing::warn!("rejected manifest {}: {}", path.display(), error);
                report.rejected.push(reject(&path, &bytes, &error));
            }
        }

        tracing::debug!(
            "loaded {} manifests from {} ({} rejected)",
            report.manifests.len(),
            self.dir.display(),
            report.rejected.len()
        );
        Ok(report)
    }
}

fn reject(path: &Path, bytes: &[u8], error: &ManifestError) -> RejectedManifest {
    RejectedManifest {
        path: path.to_path_buf(),
        id: ManifestId::parse(&path.to_string_lossy()).ok(),
        files: referenced_files(bytes),
        reason: error.to_string(),
    }
}

/// Best-effort extraction of file references from an unparseable manifest
fn referenced_files(bytes: &[u8]) -> Vec<String> {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(bytes) else {
        return Vec::new();
    };

    let listed = ["creatableFiles", "editableFiles"]
        .iter()
        .filter_map(|key| value.get(key).and_then(|v| v.as_array()))
        .flatten()
        .filter_map(|v| v.as_str());
    let target = value
        .get("expectedArtifacts")
        .and_then(|e| e.get("file"))
        .and_then(|f| f.as_str());

    let mut files: Vec<String> = listed.chain(target).map(normalize_path).collect();
    files.sort();
    files.dedup();
    files
}
