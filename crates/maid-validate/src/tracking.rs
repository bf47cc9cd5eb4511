//! File tracking - which source files are covered by manifests
//!
//! Walks the project tree for files an extractor understands and classifies
//! each one:
//! - `undeclared`: no manifest references it
//! - `registered`: referenced (possibly read-only), but no active manifest
//!   declares artifacts for it
//! - `tracked`: an active manifest declares its artifacts

use crate::error::ValidateError;
use maid_chain::ChainResolver;
use maid_extract::ExtractorRegistry;
use maid_manifest::{normalize_path, ManifestId, ManifestSet};
use serde::Serialize;
use std::path::Path;
use walkdir::{DirEntry, WalkDir};

/// Directory names never descended into
const IGNORED_DIRS: [&str; 6] = [
    "__pycache__",
    "node_modules",
    "target",
    "venv",
    "build",
    "dist",
];

/// Coverage of one file
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingStatus {
    /// No manifest references the file
    Undeclared,
    /// Referenced without an active artifact declaration
    Registered,
    /// Artifacts declared by an active manifest
    Tracked,
}

/// One walked file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackedFile {
    /// Path relative to the project root
    pub path: String,
    /// Coverage
    pub status: TrackingStatus,
    /// Manifests referencing the file in any way
    pub manifests: Vec<ManifestId>,
}

/// Coverage of a project tree
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrackingReport {
    /// Files sorted by path
    pub files: Vec<TrackedFile>,
}

impl TrackingReport {
    /// Files with `status`
    pub fn with_status(&self, status: TrackingStatus) -> impl Iterator<Item = &TrackedFile> {
        self.files.iter().filter(move |f| f.status == status)
    }

    /// Number of files with `status`
    #[must_use]
    pub fn count(&self, status: TrackingStatus) -> usize {
        self.with_status(status).count()
    }
}

/// Classify every extractable file under `root`
///
/// Hidden directories, the manifest directory and common build or
/// environment directories are skipped.
///
/// # Errors
/// Returns [`ValidateError::Walk`] if `root` itself cannot be read.
pub fn track_files(
    root: &Path,
    manifest_dir: &Path,
    set: &ManifestSet,
    registry: &ExtractorRegistry,
) -> Result<TrackingReport, ValidateError> {
    if !root.is_dir() {
        return Err(ValidateError::Walk {
            path: root.to_path_buf(),
            message: "not a directory".into(),
        });
    }

    let manifest_dir = root.join(manifest_dir);
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !skipped(entry, &manifest_dir));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                tracing::warn!("skipping unreadable entry: {}", error);
                continue;
            }
        };
        if !entry.file_type().is_file() || !registry.supports(entry.path()) {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let path = normalize_path(&relative.to_string_lossy());
        files.push(classify(set, path));
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(TrackingReport { files })
}

fn skipped(entry: &DirEntry, manifest_dir: &Path) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || IGNORED_DIRS.contains(&&*name) || entry.path() == manifest_dir
}

fn classify(set: &ManifestSet, path: String) -> TrackedFile {
    let refs = set.references(&path);
    let mut manifests: Vec<ManifestId> = refs
        .created_by
        .iter()
        .chain(&refs.edited_by)
        .chain(&refs.read_by)
        .chain(set.referencing(&path).map(|m| m.id()))
        .cloned()
        .collect();
    manifests.sort();
    manifests.dedup();

    let status = if manifests.is_empty() {
        TrackingStatus::Undeclared
    } else {
        match ChainResolver::new(set).resolve_chain(&path) {
            Ok(chain) if chain.active().iter().any(|m| m.targets(&path)) => TrackingStatus::Tracked,
            Ok(_) => TrackingStatus::Registered,
            Err(error) => {
                tracing::warn!("{}: {}", path, error);
                TrackingStatus::Registered
            }
        }
    };

    TrackedFile {
        path,
        status,
        manifests,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maid_extract::default_extractors;
    use maid_test_utils::{func, manifest_set, ManifestBuilder};
    use pretty_assertions::assert_eq;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "").unwrap();
    }

    #[test]
    fn classifies_walked_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for rel in [
            "src/tracked.py",
            "src/registered.py",
            "src/loose.py",
            "src/notes.txt",
            ".venv/lib/site.py",
            "src/__pycache__/tracked.py",
            "manifests/helper.py",
        ] {
            touch(root, rel);
        }

        let set = manifest_set(vec![
            ManifestBuilder::create("task-001", "src/tracked.py")
                .declare(func("f", &[], "None"))
                .readonly("src/registered.py")
                .build(),
        ]);
        let report = track_files(root, Path::new("manifests"), &set, &default_extractors()).unwrap();

        let summary: Vec<(&str, TrackingStatus)> =
            report.files.iter().map(|f| (f.path.as_str(), f.status)).collect();
        assert_eq!(
            summary,
            vec![
                ("src/loose.py", TrackingStatus::Undeclared),
                ("src/registered.py", TrackingStatus::Registered),
                ("src/tracked.py", TrackingStatus::Tracked),
            ]
        );
        assert_eq!(report.count(TrackingStatus::Undeclared), 1);
        assert_eq!(report.files[2].manifests[0].name(), "task-001");
    }

    #[test]
    fn superseded_target_is_registered() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.py");

        // task-002 takes over a.py as editable but targets another file.
        let set = manifest_set(vec![
            ManifestBuilder::create("task-001", "a.py").build(),
            ManifestBuilder::edit("task-002", "b.py")
                .also_editable("a.py")
                .supersedes("task-001")
                .build(),
        ]);
        let report =
            track_files(dir.path(), Path::new("manifests"), &set, &default_extractors()).unwrap();
        assert_eq!(report.files[0].status, TrackingStatus::Registered);
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = track_files(
            &dir.path().join("nope"),
            Path::new("manifests"),
            &ManifestSet::new(),
            &default_extractors(),
        );
        assert!(matches!(result, Err(ValidateError::Walk { .. })));
    }
}
