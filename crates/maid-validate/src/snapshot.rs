//! Manifest snapshots
//!
//! - [`snapshot_file`]: a new manifest recording the current public
//!   structure of one file, superseding the active manifests that target it
//! - [`snapshot_system`]: the merged expected artifacts of every tracked file
//!   in one system-wide document
//!
//! Snapshot manifests are written in the enhanced schema and re-parsed
//! before they touch the disk, so a snapshot that is written always loads.

use crate::error::{ValidateError, ValidateResult};
use crate::pipeline::Validator;
use maid_chain::{merge, ChainResolver};
use maid_manifest::{
    parse_manifest, Arg, Artifact, ArtifactKey, ArtifactKind, CommandSpec, LoadReport,
    ManifestId, ManifestSet, TaskType, MANIFEST_SUFFIX,
};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Schema version written into system snapshots
pub const SYSTEM_SNAPSHOT_VERSION: &str = "1";

/// One artifact in manifest form
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactEntry {
    /// `function`, `class` or `attribute`
    #[serde(rename = "type")]
    pub kind: ArtifactKind,
    /// Artifact name
    pub name: String,
    /// Owning class
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    /// Base classes
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bases: Vec<String>,
    /// Arguments, functions only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<Arg>>,
    /// Return type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub returns: Option<String>,
    /// Raised error kinds
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub raises: Vec<String>,
}

impl From<&Artifact> for ArtifactEntry {
    fn from(artifact: &Artifact) -> Self {
        let is_function = artifact.kind == ArtifactKind::Function;
        Self {
            kind: artifact.kind,
            name: artifact.name.clone(),
            class: artifact.class.clone(),
            bases: artifact.bases.clone(),
            args: is_function.then(|| artifact.args.clone()),
            returns: if is_function {
                artifact.returns.clone()
            } else {
                None
            },
            raises: artifact.raises.iter().cloned().collect(),
        }
    }
}

/// Artifacts of one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactListing {
    /// Project-relative file
    pub file: String,
    /// Artifacts, in source order for file snapshots and identity order for
    /// system snapshots
    pub contains: Vec<ArtifactEntry>,
}

/// Manifest document written by [`snapshot_file`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestDocument {
    /// Task goal
    pub goal: String,
    /// `create` for a first record, `edit` when earlier manifests exist
    pub task_type: TaskType,
    /// Manifests replaced by the snapshot
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub supersedes: Vec<ManifestId>,
    /// The snapshotted file; strict, since every public artifact is listed
    pub creatable_files: Vec<String>,
    /// Declared artifacts
    pub expected_artifacts: ArtifactListing,
    /// Commands carried over from the superseded manifests
    pub validation_commands: Vec<CommandSpec>,
}

/// Where and how [`snapshot_file`] writes
#[derive(Debug, Clone, Default)]
pub struct SnapshotOptions {
    /// Output directory relative to the root; defaults to the manifest directory
    pub output_dir: Option<PathBuf>,
    /// Overwrite an existing manifest file
    pub force: bool,
}

/// A written file snapshot
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    /// New manifest id
    pub id: ManifestId,
    /// Written manifest file
    pub manifest_path: PathBuf,
    /// Manifests the snapshot supersedes
    pub superseded_manifests: Vec<ManifestId>,
    /// Written document
    pub manifest: ManifestDocument,
}

/// Snapshot the public structure of `path` into a new manifest
///
/// The manifest gets the next free task number and supersedes the active
/// manifests targeting the file. Private artifacts are left out; of repeated
/// definitions only the first is recorded.
///
/// # Errors
/// - the file is missing or outside the root
/// - the file cannot be extracted
/// - the file's chain has a supersession cycle
/// - the target manifest exists and `force` is not set
/// - the manifest cannot be written
pub fn snapshot_file(
    validator: &Validator,
    path: &Path,
    options: &SnapshotOptions,
) -> ValidateResult<Snapshot> {
    let file = validator.relative_path(path)?;
    let absolute = validator.root().join(&file);
    if !absolute.is_file() {
        return Err(ValidateError::Snapshot {
            file,
            message: "file does not exist".into(),
        });
    }

    // A project without manifests yet gets its first record.
    let report = if validator.manifest_dir().is_dir() {
        validator.load()?
    } else {
        LoadReport::default()
    };
    let artifacts = validator
        .registry()
        .extract_file(&absolute)
        .map_err(|error| ValidateError::Snapshot {
            file: file.clone(),
            message: error.to_string(),
        })?;

    let mut seen: BTreeSet<ArtifactKey> = BTreeSet::new();
    let mut contains = Vec::new();
    for artifact in &artifacts {
        let key = artifact.key();
        if key.is_private() {
            continue;
        }
        if !seen.insert(key.clone()) {
            tracing::warn!("{}: {} defined more than once, keeping the first", file, key);
            continue;
        }
        contains.push(ArtifactEntry::from(artifact));
    }

    let chain = ChainResolver::new(&report.manifests).resolve_chain(&file)?;
    let replaced: Vec<_> = chain
        .active()
        .iter()
        .copied()
        .filter(|m| m.targets(&file))
        .collect();
    let mut validation_commands: Vec<CommandSpec> = Vec::new();
    for command in replaced.iter().flat_map(|m| m.validation_commands()) {
        if !validation_commands.contains(command) {
            validation_commands.push(command.clone());
        }
    }
    let superseded: Vec<ManifestId> = replaced.iter().map(|m| m.id().clone()).collect();

    let sequence = report
        .manifests
        .iter()
        .map(|m| m.id())
        .chain(report.rejected.iter().filter_map(|r| r.id.as_ref()))
        .filter_map(ManifestId::sequence)
        .max()
        .unwrap_or(0)
        + 1;
    let name = format!("task-{sequence:03}-snapshot-{}", slug(&file));

    let manifest = ManifestDocument {
        goal: format!("Snapshot of the public structure of {file}"),
        task_type: if superseded.is_empty() {
            TaskType::Create
        } else {
            TaskType::Edit
        },
        supersedes: superseded.clone(),
        creatable_files: vec![file.clone()],
        expected_artifacts: ArtifactListing {
            file: file.clone(),
            contains,
        },
        validation_commands,
    };

    let file_name = format!("{name}{MANIFEST_SUFFIX}");
    let bytes = serde_json::to_vec_pretty(&manifest).map_err(|error| ValidateError::Snapshot {
        file: file.clone(),
        message: error.to_string(),
    })?;
    let parsed = parse_manifest(Path::new(&file_name), &bytes)?;

    let output_dir = validator.root().join(
        options
            .output_dir
            .as_deref()
            .unwrap_or(&validator.config().manifest_dir),
    );
    let manifest_path = output_dir.join(&file_name);
    if manifest_path.exists() && !options.force {
        return Err(ValidateError::SnapshotExists(manifest_path));
    }
    std::fs::create_dir_all(&output_dir).map_err(|source| ValidateError::Io {
        path: output_dir.clone(),
        source,
    })?;
    std::fs::write(&manifest_path, &bytes).map_err(|source| ValidateError::Io {
        path: manifest_path.clone(),
        source,
    })?;
    tracing::info!(
        "snapshot of {} written to {} ({} artifacts)",
        file,
        manifest_path.display(),
        manifest.expected_artifacts.contains.len()
    );

    Ok(Snapshot {
        id: parsed.id().clone(),
        manifest_path,
        superseded_manifests: superseded,
        manifest,
    })
}

/// Lowercase file stem with separators folded to `-`
fn slug(file: &str) -> String {
    let stem = Path::new(file)
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let slug: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "file".to_string()
    } else {
        slug.to_string()
    }
}

/// System-wide manifest written by `snapshot-system`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemManifest {
    /// Document version
    pub version: String,
    /// Description of the snapshot
    pub goal: String,
    /// Always `system-snapshot`
    pub task_type: String,
    /// Merged expected artifacts, one entry per file, sorted by file
    pub system_artifacts: Vec<ArtifactListing>,
    /// Commands of the globally active manifests, deduplicated in id order
    pub validation_commands: Vec<CommandSpec>,
}

/// File left out of a system snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    /// Project-relative file
    pub file: String,
    /// Why it was left out
    pub reason: String,
}

/// Result of [`snapshot_system`]
#[derive(Debug, Clone, Serialize)]
pub struct SystemSnapshot {
    /// The system manifest
    pub manifest: SystemManifest,
    /// Files whose chain could not be resolved or merged
    pub skipped: Vec<SkippedFile>,
}

impl SystemSnapshot {
    /// Number of files with artifacts
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.manifest.system_artifacts.len()
    }

    /// Number of artifacts over all files
    #[must_use]
    pub fn artifact_count(&self) -> usize {
        self.manifest
            .system_artifacts
            .iter()
            .map(|listing| listing.contains.len())
            .sum()
    }
}

/// Merge the active declarations of every file into one document
///
/// Files with chain errors are skipped and reported, files removed by
/// their chain or declaring nothing are left out.
#[must_use]
pub fn snapshot_system(set: &ManifestSet) -> SystemSnapshot {
    let resolver = ChainResolver::new(set);
    let mut system_artifacts = Vec::new();
    let mut skipped = Vec::new();

    for file in set.files() {
        let expected = match resolver.resolve_chain(&file).and_then(|chain| merge(&chain)) {
            Ok(expected) => expected,
            Err(error) => {
                tracing::warn!("{}: left out of system snapshot: {}", file, error);
                skipped.push(SkippedFile {
                    file,
                    reason: error.to_string(),
                });
                continue;
            }
        };
        if expected.file_removed_by().is_some() || expected.is_empty() {
            continue;
        }
        system_artifacts.push(ArtifactListing {
            contains: expected.artifacts().map(ArtifactEntry::from).collect(),
            file,
        });
    }

    let (active, _) = resolver.resolve_all_isolating();
    let mut validation_commands: Vec<CommandSpec> = Vec::new();
    for command in active.active().iter().flat_map(|m| m.validation_commands()) {
        if !validation_commands.contains(command) {
            validation_commands.push(command.clone());
        }
    }

    let manifest = SystemManifest {
        version: SYSTEM_SNAPSHOT_VERSION.to_string(),
        goal: format!(
            "System-wide snapshot of {} files from active manifests",
            system_artifacts.len()
        ),
        task_type: "system-snapshot".to_string(),
        system_artifacts,
        validation_commands,
    };
    tracing::debug!(
        "system snapshot: {} files, {} skipped",
        manifest.system_artifacts.len(),
        skipped.len()
    );
    SystemSnapshot { manifest, skipped }
}
