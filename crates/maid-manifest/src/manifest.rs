//! Canonical manifest representation
//!
//! A [`Manifest`] can only be built through [`Manifest::new`], which enforces
//! the structural invariants (single target file, classification exclusivity,
//! unique identity keys). Everything downstream relies on these holding.

use crate::artifact::{Artifact, ArtifactKey};
use crate::error::{ManifestError, ManifestResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;

static SEQUENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:task-)?(\d+)").expect("sequence pattern is valid")
});

/// Manifest file suffixes stripped when deriving an id
const SUFFIXES: [&str; 2] = [".manifest.json", ".json"];

/// Manifest identity and ordering key
///
/// Derived from the file name: `manifests/task-012-cache.manifest.json`
/// has name `task-012-cache` and sequence `12`. Ordering is by sequence,
/// then name; unsequenced manifests sort last.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ManifestId {
    name: String,
    sequence: Option<u64>,
}

impl ManifestId {
    /// Parse an id from a manifest name, file name or path
    pub fn parse(raw: &str) -> ManifestResult<Self> {
        let file_name = raw.rsplit(&['/', '\\'][..]).next().unwrap_or(raw).trim();
        let name = SUFFIXES
            .iter()
            .find_map(|suffix| file_name.strip_suffix(suffix))
            .unwrap_or(file_name);

        if name.is_empty() || name == "." || name == ".." {
            return Err(ManifestError::InvalidName(raw.to_string()));
        }

        let sequence = SEQUENCE
            .captures(name)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok());

        Ok(Self {
            name: name.to_string(),
            sequence,
        })
    }

    /// Manifest name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sequence number, if the name carries one
    #[inline]
    #[must_use]
    pub fn sequence(&self) -> Option<u64> {
        self.sequence
    }

    /// Explicit chronological order between two manifests
    ///
    /// Returns `None` when either side lacks a sequence or both share one:
    /// such manifests have no defined "later".
    #[must_use]
    pub fn explicit_order(&self, other: &Self) -> Option<Ordering> {
        match (self.sequence, other.sequence) {
            (Some(a), Some(b)) if a != b => Some(a.cmp(&b)),
            _ => None,
        }
    }
}

impl Ord for ManifestId {
    fn cmp(&self, other: &Self) -> Ordering {
        let rank = |id: &Self| (id.sequence.is_none(), id.sequence);
        rank(self)
            .cmp(&rank(other))
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl PartialOrd for ManifestId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Display for ManifestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl Serialize for ManifestId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name)
    }
}

/// Kind of task a manifest describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    /// New file
    Create,
    /// Change to an existing file
    Edit,
    /// Structure change preserving behavior
    Refactor,
}

/// How a manifest classifies a file it declares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileClassification {
    /// Created by the task; validated strictly
    Creatable,
    /// Edited by the task; validated permissively
    Editable,
}

/// Presence of the target file itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    /// File exists
    #[default]
    Present,
    /// File was deleted by the task
    Absent,
}

/// Declared artifacts for the single target file of a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpectedArtifacts {
    /// Target file (normalized)
    pub file: String,
    /// File presence
    pub status: FileStatus,
    /// Declared artifacts, unique by identity key
    pub contains: Vec<Artifact>,
}

/// One validation command as an argument vector
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CommandSpec(Vec<String>);

impl CommandSpec {
    /// Wrap an argument vector
    #[inline]
    #[must_use]
    pub fn new(argv: Vec<String>) -> Self {
        Self(argv)
    }

    /// Argument vector
    #[inline]
    #[must_use]
    pub fn argv(&self) -> &[String] {
        &self.0
    }

    /// Program name
    #[inline]
    #[must_use]
    pub fn program(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }
}

impl Display for CommandSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" "))
    }
}

/// Unvalidated manifest fields, turned into a [`Manifest`] by [`Manifest::new`]
#[derive(Debug, Clone)]
pub struct ManifestDraft {
    /// Identity
    pub id: ManifestId,
    /// Source file the manifest was read from
    pub source: Option<PathBuf>,
    /// BLAKE3 digest of the raw manifest bytes
    pub digest: Option<String>,
    /// Free-text goal
    pub goal: String,
    /// Task type
    pub task_type: TaskType,
    /// Superseded manifest references
    pub supersedes: Vec<ManifestId>,
    /// Files created by the task
    pub creatable_files: Vec<String>,
    /// Files edited by the task
    pub editable_files: Vec<String>,
    /// Files read by the task
    pub readonly_files: Vec<String>,
    /// Declared artifacts
    pub expected: ExpectedArtifacts,
    /// Validation commands in declared order
    pub validation_commands: Vec<CommandSpec>,
    /// Opaque metadata
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Canonical, validated manifest
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    id: ManifestId,
    #[serde(skip)]
    source: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    digest: Option<String>,
    goal: String,
    task_type: TaskType,
    supersedes: BTreeSet<ManifestId>,
    files: BTreeMap<String, FileClassification>,
    readonly_files: BTreeSet<String>,
    expected_artifacts: ExpectedArtifacts,
    validation_commands: Vec<CommandSpec>,
    metadata: serde_json::Map<String, serde_json::Value>,
}

impl Manifest {
    /// Validate a draft into a manifest
    ///
    /// # Errors
    /// - empty goal or empty command vector
    /// - a file listed as both creatable and editable
    /// - target file not among creatable/editable files
    /// - duplicate identity keys in the declared artifacts
    pub fn new(draft: ManifestDraft) -> ManifestResult<Self> {
        let name = draft.id.name().to_string();

        if draft.goal.trim().is_empty() {
            return Err(ManifestError::malformed(&name, "goal must not be empty"));
        }

        if let Some(pos) = draft
            .validation_commands
            .iter()
            .position(|cmd| cmd.argv().is_empty())
        {
            return Err(ManifestError::malformed(
                &name,
                format!("validation command #{} is empty", pos + 1),
            ));
        }

        let mut files = BTreeMap::new();
        for file in draft.creatable_files.iter().map(|f| normalize_path(f)) {
            files.insert(file, FileClassification::Creatable);
        }
        for file in draft.editable_files.iter().map(|f| normalize_path(f)) {
            if files.get(&file) == Some(&FileClassification::Creatable) {
                return Err(ManifestError::malformed(
                    &name,
                    format!("{file} is listed as both creatable and editable"),
                ));
            }
            files.insert(file, FileClassification::Editable);
        }

        let mut expected = draft.expected;
        expected.file = normalize_path(&expected.file);
        if !files.contains_key(&expected.file) {
            return Err(ManifestError::malformed(
                &name,
                format!(
                    "expectedArtifacts.file {} is not in creatableFiles or editableFiles",
                    expected.file
                ),
            ));
        }

        if expected.status == FileStatus::Absent && expected.contains.iter().any(|a| !a.is_absent()) {
            return Err(ManifestError::malformed(
                &name,
                format!("{} is declared absent but lists present artifacts", expected.file),
            ));
        }

        let mut seen: HashSet<ArtifactKey> = HashSet::new();
        for artifact in &expected.contains {
            if artifact.name.trim().is_empty() {
                return Err(ManifestError::malformed(&name, "artifact name must not be empty"));
            }
            let key = artifact.key();
            if !seen.insert(key.clone()) {
                return Err(ManifestError::DuplicateArtifact {
                    manifest: name,
                    file: expected.file.clone(),
                    artifact: key,
                });
            }
        }

        Ok(Self {
            id: draft.id,
            source: draft.source,
            digest: draft.digest,
            goal: draft.goal,
            task_type: draft.task_type,
            supersedes: draft.supersedes.into_iter().collect(),
            files,
            readonly_files: draft.readonly_files.iter().map(|f| normalize_path(f)).collect(),
            expected_artifacts: expected,
            validation_commands: draft.validation_commands,
            metadata: draft.metadata,
        })
    }

    /// Identity
    #[inline]
    #[must_use]
    pub fn id(&self) -> &ManifestId {
        &self.id
    }

    /// File the manifest was loaded from
    #[inline]
    #[must_use]
    pub fn source(&self) -> Option<&PathBuf> {
        self.source.as_ref()
    }

    /// Digest of the raw manifest bytes
    #[inline]
    #[must_use]
    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// Goal text
    #[inline]
    #[must_use]
    pub fn goal(&self) -> &str {
        &self.goal
    }

    /// Task type
    #[inline]
    #[must_use]
    pub fn task_type(&self) -> TaskType {
        self.task_type
    }

    /// Superseded manifests
    #[inline]
    #[must_use]
    pub fn supersedes(&self) -> &BTreeSet<ManifestId> {
        &self.supersedes
    }

    /// Declared files and their classification
    #[inline]
    #[must_use]
    pub fn files(&self) -> &BTreeMap<String, FileClassification> {
        &self.files
    }

    /// Read-only files
    #[inline]
    #[must_use]
    pub fn readonly_files(&self) -> &BTreeSet<String> {
        &self.readonly_files
    }

    /// Declared artifacts
    #[inline]
    #[must_use]
    pub fn expected_artifacts(&self) -> &ExpectedArtifacts {
        &self.expected_artifacts
    }

    /// Validation commands
    #[inline]
    #[must_use]
    pub fn validation_commands(&self) -> &[CommandSpec] {
        &self.validation_commands
    }

    /// Opaque metadata
    #[inline]
    #[must_use]
    pub fn metadata(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.metadata
    }

    /// Classification of `file`, if declared
    #[must_use]
    pub fn classification_of(&self, file: &str) -> Option<FileClassification> {
        self.files.get(&normalize_path(file)).copied()
    }

    /// Whether the manifest creates, edits or targets `file`
    #[must_use]
    pub fn touches(&self, file: &str) -> bool {
        let file = normalize_path(file);
        self.files.contains_key(&file) || self.expected_artifacts.file == file
    }

    /// Whether the manifest declares artifacts for `file`
    #[must_use]
    pub fn targets(&self, file: &str) -> bool {
        self.expected_artifacts.file == normalize_path(file)
    }

    /// Whether the manifest lists `file` as read-only
    #[must_use]
    pub fn reads(&self, file: &str) -> bool {
        self.readonly_files.contains(&normalize_path(file))
    }
}

/// Normalize a manifest-relative path
///
/// Backslashes become slashes, leading `./` segments and duplicate slashes
/// are dropped.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    let unified = path.trim().replace('\\', "/");
    unified
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Manifests referencing one file, grouped by reference type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileReferences {
    /// File in `creatableFiles`
    pub created_by: Vec<ManifestId>,
    /// File in `editableFiles`
    pub edited_by: Vec<ManifestId>,
    /// File in `readonlyFiles`
    pub read_by: Vec<ManifestId>,
}

impl FileReferences {
    /// Number of distinct manifests referencing the file
    #[must_use]
    pub fn total(&self) -> usize {
        self.created_by
            .iter()
            .chain(&self.edited_by)
            .chain(&self.read_by)
            .collect::<BTreeSet<_>>()
            .len()
    }
}

/// Ordered, name-unique collection of manifests
#[derive(Debug, Clone, Default)]
pub struct ManifestSet {
    manifests: BTreeMap<ManifestId, Manifest>,
}

impl ManifestSet {
    /// Empty set
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from manifests
    ///
    /// # Errors
    /// Returns [`ManifestError::DuplicateManifest`] if two share a name.
    pub fn from_manifests(manifests: impl IntoIterator<Item = Manifest>) -> ManifestResult<Self> {
        let mut set = Self::new();
        for manifest in manifests {
            set.insert(manifest)?;
        }
        Ok(set)
    }

    /// Insert a manifest
    ///
    /// # Errors
    /// Returns [`ManifestError::DuplicateManifest`] if the name is taken.
    pub fn insert(&mut self, manifest: Manifest) -> ManifestResult<()> {
        if self.manifests.contains_key(manifest.id()) {
            return Err(ManifestError::DuplicateManifest(manifest.id().to_string()));
        }
        self.manifests.insert(manifest.id().clone(), manifest);
        Ok(())
    }

    /// Lookup by id
    #[inline]
    #[must_use]
    pub fn get(&self, id: &ManifestId) -> Option<&Manifest> {
        self.manifests.get(id)
    }

    /// Lookup by name or path
    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<&Manifest> {
        ManifestId::parse(name).ok().and_then(|id| self.get(&id))
    }

    /// Whether a manifest with this id exists
    #[inline]
    #[must_use]
    pub fn contains(&self, id: &ManifestId) -> bool {
        self.manifests.contains_key(id)
    }

    /// Manifests in id order
    pub fn iter(&self) -> impl Iterator<Item = &Manifest> {
        self.manifests.values()
    }

    /// Number of manifests
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.manifests.len()
    }

    /// Whether the set is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.manifests.is_empty()
    }

    /// Manifests that create, edit or target `file`, in id order
    pub fn referencing<'s>(&'s self, file: &str) -> impl Iterator<Item = &'s Manifest> + 's {
        let file = normalize_path(file);
        self.manifests.values().filter(move |m| m.touches(&file))
    }

    /// All files created, edited or targeted by any manifest, sorted
    #[must_use]
    pub fn files(&self) -> BTreeSet<String> {
        self.manifests
            .values()
            .flat_map(|m| {
                m.files()
                    .keys()
                    .cloned()
                    .chain(std::iter::once(m.expected_artifacts().file.clone()))
            })
            .collect()
    }

    /// Manifests referencing `file`, grouped by reference type
    #[must_use]
    pub fn references(&self, file: &str) -> FileReferences {
        let mut refs = FileReferences::default();
        for manifest in self.manifests.values() {
            match manifest.classification_of(file) {
                Some(FileClassification::Creatable) => refs.created_by.push(manifest.id().clone()),
                Some(FileClassification::Editable) => refs.edited_by.push(manifest.id().clone()),
                None => {}
            }
            if manifest.reads(file) {
                refs.read_by.push(manifest.id().clone());
            }
        }
        refs
    }
}
