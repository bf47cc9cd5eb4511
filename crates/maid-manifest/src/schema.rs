//! On-disk manifest schema and normalization
//!
//! Manifests exist in two shapes:
//! - **legacy**: `validationCommand` (one argv), `parameters` on functions
//! - **enhanced**: `validationCommands` (list of argv), `args`, structured
//!   `returns`, `raises`, `metadata`
//!
//! Both deserialize into [`RawManifest`] and are normalized by
//! [`normalize`] into one canonical [`Manifest`]. Nothing downstream sees
//! which variant a manifest was written in.

use crate::artifact::{normalize_type, Arg, Artifact, ArtifactKind, ArtifactStatus};
use crate::error::{ManifestError, ManifestResult};
use crate::manifest::{
    CommandSpec, ExpectedArtifacts, FileStatus, Manifest, ManifestDraft, ManifestId, TaskType,
};
use schemars::JsonSchema;
use serde::Deserialize;
use std::path::Path;

/// Raw manifest document
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawManifest {
    /// Task goal
    pub goal: String,
    /// `create`, `edit` or `refactor`
    pub task_type: RawTaskType,
    /// Manifests this one supersedes (names or paths)
    #[serde(default)]
    pub supersedes: Vec<String>,
    /// Files created by the task
    #[serde(default)]
    pub creatable_files: Vec<String>,
    /// Files edited by the task
    #[serde(default)]
    pub editable_files: Vec<String>,
    /// Files read by the task
    #[serde(default)]
    pub readonly_files: Vec<String>,
    /// Declared artifacts for the single target file
    pub expected_artifacts: RawExpectedArtifacts,
    /// Legacy single validation command
    #[serde(default)]
    pub validation_command: Option<Vec<String>>,
    /// Enhanced list of validation commands
    #[serde(default)]
    pub validation_commands: Option<Vec<Vec<String>>>,
    /// Opaque metadata
    #[serde(default)]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
    /// Free-text description (ignored)
    #[serde(default)]
    pub description: Option<String>,
    /// Schema version tag (ignored)
    #[serde(default)]
    pub version: Option<String>,
}

/// Raw task type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RawTaskType {
    /// New file
    Create,
    /// Existing file
    Edit,
    /// Refactor
    Refactor,
}

/// Raw `expectedArtifacts` object
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct RawExpectedArtifacts {
    /// Target file
    pub file: String,
    /// Declared artifacts
    #[serde(default)]
    pub contains: Vec<RawArtifact>,
    /// `absent` when the task deletes the file
    #[serde(default)]
    pub status: Option<RawStatus>,
}

/// Raw presence marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RawStatus {
    /// Present
    Present,
    /// Removed
    Absent,
}

/// Raw artifact declaration
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct RawArtifact {
    /// `function`, `class` or `attribute`
    #[serde(rename = "type")]
    pub kind: RawKind,
    /// Artifact name
    pub name: String,
    /// Owning class
    #[serde(default)]
    pub class: Option<String>,
    /// Base classes
    #[serde(default)]
    pub bases: Option<Vec<String>>,
    /// Enhanced argument list
    #[serde(default)]
    pub args: Option<Vec<RawArg>>,
    /// Legacy argument list
    #[serde(default)]
    pub parameters: Option<Vec<RawArg>>,
    /// Return type
    #[serde(default)]
    pub returns: Option<RawReturns>,
    /// Raised error kinds
    #[serde(default)]
    pub raises: Option<Vec<String>>,
    /// Presence marker
    #[serde(default)]
    pub status: Option<RawStatus>,
    /// Free-text description (ignored)
    #[serde(default)]
    pub description: Option<String>,
}

/// Raw artifact kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RawKind {
    /// Function or method
    Function,
    /// Class
    Class,
    /// Attribute
    Attribute,
}

/// Raw argument: a bare name or a structured entry
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum RawArg {
    /// Bare name
    Name(String),
    /// Structured argument
    Full {
        /// Name
        name: String,
        /// Type
        #[serde(rename = "type", default)]
        ty: Option<String>,
        /// Default value (ignored for comparison)
        #[serde(default)]
        default: Option<serde_json::Value>,
    },
}

/// Raw return type: plain string or `{ "type": ... }`
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum RawReturns {
    /// Plain type name
    Plain(String),
    /// Structured type descriptor
    Structured {
        /// Type name
        #[serde(rename = "type")]
        ty: String,
    },
}

/// JSON schema of the raw manifest document
#[must_use]
pub fn manifest_schema() -> schemars::schema::RootSchema {
    schemars::schema_for!(RawManifest)
}

/// Parse and normalize manifest bytes
///
/// `origin` is the manifest's path; it provides the id.
///
/// # Errors
/// Schema errors, ambiguous variants and invariant violations all surface
/// as [`ManifestError`].
pub fn parse_manifest(origin: &Path, bytes: &[u8]) -> ManifestResult<Manifest> {
    let id = ManifestId::parse(&origin.to_string_lossy())?;
    let raw: RawManifest = serde_json::from_slice(bytes).map_err(|e| ManifestError::Schema {
        manifest: id.to_string(),
        message: e.to_string(),
    })?;
    let digest = blake3::hash(bytes).to_hex().to_string();
    normalize(id, raw, Some(origin.to_path_buf()), Some(digest))
}

/// Normalize a raw manifest into the canonical representation
///
/// # Errors
/// - both `validationCommand` and `validationCommands`, or neither
/// - both `args` and `parameters` on one artifact
/// - signature fields that do not belong to the artifact kind
/// - anything rejected by [`Manifest::new`]
pub fn normalize(
    id: ManifestId,
    raw: RawManifest,
    source: Option<std::path::PathBuf>,
    digest: Option<String>,
) -> ManifestResult<Manifest> {
    let name = id.to_string();

    let validation_commands = match (raw.validation_command, raw.validation_commands) {
        (Some(_), Some(_)) => {
            return Err(ManifestError::malformed(
                &name,
                "both validationCommand and validationCommands are present",
            ))
        }
        (Some(single), None) => vec![CommandSpec::new(single)],
        (None, Some(many)) => many.into_iter().map(CommandSpec::new).collect(),
        (None, None) => {
            return Err(ManifestError::malformed(
                &name,
                "missing validationCommand or validationCommands",
            ))
        }
    };

    let supersedes = raw
        .supersedes
        .iter()
        .map(|reference| ManifestId::parse(reference))
        .collect::<ManifestResult<Vec<_>>>()?;

    let contains = raw
        .expected_artifacts
        .contains
        .into_iter()
        .map(|artifact| normalize_artifact(&name, artifact))
        .collect::<ManifestResult<Vec<_>>>()?;

    let status = match raw.expected_artifacts.status {
        Some(RawStatus::Absent) => FileStatus::Absent,
        Some(RawStatus::Present) | None => FileStatus::Present,
    };

    Manifest::new(ManifestDraft {
        id,
        source,
        digest,
        goal: raw.goal,
        task_type: match raw.task_type {
            RawTaskType::Create => TaskType::Create,
            RawTaskType::Edit => TaskType::Edit,
            RawTaskType::Refactor => TaskType::Refactor,
        },
        supersedes,
        creatable_files: raw.creatable_files,
        editable_files: raw.editable_files,
        readonly_files: raw.readonly_files,
        expected: ExpectedArtifacts {
            file: raw.expected_artifacts.file,
            status,
            contains,
        },
        validation_commands,
        metadata: raw.metadata.unwrap_or_default(),
    })
}

fn normalize_artifact(manifest: &str, raw: RawArtifact) -> ManifestResult<Artifact> {
    let kind = match raw.kind {
        RawKind::Function => ArtifactKind::Function,
        RawKind::Class => ArtifactKind::Class,
        RawKind::Attribute => ArtifactKind::Attribute,
    };
    let label = format!("{kind} {}", raw.name);

    let raw_args = match (raw.args, raw.parameters) {
        (Some(_), Some(_)) => {
            return Err(ManifestError::malformed(
                manifest,
                format!("{label}: both args and parameters are present"),
            ))
        }
        (args, parameters) => args.or(parameters),
    };

    if kind != ArtifactKind::Function && (raw_args.is_some() || raw.returns.is_some()) {
        return Err(ManifestError::malformed(
            manifest,
            format!("{label}: args/returns are only valid on functions"),
        ));
    }
    if kind != ArtifactKind::Class && raw.bases.is_some() {
        return Err(ManifestError::malformed(
            manifest,
            format!("{label}: bases are only valid on classes"),
        ));
    }
    if kind == ArtifactKind::Class && raw.class.is_some() {
        return Err(ManifestError::malformed(
            manifest,
            format!("{label}: nested classes are not supported"),
        ));
    }

    let args = raw_args
        .unwrap_or_default()
        .into_iter()
        .map(|arg| match arg {
            RawArg::Name(name) => Arg::new(name),
            RawArg::Full { name, ty, .. } => Arg {
                name,
                ty: ty.as_deref().map(normalize_type),
            },
        })
        .collect();

    Ok(Artifact {
        kind,
        name: raw.name,
        class: raw.class.filter(|c| !c.trim().is_empty()),
        bases: raw
            .bases
            .unwrap_or_default()
            .iter()
            .map(|base| normalize_type(base))
            .collect(),
        args,
        returns: raw.returns.map(|r| match r {
            RawReturns::Plain(ty) | RawReturns::Structured { ty } => normalize_type(&ty),
        }),
        raises: raw.raises.unwrap_or_default().into_iter().collect(),
        status: match raw.status {
            Some(RawStatus::Absent) => ArtifactStatus::Absent,
            Some(RawStatus::Present) | None => ArtifactStatus::Present,
        },
    })
}
