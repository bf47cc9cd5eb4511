//! Structural comparator
//!
//! Compares the merged expected set of a file with its extracted artifacts.
//!
//! - strict (creatable files): public actual artifacts must equal the
//!   expected set, signatures included
//! - permissive (editable files): expected artifacts must be a subset of the
//!   public actual artifacts, signatures included
//!
//! Private artifacts are ignored on both sides. Every discrepancy is
//! collected; nothing short-circuits after the first problem.

use maid_chain::ExpectedSet;
use maid_manifest::{Artifact, ArtifactKey, FileClassification, ManifestId, SignatureField};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Comparison semantics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Public actual artifacts must equal the expected set
    Strict,
    /// Expected artifacts must be a subset of the actual ones
    Permissive,
}

impl ValidationMode {
    /// Mode implied by a file classification
    #[inline]
    #[must_use]
    pub fn for_classification(classification: FileClassification) -> Self {
        match classification {
            FileClassification::Creatable => Self::Strict,
            FileClassification::Editable => Self::Permissive,
        }
    }
}

impl Display for ValidationMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Strict => "strict",
            Self::Permissive => "permissive",
        })
    }
}

impl FromStr for ValidationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strict" => Ok(Self::Strict),
            "permissive" => Ok(Self::Permissive),
            other => Err(format!("unknown validation mode '{other}'")),
        }
    }
}

/// Outcome code, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResultCode {
    /// Everything matched
    Ok,
    /// Structural discrepancy
    StructuralFail,
    /// Chain or manifest problem
    ChainFail,
    /// Validation command failed
    BehavioralFail,
}

impl ResultCode {
    /// Process exit code
    #[inline]
    #[must_use]
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::StructuralFail => 1,
            Self::ChainFail => 2,
            Self::BehavioralFail => 3,
        }
    }

    /// Rank used to pick the most severe code: chain > structural > behavioral
    #[inline]
    #[must_use]
    pub fn severity(self) -> u8 {
        match self {
            Self::Ok => 0,
            Self::BehavioralFail => 1,
            Self::StructuralFail => 2,
            Self::ChainFail => 3,
        }
    }

    /// Most severe of `codes`, [`ResultCode::Ok`] if empty
    #[must_use]
    pub fn most_severe(codes: impl IntoIterator<Item = Self>) -> Self {
        codes
            .into_iter()
            .max_by_key(|code| code.severity())
            .unwrap_or(Self::Ok)
    }
}

impl Display for ResultCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ok => "ok",
            Self::StructuralFail => "structural-fail",
            Self::ChainFail => "chain-fail",
            Self::BehavioralFail => "behavioral-fail",
        })
    }
}

/// One validation discrepancy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Issue {
    /// Supersession cycle among the file's manifests
    ChainCycle {
        /// Validated file
        file: String,
        /// Cycle members in edge order
        cycle: Vec<ManifestId>,
    },

    /// Manifest failed to load, or the chain is ambiguous
    MalformedManifest {
        /// Validated file
        file: String,
        /// Manifests involved
        manifests: Vec<ManifestId>,
        /// Contested identity, for ambiguous chains
        #[serde(skip_serializing_if = "Option::is_none")]
        artifact: Option<ArtifactKey>,
        /// Explanation
        reason: String,
    },

    /// Expected artifact not found
    MissingArtifact {
        /// Validated file
        file: String,
        /// Missing identity
        artifact: ArtifactKey,
        /// Manifest that declared it
        manifest: ManifestId,
    },

    /// Public artifact not declared (strict mode)
    StrictExtraArtifact {
        /// Validated file
        file: String,
        /// Undeclared identity
        artifact: ArtifactKey,
        /// Manifest whose classification made the file strict
        manifest: ManifestId,
    },

    /// One signature field differs
    SignatureMismatch {
        /// Validated file
        file: String,
        /// Compared identity
        artifact: ArtifactKey,
        /// Manifest that declared it
        manifest: ManifestId,
        /// Differing field
        field: SignatureField,
        /// Declared value
        expected: String,
        /// Extracted value
        actual: String,
    },

    /// Identity defined more than once in the source
    DuplicateArtifact {
        /// Validated file
        file: String,
        /// Repeated identity
        artifact: ArtifactKey,
        /// Number of definitions
        count: usize,
        /// Manifest the file was validated against
        manifest: ManifestId,
    },

    /// File expected absent exists on disk
    UnexpectedFile {
        /// Validated file
        file: String,
        /// Manifest that removed the file
        manifest: ManifestId,
    },

    /// Source could not be extracted
    Extraction {
        /// Validated file
        file: String,
        /// Manifest the file was validated against
        manifest: ManifestId,
        /// Explanation
        reason: String,
    },

    /// Validation command exceeded its budget
    CommandTimeout {
        /// Manifest owning the command
        manifest: ManifestId,
        /// Rendered command
        command: String,
        /// Budget in seconds
        timeout_secs: u64,
    },

    /// Validation command failed or could not start
    CommandFailure {
        /// Manifest owning the command
        manifest: ManifestId,
        /// Rendered command
        command: String,
        /// Exit code, `None` if the process never ran or was killed
        exit_code: Option<i32>,
        /// Explanation
        reason: String,
    },
}

impl Issue {
    /// Result code this issue contributes
    #[must_use]
    pub fn code(&self) -> ResultCode {
        match self {
            Self::ChainCycle { .. } | Self::MalformedManifest { .. } => ResultCode::ChainFail,
            Self::MissingArtifact { .. }
            | Self::StrictExtraArtifact { .. }
            | Self::SignatureMismatch { .. }
            | Self::DuplicateArtifact { .. }
            | Self::UnexpectedFile { .. }
            | Self::Extraction { .. } => ResultCode::StructuralFail,
            Self::CommandTimeout { .. } | Self::CommandFailure { .. } => {
                ResultCode::BehavioralFail
            }
        }
    }

    /// Artifact identity, where the issue concerns one
    #[must_use]
    pub fn artifact(&self) -> Option<&ArtifactKey> {
        match self {
            Self::MalformedManifest { artifact, .. } => artifact.as_ref(),
            Self::MissingArtifact { artifact, .. }
            | Self::StrictExtraArtifact { artifact, .. }
            | Self::SignatureMismatch { artifact, .. }
            | Self::DuplicateArtifact { artifact, .. } => Some(artifact),
            _ => None,
        }
    }

    fn sort_key(&self) -> (Option<&ArtifactKey>, u8, Option<SignatureField>) {
        let rank = match self {
            Self::ChainCycle { .. } => 0,
            Self::MalformedManifest { .. } => 1,
            Self::UnexpectedFile { .. } => 2,
            Self::Extraction { .. } => 3,
            Self::DuplicateArtifact { .. } => 4,
            Self::MissingArtifact { .. } => 5,
            Self::StrictExtraArtifact { .. } => 6,
            Self::SignatureMismatch { .. } => 7,
            Self::CommandTimeout { .. } => 8,
            Self::CommandFailure { .. } => 9,
        };
        let field = match self {
            Self::SignatureMismatch { field, .. } => Some(*field),
            _ => None,
        };
        (self.artifact(), rank, field)
    }
}

impl Display for Issue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChainCycle { file, cycle } => {
                let names: Vec<&str> = cycle.iter().map(ManifestId::name).collect();
                write!(f, "{file}: supersession cycle {}", names.join(" -> "))
            }
            Self::MalformedManifest {
                file,
                manifests,
                reason,
                ..
            } => {
                let names: Vec<&str> = manifests.iter().map(ManifestId::name).collect();
                write!(f, "{file}: malformed manifest [{}]: {reason}", names.join(", "))
            }
            Self::MissingArtifact {
                file,
                artifact,
                manifest,
            } => write!(f, "{file}: missing {artifact} (declared by {manifest})"),
            Self::StrictExtraArtifact {
                file,
                artifact,
                manifest,
            } => write!(f, "{file}: undeclared public {artifact} (strict per {manifest})"),
            Self::SignatureMismatch {
                file,
                artifact,
                manifest,
                field,
                expected,
                actual,
            } => write!(
                f,
                "{file}: {artifact} {field} mismatch: expected {expected}, found {actual} (declared by {manifest})"
            ),
            Self::DuplicateArtifact {
                file,
                artifact,
                count,
                manifest,
            } => write!(
                f,
                "{file}: {artifact} defined {count} times (validated against {manifest})"
            ),
            Self::UnexpectedFile { file, manifest } => {
                write!(f, "{file}: exists but was removed by {manifest}")
            }
            Self::Extraction {
                file,
                manifest,
                reason,
            } => write!(
                f,
                "{file}: extraction failed: {reason} (validated against {manifest})"
            ),
            Self::CommandTimeout {
                manifest,
                command,
                timeout_secs,
            } => write!(f, "{manifest}: `{command}` timed out after {timeout_secs}s"),
            Self::CommandFailure {
                manifest,
                command,
                exit_code,
                reason,
            } => match exit_code {
                Some(code) => write!(f, "{manifest}: `{command}` exited with {code}: {reason}"),
                None => write!(f, "{manifest}: `{command}` failed: {reason}"),
            },
        }
    }
}

/// Sort issues by identity key, then issue kind
pub fn sort_issues(issues: &mut [Issue]) {
    issues.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
}

/// Validation outcome for one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    /// Validated file
    pub file: String,
    /// Mode used, `None` when validation stopped before comparing
    pub mode: Option<ValidationMode>,
    /// Outcome code
    pub code: ResultCode,
    /// Active manifests for the file
    pub active_manifests: Vec<ManifestId>,
    /// Discrepancies, sorted by identity key
    pub issues: Vec<Issue>,
}

impl ValidationResult {
    /// Build a result, sorting issues and deriving the code
    #[must_use]
    pub fn new(
        file: impl Into<String>,
        mode: Option<ValidationMode>,
        active_manifests: Vec<ManifestId>,
        mut issues: Vec<Issue>,
    ) -> Self {
        sort_issues(&mut issues);
        Self {
            file: file.into(),
            mode,
            code: ResultCode::most_severe(issues.iter().map(Issue::code)),
            active_manifests,
            issues,
        }
    }

    /// Whether the file validated cleanly
    #[inline]
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.code == ResultCode::Ok
    }
}

/// Compare expected against actual artifacts
///
/// `actual` is `None` when the file does not exist; a missing file compares
/// as an empty artifact set unless the file is expected absent. `governing`
/// is the manifest that decided the mode; issues not tied to a declaration
/// name it.
#[must_use]
pub fn compare(
    expected: &ExpectedSet,
    actual: Option<&[Artifact]>,
    mode: ValidationMode,
    governing: &ManifestId,
) -> Vec<Issue> {
    let file = expected.file();
    let mut issues = Vec::new();

    if let Some(removed_by) = expected.file_removed_by() {
        if actual.is_some() {
            issues.push(Issue::UnexpectedFile {
                file: file.to_string(),
                manifest: removed_by.clone(),
            });
        }
        return issues;
    }

    let mut public: BTreeMap<ArtifactKey, &Artifact> = BTreeMap::new();
    let mut counts: BTreeMap<ArtifactKey, usize> = BTreeMap::new();
    for artifact in actual.unwrap_or_default() {
        let key = artifact.key();
        if key.is_private() {
            continue;
        }
        *counts.entry(key.clone()).or_default() += 1;
        public.entry(key).or_insert(artifact);
    }
    for (key, count) in counts.into_iter().filter(|(_, n)| *n > 1) {
        issues.push(Issue::DuplicateArtifact {
            file: file.to_string(),
            artifact: key,
            count,
            manifest: governing.clone(),
        });
    }

    let mut declared = BTreeSet::new();
    for (key, entry) in expected.entries() {
        if key.is_private() {
            continue;
        }
        declared.insert(key);
        let Some(found) = public.get(key) else {
            issues.push(Issue::MissingArtifact {
                file: file.to_string(),
                artifact: key.clone(),
                manifest: entry.declared_by.clone(),
            });
            continue;
        };
        for field in entry.artifact.signature_diff(found) {
            issues.push(Issue::SignatureMismatch {
                file: file.to_string(),
                artifact: key.clone(),
                manifest: entry.declared_by.clone(),
                field,
                expected: entry.artifact.render_field(field),
                actual: found.render_field(field),
            });
        }
    }

    if mode == ValidationMode::Strict {
        for key in public.keys().filter(|k| !declared.contains(k)) {
            issues.push(Issue::StrictExtraArtifact {
                file: file.to_string(),
                artifact: key.clone(),
                manifest: governing.clone(),
            });
        }
    }

    sort_issues(&mut issues);
    issues
}
