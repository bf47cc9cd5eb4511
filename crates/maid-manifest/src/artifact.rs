//! Artifacts - declared or extracted units of public structure
//!
//! An [`Artifact`] is a function, class or attribute together with its
//! signature. Artifacts are identified by their [`ArtifactKey`]
//! `(kind, class, name)`; two artifacts with the same key describe the same
//! unit of structure and are compared field by field.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};

/// Marker prefix for private names
pub const PRIVATE_MARKER: char = '_';

/// Kind of artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// Function or method
    Function,
    /// Class
    Class,
    /// Module or class attribute
    Attribute,
}

impl ArtifactKind {
    /// Lowercase name as used in manifests
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Class => "class",
            Self::Attribute => "attribute",
        }
    }
}

impl Display for ArtifactKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of an artifact within one file
///
/// Ordering is `(kind, class, name)` with module-level artifacts (no class)
/// sorting before class members, which keeps reports deterministic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ArtifactKey {
    /// Artifact kind
    pub kind: ArtifactKind,
    /// Owning class, `None` for module-level artifacts
    pub class: Option<String>,
    /// Artifact name
    pub name: String,
}

impl ArtifactKey {
    /// Create a new key
    #[inline]
    #[must_use]
    pub fn new(kind: ArtifactKind, class: Option<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            class,
            name: name.into(),
        }
    }

    /// Whether the key names a private artifact
    ///
    /// Private: the name (or the owning class) starts with `_` and is not a
    /// dunder name such as `__init__`.
    #[must_use]
    pub fn is_private(&self) -> bool {
        is_private_name(&self.name) || self.class.as_deref().is_some_and(is_private_name)
    }
}

impl Display for ArtifactKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.class {
            Some(class) => write!(f, "{} {}.{}", self.kind, class, self.name),
            None => write!(f, "{} {}", self.kind, self.name),
        }
    }
}

/// Check a single identifier against the private marker rule
#[must_use]
pub fn is_private_name(name: &str) -> bool {
    let is_dunder = name.len() > 4 && name.starts_with("__") && name.ends_with("__");
    name.starts_with(PRIVATE_MARKER) && !is_dunder
}

/// Canonical spelling of a type descriptor
///
/// Whitespace is dropped and surrounding quotes of forward references are
/// stripped, then one space is put after each `,` and around each `|`.
/// `Dict[str,int]` and `"Dict[ str, int ]"` both become `Dict[str, int]`.
#[must_use]
pub fn normalize_type(ty: &str) -> String {
    let trimmed = ty.trim();
    let unquoted = ['"', '\'']
        .iter()
        .find_map(|q| {
            trimmed
                .strip_prefix(*q)
                .and_then(|rest| rest.strip_suffix(*q))
        })
        .unwrap_or(trimmed);
    let compact: String = unquoted.chars().filter(|c| !c.is_whitespace()).collect();
    compact.replace(',', ", ").replace('|', " | ")
}

/// Function or method argument
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Arg {
    /// Argument name (variadics keep their `*`/`**` marker)
    pub name: String,
    /// Declared type, if any
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<String>,
}

impl Arg {
    /// Untyped argument
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: None,
        }
    }

    /// Typed argument
    #[inline]
    #[must_use]
    pub fn typed(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: Some(ty.into()),
        }
    }
}

impl Display for Arg {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.ty {
            Some(ty) => write!(f, "{}: {}", self.name, ty),
            None => f.write_str(&self.name),
        }
    }
}

/// Presence marker on a declared artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactStatus {
    /// Artifact must exist
    #[default]
    Present,
    /// Artifact was removed; deletes earlier declarations on merge
    Absent,
}

/// Signature field compared between expected and actual artifacts
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureField {
    /// Argument list (count, order, names, types)
    Args,
    /// Return type
    Returns,
    /// Raised error kinds (set equality)
    Raises,
    /// Base classes (ordered)
    Bases,
}

impl Display for SignatureField {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Args => "args",
            Self::Returns => "returns",
            Self::Raises => "raises",
            Self::Bases => "bases",
        })
    }
}

/// A unit of public structure with its signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Artifact kind
    pub kind: ArtifactKind,
    /// Artifact name
    pub name: String,
    /// Owning class
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    /// Base classes (classes only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bases: Vec<String>,
    /// Arguments (functions only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Arg>,
    /// Return type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returns: Option<String>,
    /// Raised error kinds
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub raises: BTreeSet<String>,
    /// Presence marker
    #[serde(default, skip_serializing_if = "is_present")]
    pub status: ArtifactStatus,
}

fn is_present(status: &ArtifactStatus) -> bool {
    *status == ArtifactStatus::Present
}

impl Artifact {
    fn bare(kind: ArtifactKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            class: None,
            bases: Vec::new(),
            args: Vec::new(),
            returns: None,
            raises: BTreeSet::new(),
            status: ArtifactStatus::Present,
        }
    }

    /// Module-level function with no arguments
    #[inline]
    #[must_use]
    pub fn function(name: impl Into<String>) -> Self {
        Self::bare(ArtifactKind::Function, name)
    }

    /// Class with no bases
    #[inline]
    #[must_use]
    pub fn class(name: impl Into<String>) -> Self {
        Self::bare(ArtifactKind::Class, name)
    }

    /// Attribute
    #[inline]
    #[must_use]
    pub fn attribute(name: impl Into<String>) -> Self {
        Self::bare(ArtifactKind::Attribute, name)
    }

    /// Set the owning class
    #[inline]
    #[must_use]
    pub fn in_class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    /// Set the argument list
    #[inline]
    #[must_use]
    pub fn with_args(mut self, args: Vec<Arg>) -> Self {
        self.args = args;
        self
    }

    /// Set the return type
    #[inline]
    #[must_use]
    pub fn returning(mut self, ty: impl Into<String>) -> Self {
        self.returns = Some(ty.into());
        self
    }

    /// Set the raised error kinds
    #[must_use]
    pub fn raising<I, S>(mut self, raises: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.raises = raises.into_iter().map(Into::into).collect();
        self
    }

    /// Set the base classes
    #[must_use]
    pub fn with_bases<I, S>(mut self, bases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bases = bases.into_iter().map(Into::into).collect();
        self
    }

    /// Mark as removed
    #[inline]
    #[must_use]
    pub fn absent(mut self) -> Self {
        self.status = ArtifactStatus::Absent;
        self
    }

    /// Identity key
    #[must_use]
    pub fn key(&self) -> ArtifactKey {
        ArtifactKey::new(self.kind, self.class.clone(), self.name.clone())
    }

    /// Whether this artifact is private
    #[inline]
    #[must_use]
    pub fn is_private(&self) -> bool {
        is_private_name(&self.name) || self.class.as_deref().is_some_and(is_private_name)
    }

    /// Whether this is a removal marker
    #[inline]
    #[must_use]
    pub fn is_absent(&self) -> bool {
        self.status == ArtifactStatus::Absent
    }

    /// Fields whose values differ between `self` and `other`
    ///
    /// Raises are compared as sets, everything else as ordered sequences.
    #[must_use]
    pub fn signature_diff(&self, other: &Artifact) -> Vec<SignatureField> {
        let mut diff = Vec::new();
        if self.args != other.args {
            diff.push(SignatureField::Args);
        }
        if self.returns != other.returns {
            diff.push(SignatureField::Returns);
        }
        if self.raises != other.raises {
            diff.push(SignatureField::Raises);
        }
        if self.bases != other.bases {
            diff.push(SignatureField::Bases);
        }
        diff
    }

    /// Whether both artifacts declare the same contract (signature and status)
    #[must_use]
    pub fn same_contract(&self, other: &Artifact) -> bool {
        self.status == other.status && self.signature_diff(other).is_empty()
    }

    /// Render one signature field for diagnostics
    #[must_use]
    pub fn render_field(&self, field: SignatureField) -> String {
        match field {
            SignatureField::Args => format!(
                "({})",
                self.args
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            SignatureField::Returns => self.returns.clone().unwrap_or_else(|| "-".to_string()),
            SignatureField::Raises => format!(
                "{{{}}}",
                self.raises.iter().cloned().collect::<Vec<_>>().join(", ")
            ),
            SignatureField::Bases => format!("[{}]", self.bases.join(", ")),
        }
    }
}
