//! Artifact merger - folds active declarations into one expected set
//!
//! Declarations are applied in ascending manifest order. A redeclaration
//! replaces the earlier artifact wholesale, an `absent` marker deletes it,
//! and a file-level `absent` status clears the file. Colliding declarations
//! from manifests with no explicit order are rejected as ambiguous.

use crate::error::ChainError;
use crate::resolver::ResolvedChain;
use maid_manifest::{normalize_path, Artifact, ArtifactKey, FileStatus, Manifest, ManifestId};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// An expected artifact with its provenance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedEntry {
    /// Declared artifact
    pub artifact: Artifact,
    /// Manifest whose declaration is authoritative
    pub declared_by: ManifestId,
}

/// Canonical expected artifacts of one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedSet {
    file: String,
    entries: BTreeMap<ArtifactKey, ExpectedEntry>,
    removed: BTreeMap<ArtifactKey, ExpectedEntry>,
    file_removed_by: Option<ManifestId>,
}

impl ExpectedSet {
    /// Empty set for `file`
    #[must_use]
    pub fn empty(file: &str) -> Self {
        Self {
            file: normalize_path(file),
            entries: BTreeMap::new(),
            removed: BTreeMap::new(),
            file_removed_by: None,
        }
    }

    /// Target file
    #[inline]
    #[must_use]
    pub fn file(&self) -> &str {
        &self.file
    }

    /// Expected entries, sorted by identity key
    pub fn entries(&self) -> impl Iterator<Item = (&ArtifactKey, &ExpectedEntry)> {
        self.entries.iter()
    }

    /// Expected artifacts, sorted by identity key
    pub fn artifacts(&self) -> impl Iterator<Item = &Artifact> {
        self.entries.values().map(|entry| &entry.artifact)
    }

    /// Entry for `key`
    #[inline]
    #[must_use]
    pub fn get(&self, key: &ArtifactKey) -> Option<&ExpectedEntry> {
        self.entries.get(key)
    }

    /// Identities deleted by an `absent` marker, with the deleting manifest
    pub fn removed(&self) -> impl Iterator<Item = (&ArtifactKey, &ExpectedEntry)> {
        self.removed.iter()
    }

    /// Number of expected artifacts
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is expected
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the file itself is expected to be deleted
    #[inline]
    #[must_use]
    pub fn is_file_absent(&self) -> bool {
        self.file_removed_by.is_some()
    }

    /// Manifest that declared the file absent
    #[inline]
    #[must_use]
    pub fn file_removed_by(&self) -> Option<&ManifestId> {
        self.file_removed_by.as_ref()
    }

    fn apply(&mut self, manifest: &Manifest) -> Result<(), ChainError> {
        let id = manifest.id();
        let expected = manifest.expected_artifacts();

        match expected.status {
            FileStatus::Absent => {
                tracing::debug!("{} removes {}", id, self.file);
                self.entries.clear();
                self.removed.clear();
                self.file_removed_by = Some(id.clone());
            }
            FileStatus::Present => self.file_removed_by = None,
        }

        for artifact in &expected.contains {
            self.declare(id, artifact)?;
        }
        Ok(())
    }

    fn declare(&mut self, id: &ManifestId, artifact: &Artifact) -> Result<(), ChainError> {
        let key = artifact.key();
        let previous = self.entries.get(&key).or_else(|| self.removed.get(&key));

        let declared_by = match previous {
            None => id.clone(),
            Some(prev) if prev.artifact.same_contract(artifact) => {
                std::cmp::max(&prev.declared_by, id).clone()
            }
            Some(prev) => match prev.declared_by.explicit_order(id) {
                Some(Ordering::Less) => {
                    tracing::debug!("{} overrides {} from {}", id, key, prev.declared_by);
                    id.clone()
                }
                Some(Ordering::Greater | Ordering::Equal) => return Ok(()),
                None => {
                    return Err(ChainError::Ambiguous {
                        file: self.file.clone(),
                        artifact: key,
                        first: prev.declared_by.clone(),
                        second: id.clone(),
                    })
                }
            },
        };

        let entry = ExpectedEntry {
            artifact: artifact.clone(),
            declared_by,
        };
        if artifact.is_absent() {
            self.entries.remove(&key);
            self.removed.insert(key, entry);
        } else {
            self.removed.remove(&key);
            self.entries.insert(key, entry);
        }
        Ok(())
    }
}

/// Merge the active manifests of a resolved chain
///
/// # Errors
/// Returns [`ChainError::Ambiguous`] on an unordered conflicting collision.
pub fn merge(chain: &ResolvedChain<'_>) -> Result<ExpectedSet, ChainError> {
    merge_manifests(chain.scope(), chain.active().iter().copied())
}

/// Merge the declarations that `manifests` make for `file`
///
/// Manifests are applied in id order whatever the input order; a manifest
/// given more than once is applied once.
///
/// # Errors
/// Returns [`ChainError::Ambiguous`] on an unordered conflicting collision.
pub fn merge_manifests<'m>(
    file: &str,
    manifests: impl IntoIterator<Item = &'m Manifest>,
) -> Result<ExpectedSet, ChainError> {
    let mut set = ExpectedSet::empty(file);
    let ordered: BTreeMap<&ManifestId, &Manifest> = manifests
        .into_iter()
        .filter(|m| m.targets(&set.file))
        .map(|m| (m.id(), m))
        .collect();

    for manifest in ordered.into_values() {
        set.apply(manifest)?;
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use maid_manifest::{Arg, ArtifactKind};
    use maid_test_utils::{func, method, ManifestBuilder};
    use pretty_assertions::assert_eq;

    fn key(name: &str) -> ArtifactKey {
        ArtifactKey::new(ArtifactKind::Function, None, name)
    }

    #[test]
    fn later_declaration_replaces_whole_signature() {
        let m1 = ManifestBuilder::create("task-001", "a.py")
            .declare(func("f", &[("x", "int")], "int").raising(["ValueError"]))
            .build();
        let m2 = ManifestBuilder::edit("task-002", "a.py")
            .declare(func("f", &[("x", "int"), ("y", "int")], "int"))
            .build();

        let set = merge_manifests("a.py", [&m1, &m2]).unwrap();
        let entry = set.get(&key("f")).unwrap();
        assert_eq!(entry.declared_by.name(), "task-002");
        assert_eq!(entry.artifact.args.len(), 2);
        assert!(entry.artifact.raises.is_empty());
    }

    #[test]
    fn identities_accumulate_across_manifests() {
        let m1 = ManifestBuilder::create("task-001", "a.py")
            .declare(func("f", &[], "None"))
            .build();
        let m2 = ManifestBuilder::edit("task-002", "a.py")
            .declare(method("Cache", "get", &[("key", "str")], "bytes"))
            .build();

        let set = merge_manifests("a.py", [&m2, &m1]).unwrap();
        let names: Vec<String> = set.entries().map(|(k, _)| k.to_string()).collect();
        assert_eq!(names, vec!["function f", "function Cache.get"]);
    }

    #[test]
    fn absent_marker_deletes_identity() {
        let m1 = ManifestBuilder::create("task-001", "a.py")
            .declare(func("f", &[], "None"))
            .declare(func("g", &[], "None"))
            .build();
        let m2 = ManifestBuilder::edit("task-002", "a.py")
            .declare(func("f", &[], "None").absent())
            .build();

        let set = merge_manifests("a.py", [&m1, &m2]).unwrap();
        assert!(set.get(&key("f")).is_none());
        assert!(set.get(&key("g")).is_some());
        let (removed, entry) = set.removed().next().unwrap();
        assert_eq!(removed, &key("f"));
        assert_eq!(entry.declared_by.name(), "task-002");
    }

    #[test]
    fn removed_identity_can_return() {
        let m1 = ManifestBuilder::create("task-001", "a.py")
            .declare(func("f", &[], "None"))
            .build();
        let m2 = ManifestBuilder::edit("task-002", "a.py")
            .declare(func("f", &[], "None").absent())
            .build();
        let m3 = ManifestBuilder::edit("task-003", "a.py")
            .declare(func("f", &[("x", "int")], "None"))
            .build();

        let set = merge_manifests("a.py", [&m1, &m2, &m3]).unwrap();
        assert_eq!(set.get(&key("f")).unwrap().declared_by.name(), "task-003");
        assert_eq!(set.removed().count(), 0);
    }

    #[test]
    fn file_absent_clears_everything() {
        let m1 = ManifestBuilder::create("task-001", "a.py")
            .declare(func("f", &[], "None"))
            .build();
        let m2 = ManifestBuilder::edit("task-002", "a.py").file_absent().build();

        let set = merge_manifests("a.py", [&m1, &m2]).unwrap();
        assert!(set.is_empty());
        assert!(set.is_file_absent());
        assert_eq!(set.file_removed_by().unwrap().name(), "task-002");
    }

    #[test]
    fn recreating_file_clears_absent_flag() {
        let m1 = ManifestBuilder::edit("task-001", "a.py").file_absent().build();
        let m2 = ManifestBuilder::create("task-002", "a.py")
            .declare(func("f", &[], "None"))
            .build();

        let set = merge_manifests("a.py", [&m1, &m2]).unwrap();
        assert!(!set.is_file_absent());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn unordered_conflict_is_ambiguous() {
        let m1 = ManifestBuilder::edit("alpha", "c.py")
            .declare(func("k", &[("x", "int")], "int"))
            .build();
        let m2 = ManifestBuilder::edit("beta", "c.py")
            .declare(func("k", &[("x", "str")], "int"))
            .build();

        let err = merge_manifests("c.py", [&m1, &m2]).unwrap_err();
        match err {
            ChainError::Ambiguous {
                file,
                artifact,
                first,
                second,
            } => {
                assert_eq!(file, "c.py");
                assert_eq!(artifact, key("k"));
                assert_eq!(first.name(), "alpha");
                assert_eq!(second.name(), "beta");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn same_sequence_conflict_is_ambiguous() {
        let m1 = ManifestBuilder::edit("task-004-a", "c.py")
            .declare(func("k", &[], "int"))
            .build();
        let m2 = ManifestBuilder::edit("task-004-b", "c.py")
            .declare(func("k", &[], "str"))
            .build();
        assert!(merge_manifests("c.py", [&m1, &m2]).is_err());
    }

    #[test]
    fn unordered_agreement_is_not_ambiguous() {
        let m1 = ManifestBuilder::edit("alpha", "c.py")
            .declare(func("k", &[("x", "int")], "int"))
            .build();
        let m2 = ManifestBuilder::edit("beta", "c.py")
            .declare(func("k", &[("x", "int")], "int"))
            .build();

        let set = merge_manifests("c.py", [&m1, &m2]).unwrap();
        assert_eq!(set.get(&key("k")).unwrap().declared_by.name(), "beta");
    }

    #[test]
    fn other_targets_do_not_contribute() {
        let m1 = ManifestBuilder::create("task-001", "a.py")
            .declare(func("f", &[], "None"))
            .build();
        let m2 = ManifestBuilder::edit("task-002", "b.py")
            .also_editable("a.py")
            .declare(func("g", &[], "None"))
            .build();

        let set = merge_manifests("./a.py", [&m1, &m2]).unwrap();
        assert_eq!(set.file(), "a.py");
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn declaration_order_within_manifest_is_irrelevant() {
        let forward = ManifestBuilder::create("task-001", "a.py")
            .declare(func("f", &[], "None"))
            .declare(Artifact::class("Cache").with_bases(["Base"]))
            .declare(Artifact::attribute("LIMIT"))
            .build();
        let backward = ManifestBuilder::create("task-001", "a.py")
            .declare(Artifact::attribute("LIMIT"))
            .declare(Artifact::class("Cache").with_bases(["Base"]))
            .declare(func("f", &[], "None"))
            .build();

        assert_eq!(
            merge_manifests("a.py", [&forward]).unwrap(),
            merge_manifests("a.py", [&backward]).unwrap()
        );
    }

    #[test]
    fn untyped_args_compare_by_contract() {
        let m1 = ManifestBuilder::create("task-001", "a.py")
            .declare(Artifact::function("f").with_args(vec![Arg::new("x")]))
            .build();
        let set = merge_manifests("a.py", [&m1]).unwrap();
        assert_eq!(set.get(&key("f")).unwrap().artifact.args[0].ty, None);
    }
}
