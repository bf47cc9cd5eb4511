//! Chain resolver - the supersession graph for one file
//!
//! Candidates are the manifests that create, edit or target a file. Edges
//! run `new -> old` for every `supersedes` reference between candidates.
//! The graph must be acyclic; every candidate reachable from another
//! candidate is superseded, the rest are active.

use crate::error::ChainError;
use maid_manifest::{FileClassification, Manifest, ManifestId, ManifestSet};
use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use petgraph::visit::Dfs;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Scope name used by [`ChainResolver::resolve_all`]
pub const GLOBAL_SCOPE: &str = "*";

/// A supersession reference that names no known manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DanglingReference {
    /// Manifest holding the reference
    pub from: ManifestId,
    /// Unknown target
    pub target: ManifestId,
}

/// Resolved manifest history for one file
#[derive(Debug, Clone)]
pub struct ResolvedChain<'a> {
    scope: String,
    active: Vec<&'a Manifest>,
    superseded: Vec<&'a Manifest>,
    dangling: Vec<DanglingReference>,
}

impl<'a> ResolvedChain<'a> {
    /// File (or [`GLOBAL_SCOPE`]) the chain was resolved for
    #[inline]
    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Active manifests, ascending by id
    #[inline]
    #[must_use]
    pub fn active(&self) -> &[&'a Manifest] {
        &self.active
    }

    /// Superseded manifests, ascending by id (audit only)
    #[inline]
    #[must_use]
    pub fn superseded(&self) -> &[&'a Manifest] {
        &self.superseded
    }

    /// Unresolvable supersession references
    #[inline]
    #[must_use]
    pub fn dangling(&self) -> &[DanglingReference] {
        &self.dangling
    }

    /// Whether no manifest references the scope
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active.is_empty() && self.superseded.is_empty()
    }

    /// Ids of the active manifests
    #[must_use]
    pub fn active_ids(&self) -> Vec<ManifestId> {
        self.active.iter().map(|m| m.id().clone()).collect()
    }

    /// Classification of the scope file in the latest active manifest
    /// that classifies it, with the manifest that decided it
    #[must_use]
    pub fn classification(&self) -> Option<(FileClassification, &'a ManifestId)> {
        self.active
            .iter()
            .rev()
            .find_map(|m| m.classification_of(&self.scope).map(|c| (c, m.id())))
    }
}

/// Resolves manifest chains over a [`ManifestSet`]
///
/// Pure: every call recomputes the view from the set, nothing is cached.
#[derive(Debug, Clone, Copy)]
pub struct ChainResolver<'a> {
    set: &'a ManifestSet,
}

impl<'a> ChainResolver<'a> {
    /// Create resolver over `set`
    #[inline]
    #[must_use]
    pub fn new(set: &'a ManifestSet) -> Self {
        Self { set }
    }

    /// Resolve the active history of `file`
    ///
    /// # Errors
    /// Returns [`ChainError::Cycle`] if supersession among the file's
    /// manifests is cyclic.
    pub fn resolve_chain(&self, file: &str) -> Result<ResolvedChain<'a>, ChainError> {
        let file = maid_manifest::normalize_path(file);
        let candidates: Vec<&'a Manifest> = self.set.referencing(&file).collect();
        self.resolve_among(file, candidates)
    }

    /// Resolve over every manifest in the set
    ///
    /// Fails as a whole on the first cycle; see
    /// [`Self::resolve_all_isolating`] for a view that keeps going.
    ///
    /// # Errors
    /// Returns [`ChainError::Cycle`] on any supersession cycle.
    pub fn resolve_all(&self) -> Result<ResolvedChain<'a>, ChainError> {
        let candidates: Vec<&'a Manifest> = self.set.iter().collect();
        self.resolve_among(GLOBAL_SCOPE.to_string(), candidates)
    }

    /// Resolve over every manifest, setting cyclic components aside
    ///
    /// Each cyclic component yields one [`ChainError::Cycle`] scoped to the
    /// files its members target. Its members are neither active nor
    /// superseded; everything else resolves as in [`Self::resolve_all`].
    #[must_use]
    pub fn resolve_all_isolating(&self) -> (ResolvedChain<'a>, Vec<ChainError>) {
        let mut candidates: Vec<&'a Manifest> = self.set.iter().collect();
        candidates.sort_by(|a, b| a.id().cmp(b.id()));
        let (graph, dangling) = self.supersession_graph(&candidates);

        let mut excluded = BTreeSet::new();
        let mut cycles = Vec::new();
        for members in cyclic_components(&graph) {
            let files: BTreeSet<&str> = members
                .iter()
                .map(|&i| candidates[i].expected_artifacts().file.as_str())
                .collect();
            let scope = files.into_iter().collect::<Vec<_>>().join(", ");
            tracing::warn!("setting aside cyclic manifests for {}", scope);
            cycles.push(ChainError::Cycle {
                scope,
                cycle: cycle_path(&graph, &members)
                    .into_iter()
                    .map(|i| candidates[i].id().clone())
                    .collect(),
            });
            excluded.extend(members);
        }

        let superseded_idx = superseded_nodes(&graph, candidates.len());
        let mut active = Vec::new();
        let mut superseded = Vec::new();
        for (i, manifest) in candidates.into_iter().enumerate() {
            if excluded.contains(&i) {
                continue;
            }
            if superseded_idx.contains(&i) {
                superseded.push(manifest);
            } else {
                active.push(manifest);
            }
        }

        let chain = ResolvedChain {
            scope: GLOBAL_SCOPE.to_string(),
            active,
            superseded,
            dangling,
        };
        (chain, cycles)
    }

    fn resolve_among(
        &self,
        scope: String,
        mut candidates: Vec<&'a Manifest>,
    ) -> Result<ResolvedChain<'a>, ChainError> {
        candidates.sort_by(|a, b| a.id().cmp(b.id()));
        let (graph, dangling) = self.supersession_graph(&candidates);

        if let Some(cycle) = find_cycle(&graph) {
            return Err(ChainError::Cycle {
                scope,
                cycle: cycle.into_iter().map(|i| candidates[i].id().clone()).collect(),
            });
        }

        let superseded_idx = superseded_nodes(&graph, candidates.len());
        let (superseded, active): (Vec<_>, Vec<_>) = candidates
            .into_iter()
            .enumerate()
            .partition(|(i, _)| superseded_idx.contains(i));

        let chain = ResolvedChain {
            scope,
            active: active.into_iter().map(|(_, m)| m).collect(),
            superseded: superseded.into_iter().map(|(_, m)| m).collect(),
            dangling,
        };
        tracing::debug!(
            "chain for {}: {} active, {} superseded",
            chain.scope,
            chain.active.len(),
            chain.superseded.len()
        );
        Ok(chain)
    }

    /// Edges `new -> old` between sorted candidates, plus unknown targets
    fn supersession_graph(
        &self,
        candidates: &[&'a Manifest],
    ) -> (DiGraphMap<usize, ()>, Vec<DanglingReference>) {
        let index: BTreeMap<&ManifestId, usize> = candidates
            .iter()
            .enumerate()
            .map(|(i, m)| (m.id(), i))
            .collect();

        let mut graph: DiGraphMap<usize, ()> = DiGraphMap::new();
        let mut dangling = Vec::new();
        for (i, manifest) in candidates.iter().enumerate() {
            graph.add_node(i);
            for target in manifest.supersedes() {
                if let Some(&j) = index.get(target) {
                    graph.add_edge(i, j, ());
                } else if !self.set.contains(target) {
                    tracing::warn!(
                        "{} supersedes unknown manifest {}",
                        manifest.id(),
                        target
                    );
                    dangling.push(DanglingReference {
                        from: manifest.id().clone(),
                        target: target.clone(),
                    });
                }
            }
        }
        (graph, dangling)
    }
}

/// Nodes reachable from some other node
fn superseded_nodes(graph: &DiGraphMap<usize, ()>, len: usize) -> BTreeSet<usize> {
    let mut superseded = BTreeSet::new();
    for start in 0..len {
        let mut dfs = Dfs::new(graph, start);
        while let Some(node) = dfs.next(graph) {
            if node != start {
                superseded.insert(node);
            }
        }
    }
    superseded
}

/// Strongly connected components containing a cycle, sorted
fn cyclic_components(graph: &DiGraphMap<usize, ()>) -> Vec<BTreeSet<usize>> {
    let mut cyclic: Vec<BTreeSet<usize>> = tarjan_scc(graph)
        .into_iter()
        .filter(|scc| scc.len() > 1 || scc.iter().any(|&n| graph.contains_edge(n, n)))
        .map(|scc| scc.into_iter().collect())
        .collect();
    cyclic.sort();
    cyclic
}

/// Find one cycle, starting at the lowest node of the first cyclic component
fn find_cycle(graph: &DiGraphMap<usize, ()>) -> Option<Vec<usize>> {
    let members = cyclic_components(graph).into_iter().next()?;
    Some(cycle_path(graph, &members))
}

/// Shortest cycle through the lowest member of a cyclic component
fn cycle_path(graph: &DiGraphMap<usize, ()>, members: &BTreeSet<usize>) -> Vec<usize> {
    let Some(&start) = members.iter().next() else {
        return Vec::new();
    };
    if graph.contains_edge(start, start) {
        return vec![start];
    }

    // Shortest path back to `start` inside the component.
    let mut parent: BTreeMap<usize, usize> = BTreeMap::new();
    let mut queue = VecDeque::from([start]);
    while let Some(node) = queue.pop_front() {
        let mut next: Vec<usize> = graph
            .neighbors(node)
            .filter(|n| members.contains(n))
            .collect();
        next.sort_unstable();
        for succ in next {
            if succ == start {
                let mut path = vec![node];
                let mut cur = node;
                while let Some(&p) = parent.get(&cur) {
                    path.push(p);
                    cur = p;
                }
                path.reverse();
                return path;
            }
            if let std::collections::btree_map::Entry::Vacant(slot) = parent.entry(succ) {
                slot.insert(node);
                queue.push_back(succ);
            }
        }
    }

    members.iter().copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use maid_test_utils::{func, manifest_set, ManifestBuilder};
    use pretty_assertions::assert_eq;

    fn names(manifests: &[&Manifest]) -> Vec<String> {
        manifests.iter().map(|m| m.id().to_string()).collect()
    }

    #[test]
    fn single_manifest_is_active() {
        let set = manifest_set(vec![ManifestBuilder::edit("task-001", "a.py").build()]);
        let chain = ChainResolver::new(&set).resolve_chain("a.py").unwrap();
        assert_eq!(names(chain.active()), vec!["task-001"]);
        assert!(chain.superseded().is_empty());
    }

    #[test]
    fn supersession_is_transitive() {
        let set = manifest_set(vec![
            ManifestBuilder::create("task-001", "a.py").build(),
            ManifestBuilder::edit("task-002", "a.py").supersedes("task-001").build(),
            ManifestBuilder::edit("task-003", "a.py").supersedes("task-002").build(),
        ]);
        let chain = ChainResolver::new(&set).resolve_chain("a.py").unwrap();
        assert_eq!(names(chain.active()), vec!["task-003"]);
        assert_eq!(names(chain.superseded()), vec!["task-001", "task-002"]);
    }

    #[test]
    fn unrelated_files_are_not_candidates() {
        let set = manifest_set(vec![
            ManifestBuilder::edit("task-001", "a.py").build(),
            ManifestBuilder::edit("task-002", "b.py").readonly("a.py").build(),
        ]);
        let chain = ChainResolver::new(&set).resolve_chain("./a.py").unwrap();
        assert_eq!(names(chain.active()), vec!["task-001"]);
    }

    #[test]
    fn editable_listing_without_target_is_candidate() {
        let set = manifest_set(vec![
            ManifestBuilder::create("task-001", "a.py").build(),
            ManifestBuilder::edit("task-002", "b.py")
                .also_editable("a.py")
                .supersedes("task-001")
                .build(),
        ]);
        let chain = ChainResolver::new(&set).resolve_chain("a.py").unwrap();
        assert_eq!(names(chain.active()), vec!["task-002"]);
    }

    #[test]
    fn detects_two_cycle() {
        let set = manifest_set(vec![
            ManifestBuilder::edit("task-001", "a.py").supersedes("task-002").build(),
            ManifestBuilder::edit("task-002", "a.py").supersedes("task-001").build(),
        ]);
        let err = ChainResolver::new(&set).resolve_chain("a.py").unwrap_err();
        match err {
            ChainError::Cycle { scope, cycle } => {
                assert_eq!(scope, "a.py");
                let cycle: Vec<_> = cycle.iter().map(ToString::to_string).collect();
                assert_eq!(cycle, vec!["task-001", "task-002"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn detects_self_supersession() {
        let set = manifest_set(vec![ManifestBuilder::edit("task-001", "a.py")
            .supersedes("task-001")
            .build()]);
        let err = ChainResolver::new(&set).resolve_chain("a.py").unwrap_err();
        assert_eq!(err.manifests().len(), 1);
    }

    #[test]
    fn cycle_outside_file_does_not_affect_it() {
        let set = manifest_set(vec![
            ManifestBuilder::edit("task-001", "a.py").build(),
            ManifestBuilder::edit("task-002", "b.py").supersedes("task-003").build(),
            ManifestBuilder::edit("task-003", "b.py").supersedes("task-002").build(),
        ]);
        let resolver = ChainResolver::new(&set);
        assert!(resolver.resolve_chain("a.py").is_ok());
        assert!(resolver.resolve_chain("b.py").is_err());
        assert!(resolver.resolve_all().is_err());
    }

    #[test]
    fn dangling_references_are_reported() {
        let set = manifest_set(vec![ManifestBuilder::edit("task-002", "a.py")
            .supersedes("task-001-deleted")
            .build()]);
        let chain = ChainResolver::new(&set).resolve_chain("a.py").unwrap();
        assert_eq!(chain.dangling().len(), 1);
        assert_eq!(chain.dangling()[0].target.name(), "task-001-deleted");
        assert_eq!(names(chain.active()), vec!["task-002"]);
    }

    #[test]
    fn classification_comes_from_latest_active() {
        let set = manifest_set(vec![
            ManifestBuilder::create("task-001", "a.py").build(),
            ManifestBuilder::edit("task-002", "a.py")
                .declare(func("f", &[], "None"))
                .build(),
        ]);
        let chain = ChainResolver::new(&set).resolve_chain("a.py").unwrap();
        let (classification, decided_by) = chain.classification().unwrap();
        assert_eq!(classification, FileClassification::Editable);
        assert_eq!(decided_by.name(), "task-002");
    }

    #[test]
    fn global_view_spans_files() {
        let set = manifest_set(vec![
            ManifestBuilder::create("task-001", "a.py").build(),
            ManifestBuilder::edit("task-002", "b.py").supersedes("task-001").build(),
        ]);
        let resolver = ChainResolver::new(&set);
        let global = resolver.resolve_all().unwrap();
        assert_eq!(names(global.active()), vec!["task-002"]);

        // Restricted to `a.py`, the superseding manifest is not a candidate.
        let local = resolver.resolve_chain("a.py").unwrap();
        assert_eq!(names(local.active()), vec!["task-001"]);
    }

    #[test]
    fn chain_outlives_the_file_argument() {
        let set = manifest_set(vec![ManifestBuilder::edit("task-001", "a.py").build()]);
        let resolver = ChainResolver::new(&set);
        let chain = {
            let file = String::from("./a.py");
            resolver.resolve_chain(&file).unwrap()
        };
        assert_eq!(chain.scope(), "a.py");
        assert_eq!(names(chain.active()), vec!["task-001"]);
    }

    #[test]
    fn isolating_view_sets_cycles_aside() {
        let set = manifest_set(vec![
            ManifestBuilder::create("task-001", "a.py").build(),
            ManifestBuilder::edit("task-002", "b.py").supersedes("task-003").build(),
            ManifestBuilder::edit("task-003", "b.py").supersedes("task-002").build(),
            ManifestBuilder::create("task-004", "c.py").build(),
            ManifestBuilder::edit("task-005", "c.py").supersedes("task-004").build(),
        ]);
        let (chain, cycles) = ChainResolver::new(&set).resolve_all_isolating();
        assert_eq!(names(chain.active()), vec!["task-001", "task-005"]);
        assert_eq!(names(chain.superseded()), vec!["task-004"]);

        assert_eq!(cycles.len(), 1);
        match &cycles[0] {
            ChainError::Cycle { scope, cycle } => {
                assert_eq!(scope, "b.py");
                let cycle: Vec<_> = cycle.iter().map(ToString::to_string).collect();
                assert_eq!(cycle, vec!["task-002", "task-003"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn isolating_view_reports_each_cycle() {
        let set = manifest_set(vec![
            ManifestBuilder::edit("task-001", "a.py").supersedes("task-001").build(),
            ManifestBuilder::edit("task-002", "b.py").supersedes("task-003").build(),
            ManifestBuilder::edit("task-003", "c.py").supersedes("task-002").build(),
        ]);
        let (chain, cycles) = ChainResolver::new(&set).resolve_all_isolating();
        assert!(chain.is_empty());
        let scopes: Vec<String> = cycles
            .iter()
            .map(|e| match e {
                ChainError::Cycle { scope, .. } => scope.clone(),
                other => panic!("unexpected error: {other}"),
            })
            .collect();
        assert_eq!(scopes, vec!["a.py", "b.py, c.py"]);
    }
}
