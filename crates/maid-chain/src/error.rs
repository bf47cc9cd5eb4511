//! Chain errors
//!
//! Both variants are fatal for the file being validated: no comparison is
//! attempted once the chain itself is broken.

use maid_manifest::{ArtifactKey, ManifestId};

/// Errors raised while resolving or merging a manifest chain
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    /// Supersession edges form a cycle
    #[error("supersession cycle for {scope}: {}", render_cycle(.cycle))]
    Cycle {
        /// File (or `*` for the global view)
        scope: String,
        /// Manifests on the cycle, in edge order
        cycle: Vec<ManifestId>,
    },

    /// Two unordered active manifests declare one identity differently
    #[error(
        "ambiguous chain for {file}: {first} and {second} both declare {artifact} \
         with different contracts and neither is ordered after the other"
    )]
    Ambiguous {
        /// Target file
        file: String,
        /// Contested identity
        artifact: ArtifactKey,
        /// Earlier declaration
        first: ManifestId,
        /// Conflicting declaration
        second: ManifestId,
    },
}

impl ChainError {
    /// Manifests involved in the error
    #[must_use]
    pub fn manifests(&self) -> Vec<ManifestId> {
        match self {
            Self::Cycle { cycle, .. } => cycle.clone(),
            Self::Ambiguous { first, second, .. } => vec![first.clone(), second.clone()],
        }
    }
}

fn render_cycle(cycle: &[ManifestId]) -> String {
    let mut parts: Vec<String> = cycle.iter().map(ToString::to_string).collect();
    if let Some(first) = cycle.first() {
        parts.push(first.to_string());
    }
    parts.join(" -> ")
}
