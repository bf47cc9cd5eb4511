//! MAID Artifact Extraction
//!
//! Produces the actual public structure of a source file as a list of
//! [`Artifact`]s, the input the structural comparator checks against the
//! merged manifest declarations.
//!
//! Extractors are registered by file extension in an [`ExtractorRegistry`];
//! [`PythonExtractor`] is built in and uses tree-sitter.

#![warn(unreachable_pub)]

use maid_manifest::Artifact;
use std::path::Path;

pub mod error;
pub mod python;
pub mod registry;

pub use error::ExtractError;
pub use python::PythonExtractor;
pub use registry::{default_extractors, ExtractorRegistry};

/// Extracts artifacts from source text
///
/// Implement this trait to support another language.
pub trait ArtifactExtractor: Send + Sync + 'static {
    /// Short name for diagnostics
    fn name(&self) -> &'static str;

    /// Extract artifacts in source order
    ///
    /// # Errors
    /// Returns [`ExtractError`] if the source cannot be parsed.
    fn extract(&self, source: &str) -> Result<Vec<Artifact>, ExtractError>;

    /// Supported file extensions (without dot)
    fn extensions(&self) -> &[&str];

    /// Check if this extractor handles the given path
    fn can_extract(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions().contains(&ext))
    }

    /// Priority (higher = tried first when several extractors match)
    fn priority(&self) -> i32 {
        0
    }
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
