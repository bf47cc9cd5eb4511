//! Extractor registry keyed by file extension

use crate::error::ExtractError;
use crate::python::PythonExtractor;
use crate::ArtifactExtractor;
use maid_manifest::Artifact;
use std::path::Path;

/// Registered extractors, tried in priority order
pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn ArtifactExtractor>>,
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        default_extractors()
    }
}

impl std::fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractorRegistry")
            .field("extractor_count", &self.extractors.len())
            .field("extensions", &self.all_extensions())
            .finish()
    }
}

impl ExtractorRegistry {
    /// Create empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            extractors: Vec::new(),
        }
    }

    /// Register an extractor
    pub fn register<E: ArtifactExtractor>(&mut self, extractor: E) {
        self.extractors.push(Box::new(extractor));
        self.extractors
            .sort_by_key(|e| std::cmp::Reverse(e.priority()));
    }

    /// Find extractor for path
    #[must_use]
    pub fn find_for_path(&self, path: &Path) -> Option<&dyn ArtifactExtractor> {
        self.extractors
            .iter()
            .find(|e| e.can_extract(path))
            .map(|e| &**e)
    }

    /// Whether some extractor handles `path`
    #[inline]
    #[must_use]
    pub fn supports(&self, path: &Path) -> bool {
        self.find_for_path(path).is_some()
    }

    /// All registered extensions
    #[must_use]
    pub fn all_extensions(&self) -> Vec<&str> {
        self.extractors
            .iter()
            .flat_map(|e| e.extensions())
            .copied()
            .collect()
    }

    /// Extract artifacts from `source`, choosing the extractor by `path`
    ///
    /// # Errors
    /// [`ExtractError::NoExtractorForExtension`] if nothing handles `path`,
    /// otherwise whatever the extractor reports.
    pub fn extract_source(&self, path: &Path, source: &str) -> Result<Vec<Artifact>, ExtractError> {
        let extractor = self.find_for_path(path).ok_or_else(|| {
            ExtractError::NoExtractorForExtension(
                path.extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or_default()
                    .to_string(),
            )
        })?;
        tracing::debug!("extracting {} with {}", path.display(), extractor.name());
        extractor.extract(source)
    }

    /// Read `path` and extract its artifacts
    ///
    /// # Errors
    /// IO errors reading the file, plus everything
    /// [`extract_source`](Self::extract_source) reports.
    pub fn extract_file(&self, path: &Path) -> Result<Vec<Artifact>, ExtractError> {
        let source =
            std::fs::read_to_string(path).map_err(|e| ExtractError::io_error(path, e))?;
        self.extract_source(path, &source)
    }
}

/// Registry with the built-in extractors
#[inline]
#[must_use]
pub fn default_extractors() -> ExtractorRegistry {
    let mut registry = ExtractorRegistry::new();
    registry.register(PythonExtractor::new());
    registry
}
