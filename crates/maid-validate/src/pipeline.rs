//! Validation pipeline
//!
//! Per file: `resolve -> merge -> extract -> compare`. A directory sweep runs
//! that pipeline for every referenced file on a bounded pool of blocking
//! tasks and writes each outcome into a fixed slot, so the report order is
//! the sorted file order regardless of completion order.

use crate::behavior::chain_issue;
use crate::compare::{compare, Issue, ResultCode, ValidationMode, ValidationResult};
use crate::config::ValidatorConfig;
use crate::error::{ValidateError, ValidateResult};
use maid_chain::{merge, ChainResolver};
use maid_extract::{default_extractors, ExtractorRegistry};
use maid_manifest::{normalize_path, LoadReport, ManifestStore, RejectedManifest};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

/// Validates files of one project against its manifests
#[derive(Debug, Clone)]
pub struct Validator {
    root: PathBuf,
    config: ValidatorConfig,
    registry: Arc<ExtractorRegistry>,
}

impl Validator {
    /// Create validator for the project at `root` with the built-in extractors
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, config: ValidatorConfig) -> Self {
        Self {
            root: root.into(),
            config,
            registry: Arc::new(default_extractors()),
        }
    }

    /// With a custom extractor registry
    #[inline]
    #[must_use]
    pub fn with_registry(mut self, registry: ExtractorRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Project root
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Extractor registry
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &ExtractorRegistry {
        &self.registry
    }

    /// Absolute manifest directory
    #[must_use]
    pub fn manifest_dir(&self) -> PathBuf {
        self.root.join(&self.config.manifest_dir)
    }

    /// Load the manifest directory
    ///
    /// # Errors
    /// Returns [`ValidateError::Manifest`] if the directory cannot be listed.
    pub fn load(&self) -> ValidateResult<LoadReport> {
        Ok(ManifestStore::new(self.manifest_dir()).load()?)
    }

    /// Project-relative, normalized form of `path`
    ///
    /// # Errors
    /// Returns [`ValidateError::OutsideRoot`] for absolute paths outside the
    /// root and for relative paths escaping it.
    pub fn relative_path(&self, path: &Path) -> ValidateResult<String> {
        let outside = || ValidateError::OutsideRoot {
            path: path.to_path_buf(),
            root: self.root.clone(),
        };
        let relative = if path.is_absolute() {
            path.strip_prefix(&self.root).map_err(|_| outside())?
        } else {
            path
        };
        if relative
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
        {
            return Err(outside());
        }
        Ok(normalize_path(&relative.to_string_lossy()))
    }

    /// Validate one file, loading manifests fresh
    ///
    /// # Errors
    /// Infrastructure failures only: unreadable manifest directory, a path
    /// outside the root, or a file no manifest references.
    pub fn validate_file(
        &self,
        path: &Path,
        mode: Option<ValidationMode>,
    ) -> ValidateResult<ValidationResult> {
        let file = self.relative_path(path)?;
        let report = self.load()?;
        self.validate_loaded(&report, &file, mode)
    }

    /// Validate one project-relative file against already loaded manifests
    ///
    /// # Errors
    /// Returns [`ValidateError::Untracked`] when neither a loaded nor a
    /// rejected manifest references `file`.
    pub fn validate_loaded(
        &self,
        report: &LoadReport,
        file: &str,
        mode: Option<ValidationMode>,
    ) -> ValidateResult<ValidationResult> {
        let file = normalize_path(file);

        let rejected: Vec<Issue> = report
            .rejected_for(&file)
            .map(|r| rejected_issue(&file, r))
            .collect();
        if !rejected.is_empty() {
            return Ok(ValidationResult::new(file, None, Vec::new(), rejected));
        }

        let chain = match ChainResolver::new(&report.manifests).resolve_chain(&file) {
            Ok(chain) => chain,
            Err(error) => {
                let issue = chain_issue(&file, error);
                return Ok(ValidationResult::new(file, None, Vec::new(), vec![issue]));
            }
        };
        let classification = chain.classification();
        // Manifest that decided the mode, else the latest active one.
        let governing = classification
            .map(|(_, id)| id)
            .or_else(|| chain.active().last().map(|m| m.id()))
            .cloned();
        let Some(governing) = governing else {
            return Err(ValidateError::Untracked(file));
        };
        let active = chain.active_ids();

        let expected = match merge(&chain) {
            Ok(expected) => expected,
            Err(error) => {
                let issue = chain_issue(&file, error);
                return Ok(ValidationResult::new(file, None, active, vec![issue]));
            }
        };

        let mode = mode
            .or_else(|| classification.map(|(c, _)| ValidationMode::for_classification(c)))
            .unwrap_or(ValidationMode::Permissive);

        let path = self.root.join(&file);
        let actual = if !path.is_file() {
            None
        } else if expected.is_empty() && !self.registry.supports(&path) {
            tracing::debug!("{}: no extractor and nothing declared, skipping", file);
            Some(Vec::new())
        } else {
            match self.registry.extract_file(&path) {
                Ok(artifacts) => Some(artifacts),
                Err(error) => {
                    let issue = Issue::Extraction {
                        file: file.clone(),
                        manifest: governing,
                        reason: error.to_string(),
                    };
                    return Ok(ValidationResult::new(file, Some(mode), active, vec![issue]));
                }
            }
        };

        let issues = compare(&expected, actual.as_deref(), mode, &governing);
        tracing::debug!("{}: {} mode, {} issues", file, mode, issues.len());
        Ok(ValidationResult::new(file, Some(mode), active, issues))
    }

    /// Validate every file referenced by a manifest
    ///
    /// Files referenced only by rejected manifests are included and fail with
    /// `chain-fail`. With a sweep timeout, files not finished in time are
    /// reported as [`FileOutcome::Incomplete`].
    ///
    /// # Errors
    /// Returns [`ValidateError::Manifest`] if the manifest directory cannot be
    /// listed.
    pub async fn validate_directory(&self) -> ValidateResult<SweepReport> {
        let report = Arc::new(self.load()?);

        let files: Vec<String> = report
            .manifests
            .files()
            .into_iter()
            .chain(report.rejected.iter().flat_map(|r| r.files.iter().cloned()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        tracing::info!(
            "validating {} files with {} workers",
            files.len(),
            self.config.workers
        );

        let deadline = self.config.sweep_timeout().map(|t| Instant::now() + t);
        let permits = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let mut tasks = JoinSet::new();

        for (slot, file) in files.iter().enumerate() {
            let validator = self.clone();
            let report = Arc::clone(&report);
            let permits = Arc::clone(&permits);
            let file = file.clone();
            tasks.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return (slot, None);
                };
                let outcome = tokio::task::spawn_blocking(move || {
                    validator.validate_loaded(&report, &file, None)
                })
                .await;
                (slot, Some(outcome))
            });
        }

        let mut slots: Vec<Option<FileOutcome>> = vec![None; files.len()];
        loop {
            let joined = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, tasks.join_next()).await
                {
                    Ok(joined) => joined,
                    Err(_) => {
                        tracing::warn!("sweep timed out, aborting remaining files");
                        tasks.abort_all();
                        break;
                    }
                },
                None => tasks.join_next().await,
            };
            let Some(joined) = joined else {
                break;
            };
            let Ok((slot, Some(outcome))) = joined else {
                continue;
            };
            slots[slot] = Some(match outcome {
                Ok(Ok(result)) => FileOutcome::Completed(result),
                Ok(Err(error)) => FileOutcome::Error {
                    file: files[slot].clone(),
                    message: error.to_string(),
                },
                Err(error) => FileOutcome::Error {
                    file: files[slot].clone(),
                    message: format!("validation task failed: {error}"),
                },
            });
        }

        let results: Vec<FileOutcome> = slots
            .into_iter()
            .zip(&files)
            .map(|(slot, file)| {
                slot.unwrap_or_else(|| FileOutcome::Incomplete { file: file.clone() })
            })
            .collect();

        let sweep = SweepReport {
            results,
            rejected: report.rejected.clone(),
        };
        tracing::info!(
            "sweep finished: {} files, result {}",
            sweep.results.len(),
            sweep.code()
        );
        Ok(sweep)
    }
}

fn rejected_issue(file: &str, rejected: &RejectedManifest) -> Issue {
    Issue::MalformedManifest {
        file: file.to_string(),
        manifests: rejected.id.iter().cloned().collect(),
        artifact: None,
        reason: format!("{}: {}", rejected.path.display(), rejected.reason),
    }
}

/// Outcome of one file in a sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    /// Pipeline ran to completion
    Completed(ValidationResult),
    /// Pipeline stopped on an infrastructure error
    Error {
        /// Validated file
        file: String,
        /// Error message
        message: String,
    },
    /// Sweep timed out before the file finished
    Incomplete {
        /// Validated file
        file: String,
    },
}

impl FileOutcome {
    /// File this outcome is for
    #[must_use]
    pub fn file(&self) -> &str {
        match self {
            Self::Completed(result) => &result.file,
            Self::Error { file, .. } | Self::Incomplete { file } => file,
        }
    }

    /// Outcome code; errors and incomplete files count as structural failures
    #[must_use]
    pub fn code(&self) -> ResultCode {
        match self {
            Self::Completed(result) => result.code,
            Self::Error { .. } | Self::Incomplete { .. } => ResultCode::StructuralFail,
        }
    }
}

/// Result of a directory sweep
#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    /// Per-file outcomes, sorted by file
    pub results: Vec<FileOutcome>,
    /// Manifests that failed to load
    pub rejected: Vec<RejectedManifest>,
}

impl SweepReport {
    /// Most severe code across all files
    #[must_use]
    pub fn code(&self) -> ResultCode {
        ResultCode::most_severe(self.results.iter().map(FileOutcome::code))
    }

    /// Outcomes that are not `ok`
    pub fn failures(&self) -> impl Iterator<Item = &FileOutcome> {
        self.results.iter().filter(|r| r.code() != ResultCode::Ok)
    }

    /// Number of incomplete files
    #[must_use]
    pub fn incomplete(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r, FileOutcome::Incomplete { .. }))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn validator(root: &Path) -> Validator {
        Validator::new(root, ValidatorConfig::default())
    }

    #[test]
    fn relative_path_normalizes_and_guards_root() {
        let dir = tempfile::tempdir().unwrap();
        let validator = validator(dir.path());

        assert_eq!(
            validator.relative_path(Path::new("./src//a.py")).unwrap(),
            "src/a.py"
        );
        assert_eq!(
            validator
                .relative_path(&dir.path().join("src").join("a.py"))
                .unwrap(),
            "src/a.py"
        );
        assert!(matches!(
            validator.relative_path(Path::new("../a.py")),
            Err(ValidateError::OutsideRoot { .. })
        ));
        assert!(matches!(
            validator.relative_path(Path::new("/elsewhere/a.py")),
            Err(ValidateError::OutsideRoot { .. })
        ));
    }

    #[test]
    fn missing_manifest_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = validator(dir.path()).validate_file(Path::new("a.py"), None);
        assert!(matches!(result, Err(ValidateError::Manifest(_))));
    }

    #[test]
    fn outcome_codes() {
        let incomplete = FileOutcome::Incomplete { file: "a.py".into() };
        assert_eq!(incomplete.code(), ResultCode::StructuralFail);
        assert_eq!(incomplete.file(), "a.py");

        let sweep = SweepReport {
            results: vec![
                FileOutcome::Completed(ValidationResult::new("b.py", None, vec![], vec![])),
                incomplete,
            ],
            rejected: vec![],
        };
        assert_eq!(sweep.code(), ResultCode::StructuralFail);
        assert_eq!(sweep.incomplete(), 1);
        assert_eq!(sweep.failures().count(), 1);
    }
}
