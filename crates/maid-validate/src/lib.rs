//! MAID Validation
//!
//! Checks source files against their manifest chains.
//!
//! - [`compare`]: strict or permissive comparison of an expected set with
//!   extracted artifacts
//! - [`Validator`]: per-file pipeline and concurrent directory sweep
//! - [`BehaviorRunner`]: runs the declared validation commands through a
//!   [`CommandRunner`]
//! - [`track_files`]: manifest coverage of the project tree
//! - [`snapshot_file`] and [`snapshot_system`]: manifests generated from
//!   existing code and from the active chains
//!
//! Discrepancies are reported as [`Issue`] values; `Err` is reserved for
//! infrastructure failures.
//!
//! # Example
//!
//! ```rust,ignore
//! use maid_validate::{Validator, ValidatorConfig};
//!
//! let validator = Validator::new(".", ValidatorConfig::discover(".".as_ref())?);
//! let sweep = validator.validate_directory().await?;
//! std::process::exit(sweep.code().exit_code());
//! ```

#![warn(unreachable_pub)]

pub mod behavior;
pub mod compare;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod snapshot;
pub mod tracking;

pub use behavior::{
    chain_issue, BehaviorReport, BehaviorRunner, CommandOutput, CommandRun, CommandRunner,
    CommandStatus, ManifestRun, ProcessRunner,
};
pub use compare::{compare, sort_issues, Issue, ResultCode, ValidationMode, ValidationResult};
pub use config::{ValidatorConfig, CONFIG_FILE};
pub use error::{ConfigError, RunnerError, ValidateError, ValidateResult};
pub use pipeline::{FileOutcome, SweepReport, Validator};
pub use snapshot::{
    snapshot_file, snapshot_system, ArtifactEntry, ArtifactListing, ManifestDocument,
    SkippedFile, Snapshot, SnapshotOptions, SystemManifest, SystemSnapshot,
};
pub use tracking::{track_files, TrackedFile, TrackingReport, TrackingStatus};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
