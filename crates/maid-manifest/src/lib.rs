//! MAID Manifest Model
//!
//! Canonical, strongly-typed manifests and artifacts.
//!
//! # Core Concepts
//!
//! - [`Artifact`]: function, class or attribute with its signature
//! - [`ArtifactKey`]: identity `(kind, class, name)` used for comparison
//! - [`Manifest`]: validated, immutable contract for one target file
//! - [`ManifestSet`]: name-unique collection ordered by [`ManifestId`]
//! - [`ManifestStore`]: loads a directory, normalizing legacy and enhanced
//!   documents into the same representation
//!
//! # Example
//!
//! ```rust,ignore
//! use maid_manifest::ManifestStore;
//!
//! let report = ManifestStore::new("manifests").load()?;
//! for manifest in report.manifests.referencing("src/cache.py") {
//!     println!("{} -> {}", manifest.id(), manifest.goal());
//! }
//! ```

#![warn(unreachable_pub)]

pub mod artifact;
pub mod error;
pub mod manifest;
pub mod schema;
pub mod store;

pub use artifact::{
    is_private_name, normalize_type, Arg, Artifact, ArtifactKey, ArtifactKind, ArtifactStatus,
    SignatureField, PRIVATE_MARKER,
};
pub use error::{ManifestError, ManifestResult};
pub use manifest::{
    normalize_path, CommandSpec, ExpectedArtifacts, FileClassification, FileReferences,
    FileStatus, Manifest, ManifestDraft, ManifestId, ManifestSet, TaskType,
};
pub use schema::{manifest_schema, parse_manifest, RawManifest};
pub use store::{LoadReport, ManifestStore, RejectedManifest, MANIFEST_SUFFIX};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
