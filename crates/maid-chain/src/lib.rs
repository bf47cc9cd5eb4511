//! MAID Chain Resolution
//!
//! Turns a file's manifest history into its authoritative expected artifacts.
//!
//! - [`ChainResolver`]: builds the supersession graph over the manifests that
//!   reference a file, rejects cycles and keeps the non-superseded ones
//! - [`merge`]: folds the active declarations into an [`ExpectedSet`]
//!
//! Both are pure functions of a [`maid_manifest::ManifestSet`]; nothing is
//! cached between calls.
//!
//! # Example
//!
//! ```rust,ignore
//! use maid_chain::{merge, ChainResolver};
//!
//! let chain = ChainResolver::new(&set).resolve_chain("src/cache.py")?;
//! let expected = merge(&chain)?;
//! for artifact in expected.artifacts() {
//!     println!("{}", artifact.key());
//! }
//! ```

#![warn(unreachable_pub)]

pub mod error;
pub mod merge;
pub mod resolver;

pub use error::ChainError;
pub use merge::{merge, merge_manifests, ExpectedEntry, ExpectedSet};
pub use resolver::{ChainResolver, DanglingReference, ResolvedChain, GLOBAL_SCOPE};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
