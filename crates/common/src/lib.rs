//! Sitegate Common Library
//!
//! Shared data model, error taxonomy and the page manifest used by the
//! verification engine and the CLI.

pub mod error;
pub mod manifest;
pub mod types;

// Re-export commonly used types
pub use error::{Error, ManifestError, NavigationFailure, Result};
pub use manifest::{PageManifestEntry, PathManifest};
pub use types::*;

/// Sitegate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
