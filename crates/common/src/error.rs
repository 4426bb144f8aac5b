//! Error types for sitegate

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using the sitegate Error
pub type Result<T> = std::result::Result<T, Error>;

/// Why a navigation did not produce a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NavigationFailure {
    Timeout,
    Network,
    Other,
}

impl std::fmt::Display for NavigationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NavigationFailure::Timeout => "TIMEOUT",
            NavigationFailure::Network => "NETWORK",
            NavigationFailure::Other => "OTHER",
        };
        f.write_str(s)
    }
}

/// Manifest loading and validation errors. Always fatal to a run.
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Manifest contains no page paths")]
    Empty,

    #[error("Failed to read manifest {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid manifest entry on line {line} ({entry:?}): {reason}")]
    InvalidEntry {
        line: usize,
        entry: String,
        reason: String,
    },
}

/// Sitegate error types
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("Navigation failed ({kind}): {reason}")]
    Navigation {
        kind: NavigationFailure,
        reason: String,
    },

    #[error("Status mismatch. Baseline: {baseline}, Candidate: {candidate}")]
    StatusMismatch { baseline: u16, candidate: u16 },

    #[error("Diff computation failed: {0}")]
    DiffCompute(String),

    #[error("Browser session crashed: {0}")]
    SessionCrash(String),

    #[error("Screenshot capture failed: {0}")]
    Capture(String),

    #[error("Playwright not found. Install with: npx playwright install")]
    PlaywrightNotFound,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn navigation(kind: NavigationFailure, reason: impl Into<String>) -> Self {
        Error::Navigation {
            kind,
            reason: reason.into(),
        }
    }

    /// Only manifest problems abort a run; everything else is recorded per path.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Manifest(_))
    }

    pub fn is_session_crash(&self) -> bool {
        matches!(self, Error::SessionCrash(_))
    }
}
