use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Unified error type for build-stash operations
#[derive(Error, Debug)]
pub enum StashError {
    #[error("Git operation failed: {0}")]
    Git(#[from] git2::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Version parsing error: {0}")]
    Version(String),

    #[error("Invalid version marker: {0}")]
    Marker(String),

    #[error("Commit graph contract violated: {0}")]
    GraphContract(String),

    #[error("Topology error: {0}")]
    Topology(String),

    #[error("Resolution failed: {0}")]
    Resolution(String),

    /// Requested build number lies outside `0..=max` for the range.
    #[error("Build number {requested} is out of range 0..={max} for {base}..{end}")]
    BuildNumberOutOfRange {
        base: String,
        end: String,
        requested: i64,
        max: u32,
    },

    /// The build number exists in the range but not on its first-parent chain.
    #[error("Build number {requested} is not on the first-parent chain {base}..{end}")]
    BuildNumberNotFound {
        base: String,
        end: String,
        requested: i64,
    },

    #[error("{subject} is not in the ancestry chain of {end}")]
    NotInAncestry { subject: String, end: String },

    #[error("No integration point for {subject} on the first-parent chain {start}..{end}")]
    IntegrationPointNotFound {
        subject: String,
        start: String,
        end: String,
    },

    #[error("Stash {marker} already contains {}", path.display())]
    Conflict { marker: String, path: PathBuf },

    #[error("Timed out after {timeout:?} waiting for lock {}", path.display())]
    LockTimeout { path: PathBuf, timeout: Duration },

    #[error("Cancelled while waiting for lock {}", path.display())]
    Cancelled { path: PathBuf },

    #[error("Invalid stash path: {0}")]
    InvalidPath(String),

    #[error("Internal consistency error: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for Results in build-stash
pub type Result<T> = std::result::Result<T, StashError>;

impl StashError {
    /// Create a configuration error with context
    pub fn config(msg: impl Into<String>) -> Self {
        StashError::Config(msg.into())
    }

    /// Create a version error with context
    pub fn version(msg: impl Into<String>) -> Self {
        StashError::Version(msg.into())
    }

    /// Create a marker error with context
    pub fn marker(msg: impl Into<String>) -> Self {
        StashError::Marker(msg.into())
    }

    /// Create a topology error with context
    pub fn topology(msg: impl Into<String>) -> Self {
        StashError::Topology(msg.into())
    }

    /// Create a resolution error with context
    pub fn resolution(msg: impl Into<String>) -> Self {
        StashError::Resolution(msg.into())
    }

    /// Create an internal consistency error with context
    pub fn internal(msg: impl Into<String>) -> Self {
        StashError::Internal(msg.into())
    }

    /// True for failures of the stash store itself (conflicts, locks, I/O).
    ///
    /// Callers use this to tell "retry or fail hard" apart from lookups that
    /// simply found nothing.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            StashError::Conflict { .. }
                | StashError::LockTimeout { .. }
                | StashError::Cancelled { .. }
                | StashError::InvalidPath(_)
                | StashError::Io(_)
        )
    }

    /// True when a lock could not be acquired.
    pub fn is_lock(&self) -> bool {
        matches!(
            self,
            StashError::LockTimeout { .. } | StashError::Cancelled { .. }
        )
    }
}
