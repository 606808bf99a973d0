//! Snapshot pipeline errors
//!
//! None of these are fatal to the daemon; they end one pipeline run for one
//! directory and are logged by whoever started the run.

use std::path::PathBuf;

use ks_core::CoreError;
use thiserror::Error;

/// Failure of one step of the snapshot pipeline
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Destination parent missing or unreadable
    #[error("storage unavailable at {}: {source}", path.display())]
    StorageUnavailable {
        /// Destination parent that could not be read or created
        path: PathBuf,
        /// Underlying filesystem error
        source: CoreError,
    },

    /// The live directory is gone
    #[error("source directory {} does not exist", path.display())]
    SourceMissing {
        /// Source directory
        path: PathBuf,
    },

    /// The target version already exists; versions are never reused
    #[error("snapshot {} already exists", path.display())]
    VersionCollision {
        /// Path that should have been free
        path: PathBuf,
    },

    /// Copy or publish of the snapshot did not complete
    #[error("copy of {} failed: {source}", source_dir.display())]
    CopyFailure {
        /// Directory being copied
        source_dir: PathBuf,
        /// Partially written tree left behind
        partial: PathBuf,
        /// Underlying filesystem error
        source: CoreError,
    },

    /// A stale version could not be removed
    #[error("failed to delete version {version} at {}: {source}", path.display())]
    DeleteFailure {
        /// Version number
        version: u64,
        /// Version directory
        path: PathBuf,
        /// Underlying filesystem error
        source: CoreError,
    },

    /// Rejected input
    #[error("invalid {field}: {reason}")]
    InvalidInput {
        /// Field that failed validation
        field: &'static str,
        /// Static reason
        reason: &'static str,
    },
}
