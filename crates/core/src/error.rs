//! Filesystem-level errors
//!
//! Every variant carries the operation that failed and the path involved so a
//! log line is enough to reproduce the failure.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors produced by the filesystem collaborator and layout helpers
#[derive(Debug, Error)]
pub enum CoreError {
    /// IO failure while touching the filesystem
    #[error("{operation} failed for {}: {source}", path.display())]
    Io {
        /// Operation that triggered the failure
        operation: &'static str,
        /// Path involved
        path: PathBuf,
        /// Underlying IO error
        source: io::Error,
    },

    /// Directory traversal failure
    #[error("{operation} failed for {}: {source}", path.display())]
    Walk {
        /// Operation that triggered the failure
        operation: &'static str,
        /// Root of the traversal
        path: PathBuf,
        /// Underlying walkdir error
        source: walkdir::Error,
    },

    /// Symbolic link cycle found while following links
    #[error("symlink loop at {}", path.display())]
    SymlinkLoop {
        /// Entry that points back at one of its ancestors
        path: PathBuf,
    },

    /// Rejected input
    #[error("invalid {field}: {reason} ({value})")]
    InvalidInput {
        /// Field that failed validation
        field: &'static str,
        /// Static reason
        reason: &'static str,
        /// Offending value
        value: String,
    },
}

impl CoreError {
    pub(crate) fn io(operation: &'static str, path: &Path, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn walk(operation: &'static str, path: &Path, source: walkdir::Error) -> Self {
        Self::Walk {
            operation,
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn invalid(
        field: &'static str,
        reason: &'static str,
        value: impl Into<String>,
    ) -> Self {
        Self::InvalidInput {
            field,
            reason,
            value: value.into(),
        }
    }

    /// True when the failure is a missing path
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Io { source, .. } => source.kind() == io::ErrorKind::NotFound,
            Self::Walk { source, .. } => source
                .io_error()
                .map(|e| e.kind() == io::ErrorKind::NotFound)
                .unwrap_or(false),
            _ => false,
        }
    }
}
