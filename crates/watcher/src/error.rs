//! Error types for the dispatcher

use history::SnapshotError;
use thiserror::Error;

/// Why a dispatcher stopped early
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The platform watcher can no longer deliver events
    #[error("watcher failed: {reason}")]
    Watcher { reason: String },
}

/// Why one snapshot run did not produce a version
#[derive(Debug, Error)]
pub enum RunFailure {
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error("snapshot task panicked: {0}")]
    Panicked(String),
}
