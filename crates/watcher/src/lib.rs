//! Directory watching for Keepsake
//!
//! This crate turns raw filesystem notifications into snapshot requests:
//! - Platform events normalized into [`WatchEvent`]s
//! - Ignore rules for editor temporaries and `.keepsakeignore`
//! - Per-directory debouncing with at most one snapshot in flight
//! - Initial and overflow rescans of the watched directories

pub mod debounce;
pub mod dispatch;
pub mod error;
pub mod ignore;
pub mod platform;
pub mod scan;

use std::path::PathBuf;

pub use debounce::{Completion, DebounceTable, DirPhase, Removal, Touch};
pub use dispatch::{DispatchStats, Dispatcher};
pub use error::{DispatchError, RunFailure};
pub use crate::ignore::IgnoreRules;
pub use platform::FsWatcher;
pub use scan::watched_directories;

/// Bound on queued events between the platform watcher and the dispatcher
pub const CHANNEL_CAPACITY: usize = 1024;

/// A normalized filesystem event
///
/// Paths are absolute, as reported by the platform watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A directory appeared, or a directory itself was replaced
    DirectoryAdded(PathBuf),
    /// A file was created, modified or removed
    FileChanged(PathBuf),
    /// A directory went away
    DirectoryRemoved(PathBuf),
    /// The platform dropped events; any watched directory may have changed
    Overflow,
    /// The watcher reported a problem
    WatchError {
        /// Human-readable description
        reason: String,
        /// Watching cannot continue
        fatal: bool,
    },
}

impl WatchEvent {
    /// Path the event is about, if any
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Self::DirectoryAdded(p) | Self::FileChanged(p) | Self::DirectoryRemoved(p) => Some(p),
            Self::Overflow | Self::WatchError { .. } => None,
        }
    }
}
