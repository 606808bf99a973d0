//! Watched directory identities and their destination layout
//!
//! A watched directory is identified by its path relative to the source
//! root. Its snapshots live next to each other in the mirrored parent under
//! the destination root:
//!
//! ```text
//! source/
//!   projects/
//!     reports/          <- identity "projects/reports"
//! destination/
//!   projects/           <- destination_parent
//!     reports_v1/
//!     reports_v2/
//! ```

use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use crate::error::CoreError;
use crate::naming;
use crate::Result;

/// A directory under the source root whose changes produce snapshots
///
/// This is a computed view; nothing about it is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WatchedDirectory {
    /// Path relative to the source root (the identity)
    relative: PathBuf,
    /// Final path segment
    base_name: String,
    /// Absolute path of the live directory
    source: PathBuf,
    /// Mirrored parent directory under the destination root
    destination_parent: PathBuf,
}

impl WatchedDirectory {
    /// Build the view for `relative` under the given roots
    ///
    /// `relative` must be non-empty, relative, made only of normal
    /// components, and end in a UTF-8 name.
    pub fn new(
        source_root: &Path,
        destination_root: &Path,
        relative: impl AsRef<Path>,
    ) -> Result<Self> {
        let relative = relative.as_ref();
        let display = relative.display().to_string();

        if relative.as_os_str().is_empty() {
            return Err(CoreError::invalid("relative_path", "empty", display));
        }
        if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(CoreError::invalid("relative_path", "not a plain relative path", display));
        }

        let base_name = relative
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                CoreError::invalid("relative_path", "name is not valid UTF-8", display.clone())
            })?
            .to_string();

        let destination_parent = match relative.parent() {
            Some(parent) => destination_root.join(parent),
            None => destination_root.to_path_buf(),
        };

        Ok(Self {
            relative: relative.to_path_buf(),
            base_name,
            source: source_root.join(relative),
            destination_parent,
        })
    }

    /// Identity of this directory (path relative to the source root)
    pub fn relative(&self) -> &Path {
        &self.relative
    }

    /// Final path segment, the prefix of every snapshot name
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    /// Live directory being backed up
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Directory holding the snapshots
    pub fn destination_parent(&self) -> &Path {
        &self.destination_parent
    }

    /// Number of levels below the source root
    pub fn depth(&self) -> usize {
        self.relative.components().count()
    }

    /// Final path of `version`
    pub fn version_path(&self, version: u64) -> PathBuf {
        self.destination_parent
            .join(naming::version_dir_name(&self.base_name, version))
    }

    /// Hidden sibling a copy of `version` is staged in
    pub fn staging_path(&self, version: u64, token: &str) -> PathBuf {
        let final_name = naming::version_dir_name(&self.base_name, version);
        self.destination_parent
            .join(naming::staging_dir_name(&final_name, token))
    }
}

impl std::fmt::Display for WatchedDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.relative.display())
    }
}

/// One version of a watched directory on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedSnapshot {
    /// Name of the directory this is a snapshot of
    pub base_name: String,
    /// Version number (>= 1)
    pub version: u64,
    /// `destination_parent/base_name_v{version}`
    pub path: PathBuf,
}

impl VersionedSnapshot {
    /// Describe `version` of `base_name` under `destination_parent`
    pub fn new(destination_parent: &Path, base_name: &str, version: u64) -> Self {
        Self {
            base_name: base_name.to_string(),
            version,
            path: destination_parent.join(naming::version_dir_name(base_name, version)),
        }
    }

    /// Creation time of the snapshot, taken from the filesystem
    pub fn modified(&self) -> Result<SystemTime> {
        std::fs::symlink_metadata(&self.path)
            .and_then(|m| m.modified())
            .map_err(|e| CoreError::io("snapshot.modified", &self.path, e))
    }
}
