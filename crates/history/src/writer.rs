//! Snapshot writer
//!
//! Copies the live directory into a hidden staging sibling, then renames it
//! to its final `<name>_v<N>` path. A failed copy therefore never shows up as
//! a version. The writer does not clean up after itself; on failure the
//! error names the partial tree and the caller decides what to do with it.

use std::path::{Path, PathBuf};

use ks_core::naming::staging_dir_name;
use ks_core::{CopyStats, FsOps};
use uuid::Uuid;

use crate::error::SnapshotError;
use crate::Result;

/// A completed snapshot
#[derive(Debug, Clone)]
pub struct WrittenSnapshot {
    /// Final path of the snapshot
    pub path: PathBuf,
    /// Copy counters
    pub stats: CopyStats,
}

/// Writes full-tree snapshots through an [`FsOps`]
pub struct SnapshotWriter<'a> {
    fs: &'a dyn FsOps,
}

impl<'a> SnapshotWriter<'a> {
    /// Create a writer over the given filesystem
    pub fn new(fs: &'a dyn FsOps) -> Self {
        Self { fs }
    }

    /// Copy `source_dir` into the new snapshot at `dest_path`
    ///
    /// `dest_path` must not exist. Missing parents of `dest_path` are
    /// created.
    pub fn write_snapshot(&self, source_dir: &Path, dest_path: &Path) -> Result<WrittenSnapshot> {
        if !self.fs.exists(source_dir) {
            return Err(SnapshotError::SourceMissing {
                path: source_dir.to_path_buf(),
            });
        }
        if self.fs.exists(dest_path) {
            return Err(SnapshotError::VersionCollision {
                path: dest_path.to_path_buf(),
            });
        }

        let file_name = dest_path.file_name().and_then(|n| n.to_str());
        let (parent, final_name) = match (dest_path.parent(), file_name) {
            (Some(parent), Some(name)) => (parent, name),
            _ => {
                return Err(SnapshotError::InvalidInput {
                    field: "dest_path",
                    reason: "no parent or file name",
                })
            }
        };

        self.fs
            .create_dir_all(parent)
            .map_err(|source| SnapshotError::StorageUnavailable {
                path: parent.to_path_buf(),
                source,
            })?;

        let token = Uuid::new_v4().simple().to_string();
        let staging = parent.join(staging_dir_name(final_name, &token));

        let copy_failed = |source| SnapshotError::CopyFailure {
            source_dir: source_dir.to_path_buf(),
            partial: staging.clone(),
            source,
        };

        let stats = self.fs.copy_tree(source_dir, &staging).map_err(copy_failed)?;
        self.fs.rename(&staging, dest_path).map_err(copy_failed)?;

        Ok(WrittenSnapshot {
            path: dest_path.to_path_buf(),
            stats,
        })
    }
}
