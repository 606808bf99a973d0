//! Filesystem collaborator
//!
//! The snapshot pipeline never touches `std::fs` directly; it goes through
//! [`FsOps`] so tests can substitute failing or instrumented filesystems.

use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::SymlinkPolicy;
use crate::error::CoreError;
use crate::Result;

/// Counters reported by a tree copy
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CopyStats {
    /// Regular files copied
    pub files: u64,
    /// Directories created (excluding the destination root)
    pub directories: u64,
    /// Links recreated as links
    pub symlinks: u64,
    /// Bytes of file content copied
    pub bytes: u64,
    /// Entries skipped (vanished mid-copy, broken links, special files)
    pub skipped: u64,
}

/// Filesystem operations used by the snapshot pipeline
pub trait FsOps: Send + Sync {
    /// Names of the entries of `dir`
    ///
    /// Names that are not valid UTF-8 are left out; they can never be
    /// snapshot names.
    fn list_entries(&self, dir: &Path) -> Result<Vec<String>>;

    /// Recursively copy the directory `src` into `dst`, creating `dst` and any
    /// missing parents
    fn copy_tree(&self, src: &Path, dst: &Path) -> Result<CopyStats>;

    /// Recursively remove `path`; a missing path is not an error
    fn remove_tree(&self, path: &Path) -> Result<()>;

    /// Create `path` and its parents
    fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Rename `from` to `to` within one filesystem
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// True when something (file, directory or link) exists at `path`
    fn exists(&self, path: &Path) -> bool;
}

/// [`FsOps`] backed by the local filesystem
#[derive(Debug, Clone)]
pub struct LocalFs {
    symlinks: SymlinkPolicy,
}

impl LocalFs {
    /// Create a local filesystem with the given link policy
    ///
    /// `Preserve` needs Unix; elsewhere links are followed instead.
    pub fn new(symlinks: SymlinkPolicy) -> Self {
        if symlinks == SymlinkPolicy::Preserve && !cfg!(unix) {
            warn!("symlink preservation is only supported on unix; following links instead");
            return Self {
                symlinks: SymlinkPolicy::Follow,
            };
        }
        Self { symlinks }
    }

    /// Link policy in effect
    pub fn symlink_policy(&self) -> SymlinkPolicy {
        self.symlinks
    }

    fn following(&self) -> bool {
        self.symlinks == SymlinkPolicy::Follow
    }
}

impl Default for LocalFs {
    fn default() -> Self {
        Self::new(SymlinkPolicy::default())
    }
}

impl FsOps for LocalFs {
    fn list_entries(&self, dir: &Path) -> Result<Vec<String>> {
        let read_dir =
            fs::read_dir(dir).map_err(|e| CoreError::io("list_entries.read_dir", dir, e))?;

        let mut names = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| CoreError::io("list_entries.entry", dir, e))?;
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(raw) => debug!(dir = %dir.display(), name = ?raw, "skipping non UTF-8 entry"),
            }
        }
        Ok(names)
    }

    fn copy_tree(&self, src: &Path, dst: &Path) -> Result<CopyStats> {
        let meta = fs::metadata(src).map_err(|e| CoreError::io("copy_tree.stat_source", src, e))?;
        if !meta.is_dir() {
            return Err(CoreError::invalid(
                "source",
                "not a directory",
                src.display().to_string(),
            ));
        }

        fs::create_dir_all(dst).map_err(|e| CoreError::io("copy_tree.create_root", dst, e))?;

        let following = self.following();
        let mut stats = CopyStats::default();

        for entry in WalkDir::new(src).follow_links(following).min_depth(1) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    if let Some(path) = err.loop_ancestor().and(err.path()) {
                        return Err(CoreError::SymlinkLoop {
                            path: path.to_path_buf(),
                        });
                    }
                    if vanished(&err) {
                        // Deleted while copying, or a dangling link being followed
                        warn!(
                            path = %err.path().unwrap_or(src).display(),
                            "skipping entry that disappeared or points nowhere"
                        );
                        stats.skipped += 1;
                        continue;
                    }
                    return Err(CoreError::walk("copy_tree.walk", src, err));
                }
            };

            let relative = entry.path().strip_prefix(src).map_err(|_| {
                CoreError::invalid(
                    "source_entry",
                    "outside of source",
                    entry.path().display().to_string(),
                )
            })?;
            let target = dst.join(relative);
            let file_type = entry.file_type();

            if file_type.is_dir() {
                fs::create_dir_all(&target)
                    .map_err(|e| CoreError::io("copy_tree.create_dir", &target, e))?;
                stats.directories += 1;
            } else if file_type.is_symlink() {
                // Only reachable when links are preserved
                ensure_parent(&target)?;
                copy_link(entry.path(), &target)?;
                stats.symlinks += 1;
            } else if file_type.is_file() {
                ensure_parent(&target)?;
                match fs::copy(entry.path(), &target) {
                    Ok(bytes) => {
                        stats.files += 1;
                        stats.bytes += bytes;
                    }
                    Err(e) if e.kind() == io::ErrorKind::NotFound && !entry.path().exists() => {
                        debug!(path = %entry.path().display(), "file vanished during copy");
                        stats.skipped += 1;
                    }
                    Err(e) => return Err(CoreError::io("copy_tree.copy_file", &target, e)),
                }
            } else {
                debug!(path = %entry.path().display(), "skipping special file");
                stats.skipped += 1;
            }
        }

        Ok(stats)
    }

    fn remove_tree(&self, path: &Path) -> Result<()> {
        let meta = match fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(CoreError::io("remove_tree.stat", path, e)),
        };

        let result = if meta.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CoreError::io("remove_tree.remove", path, e)),
        }
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).map_err(|e| CoreError::io("create_dir_all", path, e))
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        fs::rename(from, to).map_err(|e| CoreError::io("rename", to, e))
    }

    fn exists(&self, path: &Path) -> bool {
        fs::symlink_metadata(path).is_ok()
    }
}

fn ensure_parent(target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| CoreError::io("copy_tree.create_parent", parent, e))?;
    }
    Ok(())
}

fn vanished(err: &walkdir::Error) -> bool {
    err.io_error()
        .map(|e| e.kind() == io::ErrorKind::NotFound)
        .unwrap_or(false)
}

#[cfg(unix)]
fn copy_link(link: &Path, target: &Path) -> Result<()> {
    let pointee = fs::read_link(link).map_err(|e| CoreError::io("copy_tree.read_link", link, e))?;
    std::os::unix::fs::symlink(&pointee, target)
        .map_err(|e| CoreError::io("copy_tree.create_link", target, e))
}

#[cfg(not(unix))]
fn copy_link(link: &Path, _target: &Path) -> Result<()> {
    // LocalFs::new never selects Preserve off unix
    Err(CoreError::invalid(
        "symlink",
        "link preservation unsupported on this platform",
        link.display().to_string(),
    ))
}
