//! Directory scan for initial and recovery snapshots
//!
//! Finds every directory the watcher would treat as a snapshot target, so
//! the caller can enqueue them as if they had just appeared. Used at startup
//! when an initial snapshot is requested and after the platform watcher
//! reports dropped events.

use std::path::{Path, PathBuf};

use anyhow::Result;
use ks_core::WatchDepth;
use tracing::debug;
use walkdir::WalkDir;

use crate::ignore::IgnoreRules;

/// Directories under `source_root` within `depth`, sorted, as absolute paths
pub fn watched_directories(
    source_root: &Path,
    depth: WatchDepth,
    rules: &IgnoreRules,
) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();

    for entry in WalkDir::new(source_root)
        .follow_links(false)
        .min_depth(1)
        .max_depth(depth.max_components())
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || e.path()
                    .strip_prefix(source_root)
                    .map(|rel| !rules.should_ignore(rel))
                    .unwrap_or(false)
        })
    {
        let entry = entry?;
        if entry.file_type().is_dir() {
            dirs.push(entry.into_path());
        }
    }

    debug!(count = dirs.len(), root = %source_root.display(), "scanned watched directories");
    Ok(dirs)
}
