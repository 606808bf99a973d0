//! Version resolution
//!
//! Every call re-reads the destination parent. Nothing is cached, so a
//! restart, a manual cleanup or an external restore is picked up on the next
//! run without any bookkeeping.

use std::path::Path;

use ks_core::naming::parse_version;
use ks_core::{FsOps, VersionedSnapshot};

use crate::error::SnapshotError;
use crate::Result;

/// Existing versions of `base_name` under `destination_parent`, newest first
///
/// Entries that do not parse as `<base_name>_v<N>` are skipped.
pub fn list_versions(
    fs: &dyn FsOps,
    destination_parent: &Path,
    base_name: &str,
) -> Result<Vec<VersionedSnapshot>> {
    if base_name.is_empty() {
        return Err(SnapshotError::InvalidInput {
            field: "base_name",
            reason: "empty",
        });
    }

    let entries = fs
        .list_entries(destination_parent)
        .map_err(|source| SnapshotError::StorageUnavailable {
            path: destination_parent.to_path_buf(),
            source,
        })?;

    let mut versions: Vec<VersionedSnapshot> = entries
        .iter()
        .filter_map(|name| parse_version(name, base_name))
        .map(|version| VersionedSnapshot::new(destination_parent, base_name, version))
        .collect();

    // Numeric, so v10 sorts above v9
    versions.sort_unstable_by(|a, b| b.version.cmp(&a.version));
    Ok(versions)
}

/// Version the next snapshot gets: newest + 1, or 1 when there is none
pub fn next_version(versions: &[VersionedSnapshot]) -> Result<u64> {
    match versions.iter().map(|v| v.version).max() {
        None => Ok(1),
        Some(newest) => newest.checked_add(1).ok_or(SnapshotError::InvalidInput {
            field: "version",
            reason: "version numbers exhausted",
        }),
    }
}
