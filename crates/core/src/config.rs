//! Daemon configuration
//!
//! Built once at startup (defaults, then TOML, then environment, then flags)
//! and shared read-only by every component afterwards.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::layout::WatchedDirectory;

/// Default number of versions kept per directory
pub const DEFAULT_MAX_VERSIONS: usize = 4;

/// Default quiet window before a snapshot starts
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

/// Upper bound for the debounce window (10 minutes)
pub const MAX_DEBOUNCE_MS: u64 = 600_000;

/// Errors found while validating configuration; all are fatal at startup
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required setting has no value
    #[error("{field} is not set")]
    Missing {
        /// Setting name
        field: &'static str,
    },

    /// A setting has an unusable value
    #[error("invalid {field} '{value}': {reason}")]
    InvalidValue {
        /// Setting name
        field: &'static str,
        /// Static reason
        reason: &'static str,
        /// Offending value
        value: String,
    },

    /// The source root is absent or not a directory
    #[error("source root {} is not a directory", path.display())]
    SourceUnavailable {
        /// Configured source root
        path: PathBuf,
    },

    /// Source and destination overlap, so snapshots would trigger snapshots
    #[error(
        "source root {} and destination root {} overlap",
        source_root.display(),
        destination_root.display()
    )]
    OverlappingRoots {
        /// Configured source root
        source_root: PathBuf,
        /// Configured destination root
        destination_root: PathBuf,
    },

    /// The destination root cannot be created or written to
    #[error("destination root {} is not writable: {source}", path.display())]
    DestinationUnwritable {
        /// Configured destination root
        path: PathBuf,
        /// Underlying IO error
        source: io::Error,
    },
}

/// How deep below the source root changes are tracked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WatchDepth {
    /// Only directories directly under the root are created or snapshotted
    #[default]
    TopLevel,
    /// Changes to files inside top-level directories, and directories one
    /// level deeper, are tracked too
    Nested,
}

impl WatchDepth {
    /// Maximum number of path components (relative to the source root) an
    /// event path may have
    pub fn max_components(self) -> usize {
        match self {
            Self::TopLevel => 1,
            Self::Nested => 2,
        }
    }
}

impl FromStr for WatchDepth {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "top-level" | "toplevel" | "top" | "0" => Ok(Self::TopLevel),
            "nested" | "1" => Ok(Self::Nested),
            _ => Err(ConfigError::InvalidValue {
                field: "watch_depth",
                reason: "expected 'top-level' or 'nested'",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for WatchDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TopLevel => f.write_str("top-level"),
            Self::Nested => f.write_str("nested"),
        }
    }
}

/// What a snapshot does with symbolic links found in the source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SymlinkPolicy {
    /// Copy the contents the link points at
    #[default]
    Follow,
    /// Recreate the link itself (unix only)
    Preserve,
}

impl FromStr for SymlinkPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "follow" => Ok(Self::Follow),
            "preserve" => Ok(Self::Preserve),
            _ => Err(ConfigError::InvalidValue {
                field: "symlinks",
                reason: "expected 'follow' or 'preserve'",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for SymlinkPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Follow => f.write_str("follow"),
            Self::Preserve => f.write_str("preserve"),
        }
    }
}

/// Ignore configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoreConfig {
    /// Drop editor swap files, backups and OS metadata files (default: true)
    #[serde(default = "default_true")]
    pub builtin: bool,

    /// Read `.keepsakeignore` from the source root (default: true)
    #[serde(default = "default_true")]
    pub use_ignore_file: bool,

    /// Additional gitignore-style patterns
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl Default for IgnoreConfig {
    fn default() -> Self {
        Self {
            builtin: true,
            use_ignore_file: true,
            patterns: vec![],
        }
    }
}

fn default_true() -> bool {
    true
}

/// Complete daemon configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Tree to watch
    pub source_root: PathBuf,

    /// Tree snapshots are written into
    pub destination_root: PathBuf,

    /// Versions kept per directory (>= 1)
    pub max_versions: usize,

    /// Quiet window in milliseconds before a snapshot starts
    pub debounce_ms: u64,

    /// Levels below the source root that produce events
    pub watch_depth: WatchDepth,

    /// Link handling during copies
    pub symlinks: SymlinkPolicy,

    /// Snapshot every existing watched directory once at startup
    pub initial_snapshot: bool,

    /// Also write logs to this file
    pub log_file: Option<PathBuf>,

    /// Event filtering
    pub ignore: IgnoreConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_root: PathBuf::new(),
            destination_root: PathBuf::new(),
            max_versions: DEFAULT_MAX_VERSIONS,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            watch_depth: WatchDepth::default(),
            symlinks: SymlinkPolicy::default(),
            initial_snapshot: false,
            log_file: None,
            ignore: IgnoreConfig::default(),
        }
    }
}

impl Config {
    /// Quiet window before a snapshot starts
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// View of the watched directory at `relative`
    pub fn watched_directory(&self, relative: impl AsRef<Path>) -> crate::Result<WatchedDirectory> {
        WatchedDirectory::new(&self.source_root, &self.destination_root, relative)
    }

    /// Check settings that do not require touching the destination
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source_root.as_os_str().is_empty() {
            return Err(ConfigError::Missing { field: "source_root" });
        }
        if self.destination_root.as_os_str().is_empty() {
            return Err(ConfigError::Missing {
                field: "destination_root",
            });
        }
        if self.max_versions == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_versions",
                reason: "must be at least 1",
                value: self.max_versions.to_string(),
            });
        }
        if self.debounce_ms > MAX_DEBOUNCE_MS {
            return Err(ConfigError::InvalidValue {
                field: "debounce_ms",
                reason: "must be at most 600000",
                value: self.debounce_ms.to_string(),
            });
        }
        if !self.source_root.is_dir() {
            return Err(ConfigError::SourceUnavailable {
                path: self.source_root.clone(),
            });
        }

        let source = normalize(&self.source_root);
        let destination = normalize(&self.destination_root);
        if source.starts_with(&destination) || destination.starts_with(&source) {
            return Err(ConfigError::OverlappingRoots {
                source_root: self.source_root.clone(),
                destination_root: self.destination_root.clone(),
            });
        }

        Ok(())
    }

    /// Create the destination root and prove it accepts writes
    pub fn prepare_destination(&self) -> Result<(), ConfigError> {
        let unwritable = |source| ConfigError::DestinationUnwritable {
            path: self.destination_root.clone(),
            source,
        };

        fs::create_dir_all(&self.destination_root).map_err(unwritable)?;

        let probe = self
            .destination_root
            .join(format!(".keepsake-probe-{}", std::process::id()));
        fs::write(&probe, b"probe").map_err(unwritable)?;
        fs::remove_file(&probe).map_err(unwritable)?;

        Ok(())
    }
}

/// Absolute form of `path`, resolving symlinks for the part that exists
fn normalize(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }

    // Walk up to the closest existing ancestor and re-append the rest
    let mut missing = Vec::new();
    let mut cursor = path;
    while let Some(parent) = cursor.parent() {
        if let Some(name) = cursor.file_name() {
            missing.push(name.to_os_string());
        }
        if let Ok(canonical) = parent.canonicalize() {
            return missing.iter().rev().fold(canonical, |acc, name| acc.join(name));
        }
        cursor = parent;
    }

    match std::env::current_dir() {
        Ok(cwd) if path.is_relative() => cwd.join(path),
        _ => path.to_path_buf(),
    }
}
