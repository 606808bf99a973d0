//! Core types for Keepsake
//!
//! This crate provides:
//! - The immutable daemon configuration and its validation
//! - Watched directory identities and their mirrored destination layout
//! - The on-disk `<name>_v<N>` version naming convention
//! - The filesystem collaborator (`FsOps`) used to copy, list and remove trees

pub mod config;
pub mod error;
pub mod fs;
pub mod layout;
pub mod naming;

// Re-exports
pub use config::{Config, ConfigError, IgnoreConfig, SymlinkPolicy, WatchDepth};
pub use error::CoreError;
pub use fs::{CopyStats, FsOps, LocalFs};
pub use layout::{VersionedSnapshot, WatchedDirectory};

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
