//! Snapshot history for watched directories
//!
//! This crate provides:
//! - Version resolution from the destination tree (the disk is the only record)
//! - Staged full-tree snapshot writes
//! - Retention enforcement (keep the newest N versions)
//! - The per-directory snapshot pipeline tying the three together
//! - Cleanup of staging directories left behind by a crash

pub mod error;
pub mod pipeline;
pub mod resolver;
pub mod retention;
pub mod sweep;
pub mod writer;

// Re-exports
pub use error::SnapshotError;
pub use pipeline::{SnapshotOutcome, SnapshotPipeline, SnapshotRunner};
pub use resolver::{list_versions, next_version};
pub use retention::{RetentionEnforcer, RetentionPolicy, RetentionReport};
pub use sweep::sweep_staging;
pub use writer::{SnapshotWriter, WrittenSnapshot};

/// Result type for history operations
pub type Result<T> = std::result::Result<T, SnapshotError>;
