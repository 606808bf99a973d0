//! Command-line arguments
//!
//! Every flag also reads an environment variable, so the effective
//! precedence is flag > environment (including `.env`) > config file >
//! defaults.

use clap::Parser;
use ks_core::{Config, SymlinkPolicy, WatchDepth};
use std::path::PathBuf;

/// Keepsake - versioned directory backups on change
#[derive(Parser, Debug, Default)]
#[command(name = "keepsake")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/keepsake/config.toml if present)
    #[arg(short, long, value_name = "PATH", env = "KEEPSAKE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory to watch
    #[arg(long, value_name = "DIR", env = "SOURCE_DIR")]
    pub source: Option<PathBuf>,

    /// Directory that receives the versioned copies
    #[arg(long, value_name = "DIR", env = "DESTINATION_DIR")]
    pub destination: Option<PathBuf>,

    /// Versions kept per directory (default: 4)
    #[arg(long, env = "KEEPSAKE_MAX_VERSIONS")]
    pub max_versions: Option<usize>,

    /// Quiet window before a snapshot starts, in milliseconds (default: 300)
    #[arg(long, env = "KEEPSAKE_DEBOUNCE_MS")]
    pub debounce_ms: Option<u64>,

    /// top-level or nested (default: top-level)
    #[arg(long, env = "KEEPSAKE_WATCH_DEPTH")]
    pub watch_depth: Option<WatchDepth>,

    /// follow or preserve (default: follow)
    #[arg(long, env = "KEEPSAKE_SYMLINKS")]
    pub symlinks: Option<SymlinkPolicy>,

    /// Snapshot every existing directory once at startup
    #[arg(long)]
    pub initial_snapshot: bool,

    /// Also write logs to this file
    #[arg(long, value_name = "PATH", env = "KEEPSAKE_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "watcher=trace" (default: RUST_LOG, then info)
    #[arg(long, value_name = "FILTER")]
    pub log_level: Option<String>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    pub print_config: bool,
}

impl Cli {
    /// Overlay the values given on the command line or in the environment
    pub fn apply(&self, config: &mut Config) {
        if let Some(source) = &self.source {
            config.source_root = source.clone();
        }
        if let Some(destination) = &self.destination {
            config.destination_root = destination.clone();
        }
        if let Some(max_versions) = self.max_versions {
            config.max_versions = max_versions;
        }
        if let Some(debounce_ms) = self.debounce_ms {
            config.debounce_ms = debounce_ms;
        }
        if let Some(depth) = self.watch_depth {
            config.watch_depth = depth;
        }
        if let Some(symlinks) = self.symlinks {
            config.symlinks = symlinks;
        }
        if self.initial_snapshot {
            config.initial_snapshot = true;
        }
        if let Some(log_file) = &self.log_file {
            config.log_file = Some(log_file.clone());
        }
    }
}
