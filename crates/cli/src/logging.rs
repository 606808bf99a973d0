//! Tracing setup for the keepsake binary

use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str =
    "keepsake=info,keepsake_cli=info,keepsake_core=info,history=info,watcher=info";

/// Keeps the file writer flushing; hold it until the process exits
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Filter from `--log-level`, else `RUST_LOG`, else the default
pub fn build_filter(level: Option<&str>) -> Result<EnvFilter> {
    match level {
        Some(level) => {
            EnvFilter::try_new(level).with_context(|| format!("Invalid log filter '{level}'"))
        }
        None => Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))),
    }
}

/// Initialize tracing with stderr output and an optional log file
pub fn init(level: Option<&str>, log_file: Option<&Path>) -> Result<LogGuard> {
    let filter = build_filter(level)?;

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .with_context(|| format!("Log file path has no file name: {}", path.display()))?;
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;

            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(build_filter(level)?);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(filter),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(LogGuard { _file: guard })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_level() {
        assert!(build_filter(Some("debug")).is_ok());
        assert!(build_filter(Some("watcher=trace,history=debug")).is_ok());
    }

    #[test]
    fn test_invalid_level() {
        assert!(build_filter(Some("watcher=loud")).is_err());
    }

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
    }
}
