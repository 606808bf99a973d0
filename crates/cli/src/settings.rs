//! Layered configuration loading
//!
//! Defaults, then a TOML file, then `.env` and the environment, then flags.
//! The last two layers are merged by clap.

use anyhow::{Context, Result};
use ks_core::Config;
use std::path::{Path, PathBuf};

use crate::args::Cli;

/// Per-user config file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("keepsake").join("config.toml"))
}

/// Load `.env` from the working directory, if there is one
///
/// Variables already present in the environment win.
pub fn load_env_file() -> Option<PathBuf> {
    dotenvy::dotenv().ok()
}

/// Build the effective configuration
pub fn load(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => read_file(path)?,
        None => match default_config_path().filter(|p| p.is_file()) {
            Some(path) => read_file(&path)?,
            None => Config::default(),
        },
    };

    cli.apply(&mut config);
    Ok(config)
}

/// Parse a TOML config file
pub fn read_file(path: &Path) -> Result<Config> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("Invalid config file {}", path.display()))
}

/// Render a configuration as TOML
pub fn render(config: &Config) -> Result<String> {
    toml::to_string_pretty(config).context("Failed to serialize configuration")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use ks_core::WatchDepth;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_file_then_flags() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
source_root = "/srv/live"
destination_root = "/srv/backups"
max_versions = 8
watch_depth = "nested"

[ignore]
patterns = ["*.tmp"]
"#,
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "keepsake",
            "--config",
            path.to_str().unwrap(),
            "--max-versions",
            "3",
        ])
        .unwrap();
        let config = load(&cli).unwrap();

        assert_eq!(config.source_root, PathBuf::from("/srv/live"));
        assert_eq!(config.max_versions, 3);
        assert_eq!(config.watch_depth, WatchDepth::Nested);
        assert_eq!(config.debounce_ms, 300);
        assert_eq!(config.ignore.patterns, vec!["*.tmp".to_string()]);
        assert!(config.ignore.builtin);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let cli = Cli {
            config: Some(temp_dir.path().join("nope.toml")),
            ..Cli::default()
        };

        let err = load(&cli).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "max_versions = \"many\"\n").unwrap();

        assert!(read_file(&path).is_err());
    }

    #[test]
    fn test_render_reads_back() {
        let config = Config {
            source_root: PathBuf::from("/srv/live"),
            destination_root: PathBuf::from("/srv/backups"),
            max_versions: 6,
            ..Config::default()
        };

        let text = render(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();

        assert!(text.contains("max_versions = 6"));
        assert_eq!(parsed, config);
    }
}
