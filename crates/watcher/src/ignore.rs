//! Ignore pattern management for keepsake
//!
//! Supports three sources of ignore patterns:
//! 1. Built-in patterns (editor temporaries, OS metadata files)
//! 2. `.keepsakeignore` in the source root (gitignore syntax)
//! 3. Config-based patterns (gitignore syntax)
//!
//! Ignored paths never schedule a snapshot. They are still copied when their
//! directory is snapshotted for another reason.

use anyhow::Result;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ks_core::IgnoreConfig;
use std::path::{Path, PathBuf};

/// File name of the per-root ignore file
pub const IGNORE_FILE_NAME: &str = ".keepsakeignore";

/// Ignore rule manager
pub struct IgnoreRules {
    /// Source root the patterns are relative to
    source_root: PathBuf,

    /// Patterns from `.keepsakeignore` (optional)
    ignore_file: Option<Gitignore>,

    /// Patterns from configuration (optional)
    patterns: Option<Gitignore>,

    /// Configuration
    config: IgnoreConfig,
}

impl IgnoreRules {
    /// Load ignore rules for a source root
    pub fn load(source_root: &Path, config: IgnoreConfig) -> Result<Self> {
        let patterns = if config.patterns.is_empty() {
            None
        } else {
            let mut builder = GitignoreBuilder::new(source_root);
            for pattern in &config.patterns {
                builder.add_line(None, pattern)?;
            }
            Some(builder.build()?)
        };

        let mut rules = Self {
            source_root: source_root.to_path_buf(),
            ignore_file: None,
            patterns,
            config,
        };

        rules.reload_ignore_file()?;
        Ok(rules)
    }

    /// Rules that ignore nothing
    pub fn none(source_root: &Path) -> Self {
        Self {
            source_root: source_root.to_path_buf(),
            ignore_file: None,
            patterns: None,
            config: IgnoreConfig {
                builtin: false,
                use_ignore_file: false,
                patterns: vec![],
            },
        }
    }

    /// Re-read `.keepsakeignore` from disk
    ///
    /// On a parse error the rules already loaded stay in effect.
    pub fn reload_ignore_file(&mut self) -> Result<()> {
        if !self.config.use_ignore_file {
            self.ignore_file = None;
            return Ok(());
        }

        let path = self.source_root.join(IGNORE_FILE_NAME);
        if !path.exists() {
            self.ignore_file = None;
            return Ok(());
        }

        let mut builder = GitignoreBuilder::new(&self.source_root);
        if let Some(err) = builder.add(&path) {
            return Err(err.into());
        }
        let parsed = builder.build()?;
        self.ignore_file = Some(parsed);

        Ok(())
    }

    /// Whether `relative` names the ignore file itself
    pub fn is_ignore_file(&self, relative: &Path) -> bool {
        self.config.use_ignore_file && relative == Path::new(IGNORE_FILE_NAME)
    }

    /// Check if a path relative to the source root should be ignored
    pub fn should_ignore(&self, relative: &Path) -> bool {
        if self.config.builtin && is_builtin_ignored(relative) {
            return true;
        }
        if self.ignore_file.is_none() && self.patterns.is_none() {
            return false;
        }

        let is_dir = self.source_root.join(relative).is_dir();
        [&self.ignore_file, &self.patterns]
            .into_iter()
            .flatten()
            .any(|rules| rules.matched_path_or_any_parents(relative, is_dir).is_ignore())
    }

    /// Get number of active ignore sources
    pub fn active_sources(&self) -> usize {
        usize::from(self.config.builtin)
            + usize::from(self.ignore_file.is_some())
            + usize::from(self.patterns.is_some())
    }

    /// Get source root
    pub fn source_root(&self) -> &Path {
        &self.source_root
    }
}

/// Editor temporaries and OS metadata files, matched on any path component
fn is_builtin_ignored(path: &Path) -> bool {
    path.components()
        .filter_map(|c| c.as_os_str().to_str())
        .any(matches_editor_temp)
}

/// Covers Vim, Emacs, JetBrains safe-write files and MacOS/Windows system files
fn matches_editor_temp(name: &str) -> bool {
    // Vim swap files
    if name.ends_with(".swp") || name.ends_with(".swo") || name.ends_with(".swx") {
        return true;
    }

    // Vim/Emacs backup files
    if name.ends_with('~') {
        return true;
    }

    // Emacs auto-save and lock files
    if (name.len() > 1 && name.starts_with('#') && name.ends_with('#')) || name.starts_with(".#") {
        return true;
    }

    // JetBrains safe-write temporaries
    if name.ends_with("___jb_tmp___") || name.ends_with("___jb_old___") {
        return true;
    }

    // MacOS and Windows system files
    matches!(name, ".DS_Store" | "Thumbs.db" | "desktop.ini") || name.starts_with("._")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config(builtin: bool, use_ignore_file: bool, patterns: &[&str]) -> IgnoreConfig {
        IgnoreConfig {
            builtin,
            use_ignore_file,
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn test_builtin_patterns() {
        let temp_dir = TempDir::new().unwrap();
        let rules = IgnoreRules::load(temp_dir.path(), IgnoreConfig::default()).unwrap();

        assert!(rules.should_ignore(Path::new("reports/.summary.txt.swp")));
        assert!(rules.should_ignore(Path::new("reports/summary.txt~")));
        assert!(rules.should_ignore(Path::new("reports/#summary.txt#")));
        assert!(rules.should_ignore(Path::new("reports/.#summary.txt")));
        assert!(rules.should_ignore(Path::new(".DS_Store")));
        assert!(rules.should_ignore(Path::new("reports/._cover.png")));

        assert!(!rules.should_ignore(Path::new("reports")));
        assert!(!rules.should_ignore(Path::new("reports/summary.txt")));
        assert!(!rules.should_ignore(Path::new("#")));
    }

    #[test]
    fn test_builtin_can_be_disabled() {
        let temp_dir = TempDir::new().unwrap();
        let rules = IgnoreRules::load(temp_dir.path(), config(false, false, &[])).unwrap();

        assert!(!rules.should_ignore(Path::new("reports/.summary.txt.swp")));
        assert_eq!(rules.active_sources(), 0);
    }

    #[test]
    fn test_ignore_file_parsing() -> Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join(IGNORE_FILE_NAME), "*.log\nscratch/\n")?;
        fs::create_dir_all(temp_dir.path().join("scratch"))?;

        let rules = IgnoreRules::load(temp_dir.path(), IgnoreConfig::default())?;

        assert!(rules.should_ignore(Path::new("reports/debug.log")));
        assert!(rules.should_ignore(Path::new("scratch")));
        assert!(rules.should_ignore(Path::new("scratch/notes.txt")));
        assert!(!rules.should_ignore(Path::new("reports/summary.txt")));
        assert_eq!(rules.active_sources(), 2);

        Ok(())
    }

    #[test]
    fn test_ignore_file_disabled() -> Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join(IGNORE_FILE_NAME), "*.log\n")?;

        let rules = IgnoreRules::load(temp_dir.path(), config(true, false, &[]))?;

        assert!(!rules.should_ignore(Path::new("debug.log")));
        assert!(!rules.is_ignore_file(Path::new(IGNORE_FILE_NAME)));

        Ok(())
    }

    #[test]
    fn test_config_patterns() {
        let temp_dir = TempDir::new().unwrap();
        let patterns = config(false, false, &["*.tmp", "cache/"]);
        let rules = IgnoreRules::load(temp_dir.path(), patterns).unwrap();
        fs::create_dir_all(temp_dir.path().join("cache")).unwrap();

        assert!(rules.should_ignore(Path::new("upload.tmp")));
        assert!(rules.should_ignore(Path::new("reports/upload.tmp")));
        assert!(rules.should_ignore(Path::new("cache")));
        assert!(rules.should_ignore(Path::new("cache/blob")));
        assert!(!rules.should_ignore(Path::new("reports/summary.txt")));
    }

    #[test]
    fn test_negation_in_ignore_file() -> Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(
            temp_dir.path().join(IGNORE_FILE_NAME),
            "*.log\n!important.log\n",
        )?;

        let rules = IgnoreRules::load(temp_dir.path(), config(false, true, &[]))?;

        assert!(rules.should_ignore(Path::new("debug.log")));
        assert!(!rules.should_ignore(Path::new("important.log")));

        Ok(())
    }

    #[test]
    fn test_reload_ignore_file() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let mut rules = IgnoreRules::load(temp_dir.path(), IgnoreConfig::default())?;
        assert!(!rules.should_ignore(Path::new("debug.log")));
        assert!(rules.is_ignore_file(Path::new(IGNORE_FILE_NAME)));

        fs::write(temp_dir.path().join(IGNORE_FILE_NAME), "*.log\n")?;
        rules.reload_ignore_file()?;
        assert!(rules.should_ignore(Path::new("debug.log")));

        fs::remove_file(temp_dir.path().join(IGNORE_FILE_NAME))?;
        rules.reload_ignore_file()?;
        assert!(!rules.should_ignore(Path::new("debug.log")));

        Ok(())
    }

    #[test]
    fn test_malformed_reload_keeps_previous_rules() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let ignore_path = temp_dir.path().join(IGNORE_FILE_NAME);
        fs::write(&ignore_path, "*.log\n")?;
        let mut rules = IgnoreRules::load(temp_dir.path(), IgnoreConfig::default())?;
        assert!(rules.should_ignore(Path::new("debug.log")));

        fs::write(&ignore_path, "*.log\n{a,b\n[z-a]\n")?;
        assert!(rules.reload_ignore_file().is_err());

        assert!(rules.should_ignore(Path::new("debug.log")));
        assert_eq!(rules.active_sources(), 2);

        Ok(())
    }

    #[test]
    fn test_none_ignores_nothing() {
        let rules = IgnoreRules::none(Path::new("/src"));
        assert!(!rules.should_ignore(Path::new("a.swp")));
        assert_eq!(rules.source_root(), Path::new("/src"));
    }
}
