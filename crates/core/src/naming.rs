//! On-disk naming of snapshot versions
//!
//! A snapshot of `reports` at version 3 lives in `reports_v3`. The number is a
//! positive decimal without leading zeros. Existing snapshot trees depend on
//! this exact shape, so it must not change.
//!
//! In-flight copies are staged under a hidden sibling name
//! (`.reports_v3.partial-<token>`) that never parses as a version.

/// Literal separator between the directory name and its version
pub const VERSION_DELIMITER: &str = "_v";

/// Marker embedded in staging directory names
pub const STAGING_MARKER: &str = ".partial-";

/// Name of the directory holding `version` of `base_name`
pub fn version_dir_name(base_name: &str, version: u64) -> String {
    format!("{base_name}{VERSION_DELIMITER}{version}")
}

/// Parse the version out of a destination entry name
///
/// Returns `None` for anything that is not exactly
/// `<base_name>_v<positive integer>`, including names that merely share a
/// prefix with `base_name` (`reports-old_v1` is not a version of `reports`).
pub fn parse_version(entry_name: &str, base_name: &str) -> Option<u64> {
    if base_name.is_empty() {
        return None;
    }

    let digits = entry_name
        .strip_prefix(base_name)?
        .strip_prefix(VERSION_DELIMITER)?;

    if digits.is_empty() || digits.starts_with('0') || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    // Overflowing values are foreign names too
    digits.parse().ok()
}

/// Name of the hidden staging directory for an in-flight copy whose final
/// name is `final_name`
pub fn staging_dir_name(final_name: &str, token: &str) -> String {
    format!(".{final_name}{STAGING_MARKER}{token}")
}

/// True for names produced by [`staging_dir_name`] for a version directory
///
/// Strict on purpose: the sweep after a crash deletes whatever matches.
pub fn is_staging_name(entry_name: &str) -> bool {
    let Some(rest) = entry_name.strip_prefix('.') else {
        return false;
    };
    let Some((final_name, token)) = rest.rsplit_once(STAGING_MARKER) else {
        return false;
    };
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return false;
    }

    match final_name.rsplit_once(VERSION_DELIMITER) {
        Some((base_name, _)) => parse_version(final_name, base_name).is_some(),
        None => false,
    }
}
