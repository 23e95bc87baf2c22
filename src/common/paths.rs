//! Configuration and scratch paths

use std::path::{Path, PathBuf};

/// Name used for the config directory and default work root
const APP_NAME: &str = "ptyharness";

/// Get the configuration directory path
///
/// Uses the directories crate for platform-appropriate locations:
/// - Linux: `~/.config/ptyharness/`
/// - macOS: `~/Library/Application Support/ptyharness/`
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Root under which session work directories are created
///
/// An explicitly configured root wins; otherwise a per-harness directory in
/// the system temp dir is used.
pub fn workdir_root(configured: Option<&Path>) -> PathBuf {
    match configured {
        Some(root) => root.to_path_buf(),
        None => std::env::temp_dir().join(APP_NAME),
    }
}

/// Turn a test case name into something safe to use as a directory prefix
pub fn sanitize_id(id: &str) -> String {
    let cleaned: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "session".to_string()
    } else {
        cleaned
    }
}
