//! Path Utilities
//!
//! Default locations for the spacedefs home directory and its files.

use std::path::{Path, PathBuf};

/// Get the spacedefs base directory (`~/.spacedefs/`)
pub fn spacedefs_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".spacedefs"))
}

/// Get the default space root (`~/.spacedefs/space/`)
pub fn default_space_dir() -> Option<PathBuf> {
    spacedefs_dir().map(|dir| dir.join("space"))
}

/// Get the default config file (`~/.spacedefs/spacedefs.json`)
pub fn default_config_path() -> Option<PathBuf> {
    spacedefs_dir().map(|dir| dir.join("spacedefs.json"))
}

/// Resolve a user-supplied path.
///
/// Absolute paths are returned as-is, `~/` is expanded against the home
/// directory, anything else is joined onto `base`.
pub fn resolve_path(raw: &str, base: &Path) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }

    let path = Path::new(raw);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
