//! Configuration directory plumbing
//!
//! Shared by the profile store and the session-config save path.

use std::path::PathBuf;

use directories::{BaseDirs, ProjectDirs};

/// Get the configuration directory path, creating it if needed.
pub fn config_dir() -> Option<PathBuf> {
    let dirs = ProjectDirs::from("org", "nterm", "nterm")?;
    let dir = dirs.config_dir().to_path_buf();
    std::fs::create_dir_all(&dir).ok()?;
    Some(dir)
}

/// Directory for per-user runtime files (the control socket lives here).
///
/// Falls back to the system temp directory when no runtime dir is available.
pub fn runtime_dir() -> PathBuf {
    BaseDirs::new()
        .and_then(|dirs| dirs.runtime_dir().map(|p| p.to_path_buf()))
        .unwrap_or_else(std::env::temp_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_dir_exists() {
        // Either XDG_RUNTIME_DIR or the temp fallback, both must be absolute.
        assert!(runtime_dir().is_absolute());
    }
}
