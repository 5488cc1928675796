//! Session configuration files
//!
//! `--load-config FILE` merges a previously saved window/tab layout into the
//! options tree; the save path is the inverse. The format is TOML: a
//! top-level `version`/`compat_version` pair gates loading, then one table
//! per window with its tabs inline. A tab's command is stored as one
//! shell-quoted string so the file stays hand-editable.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::options::{InitialWindow, TerminalOptions};
use crate::shell;

/// Format version written by this implementation.
pub const VERSION: u32 = 1;

/// Newest `compat_version` this implementation can load.
pub const COMPAT_VERSION: u32 = 1;

/// Session config errors
#[derive(Error, Debug)]
pub enum SessionConfigError {
    #[error("failed to read session config: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse session config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize session config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("session config requires version {found}, at most {supported} is supported")]
    Incompatible { found: u32, supported: u32 },

    #[error("session config window has no tabs")]
    EmptyWindow,
}

/// One saved tab.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TabConfig {
    /// Profile UUID. Machine-written; resolution never falls back.
    pub profile_id: Option<String>,
    pub working_directory: Option<PathBuf>,
    pub title: Option<String>,
    /// Shell-quoted command line.
    pub command: Option<String>,
    pub zoom: Option<f64>,
    pub active: bool,
}

/// One saved window.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WindowConfig {
    pub geometry: Option<String>,
    pub role: Option<String>,
    pub fullscreen: bool,
    pub maximized: bool,
    /// Menubar override; absent means "profile decides".
    pub menubar_visible: Option<bool>,
    pub tabs: Vec<TabConfig>,
}

/// A complete saved session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub version: u32,
    pub compat_version: u32,
    #[serde(default)]
    pub windows: Vec<WindowConfig>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            version: VERSION,
            compat_version: COMPAT_VERSION,
            windows: Vec::new(),
        }
    }
}

impl SessionConfig {
    /// Load and validate a session config file.
    pub fn load(path: &Path) -> Result<Self, SessionConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;

        if config.compat_version > COMPAT_VERSION {
            return Err(SessionConfigError::Incompatible {
                found: config.compat_version,
                supported: COMPAT_VERSION,
            });
        }
        if config.windows.iter().any(|w| w.tabs.is_empty()) {
            return Err(SessionConfigError::EmptyWindow);
        }

        Ok(config)
    }

    /// Save to a file.
    pub fn save(&self, path: &Path) -> Result<(), SessionConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Capture the window/tab layout of parsed options as a session config.
    pub fn capture(options: &TerminalOptions) -> Self {
        Self {
            version: VERSION,
            compat_version: COMPAT_VERSION,
            windows: options.windows.iter().map(capture_window).collect(),
        }
    }
}

fn capture_window(window: &InitialWindow) -> WindowConfig {
    WindowConfig {
        geometry: window.geometry.clone(),
        role: window.role.clone(),
        fullscreen: window.start_fullscreen,
        maximized: window.start_maximized,
        menubar_visible: window.menubar_state,
        tabs: window
            .tabs
            .iter()
            .map(|tab| TabConfig {
                profile_id: tab.profile.clone(),
                working_directory: tab.working_directory.clone(),
                title: tab.title.clone(),
                command: tab.exec_argv.as_ref().map(|argv| shell::join(argv)),
                zoom: tab.zoom_set.then_some(tab.zoom),
                active: tab.active,
            })
            .collect(),
    }
}
