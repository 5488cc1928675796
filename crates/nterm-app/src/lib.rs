//! nterm-app: the application model
//!
//! Everything the invoking process computes before any window exists:
//! - Command-line parsing into the initial window/tab tree
//! - The profile store and profile reference resolution
//! - Session configuration files (`--load-config` and its save path)
//! - Shell word splitting and quoting

pub mod config;
pub mod options;
pub mod profile;
pub mod session_config;
pub mod shell;

pub use options::{InitialTab, InitialWindow, OptionsError, PassFd, TerminalOptions};
pub use profile::{Profile, ProfileError, ProfileStore, ResolveProfile};
pub use session_config::{SessionConfig, SessionConfigError};
