//! nterm-core: low-level building blocks for the nterm control plane
//!
//! This crate provides the pieces shared by the client and server sides:
//! - File descriptor passing over Unix domain sockets (SCM_RIGHTS)
//! - Child process spawning with cwd/env/fd-remap support and exit collection
//! - Zoom scale bounds shared by option parsing and screen creation
//!
//! Unix only: the control socket and descriptor passing have no portable
//! equivalent.

pub mod fd_passing;
pub mod spawn;
pub mod zoom;

pub use spawn::{Child, SpawnConfig, SpawnError, FD_MAP_MAX};
pub use zoom::{clamp_zoom, ZOOM_MAX, ZOOM_MIN};
