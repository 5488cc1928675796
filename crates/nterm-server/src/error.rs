//! Service error taxonomy
//!
//! Errors the factory and receiver return to callers. They cross the wire as
//! structured responses, never as crashes; the variants mirror the error
//! kinds in [`crate::protocol`].

use nterm_app::ProfileError;
use nterm_core::SpawnError;
use thiserror::Error;

use crate::protocol::ErrorKind;

/// Errors produced by the factory and receiver services.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("no such {kind} \"{id}\"")]
    NotFound { kind: &'static str, id: String },

    #[error("terminal already closed")]
    ScreenClosed,

    #[error("failed to start child process: {0}")]
    Spawn(#[from] SpawnError),

    #[error(transparent)]
    Profile(#[from] ProfileError),
}

impl ServiceError {
    /// Map to the wire-level error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            ServiceError::NotFound { .. } => ErrorKind::InvalidArgument,
            ServiceError::ScreenClosed => ErrorKind::ScreenClosed,
            ServiceError::Spawn(_) => ErrorKind::SpawnFailed,
            ServiceError::Profile(_) => ErrorKind::InvalidArgument,
        }
    }
}
