//! Shared error types for the services crate.

use thiserror::Error;

use exam_core::model::{SessionError, SessionId, SnapshotError};
use storage::repository::StorageError;

/// Errors emitted by simulation services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SimulationError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("checkpoint is unusable: {0}")]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("no questions match the selection")]
    NoQuestions,
    #[error("no checkpoint for session {0}")]
    UnknownSession(SessionId),
    #[error("session state lock poisoned")]
    Lock,
}

/// Errors emitted while validating `SimulationConfig`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("{mode} duration must be > 0 seconds")]
    ZeroDuration { mode: &'static str },
    #[error("checkpoint attempts must be between 1 and 10, got {0}")]
    InvalidCheckpointAttempts(u32),
}
