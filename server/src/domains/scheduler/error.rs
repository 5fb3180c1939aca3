//! Typed error boundary for the engine's public entry points.
//!
//! Internal plumbing threads `anyhow::Result` the way the rest of the
//! codebase does; only the CLI/HTTP boundary needs to branch on the kind of
//! failure, so only that boundary sees this enum.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Another session already holds the run lock.
    #[error("another run is already in progress")]
    Blocked,

    /// The run was cooperatively cancelled mid-flight.
    #[error("run cancelled")]
    Cancelled,

    /// A caller-supplied narrowing parameter didn't resolve to anything
    /// runnable (e.g. an unknown template_id).
    #[error("validation error: {0}")]
    Validation(String),

    /// A database error escaped retry handling.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Anything else unexpected during expansion.
    #[error("unrecoverable error: {0}")]
    Unrecoverable(#[from] anyhow::Error),
}

impl EngineError {
    /// CLI exit code mapping.
    pub fn exit_code(&self) -> i32 {
        match self {
            EngineError::Cancelled => 1,
            _ => 2,
        }
    }
}
