//! Error types for the scheduler.
//!
//! Every variant is fatal: each one means the "exactly one running continuation, every
//! other one resumable or unborn" invariant no longer holds.

use thiserror::Error;

use crate::ids::ContinuationId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SwitchError {
    /// An entry action completed instead of switching away.
    #[error("entrypoint returned: continuation {id} finished without switching to another continuation")]
    EntrypointReturned { id: ContinuationId },

    /// `switch_to` was called by a continuation that is already suspended.
    #[error("already paused: continuation {id} cannot be paused twice before it is resumed")]
    AlreadyPaused { id: ContinuationId },

    /// The target has no record, or no stored resume action (it is running).
    #[error("target missing: continuation {id} is unknown or not resumable")]
    TargetMissing { id: ContinuationId },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl SwitchError {
    pub fn entrypoint_returned(id: ContinuationId) -> Self {
        SwitchError::EntrypointReturned { id }
    }

    pub fn already_paused(id: ContinuationId) -> Self {
        SwitchError::AlreadyPaused { id }
    }

    pub fn target_missing(id: ContinuationId) -> Self {
        SwitchError::TargetMissing { id }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        SwitchError::Internal {
            message: message.into(),
        }
    }

    /// The continuation the violation is attributed to, if any.
    pub fn continuation(&self) -> Option<ContinuationId> {
        match self {
            SwitchError::EntrypointReturned { id }
            | SwitchError::AlreadyPaused { id }
            | SwitchError::TargetMissing { id } => Some(*id),
            SwitchError::Internal { .. } => None,
        }
    }
}
