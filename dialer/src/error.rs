//! Operator command errors

use crate::batch::state::{BatchState, IllegalTransition};
use crate::model::JobId;
use crate::store::StoreError;

/// Why an operator command was rejected. A rejected command changes nothing.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Batch job not found: {job_id}")]
    NotFound { job_id: JobId },

    #[error("Invalid batch transition: {from} → {to}")]
    InvalidStateTransition { from: BatchState, to: BatchState },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<IllegalTransition> for CommandError {
    fn from(err: IllegalTransition) -> Self {
        CommandError::InvalidStateTransition {
            from: err.from,
            to: err.to,
        }
    }
}

/// Result type for operator commands
pub type CommandResult<T> = Result<T, CommandError>;
