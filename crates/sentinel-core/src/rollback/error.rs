//! Error types for rollback resolution and execution.

use sentinel_state::HostError;

use crate::domain::ValidationError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RollbackError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("hosting error: {0}")]
    Host(#[from] HostError),

    #[error("branch {branch} has no commits")]
    EmptyHistory { branch: String },

    #[error("advisory failed: {0}")]
    Advisory(String),
}

pub type RollbackResult<T> = std::result::Result<T, RollbackError>;
