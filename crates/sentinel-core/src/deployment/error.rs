//! Error types for the deployment state machine.

use crate::domain::ValidationError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeploymentError {
    #[error("deployment {0} not found")]
    NotFound(String),

    #[error("deployment {id} cannot be started from status {status}")]
    InvalidTransition { id: String, status: String },

    #[error("step {step} failed: {reason}")]
    StepFailed { step: String, reason: String },

    #[error("deployment task for {id} ended abnormally: {detail}")]
    TaskFailed { id: String, detail: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

pub type DeploymentResult<T> = std::result::Result<T, DeploymentError>;
