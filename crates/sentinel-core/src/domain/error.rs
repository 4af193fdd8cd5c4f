//! Domain-level error taxonomy for Repo Sentinel.

use sentinel_state::{HostError, StoreError};

/// Startup configuration errors. Fatal: the process must not start dispatching.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("trigger for handler '{handler}' uses unknown condition '{condition}'")]
    UnknownCondition { handler: String, condition: String },

    #[error("handler '{handler}' is registered twice for event type {event_type}")]
    DuplicateTrigger { handler: String, event_type: String },

    #[error("trigger references unregistered handler '{handler}'")]
    UnknownHandler { handler: String },

    #[error("trigger for handler '{handler}' has no event types")]
    EmptyEventTypes { handler: String },

    #[error("handler '{handler}' is registered twice")]
    DuplicateHandler { handler: String },

    #[error("handler '{handler}' cannot be built: {reason}")]
    InvalidHandler { handler: String, reason: String },

    #[error("invalid configuration file {path}: {reason}")]
    InvalidFile { path: String, reason: String },

    #[error("invalid configuration value {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Typed rejections of caller input. Never a panic, never a state change.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("cannot roll back to current state")]
    RollbackToCurrent,

    #[error("rollback number {requested} is out of range (valid: 2..={available})")]
    RollbackOutOfRange { requested: u32, available: usize },

    #[error("deployment {id} is {status}; only successful deployments can be rolled back")]
    DeploymentNotRollbackable { id: String, status: String },

    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    #[error("invalid repository url: {0}")]
    InvalidRepositoryUrl(String),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid {field}: '{value}'")]
    InvalidValue { field: String, value: String },
}

/// Repo Sentinel domain errors.
#[derive(Debug, thiserror::Error)]
pub enum SentinelError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("state store error: {0}")]
    Store(#[from] StoreError),

    #[error("hosting error: {0}")]
    Host(#[from] HostError),

    #[error("dispatch error: {0}")]
    Dispatch(#[from] crate::dispatcher::DispatchError),

    #[error("handler error: {0}")]
    Handler(#[from] crate::handler::HandlerError),

    #[error("deployment error: {0}")]
    Deployment(#[from] crate::deployment::DeploymentError),

    #[error("rollback error: {0}")]
    Rollback(#[from] crate::rollback::RollbackError),

    #[error("webhook error: {0}")]
    Webhook(#[from] crate::webhook::WebhookError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for Repo Sentinel domain operations.
pub type Result<T> = std::result::Result<T, SentinelError>;
