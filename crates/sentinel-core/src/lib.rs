//! Repo Sentinel Core Library
//!
//! Event orchestration for repository automation agents: inbound events are
//! matched against a trigger table and dispatched to isolated handlers,
//! deployments run through a step-by-step state machine, and rollbacks are
//! proposed as new commits on review branches instead of rewriting history.

pub mod api;
pub mod config;
pub mod deployment;
pub mod dispatcher;
pub mod domain;
pub mod handler;
pub mod history;
pub mod metrics;
pub mod obs;
pub mod rollback;
pub mod telemetry;
pub mod triggers;
pub mod webhook;

pub use api::{
    ActionResponse, CandidatesQuery, CandidatesResponse, DeploymentResponse,
    DeploymentStatusResponse, RollbackCommand, RollbackResponse, SentinelService, UserAction,
};
pub use config::SentinelConfig;
pub use deployment::{
    Deployment, DeploymentError, DeploymentManager, DeploymentRequest, DeploymentStatus,
    DeploymentStrategy, Environment, StepRunner,
};
pub use dispatcher::{DispatchError, Dispatcher};
pub use domain::{
    default_trigger_specs, AgentTrigger, ConfigError, EventPayload, EventProcessingResult,
    EventType, HandlerOutcome, Result, SentinelError, StateEffect, TriggerCondition, TriggerSpec,
    ValidationError,
};
pub use handler::{AgentHandler, HandlerError, HandlerRegistry, HttpAgentHandler};
pub use history::ResultHistory;
pub use rollback::{
    assess, parse_advisory, CandidateResolver, RiskLevel, RollbackAdvisor, RollbackCandidate,
    RollbackError, RollbackExecutor, RollbackOutcome, SafetyAssessment,
};
pub use telemetry::init_tracing;
pub use triggers::TriggerRegistry;
pub use webhook::{WebhookEnvelope, WebhookError, WebhookIngress};

pub use sentinel_state::{
    MemoryStateStore, RepoHost, RepoRef, RepositoryState, RepositoryStateStore,
};
