//! Deployment lifecycle.
//!
//! - `plan`: language detection, step planning, duration estimates
//! - `manager`: records plus the owned, joinable, abortable execution tasks
//! - `runner`: the `StepRunner` seam that actually performs steps

pub mod error;
pub mod manager;
pub mod model;
pub mod plan;
pub mod runner;

pub use error::{DeploymentError, DeploymentResult};
pub use manager::DeploymentManager;
pub use model::{
    Deployment, DeploymentLogEntry, DeploymentStatus, DeploymentStatusView, DeploymentStep,
    DeploymentStrategy, Environment, Language, StepPhase,
};
pub use plan::{
    detect_language, estimate_duration_secs, plan_deployment, plan_steps, DeploymentRequest,
};
pub use runner::{DryRunStepRunner, StepContext, StepRunner};
