//! Step execution seam.

use async_trait::async_trait;
use tracing::info;

use super::error::DeploymentResult;
use super::model::{DeploymentStep, DeploymentStrategy, Environment, Language};

/// What a runner knows about the deployment a step belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepContext {
    pub deployment_id: String,
    pub repository_name: String,
    pub strategy: DeploymentStrategy,
    pub environment: Environment,
    pub language: Language,
}

/// Executes a single deployment step.
///
/// Returns a short completion message for the deployment log, or
/// `DeploymentError::StepFailed` to halt the deployment.
#[async_trait]
pub trait StepRunner: Send + Sync {
    async fn run_step(&self, ctx: &StepContext, step: &DeploymentStep) -> DeploymentResult<String>;
}

/// Runner that only records what would be done.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunStepRunner;

#[async_trait]
impl StepRunner for DryRunStepRunner {
    async fn run_step(&self, ctx: &StepContext, step: &DeploymentStep) -> DeploymentResult<String> {
        info!(
            deployment_id = %ctx.deployment_id,
            step = %step.name,
            environment = %ctx.environment,
            "dry run"
        );
        Ok(format!("dry run: {}", step.description))
    }
}
