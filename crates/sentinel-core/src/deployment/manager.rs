//! Owns deployment records and the tasks executing them.
//!
//! Each started deployment runs in its own spawned task. The `JoinHandle` is
//! kept next to the record so callers can wait for completion or abort it.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use super::error::{DeploymentError, DeploymentResult};
use super::model::{Deployment, DeploymentStatus, DeploymentStatusView, StepPhase};
use super::plan::{plan_deployment, DeploymentRequest};
use super::runner::{StepContext, StepRunner};
use crate::domain::ValidationError;
use crate::obs;

type Entry = Arc<Mutex<Deployment>>;

pub struct DeploymentManager {
    runner: Arc<dyn StepRunner>,
    deployments: RwLock<HashMap<String, Entry>>,
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl DeploymentManager {
    pub fn new(runner: Arc<dyn StepRunner>) -> Self {
        Self {
            runner,
            deployments: RwLock::new(HashMap::new()),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    async fn entry(&self, id: &str) -> DeploymentResult<Entry> {
        self.deployments
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| DeploymentError::NotFound(id.to_string()))
    }

    async fn insert(&self, deployment: Deployment) -> String {
        let id = deployment.id.clone();
        self.deployments
            .write()
            .await
            .insert(id.clone(), Arc::new(Mutex::new(deployment)));
        id
    }

    /// Plan a deployment and store it as pending.
    pub async fn create(&self, request: &DeploymentRequest) -> Deployment {
        let deployment = plan_deployment(request, Utc::now());
        info!(
            deployment_id = %deployment.id,
            repository = %deployment.repository_name,
            strategy = %deployment.strategy,
            steps = deployment.steps.len(),
            "deployment planned"
        );
        self.insert(deployment.clone()).await;
        deployment
    }

    /// Move a pending deployment to in-progress and spawn its execution.
    ///
    /// The task map stays locked until the handle is stored, so `abort` always
    /// finds the handle of a deployment it sees in progress.
    pub async fn start(&self, id: &str) -> DeploymentResult<()> {
        let entry = self.entry(id).await?;
        let mut tasks = self.tasks.lock().await;
        {
            let mut deployment = entry.lock().await;
            if deployment.status != DeploymentStatus::Pending {
                return Err(DeploymentError::InvalidTransition {
                    id: id.to_string(),
                    status: deployment.status.to_string(),
                });
            }
            deployment.status = DeploymentStatus::InProgress;
            deployment.current_step = Some(0);
        }

        let handle = tokio::spawn(execute(entry, Arc::clone(&self.runner)));
        tasks.insert(id.to_string(), handle);
        Ok(())
    }

    /// `create` followed by `start`. Returns the deployment id.
    pub async fn submit(&self, request: &DeploymentRequest) -> DeploymentResult<String> {
        let id = self.create(request).await.id;
        self.start(&id).await?;
        Ok(id)
    }

    /// Wait for the execution task to finish and return the final record.
    ///
    /// A task that panicked leaves the deployment failed and is reported as
    /// `TaskFailed`.
    pub async fn join(&self, id: &str) -> DeploymentResult<Deployment> {
        let entry = self.entry(id).await?;
        let handle = self.tasks.lock().await.remove(id);
        if let Some(handle) = handle {
            match handle.await {
                Ok(()) => {}
                Err(err) if err.is_cancelled() => mark_failed(&entry, "aborted").await,
                Err(err) => {
                    let detail = format!("step runner panicked: {err}");
                    mark_failed(&entry, &detail).await;
                    return Err(DeploymentError::TaskFailed {
                        id: id.to_string(),
                        detail,
                    });
                }
            }
        }
        let snapshot = entry.lock().await.clone();
        Ok(snapshot)
    }

    /// Cancel a running deployment. Terminal deployments are left as they are.
    pub async fn abort(&self, id: &str) -> DeploymentResult<Deployment> {
        let entry = self.entry(id).await?;
        let handle = self.tasks.lock().await.remove(id);
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
        mark_failed(&entry, "aborted").await;
        let snapshot = entry.lock().await.clone();
        Ok(snapshot)
    }

    pub async fn get(&self, id: &str) -> DeploymentResult<Deployment> {
        let entry = self.entry(id).await?;
        let snapshot = entry.lock().await.clone();
        Ok(snapshot)
    }

    pub async fn status(
        &self,
        id: &str,
        recent_logs: usize,
    ) -> DeploymentResult<DeploymentStatusView> {
        let entry = self.entry(id).await?;
        let view = entry.lock().await.status_view(recent_logs);
        Ok(view)
    }

    /// All deployments, oldest first.
    pub async fn list(&self) -> Vec<Deployment> {
        let entries: Vec<Entry> = self.deployments.read().await.values().cloned().collect();
        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            out.push(entry.lock().await.clone());
        }
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        out
    }

    /// Record a rollback of a successful deployment as a new deployment.
    /// The original record is not modified.
    pub async fn rollback(&self, id: &str) -> DeploymentResult<Deployment> {
        let original = self.get(id).await?;
        if original.status != DeploymentStatus::Success {
            return Err(ValidationError::DeploymentNotRollbackable {
                id: id.to_string(),
                status: original.status.to_string(),
            }
            .into());
        }

        let mut rollback = Deployment {
            id: Uuid::new_v4().to_string(),
            status: DeploymentStatus::Rollback,
            current_step: None,
            log: Vec::new(),
            rollback_of: Some(original.id.clone()),
            created_at: Utc::now(),
            ..original
        };
        rollback.push_log(
            "rollback",
            StepPhase::Completed,
            format!("rollback of deployment {id} recorded"),
        );
        info!(deployment_id = %rollback.id, rollback_of = %id, "deployment rollback recorded");
        self.insert(rollback.clone()).await;
        Ok(rollback)
    }
}

/// Fail a deployment that has not reached a terminal state.
async fn mark_failed(entry: &Entry, reason: &str) {
    let mut deployment = entry.lock().await;
    if !matches!(
        deployment.status,
        DeploymentStatus::Pending | DeploymentStatus::InProgress
    ) {
        return;
    }
    let step = deployment
        .current_step_name()
        .unwrap_or("deployment")
        .to_string();
    deployment.push_log(&step, StepPhase::Failed, reason);
    deployment.status = DeploymentStatus::Failed;
    warn!(deployment_id = %deployment.id, reason = %reason, "deployment stopped");
    obs::emit_deployment_finished(&deployment.id, deployment.status.as_str());
}

/// Run every planned step in order. Stops as soon as the record leaves
/// in-progress, so an abort is never overwritten.
async fn execute(entry: Entry, runner: Arc<dyn StepRunner>) {
    let (ctx, steps) = {
        let deployment = entry.lock().await;
        let ctx = StepContext {
            deployment_id: deployment.id.clone(),
            repository_name: deployment.repository_name.clone(),
            strategy: deployment.strategy,
            environment: deployment.environment,
            language: deployment.language,
        };
        (ctx, deployment.steps.clone())
    };

    for (index, step) in steps.iter().enumerate() {
        {
            let mut deployment = entry.lock().await;
            if deployment.status != DeploymentStatus::InProgress {
                return;
            }
            deployment.current_step = Some(index);
            deployment.push_log(&step.name, StepPhase::Started, step.description.clone());
        }
        obs::emit_deployment_step(&ctx.deployment_id, &step.name, "started");

        let outcome = runner.run_step(&ctx, step).await;

        let mut deployment = entry.lock().await;
        if deployment.status != DeploymentStatus::InProgress {
            return;
        }
        match outcome {
            Ok(message) => {
                deployment.push_log(&step.name, StepPhase::Completed, message);
                obs::emit_deployment_step(&ctx.deployment_id, &step.name, "completed");
            }
            Err(err) => {
                deployment.push_log(&step.name, StepPhase::Failed, err.to_string());
                deployment.status = DeploymentStatus::Failed;
                obs::emit_deployment_step(&ctx.deployment_id, &step.name, "failed");
                obs::emit_deployment_finished(&ctx.deployment_id, deployment.status.as_str());
                return;
            }
        }
    }

    let mut deployment = entry.lock().await;
    if deployment.status != DeploymentStatus::InProgress {
        return;
    }
    deployment.status = DeploymentStatus::Success;
    obs::emit_deployment_finished(&ctx.deployment_id, deployment.status.as_str());
}
