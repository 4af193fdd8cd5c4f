//! User-facing operations.
//!
//! Every answer carries an explicit `success` flag; failures are described
//! in `error` instead of being raised to the caller. Internally each
//! operation is a `SentinelError` result, rendered into that field.

use std::sync::Arc;

use chrono::Utc;
use sentinel_state::{Credential, RepoRef};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::deployment::{DeploymentManager, DeploymentRequest, DeploymentStatusView};
use crate::dispatcher::Dispatcher;
use crate::domain::{
    EventPayload, EventProcessingResult, EventType, Result, SentinelError, ValidationError,
};
use crate::rollback::{
    CandidateReport, CandidateResolver, RollbackExecutor, RollbackOutcome, RollbackRequest,
};

/// Body of a direct user action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAction {
    pub repository_url: String,
    pub user_id: String,
    #[serde(default, skip_serializing)]
    pub credential: Option<String>,
}

impl UserAction {
    pub fn new(repository_url: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            repository_url: repository_url.into(),
            user_id: user_id.into(),
            credential: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse {
    pub success: bool,
    pub results: Vec<EventProcessingResult>,
    pub error: Option<String>,
}

impl ActionResponse {
    fn failed(error: impl ToString) -> Self {
        Self {
            success: false,
            results: Vec::new(),
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentResponse {
    pub success: bool,
    pub deployment_id: Option<String>,
    pub results: Vec<EventProcessingResult>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentStatusResponse {
    pub success: bool,
    pub deployment: Option<DeploymentStatusView>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidatesQuery {
    pub repository_url: String,
    pub branch: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidatesResponse {
    pub success: bool,
    #[serde(flatten)]
    pub report: Option<CandidateReport>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackCommand {
    pub repository_url: String,
    pub rollback_number: u32,
    pub branch: String,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackResponse {
    pub success: bool,
    pub outcome: Option<RollbackOutcome>,
    pub error: Option<String>,
}

/// Entry point wiring dispatch, deployments and rollback together.
pub struct SentinelService {
    dispatcher: Arc<Dispatcher>,
    deployments: Arc<DeploymentManager>,
    resolver: CandidateResolver,
    executor: RollbackExecutor,
    candidate_limit: usize,
    status_log_lines: usize,
}

impl SentinelService {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        deployments: Arc<DeploymentManager>,
        resolver: CandidateResolver,
        candidate_limit: usize,
        status_log_lines: usize,
    ) -> Self {
        let executor =
            RollbackExecutor::new(resolver.clone()).with_candidate_limit(candidate_limit);
        Self {
            dispatcher,
            deployments,
            resolver,
            executor,
            candidate_limit,
            status_log_lines,
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn deployments(&self) -> &Arc<DeploymentManager> {
        &self.deployments
    }

    /// Dispatch an already-built event (webhook path).
    pub async fn handle_event(&self, event: &EventPayload) -> ActionResponse {
        match self.dispatch(event).await {
            Ok(results) => ActionResponse {
                success: true,
                results,
                error: None,
            },
            Err(err) => {
                warn!(error = %err, "dispatch rejected");
                ActionResponse::failed(err)
            }
        }
    }

    async fn dispatch(&self, event: &EventPayload) -> Result<Vec<EventProcessingResult>> {
        Ok(self.dispatcher.process(event).await?)
    }

    async fn user_event(&self, event_type: EventType, action: &UserAction) -> ActionResponse {
        match build_event(event_type, action) {
            Ok(event) => self.handle_event(&event).await,
            Err(err) => ActionResponse::failed(err),
        }
    }

    pub async fn select_repository(&self, action: &UserAction) -> ActionResponse {
        self.user_event(EventType::RepoSelection, action).await
    }

    pub async fn initialize_repository(&self, action: &UserAction) -> ActionResponse {
        self.user_event(EventType::NewRepoInitialize, action).await
    }

    pub async fn request_workflow_optimization(&self, action: &UserAction) -> ActionResponse {
        self.user_event(EventType::WorkflowOptimizationRequest, action)
            .await
    }

    pub async fn request_analysis(&self, action: &UserAction) -> ActionResponse {
        self.user_event(EventType::RepoAnalysisRequest, action).await
    }

    pub async fn request_description(&self, action: &UserAction) -> ActionResponse {
        self.user_event(EventType::RepoDescriptionRequest, action)
            .await
    }

    /// Dispatch a deployment request and start the planned deployment.
    ///
    /// Nothing is started when a handler reports a failure for the request.
    pub async fn request_deployment(
        &self,
        action: &UserAction,
        request: &DeploymentRequest,
    ) -> DeploymentResponse {
        let results = match self.plan_deployment(action, request).await {
            Ok(results) => results,
            Err(err) => return deployment_failure(err, Vec::new()),
        };

        let refusal = results.iter().find(|r| !r.is_success()).map(|failed| {
            format!(
                "{} failed: {}",
                failed.handler_name,
                failed.error_message().unwrap_or("unknown error")
            )
        });
        if let Some(reason) = refusal {
            warn!(reason = %reason, "deployment not started");
            return deployment_failure(reason, results);
        }

        match self.deployments.submit(request).await {
            Ok(id) => {
                info!(deployment_id = %id, "deployment started");
                DeploymentResponse {
                    success: true,
                    deployment_id: Some(id),
                    results,
                    error: None,
                }
            }
            Err(err) => deployment_failure(SentinelError::from(err), results),
        }
    }

    async fn plan_deployment(
        &self,
        action: &UserAction,
        request: &DeploymentRequest,
    ) -> Result<Vec<EventProcessingResult>> {
        let event = build_event(EventType::DeploymentRequest, action)?
            .with_metadata("strategy", json!(request.strategy))
            .with_metadata("environment", json!(request.environment));
        self.dispatch(&event).await
    }

    pub async fn deployment_status(&self, id: &str) -> DeploymentStatusResponse {
        let view = self
            .deployments
            .status(id, self.status_log_lines)
            .await
            .map_err(SentinelError::from);
        status_response(view)
    }

    /// Record a rollback of a successful deployment.
    pub async fn rollback_deployment(&self, id: &str) -> DeploymentStatusResponse {
        let view = self
            .deployments
            .rollback(id)
            .await
            .map(|rollback| rollback.status_view(self.status_log_lines))
            .map_err(SentinelError::from);
        status_response(view)
    }

    pub async fn rollback_candidates(&self, query: &CandidatesQuery) -> CandidatesResponse {
        match self.candidate_report(query).await {
            Ok(report) => CandidatesResponse {
                success: true,
                report: Some(report),
                error: None,
            },
            Err(err) => CandidatesResponse {
                success: false,
                report: None,
                error: Some(err.to_string()),
            },
        }
    }

    async fn candidate_report(&self, query: &CandidatesQuery) -> Result<CandidateReport> {
        let repo = RepoRef::from_url(&query.repository_url)?;
        let report = self
            .resolver
            .report(&repo, &query.branch, self.candidate_limit, Utc::now())
            .await?;
        Ok(report)
    }

    /// Propose a rollback. `success` is true only when a pull request exists.
    pub async fn execute_rollback(&self, command: &RollbackCommand) -> RollbackResponse {
        match self.rollback(command).await {
            Ok(outcome) => RollbackResponse {
                success: matches!(outcome, RollbackOutcome::Created { .. }),
                outcome: Some(outcome),
                error: None,
            },
            Err(err) => RollbackResponse {
                success: false,
                outcome: None,
                error: Some(err.to_string()),
            },
        }
    }

    async fn rollback(&self, command: &RollbackCommand) -> Result<RollbackOutcome> {
        let request = RollbackRequest {
            repo: RepoRef::from_url(&command.repository_url)?,
            branch: command.branch.clone(),
            target: command.rollback_number,
            force: command.force,
        };
        Ok(self.executor.execute(&request).await?)
    }
}

fn build_event(event_type: EventType, action: &UserAction) -> Result<EventPayload> {
    if action.user_id.trim().is_empty() {
        return Err(ValidationError::MissingField("user_id".to_string()).into());
    }
    Ok(EventPayload::new(event_type, &action.repository_url)?
        .with_user(action.user_id.clone())
        .with_credential(action.credential.as_deref().map(Credential::new)))
}

fn deployment_failure(
    err: impl ToString,
    results: Vec<EventProcessingResult>,
) -> DeploymentResponse {
    DeploymentResponse {
        success: false,
        deployment_id: None,
        results,
        error: Some(err.to_string()),
    }
}

fn status_response(view: Result<DeploymentStatusView>) -> DeploymentStatusResponse {
    match view {
        Ok(view) => DeploymentStatusResponse {
            success: true,
            deployment: Some(view),
            error: None,
        },
        Err(err) => DeploymentStatusResponse {
            success: false,
            deployment: None,
            error: Some(err.to_string()),
        },
    }
}
