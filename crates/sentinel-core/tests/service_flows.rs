//! User-facing flows through `SentinelService`, including webhook ingress.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use sentinel_core::deployment::DryRunStepRunner;
use sentinel_core::webhook::sign_payload;
use sentinel_core::{
    default_trigger_specs, AgentHandler, CandidateResolver, CandidatesQuery, DeploymentManager,
    DeploymentRequest, DeploymentStatus, DeploymentStrategy, Dispatcher, Environment,
    EventPayload, HandlerError, HandlerRegistry, ResultHistory, RollbackCommand, RollbackOutcome,
    SentinelService, TriggerRegistry, UserAction, WebhookIngress,
};
use sentinel_state::fakes::{CommitSeed, MemoryRepoHost};
use sentinel_state::{MemoryStateStore, RepoRef, RepositoryStateStore};
use serde_json::{json, Map, Value};

const REPO: &str = "https://github.com/acme/widgets";
const SECRET: &[u8] = b"webhook-secret";

struct Echo(&'static str);

#[async_trait]
impl AgentHandler for Echo {
    async fn handle(&self, event: &EventPayload) -> Result<Map<String, Value>, HandlerError> {
        let mut out = Map::new();
        out.insert("agent".to_string(), json!(self.0));
        out.insert("repository".to_string(), json!(event.repository_name()));
        Ok(out)
    }
}

struct Refuses;

#[async_trait]
impl AgentHandler for Refuses {
    async fn handle(&self, _event: &EventPayload) -> Result<Map<String, Value>, HandlerError> {
        Err(HandlerError::failed("no deployment target for this repository"))
    }
}

struct Fixture {
    service: SentinelService,
    store: Arc<MemoryStateStore>,
    host: Arc<MemoryRepoHost>,
}

fn fixture() -> Fixture {
    fixture_with_planner(Arc::new(Echo("deployment-planner")))
}

fn fixture_with_planner(planner: Arc<dyn AgentHandler>) -> Fixture {
    let mut handlers = HandlerRegistry::new();
    for name in [
        "repo-monitor",
        "readme-generator",
        "seo-optimizer",
        "workflow-optimizer",
        "code-analyzer",
    ] {
        handlers.register(name, Arc::new(Echo(name))).unwrap();
    }
    handlers.register("deployment-planner", planner).unwrap();
    let triggers = TriggerRegistry::build(default_trigger_specs(), &handlers).unwrap();
    let store = Arc::new(MemoryStateStore::new());
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(triggers),
        Arc::new(handlers),
        store.clone(),
        Arc::new(ResultHistory::default()),
    ));
    let host = Arc::new(MemoryRepoHost::new());
    let service = SentinelService::new(
        dispatcher,
        Arc::new(DeploymentManager::new(Arc::new(DryRunStepRunner))),
        CandidateResolver::new(host.clone()),
        10,
        10,
    );
    Fixture {
        service,
        store,
        host,
    }
}

fn push_body(head: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "ref": "refs/heads/main",
        "repository": {"html_url": REPO},
        "pusher": {"name": "octocat"},
        "head_commit": {"id": head, "message": "Tighten retry loop"},
        "commits": [{"id": head}]
    }))
    .unwrap()
}

#[tokio::test]
async fn signed_push_flows_through_dispatch() {
    let f = fixture();
    let selected = f
        .service
        .select_repository(&UserAction::new(REPO, "octocat"))
        .await;
    assert!(selected.success);
    assert_eq!(selected.results.len(), 1);
    assert_eq!(selected.results[0].handler_name, "repo-monitor");

    let ingress = WebhookIngress::with_secret(SECRET);
    let body = push_body("f00dfeed");
    let signature = sign_payload(&body, SECRET);
    let event = ingress
        .receive("push", "delivery-1", Some(&signature), &body)
        .unwrap()
        .unwrap();

    let response = f.service.handle_event(&event).await;
    assert!(response.success, "{:?}", response.error);
    let handlers: Vec<&str> = response
        .results
        .iter()
        .map(|r| r.handler_name.as_str())
        .collect();
    assert_eq!(handlers, vec!["workflow-optimizer", "code-analyzer"]);

    let state = f.store.get(REPO).await.unwrap().unwrap();
    assert_eq!(state.last_commit_sha.as_deref(), Some("f00dfeed"));
    assert_eq!(state.selected_by.as_deref(), Some("octocat"));
}

#[tokio::test]
async fn tampered_webhook_is_rejected() {
    let ingress = WebhookIngress::with_secret(SECRET);
    let body = push_body("f00dfeed");
    let signature = sign_payload(&body, b"some-other-secret");
    assert!(ingress
        .receive("push", "delivery-2", Some(&signature), &body)
        .is_err());
}

#[tokio::test]
async fn push_for_unknown_repository_reports_failure() {
    let f = fixture();
    let event = WebhookIngress::with_secret(SECRET)
        .receive(
            "push",
            "delivery-3",
            Some(&sign_payload(&push_body("abc"), SECRET)),
            &push_body("abc"),
        )
        .unwrap()
        .unwrap();
    let response = f.service.handle_event(&event).await;
    assert!(!response.success);
    assert!(response.results.is_empty());
    let error = response.error.unwrap();
    assert!(error.starts_with("dispatch error"), "{error}");
    assert!(error.contains("not registered"), "{error}");
}

#[tokio::test]
async fn blank_user_is_rejected_before_dispatch() {
    let f = fixture();
    let response = f.service.select_repository(&UserAction::new(REPO, "")).await;
    assert!(!response.success);
    assert!(f.store.get(REPO).await.unwrap().is_none());
}

#[tokio::test]
async fn deployment_request_dispatches_and_starts() {
    let f = fixture();
    let action = UserAction::new(REPO, "octocat");
    f.service.select_repository(&action).await;

    let request = DeploymentRequest {
        repository_name: "widgets".to_string(),
        strategy: DeploymentStrategy::Canary,
        environment: Environment::Staging,
        files: vec!["go.mod".to_string()],
        repository_size_mb: 5,
    };
    let response = f.service.request_deployment(&action, &request).await;
    assert!(response.success, "{:?}", response.error);
    assert_eq!(response.results[0].handler_name, "deployment-planner");

    let id = response.deployment_id.unwrap();
    let finished = f.service.deployments().join(&id).await.unwrap();
    assert_eq!(finished.status, DeploymentStatus::Success);

    let status = f.service.deployment_status(&id).await;
    assert!(status.success);
    assert_eq!(status.deployment.unwrap().progress_percentage, 100);

    let rollback = f.service.rollback_deployment(&id).await;
    assert!(rollback.success);
    assert_eq!(
        rollback.deployment.unwrap().status,
        DeploymentStatus::Rollback
    );
}

#[tokio::test]
async fn deployment_for_unregistered_repository_is_not_started() {
    let f = fixture();
    let request = DeploymentRequest {
        repository_name: "widgets".to_string(),
        strategy: DeploymentStrategy::Rolling,
        environment: Environment::Development,
        files: Vec::new(),
        repository_size_mb: 0,
    };
    let response = f
        .service
        .request_deployment(&UserAction::new(REPO, "octocat"), &request)
        .await;
    assert!(!response.success);
    assert!(response.deployment_id.is_none());
    assert!(f.service.deployments().list().await.is_empty());
}

#[tokio::test]
async fn failed_planner_blocks_the_deployment() {
    let f = fixture_with_planner(Arc::new(Refuses));
    let action = UserAction::new(REPO, "octocat");
    f.service.select_repository(&action).await;

    let request = DeploymentRequest {
        repository_name: "widgets".to_string(),
        strategy: DeploymentStrategy::BlueGreen,
        environment: Environment::Production,
        files: vec!["Cargo.toml".to_string()],
        repository_size_mb: 12,
    };
    let response = f.service.request_deployment(&action, &request).await;
    assert!(!response.success);
    assert!(response.deployment_id.is_none());
    assert_eq!(response.results.len(), 1);
    assert!(!response.results[0].is_success());
    let error = response.error.unwrap();
    assert!(error.contains("deployment-planner failed"), "{error}");
    assert!(f.service.deployments().list().await.is_empty());
}

#[tokio::test]
async fn unknown_deployment_status_is_an_error_response() {
    let f = fixture();
    let status = f.service.deployment_status("missing").await;
    assert!(!status.success);
    assert!(status.deployment.is_none());
    assert!(status.error.is_some());
}

#[tokio::test]
async fn rollback_candidates_and_execution() {
    let f = fixture();
    let repo = RepoRef::new("acme", "widgets");
    let now = Utc::now();
    f.host
        .seed_history(&repo, "main", 4, now - ChronoDuration::hours(2), ChronoDuration::hours(1));
    f.host.commit_on(
        &repo,
        "main",
        CommitSeed::new("sweeping rename", now - ChronoDuration::minutes(30))
            .with_stats(120, 800, 800),
    );
    f.host
        .commit_on(&repo, "main", CommitSeed::new("head", now - ChronoDuration::minutes(5)));

    let query = CandidatesQuery {
        repository_url: REPO.to_string(),
        branch: "main".to_string(),
    };
    let candidates = f.service.rollback_candidates(&query).await;
    assert!(candidates.success);
    let json = serde_json::to_value(&candidates).unwrap();
    assert_eq!(json["total_candidates"], json!(6));
    assert_eq!(json["heuristic_recommendation"], json!(3));
    assert!(json["advisory_recommendation"].is_null());

    let command = |number: u32, force: bool| RollbackCommand {
        repository_url: REPO.to_string(),
        rollback_number: number,
        branch: "main".to_string(),
        force,
    };

    let current = f.service.execute_rollback(&command(1, true)).await;
    assert!(!current.success);
    let error = current.error.unwrap();
    assert!(error.starts_with("rollback error"), "{error}");
    assert!(error.contains("cannot roll back to current state"), "{error}");

    let risky = f.service.execute_rollback(&command(2, false)).await;
    assert!(!risky.success);
    assert!(matches!(
        risky.outcome,
        Some(RollbackOutcome::ConfirmationRequired { .. })
    ));

    let created = f.service.execute_rollback(&command(3, false)).await;
    assert!(created.success, "{:?}", created);
    assert!(matches!(
        created.outcome,
        Some(RollbackOutcome::Created {
            pull_request_number: 1,
            ..
        })
    ));
    assert_eq!(f.host.pull_requests(&repo).len(), 1);
}
