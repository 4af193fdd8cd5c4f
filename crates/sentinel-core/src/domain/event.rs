//! Inbound events.

use std::fmt;
use std::str::FromStr;

use sentinel_state::{normalize_repo_url, Credential, RepoRef};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::error::ValidationError;

/// Closed set of lifecycle events the orchestrator reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    CodePush,
    NewRepoInitialize,
    WorkflowOptimizationRequest,
    RepoAnalysisRequest,
    RepoDescriptionRequest,
    DeploymentRequest,
    RepoSelection,
}

impl EventType {
    pub const ALL: [EventType; 7] = [
        EventType::CodePush,
        EventType::NewRepoInitialize,
        EventType::WorkflowOptimizationRequest,
        EventType::RepoAnalysisRequest,
        EventType::RepoDescriptionRequest,
        EventType::DeploymentRequest,
        EventType::RepoSelection,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventType::CodePush => "code-push",
            EventType::NewRepoInitialize => "new-repo-initialize",
            EventType::WorkflowOptimizationRequest => "workflow-optimization-request",
            EventType::RepoAnalysisRequest => "repo-analysis-request",
            EventType::RepoDescriptionRequest => "repo-description-request",
            EventType::DeploymentRequest => "deployment-request",
            EventType::RepoSelection => "repo-selection",
        }
    }

    /// Events that may arrive for a repository nobody registered yet; the
    /// dispatcher registers the repository instead of rejecting them.
    pub fn registers_repository(self) -> bool {
        matches!(self, EventType::RepoSelection | EventType::NewRepoInitialize)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownEventType(s.to_string()))
    }
}

/// One unit of work entering the orchestrator.
///
/// Fields are private; builders consume `self`, so a payload handed to the
/// dispatcher cannot change underneath it.
#[derive(Debug, Clone, Serialize)]
pub struct EventPayload {
    event_type: EventType,
    repository_url: String,
    repository_owner: String,
    repository_name: String,
    #[serde(skip_serializing)]
    credential: Option<Credential>,
    requesting_user: Option<String>,
    metadata: Map<String, Value>,
}

impl EventPayload {
    /// Build a payload, deriving owner and name from the repository URL.
    pub fn new(event_type: EventType, repository_url: &str) -> Result<Self, ValidationError> {
        let repo = RepoRef::from_url(repository_url)
            .map_err(|_| ValidationError::InvalidRepositoryUrl(repository_url.to_string()))?;
        Ok(Self {
            event_type,
            repository_url: normalize_repo_url(repository_url),
            repository_owner: repo.owner,
            repository_name: repo.name,
            credential: None,
            requesting_user: None,
            metadata: Map::new(),
        })
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.requesting_user = Some(user.into());
        self
    }

    pub fn with_credential(mut self, credential: Option<Credential>) -> Self {
        self.credential = credential;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn repository_url(&self) -> &str {
        &self.repository_url
    }

    pub fn repository_owner(&self) -> &str {
        &self.repository_owner
    }

    pub fn repository_name(&self) -> &str {
        &self.repository_name
    }

    pub fn repo_ref(&self) -> RepoRef {
        RepoRef::new(&self.repository_owner, &self.repository_name)
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn requesting_user(&self) -> Option<&str> {
        self.requesting_user.as_deref()
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    /// Head commit of a push, when the event carries one.
    pub fn head_commit(&self) -> Option<&str> {
        self.metadata_str("head_commit")
    }

    /// Branch name of a push (`refs/heads/` stripped).
    pub fn branch(&self) -> Option<&str> {
        self.metadata_str("ref")
            .map(|r| r.strip_prefix("refs/heads/").unwrap_or(r))
    }
}
