//! Deployment records and their lifecycle states.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeploymentStrategy {
    BlueGreen,
    Rolling,
    Canary,
    Recreate,
}

impl DeploymentStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            DeploymentStrategy::BlueGreen => "blue-green",
            DeploymentStrategy::Rolling => "rolling",
            DeploymentStrategy::Canary => "canary",
            DeploymentStrategy::Recreate => "recreate",
        }
    }
}

impl fmt::Display for DeploymentStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentStrategy {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blue-green" => Ok(DeploymentStrategy::BlueGreen),
            "rolling" => Ok(DeploymentStrategy::Rolling),
            "canary" => Ok(DeploymentStrategy::Canary),
            "recreate" => Ok(DeploymentStrategy::Recreate),
            other => Err(ValidationError::InvalidValue {
                field: "strategy".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "development" | "dev" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(ValidationError::InvalidValue {
                field: "environment".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Lifecycle status.
///
/// `Pending -> InProgress -> {Success, Failed}`. `Rollback` marks a record
/// created to undo an earlier successful deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeploymentStatus {
    Pending,
    InProgress,
    Success,
    Failed,
    Rollback,
}

impl DeploymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeploymentStatus::Pending => "pending",
            DeploymentStatus::InProgress => "in-progress",
            DeploymentStatus::Success => "success",
            DeploymentStatus::Failed => "failed",
            DeploymentStatus::Rollback => "rollback",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, DeploymentStatus::Success | DeploymentStatus::Failed)
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Project language, detected from file names in the repository root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Rust,
    Node,
    Python,
    Go,
    Generic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentStep {
    pub name: String,
    pub description: String,
}

impl DeploymentStep {
    pub fn new(name: &str, description: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            description: description.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepPhase {
    Started,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentLogEntry {
    pub timestamp: DateTime<Utc>,
    pub step: String,
    pub phase: StepPhase,
    pub message: String,
}

/// One deployment of one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: String,
    pub repository_name: String,
    pub strategy: DeploymentStrategy,
    pub environment: Environment,
    pub status: DeploymentStatus,
    pub language: Language,
    pub steps: Vec<DeploymentStep>,
    /// Index into `steps`; set once execution starts.
    pub current_step: Option<usize>,
    pub log: Vec<DeploymentLogEntry>,
    pub estimated_duration_secs: u64,
    pub rollback_of: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Deployment {
    pub(crate) fn push_log(&mut self, step: &str, phase: StepPhase, message: impl Into<String>) {
        self.log.push(DeploymentLogEntry {
            timestamp: Utc::now(),
            step: step.to_string(),
            phase,
            message: message.into(),
        });
    }

    pub fn current_step_name(&self) -> Option<&str> {
        self.current_step
            .and_then(|i| self.steps.get(i))
            .map(|s| s.name.as_str())
    }

    /// Share of steps that completed, 0 to 100.
    pub fn progress_percentage(&self) -> u8 {
        if self.status == DeploymentStatus::Success {
            return 100;
        }
        if self.steps.is_empty() {
            return 0;
        }
        let completed = self
            .log
            .iter()
            .filter(|e| e.phase == StepPhase::Completed)
            .count()
            .min(self.steps.len());
        ((completed * 100) / self.steps.len()) as u8
    }

    /// Read model returned by status queries.
    pub fn status_view(&self, recent_logs: usize) -> DeploymentStatusView {
        let skip = self.log.len().saturating_sub(recent_logs);
        DeploymentStatusView {
            id: self.id.clone(),
            status: self.status,
            current_step_name: self.current_step_name().map(str::to_string),
            progress_percentage: self.progress_percentage(),
            recent_logs: self.log.iter().skip(skip).cloned().collect(),
            estimated_duration_secs: self.estimated_duration_secs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentStatusView {
    pub id: String,
    pub status: DeploymentStatus,
    pub current_step_name: Option<String>,
    pub progress_percentage: u8,
    pub recent_logs: Vec<DeploymentLogEntry>,
    pub estimated_duration_secs: u64,
}
