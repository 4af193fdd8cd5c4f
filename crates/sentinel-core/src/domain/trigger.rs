//! Trigger definitions: which handler runs for which events, and when.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use sentinel_state::RepositoryState;
use serde::{Deserialize, Serialize};

use crate::domain::event::EventType;

/// Named predicate over repository state gating a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerCondition {
    AutoOptimizeEnabled,
    MonitoringEnabled,
    ReadmeNotInitialized,
    SeoNotOptimized,
    WorkflowNotOptimized,
}

impl TriggerCondition {
    const KEYS: [(&'static str, TriggerCondition); 5] = [
        ("auto-optimize-enabled", TriggerCondition::AutoOptimizeEnabled),
        ("monitoring-enabled", TriggerCondition::MonitoringEnabled),
        ("readme-not-initialized", TriggerCondition::ReadmeNotInitialized),
        ("seo-not-optimized", TriggerCondition::SeoNotOptimized),
        ("workflow-not-optimized", TriggerCondition::WorkflowNotOptimized),
    ];

    /// Look up a condition by its configuration key.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::KEYS
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, c)| *c)
    }

    pub fn key(self) -> &'static str {
        Self::KEYS
            .iter()
            .find(|(_, c)| *c == self)
            .map(|(k, _)| *k)
            .unwrap_or("unknown")
    }

    pub fn holds(self, state: &RepositoryState) -> bool {
        match self {
            TriggerCondition::AutoOptimizeEnabled => {
                state.monitoring_enabled && state.auto_optimize
            }
            TriggerCondition::MonitoringEnabled => state.monitoring_enabled,
            TriggerCondition::ReadmeNotInitialized => !state.readme_initialized,
            TriggerCondition::SeoNotOptimized => !state.seo_optimized,
            TriggerCondition::WorkflowNotOptimized => !state.workflow_optimized,
        }
    }
}

/// What a successful handler run records on the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StateEffect {
    WorkflowOptimized,
    ReadmeInitialized,
    SeoOptimized,
    Analyzed,
    MonitoringEnabled,
}

impl StateEffect {
    pub fn apply(self, state: &mut RepositoryState, now: DateTime<Utc>) {
        match self {
            StateEffect::WorkflowOptimized => state.workflow_optimized = true,
            StateEffect::ReadmeInitialized => state.readme_initialized = true,
            StateEffect::SeoOptimized => state.seo_optimized = true,
            StateEffect::Analyzed => state.last_analysis_time = Some(now),
            StateEffect::MonitoringEnabled => state.monitoring_enabled = true,
        }
    }
}

/// A validated trigger held by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentTrigger {
    pub handler_name: String,
    pub event_types: BTreeSet<EventType>,
    pub priority: i32,
    pub enabled: bool,
    pub condition: Option<TriggerCondition>,
    pub on_success: Option<StateEffect>,
}

impl AgentTrigger {
    pub fn applies_to(&self, event_type: EventType) -> bool {
        self.enabled && self.event_types.contains(&event_type)
    }
}

fn default_enabled() -> bool {
    true
}

/// Trigger as written in configuration, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerSpec {
    pub handler: String,
    pub events: Vec<EventType>,
    pub priority: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub on_success: Option<StateEffect>,
}

impl TriggerSpec {
    pub fn new(handler: &str, events: &[EventType], priority: i32) -> Self {
        Self {
            handler: handler.to_string(),
            events: events.to_vec(),
            priority,
            enabled: true,
            condition: None,
            on_success: None,
        }
    }

    pub fn when(mut self, condition: &str) -> Self {
        self.condition = Some(condition.to_string());
        self
    }

    pub fn records(mut self, effect: StateEffect) -> Self {
        self.on_success = Some(effect);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// The built-in trigger table.
pub fn default_trigger_specs() -> Vec<TriggerSpec> {
    vec![
        TriggerSpec::new("repo-monitor", &[EventType::RepoSelection], 100)
            .records(StateEffect::MonitoringEnabled),
        TriggerSpec::new("readme-generator", &[EventType::NewRepoInitialize], 90)
            .when("readme-not-initialized")
            .records(StateEffect::ReadmeInitialized),
        TriggerSpec::new("seo-optimizer", &[EventType::NewRepoInitialize], 80)
            .when("seo-not-optimized")
            .records(StateEffect::SeoOptimized),
        TriggerSpec::new("workflow-optimizer", &[EventType::CodePush], 70)
            .when("auto-optimize-enabled")
            .records(StateEffect::WorkflowOptimized),
        TriggerSpec::new(
            "workflow-optimizer",
            &[EventType::WorkflowOptimizationRequest],
            70,
        )
        .records(StateEffect::WorkflowOptimized),
        TriggerSpec::new(
            "code-analyzer",
            &[EventType::CodePush, EventType::RepoAnalysisRequest],
            50,
        )
        .when("monitoring-enabled")
        .records(StateEffect::Analyzed),
        TriggerSpec::new("seo-optimizer", &[EventType::RepoDescriptionRequest], 60)
            .records(StateEffect::SeoOptimized),
        TriggerSpec::new("deployment-planner", &[EventType::DeploymentRequest], 60),
    ]
}
