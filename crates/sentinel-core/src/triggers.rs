//! Trigger registry and matcher.
//!
//! The registry is built once from [`TriggerSpec`]s and validated against the
//! [`HandlerRegistry`]; after that it is read-only.

use std::collections::{BTreeSet, HashSet};

use sentinel_state::RepositoryState;
use tracing::debug;

use crate::domain::{
    AgentTrigger, ConfigError, EventPayload, EventType, TriggerCondition, TriggerSpec,
};
use crate::handler::HandlerRegistry;

#[derive(Debug, Clone, Default)]
pub struct TriggerRegistry {
    triggers: Vec<AgentTrigger>,
}

impl TriggerRegistry {
    /// Validate `specs` and build the registry, keeping registration order.
    pub fn build(
        specs: Vec<TriggerSpec>,
        handlers: &HandlerRegistry,
    ) -> Result<Self, ConfigError> {
        let mut seen: HashSet<(String, EventType)> = HashSet::new();
        let mut triggers = Vec::with_capacity(specs.len());

        for spec in specs {
            if !handlers.contains(&spec.handler) {
                return Err(ConfigError::UnknownHandler {
                    handler: spec.handler,
                });
            }
            if spec.events.is_empty() {
                return Err(ConfigError::EmptyEventTypes {
                    handler: spec.handler,
                });
            }
            let condition = match spec.condition.as_deref() {
                None => None,
                Some(key) => Some(TriggerCondition::from_key(key).ok_or_else(|| {
                    ConfigError::UnknownCondition {
                        handler: spec.handler.clone(),
                        condition: key.to_string(),
                    }
                })?),
            };
            for event_type in &spec.events {
                if !seen.insert((spec.handler.clone(), *event_type)) {
                    return Err(ConfigError::DuplicateTrigger {
                        handler: spec.handler,
                        event_type: event_type.to_string(),
                    });
                }
            }

            triggers.push(AgentTrigger {
                handler_name: spec.handler,
                event_types: spec.events.into_iter().collect::<BTreeSet<_>>(),
                priority: spec.priority,
                enabled: spec.enabled,
                condition,
                on_success: spec.on_success,
            });
        }

        debug!(count = triggers.len(), "trigger registry built");
        Ok(Self { triggers })
    }

    /// Enabled triggers for `event_type`, highest priority first. Ties keep
    /// registration order.
    pub fn match_event(&self, event_type: EventType) -> Vec<&AgentTrigger> {
        let mut matched: Vec<&AgentTrigger> = self
            .triggers
            .iter()
            .filter(|t| t.applies_to(event_type))
            .collect();
        matched.sort_by(|a, b| b.priority.cmp(&a.priority));
        matched
    }

    /// Whether `trigger` should run given the repository's state. Conditions
    /// only read state; the event is accepted for call-site symmetry.
    pub fn should_fire(
        trigger: &AgentTrigger,
        _event: &EventPayload,
        state: &RepositoryState,
    ) -> bool {
        trigger.condition.map_or(true, |c| c.holds(state))
    }

    pub fn triggers(&self) -> &[AgentTrigger] {
        &self.triggers
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }
}
