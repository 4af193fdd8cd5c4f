//! Event dispatcher.
//!
//! Turns one inbound event into zero or more handler executions, in matched
//! order, each behind an isolation boundary. Handler errors and panics become
//! failed results; only repository registration problems fail the call.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::FutureExt;
use sentinel_state::{
    Registration, RepositoryState, RepositoryStateStore, StateMutator, StoreError,
};
use serde_json::{Map, Value};
use tracing::{debug, Instrument};
use uuid::Uuid;

use crate::domain::{
    AgentTrigger, EventPayload, EventProcessingResult, EventType, HandlerOutcome,
};
use crate::handler::{HandlerError, HandlerRegistry};
use crate::history::ResultHistory;
use crate::metrics::METRICS;
use crate::obs;
use crate::triggers::TriggerRegistry;

/// Request-level dispatch failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DispatchError {
    #[error("repository {url} is not registered")]
    RepositoryNotRegistered { url: String },

    #[error("state store error: {0}")]
    Store(#[from] StoreError),
}

pub type DispatchResult<T> = std::result::Result<T, DispatchError>;

pub struct Dispatcher {
    triggers: Arc<TriggerRegistry>,
    handlers: Arc<HandlerRegistry>,
    store: Arc<dyn RepositoryStateStore>,
    history: Arc<ResultHistory>,
}

impl Dispatcher {
    pub fn new(
        triggers: Arc<TriggerRegistry>,
        handlers: Arc<HandlerRegistry>,
        store: Arc<dyn RepositoryStateStore>,
        history: Arc<ResultHistory>,
    ) -> Self {
        Self {
            triggers,
            handlers,
            store,
            history,
        }
    }

    pub fn store(&self) -> &Arc<dyn RepositoryStateStore> {
        &self.store
    }

    pub fn history(&self) -> &Arc<ResultHistory> {
        &self.history
    }

    pub fn triggers(&self) -> &TriggerRegistry {
        &self.triggers
    }

    /// Process one event and return a result per executed handler.
    pub async fn process(
        &self,
        event: &EventPayload,
    ) -> DispatchResult<Vec<EventProcessingResult>> {
        let span = obs::dispatch_span(event.event_type().as_str(), event.repository_url());
        self.process_inner(event).instrument(span).await
    }

    async fn process_inner(
        &self,
        event: &EventPayload,
    ) -> DispatchResult<Vec<EventProcessingResult>> {
        METRICS.inc_events_dispatched();
        let event_type = event.event_type();
        let url = event.repository_url();

        let matched = self.triggers.match_event(event_type);
        obs::emit_dispatch_started(event_type.as_str(), url, matched.len());
        if matched.is_empty() {
            return Ok(Vec::new());
        }

        self.ensure_registered(event).await?;

        let mut results = Vec::with_capacity(matched.len());
        for trigger in matched {
            let state = self.current_state(url).await?;
            if !TriggerRegistry::should_fire(trigger, event, &state) {
                let condition = trigger.condition.map(|c| c.key()).unwrap_or("-");
                obs::emit_handler_skipped(&trigger.handler_name, condition);
                continue;
            }

            let result = self.run_handler(trigger, event).await;
            self.record(trigger, event, &result).await?;
            self.history.append(result.clone());
            results.push(result);
        }

        let failures = results.iter().filter(|r| !r.is_success()).count();
        obs::emit_dispatch_finished(event_type.as_str(), results.len(), failures);
        Ok(results)
    }

    /// Register the repository when the event allows it. A repository-selection
    /// event always registers again so the latest selector and credential win.
    async fn ensure_registered(&self, event: &EventPayload) -> DispatchResult<()> {
        let url = event.repository_url();
        let known = self.store.get(url).await?.is_some();
        if known && event.event_type() != EventType::RepoSelection {
            return Ok(());
        }
        if !known && !event.event_type().registers_repository() {
            return Err(DispatchError::RepositoryNotRegistered {
                url: url.to_string(),
            });
        }

        let registration = Registration {
            url: url.to_string(),
            owner: event.repository_owner().to_string(),
            name: event.repository_name().to_string(),
            selected_by: event.requesting_user().map(str::to_string),
            credential: event.credential().cloned(),
        };
        self.store.register(registration).await?;
        obs::emit_repository_registered(url, event.requesting_user());
        Ok(())
    }

    async fn current_state(&self, url: &str) -> DispatchResult<RepositoryState> {
        self.store
            .get(url)
            .await?
            .ok_or_else(|| DispatchError::RepositoryNotRegistered {
                url: url.to_string(),
            })
    }

    async fn run_handler(
        &self,
        trigger: &AgentTrigger,
        event: &EventPayload,
    ) -> EventProcessingResult {
        METRICS.inc_handler_runs();
        let started = Instant::now();

        let outcome = match self.handlers.get(&trigger.handler_name) {
            None => Err(HandlerError::failed(format!(
                "handler '{}' is not registered",
                trigger.handler_name
            ))),
            Some(handler) => AssertUnwindSafe(handler.handle(event))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(HandlerError::failed(panic_message(panic)))),
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        let outcome = match outcome {
            Ok(payload) => HandlerOutcome::Success { payload },
            Err(err) => {
                METRICS.inc_handler_failures();
                obs::emit_handler_failed(&trigger.handler_name, &err);
                HandlerOutcome::Failed {
                    error: err.to_string(),
                }
            }
        };
        let success = matches!(outcome, HandlerOutcome::Success { .. });
        obs::emit_handler_finished(&trigger.handler_name, duration_ms, success);

        EventProcessingResult {
            event_id: Uuid::new_v4(),
            event_type: event.event_type(),
            handler_name: trigger.handler_name.clone(),
            outcome,
            processing_duration_ms: duration_ms,
            processed_at: Utc::now(),
        }
    }

    async fn record(
        &self,
        trigger: &AgentTrigger,
        event: &EventPayload,
        result: &EventProcessingResult,
    ) -> DispatchResult<()> {
        let now = result.processed_at;
        let push_sha = match event.event_type() {
            EventType::CodePush => event.head_commit().map(str::to_string),
            _ => None,
        };
        let is_push = event.event_type() == EventType::CodePush;
        let effect = if result.is_success() {
            trigger.on_success
        } else {
            None
        };

        let mutator: StateMutator = Box::new(move |state: &mut RepositoryState| {
            state.touch();
            if is_push {
                if let Some(sha) = push_sha {
                    state.last_commit_sha = Some(sha);
                }
                state.last_push_time = Some(now);
            }
            if let Some(effect) = effect {
                effect.apply(state, now);
            }
        });
        self.store.update(event.repository_url(), mutator).await?;
        debug!(handler = %trigger.handler_name, "repository state updated");
        Ok(())
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    let detail = if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    };
    format!("handler panicked: {detail}")
}

/// Convenience for handlers built from closures in tests and small tools.
pub fn payload_from(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TriggerSpec;
    use crate::handler::AgentHandler;
    use async_trait::async_trait;
    use sentinel_state::{Credential, MemoryStateStore};
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl AgentHandler for Echo {
        async fn handle(&self, event: &EventPayload) -> Result<Map<String, Value>, HandlerError> {
            Ok(payload_from(&[("event", json!(event.event_type().as_str()))]))
        }
    }

    struct Panics;

    #[async_trait]
    impl AgentHandler for Panics {
        async fn handle(&self, _event: &EventPayload) -> Result<Map<String, Value>, HandlerError> {
            panic!("index out of bounds");
        }
    }

    fn dispatcher(specs: Vec<TriggerSpec>, handlers: HandlerRegistry) -> Dispatcher {
        let triggers = TriggerRegistry::build(specs, &handlers).unwrap();
        Dispatcher::new(
            Arc::new(triggers),
            Arc::new(handlers),
            Arc::new(MemoryStateStore::new()),
            Arc::new(ResultHistory::default()),
        )
    }

    fn event(event_type: EventType) -> EventPayload {
        EventPayload::new(event_type, "https://github.com/acme/widgets").unwrap()
    }

    #[tokio::test]
    async fn unregistered_repository_is_rejected() {
        let handlers = HandlerRegistry::new().with("echo", Arc::new(Echo)).unwrap();
        let d = dispatcher(
            vec![TriggerSpec::new("echo", &[EventType::CodePush], 1)],
            handlers,
        );
        let err = d.process(&event(EventType::CodePush)).await.unwrap_err();
        assert_eq!(
            err,
            DispatchError::RepositoryNotRegistered {
                url: "https://github.com/acme/widgets".to_string()
            }
        );
        assert!(d.history().is_empty());
    }

    #[tokio::test]
    async fn no_match_returns_empty_without_registration() {
        let handlers = HandlerRegistry::new().with("echo", Arc::new(Echo)).unwrap();
        let d = dispatcher(
            vec![TriggerSpec::new("echo", &[EventType::RepoSelection], 1)],
            handlers,
        );
        let results = d.process(&event(EventType::CodePush)).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn selection_registers_and_runs() {
        let handlers = HandlerRegistry::new().with("echo", Arc::new(Echo)).unwrap();
        let d = dispatcher(
            vec![TriggerSpec::new("echo", &[EventType::RepoSelection], 1)],
            handlers,
        );
        let selection = event(EventType::RepoSelection).with_user("octocat");
        let results = d.process(&selection).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_success());

        let state = d
            .store()
            .get("https://github.com/acme/widgets")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.selected_by.as_deref(), Some("octocat"));
    }

    #[tokio::test]
    async fn reselection_records_the_new_selector_and_credential() {
        let handlers = HandlerRegistry::new().with("echo", Arc::new(Echo)).unwrap();
        let d = dispatcher(
            vec![TriggerSpec::new("echo", &[EventType::RepoSelection], 1)],
            handlers,
        );
        let url = "https://github.com/acme/widgets";
        d.process(&event(EventType::RepoSelection).with_user("octocat"))
            .await
            .unwrap();

        let second = event(EventType::RepoSelection)
            .with_user("hubot")
            .with_credential(Some(Credential::new("ghp_rotated")));
        let results = d.process(&second).await.unwrap();
        assert_eq!(results.len(), 1);

        let state = d.store().get(url).await.unwrap().unwrap();
        assert_eq!(state.selected_by.as_deref(), Some("hubot"));
        let credential = d.store().credential(url).await.unwrap().unwrap();
        assert_eq!(credential.expose(), "ghp_rotated");
    }

    #[tokio::test]
    async fn panic_becomes_failed_result() {
        let handlers = HandlerRegistry::new()
            .with("boom", Arc::new(Panics))
            .unwrap()
            .with("echo", Arc::new(Echo))
            .unwrap();
        let d = dispatcher(
            vec![
                TriggerSpec::new("boom", &[EventType::RepoSelection], 10),
                TriggerSpec::new("echo", &[EventType::RepoSelection], 5),
            ],
            handlers,
        );
        let results = d.process(&event(EventType::RepoSelection)).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].handler_name, "boom");
        let message = results[0].error_message().unwrap();
        assert!(message.contains("index out of bounds"), "{message}");
        assert!(results[1].is_success());
        assert_eq!(d.history().len(), 2);
    }

    #[test]
    fn panic_message_handles_owned_strings() {
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload), "handler panicked: owned");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert!(panic_message(payload).contains("unknown"));
    }
}
