//! Handler capability contract and the registry built at startup.
//!
//! Handlers are the automation agents the dispatcher invokes. The core never
//! looks inside them: it hands over an [`EventPayload`] and receives either a
//! JSON object or a [`HandlerError`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::domain::{ConfigError, EventPayload};

/// Errors a handler may return. The dispatcher turns each into a failed result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),

    #[error("handler timed out after {0}s")]
    Timeout(u64),

    #[error("handler endpoint returned {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("handler transport error: {0}")]
    Transport(String),

    #[error("handler returned an invalid response: {0}")]
    InvalidResponse(String),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }
}

/// An automation agent reacting to events.
#[async_trait]
pub trait AgentHandler: Send + Sync {
    async fn handle(&self, event: &EventPayload) -> Result<Map<String, Value>, HandlerError>;
}

/// Handlers by name. Built once, then shared read-only behind an `Arc`.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: BTreeMap<String, Arc<dyn AgentHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`. Names are unique.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        handler: Arc<dyn AgentHandler>,
    ) -> Result<(), ConfigError> {
        let name = name.into();
        if self.handlers.contains_key(&name) {
            return Err(ConfigError::DuplicateHandler { handler: name });
        }
        self.handlers.insert(name, handler);
        Ok(())
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(
        mut self,
        name: impl Into<String>,
        handler: Arc<dyn AgentHandler>,
    ) -> Result<Self, ConfigError> {
        self.register(name, handler)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn AgentHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Handler that forwards the event to an HTTP endpoint and returns its JSON
/// object response. The credential is never part of the forwarded body.
#[derive(Debug, Clone)]
pub struct HttpAgentHandler {
    name: String,
    endpoint: String,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl HttpAgentHandler {
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, HandlerError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("repo-sentinel/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HandlerError::Transport(e.to_string()))?;
        Ok(Self {
            name: name.into(),
            endpoint: endpoint.into(),
            timeout_secs,
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl AgentHandler for HttpAgentHandler {
    #[instrument(skip(self, event), fields(handler = %self.name, event_type = %event.event_type()))]
    async fn handle(&self, event: &EventPayload) -> Result<Map<String, Value>, HandlerError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(event)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    HandlerError::Timeout(self.timeout_secs)
                } else {
                    HandlerError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(HandlerError::Remote {
                status: status.as_u16(),
                message,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| HandlerError::InvalidResponse(e.to_string()))?;
        debug!(status = status.as_u16(), "handler endpoint responded");
        match body {
            Value::Object(map) => Ok(map),
            other => Err(HandlerError::InvalidResponse(format!(
                "expected a JSON object, got {other}"
            ))),
        }
    }
}
