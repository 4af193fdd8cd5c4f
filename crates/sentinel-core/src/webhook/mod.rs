//! Webhook ingress.
//!
//! Deliveries are verified against the shared secret first, then parsed.
//! Only `push` and `repository` with action `created` become events; every
//! other delivery is accepted and ignored.

pub mod signature;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::domain::{EventPayload, EventType, ValidationError};

pub use signature::{parse_signature_header, sign_payload, verify_signature};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WebhookError {
    #[error("webhook signature missing or invalid")]
    InvalidSignature,

    #[error("malformed webhook payload: {0}")]
    Malformed(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl From<serde_json::Error> for WebhookError {
    fn from(err: serde_json::Error) -> Self {
        WebhookError::Malformed(err.to_string())
    }
}

/// A stored delivery: the `X-GitHub-Event` header, the delivery id and the body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    pub event_type: String,
    pub delivery_id: String,
    pub payload: Value,
}

#[derive(Debug, Deserialize)]
struct RepositoryRef {
    html_url: String,
}

#[derive(Debug, Deserialize)]
struct Pusher {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HeadCommit {
    id: String,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PushBody {
    repository: RepositoryRef,
    #[serde(rename = "ref")]
    git_ref: String,
    #[serde(default)]
    pusher: Option<Pusher>,
    #[serde(default)]
    head_commit: Option<HeadCommit>,
    #[serde(default)]
    commits: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct Sender {
    login: String,
}

#[derive(Debug, Deserialize)]
struct RepositoryBody {
    action: String,
    repository: RepositoryRef,
    #[serde(default)]
    sender: Option<Sender>,
}

/// Verifies and translates webhook deliveries into events.
#[derive(Clone, Default)]
pub struct WebhookIngress {
    secret: Option<Vec<u8>>,
}

impl std::fmt::Debug for WebhookIngress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookIngress")
            .field("verifies_signatures", &self.secret.is_some())
            .finish()
    }
}

impl WebhookIngress {
    /// Ingress that requires a valid signature on every delivery.
    pub fn with_secret(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: Some(secret.into()),
        }
    }

    /// Ingress that accepts unsigned deliveries.
    pub fn unverified() -> Self {
        warn!("webhook signature verification is disabled");
        Self { secret: None }
    }

    /// Verify `body` and translate it. `Ok(None)` means accepted and ignored.
    pub fn receive(
        &self,
        event_header: &str,
        delivery_id: &str,
        signature_header: Option<&str>,
        body: &[u8],
    ) -> Result<Option<EventPayload>, WebhookError> {
        if let Some(secret) = &self.secret {
            let valid = signature_header
                .map(|sig| verify_signature(body, sig, secret))
                .unwrap_or(false);
            if !valid {
                warn!(delivery_id = %delivery_id, "rejected webhook with bad signature");
                return Err(WebhookError::InvalidSignature);
            }
        }
        let payload: Value = serde_json::from_slice(body)?;
        translate(&WebhookEnvelope {
            event_type: event_header.to_string(),
            delivery_id: delivery_id.to_string(),
            payload,
        })
    }
}

/// Translate an already-trusted delivery.
pub fn translate(envelope: &WebhookEnvelope) -> Result<Option<EventPayload>, WebhookError> {
    let event = match envelope.event_type.as_str() {
        "push" => Some(translate_push(envelope)?),
        "repository" => translate_repository(envelope)?,
        other => {
            debug!(kind = %other, delivery_id = %envelope.delivery_id, "ignoring webhook");
            None
        }
    };
    Ok(event)
}

fn translate_push(envelope: &WebhookEnvelope) -> Result<EventPayload, WebhookError> {
    let body: PushBody = serde_json::from_value(envelope.payload.clone())?;
    let mut event = EventPayload::new(EventType::CodePush, &body.repository.html_url)?
        .with_metadata("delivery_id", json!(envelope.delivery_id))
        .with_metadata("ref", json!(body.git_ref))
        .with_metadata("commit_count", json!(body.commits.len()));
    if let Some(name) = body.pusher.and_then(|p| p.name) {
        event = event.with_user(name);
    }
    if let Some(head) = body.head_commit {
        event = event.with_metadata("head_commit", json!(head.id));
        if let Some(message) = head.message {
            event = event.with_metadata("head_commit_message", json!(message));
        }
    }
    Ok(event)
}

fn translate_repository(envelope: &WebhookEnvelope) -> Result<Option<EventPayload>, WebhookError> {
    let body: RepositoryBody = serde_json::from_value(envelope.payload.clone())?;
    if body.action != "created" {
        debug!(action = %body.action, "ignoring repository webhook");
        return Ok(None);
    }
    let mut event = EventPayload::new(EventType::NewRepoInitialize, &body.repository.html_url)?
        .with_metadata("delivery_id", json!(envelope.delivery_id));
    if let Some(sender) = body.sender {
        event = event.with_user(sender.login);
    }
    Ok(Some(event))
}
