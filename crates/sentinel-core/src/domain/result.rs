//! Per-handler processing results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::domain::event::EventType;

/// Outcome of one handler execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HandlerOutcome {
    Success { payload: Map<String, Value> },
    Failed { error: String },
}

/// One handler execution for one event. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventProcessingResult {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub handler_name: String,
    #[serde(flatten)]
    pub outcome: HandlerOutcome,
    pub processing_duration_ms: u64,
    pub processed_at: DateTime<Utc>,
}

impl EventProcessingResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, HandlerOutcome::Success { .. })
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.outcome {
            HandlerOutcome::Failed { error } => Some(error),
            HandlerOutcome::Success { .. } => None,
        }
    }

    pub fn payload(&self) -> Option<&Map<String, Value>> {
        match &self.outcome {
            HandlerOutcome::Success { payload } => Some(payload),
            HandlerOutcome::Failed { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn failed_result_serializes_with_status_tag() {
        let result = EventProcessingResult {
            event_id: Uuid::new_v4(),
            event_type: EventType::CodePush,
            handler_name: "code-analyzer".to_string(),
            outcome: HandlerOutcome::Failed {
                error: "boom".to_string(),
            },
            processing_duration_ms: 12,
            processed_at: Utc::now(),
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["status"], json!("failed"));
        assert_eq!(value["error"], json!("boom"));
        assert_eq!(value["event_type"], json!("code-push"));
        assert!(!result.is_success());
        assert_eq!(result.error_message(), Some("boom"));
    }
}
