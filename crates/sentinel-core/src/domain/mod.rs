//! Domain models for Repo Sentinel.
//!
//! Canonical definitions for the core entities:
//! - `EventPayload`: one inbound unit of work
//! - `AgentTrigger` / `TriggerSpec`: handler bindings
//! - `EventProcessingResult`: per-handler outcome

pub mod error;
pub mod event;
pub mod result;
pub mod trigger;

pub use error::{ConfigError, Result, SentinelError, ValidationError};
pub use event::{EventPayload, EventType};
pub use result::{EventProcessingResult, HandlerOutcome};
pub use trigger::{
    default_trigger_specs, AgentTrigger, StateEffect, TriggerCondition, TriggerSpec,
};
