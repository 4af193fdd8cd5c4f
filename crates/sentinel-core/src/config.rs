//! TOML configuration.
//!
//! ```toml
//! history_retention = 1000
//! advisory_timeout_secs = 12
//!
//! [host]
//! api_base = "https://api.github.com"
//! timeout_secs = 15
//! token_env = "GITHUB_TOKEN"
//!
//! [webhook]
//! secret_env = "SENTINEL_WEBHOOK_SECRET"
//!
//! [handlers.code-analyzer]
//! endpoint = "http://localhost:8081/analyze"
//! timeout_secs = 30
//!
//! [[triggers]]
//! handler = "code-analyzer"
//! events = ["code-push"]
//! priority = 50
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{default_trigger_specs, ConfigError, TriggerSpec};
use crate::handler::{HandlerRegistry, HttpAgentHandler};
use crate::history::DEFAULT_RETENTION;
use crate::rollback::{DEFAULT_ADVISORY_TIMEOUT, DEFAULT_CANDIDATE_LIMIT};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub api_base: String,
    pub timeout_secs: u64,
    /// Environment variable holding the API token.
    pub token_env: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            timeout_secs: 15,
            token_env: "GITHUB_TOKEN".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Environment variable holding the shared secret. Unset disables
    /// signature verification.
    pub secret_env: Option<String>,
}

fn default_handler_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerEndpoint {
    pub endpoint: String,
    #[serde(default = "default_handler_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SentinelConfig {
    pub history_retention: usize,
    pub advisory_timeout_secs: u64,
    pub rollback_candidate_limit: usize,
    /// Log entries included in deployment status answers.
    pub status_log_lines: usize,
    pub host: HostConfig,
    pub webhook: WebhookConfig,
    pub handlers: BTreeMap<String, HandlerEndpoint>,
    /// Replaces the built-in trigger table when present.
    pub triggers: Option<Vec<TriggerSpec>>,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            history_retention: DEFAULT_RETENTION,
            advisory_timeout_secs: DEFAULT_ADVISORY_TIMEOUT.as_secs(),
            rollback_candidate_limit: DEFAULT_CANDIDATE_LIMIT,
            status_log_lines: 10,
            host: HostConfig::default(),
            webhook: WebhookConfig::default(),
            handlers: BTreeMap::new(),
            triggers: None,
        }
    }
}

impl SentinelConfig {
    pub fn from_toml_str(raw: &str, origin: &str) -> Result<Self, ConfigError> {
        let config: SentinelConfig = toml::from_str(raw).map_err(|e| ConfigError::InvalidFile {
            path: origin.to_string(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::InvalidFile {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&raw, &path.display().to_string())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.history_retention == 0 {
            return Err(ConfigError::InvalidValue {
                field: "history_retention".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.rollback_candidate_limit < 2 {
            return Err(ConfigError::InvalidValue {
                field: "rollback_candidate_limit".to_string(),
                reason: "must be at least 2".to_string(),
            });
        }
        if self.host.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "host.timeout_secs".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    pub fn advisory_timeout(&self) -> Duration {
        Duration::from_secs(self.advisory_timeout_secs)
    }

    /// Trigger table in effect: the configured override or the built-in one.
    pub fn trigger_specs(&self) -> Vec<TriggerSpec> {
        self.triggers.clone().unwrap_or_else(default_trigger_specs)
    }

    /// One `HttpAgentHandler` per `[handlers.<name>]` entry.
    pub fn http_handlers(&self) -> Result<HandlerRegistry, ConfigError> {
        let mut registry = HandlerRegistry::new();
        for (name, endpoint) in &self.handlers {
            let handler = HttpAgentHandler::new(name, &endpoint.endpoint, endpoint.timeout_secs)
                .map_err(|e| ConfigError::InvalidHandler {
                    handler: name.clone(),
                    reason: e.to_string(),
                })?;
            registry.register(name.clone(), Arc::new(handler))?;
        }
        Ok(registry)
    }
}
