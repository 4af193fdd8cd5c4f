//! Repository identity and the per-repository state record.

use std::fmt;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

fn repo_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^https?://[^/]+/(?P<owner>[A-Za-z0-9_.-]+)/(?P<name>[A-Za-z0-9_.-]+?)(?:\.git)?/?$")
            .expect("static repository url pattern")
    })
}

/// Canonical form used as the state store key: no trailing slash, no `.git`.
pub fn normalize_repo_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    trimmed.strip_suffix(".git").unwrap_or(trimmed).to_string()
}

/// Owner/name pair identifying a repository on the hosting service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Parse `https://host/owner/name[.git]`.
    pub fn from_url(url: &str) -> Result<Self, StoreError> {
        let caps = repo_url_pattern()
            .captures(url.trim())
            .ok_or_else(|| StoreError::InvalidUrl {
                url: url.to_string(),
            })?;
        Ok(Self::new(&caps["owner"], &caps["name"]))
    }

    /// `owner/name`
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Opaque access credential supplied with a registration or event.
///
/// Never serialized and redacted in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Input to [`crate::RepositoryStateStore::register`].
#[derive(Debug, Clone)]
pub struct Registration {
    pub url: String,
    pub owner: String,
    pub name: String,
    pub selected_by: Option<String>,
    pub credential: Option<Credential>,
}

impl Registration {
    /// Build a registration by parsing owner and name out of the URL.
    pub fn from_url(
        url: &str,
        selected_by: Option<String>,
        credential: Option<Credential>,
    ) -> Result<Self, StoreError> {
        let repo = RepoRef::from_url(url)?;
        Ok(Self {
            url: normalize_repo_url(url),
            owner: repo.owner,
            name: repo.name,
            selected_by,
            credential,
        })
    }
}

/// Mutable per-repository record.
///
/// Only the dispatcher mutates it, through the store's single-writer
/// `update`. Records are never removed; monitoring is switched off instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryState {
    pub url: String,
    pub owner: String,
    pub name: String,
    pub selected_by: Option<String>,
    pub monitoring_enabled: bool,
    pub auto_optimize: bool,
    pub last_commit_sha: Option<String>,
    pub last_push_time: Option<DateTime<Utc>>,
    pub last_analysis_time: Option<DateTime<Utc>>,
    pub workflow_optimized: bool,
    pub readme_initialized: bool,
    pub seo_optimized: bool,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RepositoryState {
    /// Fresh record for a newly registered repository.
    pub fn new(registration: &Registration) -> Self {
        let now = Utc::now();
        Self {
            url: normalize_repo_url(&registration.url),
            owner: registration.owner.clone(),
            name: registration.name.clone(),
            selected_by: registration.selected_by.clone(),
            monitoring_enabled: true,
            auto_optimize: true,
            last_commit_sha: None,
            last_push_time: None,
            last_analysis_time: None,
            workflow_optimized: false,
            readme_initialized: false,
            seo_optimized: false,
            registered_at: now,
            updated_at: now,
        }
    }

    pub fn repo_ref(&self) -> RepoRef {
        RepoRef::new(&self.owner, &self.name)
    }

    /// Bump `updated_at`.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
