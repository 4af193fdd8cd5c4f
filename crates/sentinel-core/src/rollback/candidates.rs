//! Numbered rollback candidates for a branch.
//!
//! `#1` is always the branch head. Numbers grow with age and are only stable
//! within one resolution; callers re-resolve before acting on a number.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use sentinel_state::{CommitStats, CommitStatus, CommitSummary, RepoHost, RepoRef};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::advisory::{parse_advisory, Advisory, RollbackAdvisor};
use super::error::{RollbackError, RollbackResult};
use super::safety::{assess, RiskLevel};
use crate::obs;

/// Default advisory call budget.
pub const DEFAULT_ADVISORY_TIMEOUT: Duration = Duration::from_secs(12);

/// Default number of commits offered as candidates.
pub const DEFAULT_CANDIDATE_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackCandidate {
    pub number: u32,
    pub commit_id: String,
    pub short_id: String,
    pub message: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    pub relative_age: String,
    pub age_days: i64,
    pub files_changed: u32,
    pub additions: u32,
    pub deletions: u32,
    pub deployment_status: CommitStatus,
    pub is_current: bool,
}

impl RollbackCandidate {
    /// First line of the commit message.
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or_default()
    }
}

/// Answer to a candidate query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateReport {
    pub total_candidates: usize,
    pub candidates: Vec<RollbackCandidate>,
    pub advisory_recommendation: Option<Advisory>,
    pub heuristic_recommendation: Option<u32>,
    pub current_candidate: Option<RollbackCandidate>,
}

/// Human form of the distance between `timestamp` and `now`.
pub fn humanize_age(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - timestamp).num_seconds();
    if secs < 60 {
        return "just now".to_string();
    }
    let (value, unit) = match secs {
        s if s < 3_600 => (s / 60, "minute"),
        s if s < 86_400 => (s / 3_600, "hour"),
        s if s < 86_400 * 30 => (s / 86_400, "day"),
        s if s < 86_400 * 365 => (s / (86_400 * 30), "month"),
        s => (s / (86_400 * 365), "year"),
    };
    if value == 1 {
        format!("1 {unit} ago")
    } else {
        format!("{value} {unit}s ago")
    }
}

fn short_id(sha: &str) -> String {
    sha.chars().take(7).collect()
}

/// Newest non-current candidate assessed safe with a successful deployment,
/// else the newest non-current candidate whose deployment did not fail.
pub fn heuristic_recommendation(candidates: &[RollbackCandidate]) -> Option<u32> {
    let targets = || candidates.iter().filter(|c| !c.is_current);
    targets()
        .find(|c| {
            c.deployment_status == CommitStatus::Success
                && assess(c).map_or(false, |a| a.risk_level == RiskLevel::Safe)
        })
        .or_else(|| targets().find(|c| c.deployment_status != CommitStatus::Failure))
        .map(|c| c.number)
}

#[derive(Clone)]
pub struct CandidateResolver {
    host: Arc<dyn RepoHost>,
    advisor: Option<Arc<dyn RollbackAdvisor>>,
    advisory_timeout: Duration,
}

impl CandidateResolver {
    pub fn new(host: Arc<dyn RepoHost>) -> Self {
        Self {
            host,
            advisor: None,
            advisory_timeout: DEFAULT_ADVISORY_TIMEOUT,
        }
    }

    pub fn with_advisor(mut self, advisor: Arc<dyn RollbackAdvisor>, timeout: Duration) -> Self {
        self.advisor = Some(advisor);
        self.advisory_timeout = timeout;
        self
    }

    pub fn host(&self) -> &Arc<dyn RepoHost> {
        &self.host
    }

    /// Up to `limit` candidates for `branch`, newest (`#1`) first.
    #[instrument(skip(self, repo), fields(repo = %repo))]
    pub async fn resolve(
        &self,
        repo: &RepoRef,
        branch: &str,
        limit: usize,
        now: DateTime<Utc>,
    ) -> RollbackResult<Vec<RollbackCandidate>> {
        let commits = self.host.list_commits(repo, branch, limit).await?;
        if commits.is_empty() {
            return Err(RollbackError::EmptyHistory {
                branch: branch.to_string(),
            });
        }

        let details = join_all(commits.iter().map(|c| self.commit_details(repo, c))).await;

        let candidates: Vec<RollbackCandidate> = commits
            .into_iter()
            .zip(details)
            .enumerate()
            .map(|(index, (commit, (stats, status)))| RollbackCandidate {
                number: index as u32 + 1,
                short_id: short_id(&commit.sha),
                relative_age: humanize_age(commit.timestamp, now),
                age_days: (now - commit.timestamp).num_days().max(0),
                files_changed: stats.files_changed,
                additions: stats.additions,
                deletions: stats.deletions,
                deployment_status: status,
                is_current: index == 0,
                commit_id: commit.sha,
                message: commit.message,
                author: commit.author,
                timestamp: commit.timestamp,
            })
            .collect();
        debug!(count = candidates.len(), "rollback candidates resolved");
        Ok(candidates)
    }

    async fn commit_details(
        &self,
        repo: &RepoRef,
        commit: &CommitSummary,
    ) -> (CommitStats, CommitStatus) {
        let (stats, status) = futures::join!(
            self.host.commit_stats(repo, &commit.sha),
            self.host.commit_status(repo, &commit.sha)
        );
        let stats = stats.unwrap_or_else(|err| {
            warn!(sha = %commit.sha, error = %err, "commit stats unavailable");
            CommitStats::default()
        });
        let status = status.unwrap_or_else(|err| {
            warn!(sha = %commit.sha, error = %err, "commit status unavailable");
            CommitStatus::Unknown
        });
        (stats, status)
    }

    /// Ask the advisor, bounded by the configured timeout. Any failure means
    /// no advice.
    pub async fn advise(
        &self,
        repo: &RepoRef,
        candidates: &[RollbackCandidate],
    ) -> Option<Advisory> {
        let advisor = self.advisor.as_ref()?;
        match tokio::time::timeout(self.advisory_timeout, advisor.advise(repo, candidates)).await {
            Ok(Ok(text)) => Some(parse_advisory(&text, candidates.len())),
            Ok(Err(err)) => {
                obs::emit_advisory_unavailable(&repo.full_name(), &err.to_string());
                None
            }
            Err(_) => {
                obs::emit_advisory_unavailable(
                    &repo.full_name(),
                    &format!("timed out after {}s", self.advisory_timeout.as_secs()),
                );
                None
            }
        }
    }

    /// Candidates plus advisory and heuristic recommendations.
    pub async fn report(
        &self,
        repo: &RepoRef,
        branch: &str,
        limit: usize,
        now: DateTime<Utc>,
    ) -> RollbackResult<CandidateReport> {
        let candidates = self.resolve(repo, branch, limit, now).await?;
        let advisory_recommendation = self.advise(repo, &candidates).await;
        Ok(CandidateReport {
            total_candidates: candidates.len(),
            heuristic_recommendation: heuristic_recommendation(&candidates),
            current_candidate: candidates.first().cloned(),
            advisory_recommendation,
            candidates,
        })
    }
}
