//! Non-destructive rollback.
//!
//! A rollback never rewrites the monitored branch. It creates a new commit
//! whose tree is the target's tree and whose only parent is the current head,
//! places it on a fresh review branch and opens a pull request back into the
//! monitored branch. When the hosting API fails part way, the caller receives
//! the equivalent git commands instead.

use chrono::{DateTime, Utc};
use sentinel_state::{HostError, NewCommit, PullRequestDraft, RepoRef};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::candidates::{CandidateResolver, RollbackCandidate, DEFAULT_CANDIDATE_LIMIT};
use super::error::RollbackResult;
use super::safety::{assess, SafetyAssessment};
use crate::domain::ValidationError;
use crate::metrics::METRICS;
use crate::obs;

const WEB_BASE: &str = "https://github.com";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RollbackOutcome {
    Created {
        review_branch: String,
        revert_commit_sha: String,
        pull_request_number: u64,
        pull_request_url: String,
    },
    ConfirmationRequired {
        assessment: SafetyAssessment,
    },
    ManualInstructions {
        reason: String,
        commands: Vec<String>,
        compare_url: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackRequest {
    pub repo: RepoRef,
    pub branch: String,
    pub target: u32,
    pub force: bool,
}

pub struct RollbackExecutor {
    resolver: CandidateResolver,
    candidate_limit: usize,
}

impl RollbackExecutor {
    pub fn new(resolver: CandidateResolver) -> Self {
        Self {
            resolver,
            candidate_limit: DEFAULT_CANDIDATE_LIMIT,
        }
    }

    pub fn with_candidate_limit(mut self, limit: usize) -> Self {
        self.candidate_limit = limit.max(2);
        self
    }

    pub async fn execute(&self, request: &RollbackRequest) -> RollbackResult<RollbackOutcome> {
        self.execute_at(request, Utc::now()).await
    }

    /// Execute with a fixed clock (used for deterministic branch names in tests).
    #[instrument(
        skip(self, request),
        fields(
            repo = %request.repo,
            branch = %request.branch,
            rollback_number = request.target
        )
    )]
    pub async fn execute_at(
        &self,
        request: &RollbackRequest,
        now: DateTime<Utc>,
    ) -> RollbackResult<RollbackOutcome> {
        if request.target == 1 {
            return Err(ValidationError::RollbackToCurrent.into());
        }

        let candidates = self
            .resolver
            .resolve(&request.repo, &request.branch, self.candidate_limit, now)
            .await?;
        let target = select_target(&candidates, request.target)?;
        let assessment = assess(target)?;

        if assessment.requires_confirmation && !request.force {
            info!(risk = %assessment.risk_level, "rollback needs confirmation");
            return Ok(RollbackOutcome::ConfirmationRequired { assessment });
        }

        let review_branch = review_branch_name(&request.branch, target, now);
        match self
            .propose(request, target, &assessment, &review_branch)
            .await
        {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                let reason = format!("hosting API failed: {err}");
                METRICS.inc_rollback_fallbacks();
                obs::emit_rollback_fallback(&request.repo.full_name(), request.target, &reason);
                Ok(manual_instructions(
                    &request.repo,
                    &request.branch,
                    target,
                    &review_branch,
                    reason,
                ))
            }
        }
    }

    async fn propose(
        &self,
        request: &RollbackRequest,
        target: &RollbackCandidate,
        assessment: &SafetyAssessment,
        review_branch: &str,
    ) -> Result<RollbackOutcome, HostError> {
        let host = self.resolver.host();
        let repo = &request.repo;

        let head = host.branch_head(repo, &request.branch).await?;
        let tree = host.commit_tree(repo, &target.commit_id).await?;
        host.create_branch(repo, review_branch, &head).await?;

        let commit = NewCommit {
            message: revert_message(&request.branch, target, &head),
            tree_sha: tree,
            parents: vec![head],
        };
        let revert_sha = host.create_commit(repo, commit).await?;
        host.update_branch(repo, review_branch, &revert_sha).await?;

        let draft = PullRequestDraft {
            title: format!(
                "Roll back {} to #{} ({})",
                request.branch, target.number, target.short_id
            ),
            body: pull_request_body(&request.branch, target, assessment),
            head: review_branch.to_string(),
            base: request.branch.clone(),
        };
        let pr = host.open_pull_request(repo, draft).await?;

        METRICS.inc_rollbacks_proposed();
        obs::emit_rollback_proposed(&repo.full_name(), target.number, pr.number);
        Ok(RollbackOutcome::Created {
            review_branch: review_branch.to_string(),
            revert_commit_sha: revert_sha,
            pull_request_number: pr.number,
            pull_request_url: pr.url,
        })
    }
}

fn select_target(
    candidates: &[RollbackCandidate],
    number: u32,
) -> Result<&RollbackCandidate, ValidationError> {
    if number == 1 {
        return Err(ValidationError::RollbackToCurrent);
    }
    if number < 2 || number as usize > candidates.len() {
        return Err(ValidationError::RollbackOutOfRange {
            requested: number,
            available: candidates.len(),
        });
    }
    Ok(&candidates[number as usize - 1])
}

pub fn review_branch_name(branch: &str, target: &RollbackCandidate, now: DateTime<Utc>) -> String {
    format!(
        "rollback/{}-to-{}-{}",
        branch.replace('/', "-"),
        target.short_id,
        now.format("%Y%m%d%H%M%S")
    )
}

fn revert_message(branch: &str, target: &RollbackCandidate, head: &str) -> String {
    format!(
        "Revert {branch} to {short} \"{summary}\"\n\n\
         Restores the tree of {target_sha} on top of {head}.\n\
         No history is rewritten.",
        short = target.short_id,
        summary = target.summary(),
        target_sha = target.commit_id,
    )
}

fn pull_request_body(
    branch: &str,
    target: &RollbackCandidate,
    assessment: &SafetyAssessment,
) -> String {
    let mut body = format!(
        "Rolls `{branch}` back to #{number} `{short}` ({age}).\n\n\
         - Target: {summary} (by {author})\n\
         - Target diff: {files} files changed, +{additions} / -{deletions}\n\
         - Risk: {risk}\n",
        number = target.number,
        short = target.short_id,
        age = target.relative_age,
        summary = target.summary(),
        author = target.author,
        files = target.files_changed,
        additions = target.additions,
        deletions = target.deletions,
        risk = assessment.risk_level,
    );
    for warning in &assessment.warnings {
        body.push_str(&format!("- Warning: {warning}\n"));
    }
    body.push_str(
        "\nThis adds one commit restoring the target tree; merging it is the rollback.\n",
    );
    body
}

/// Equivalent git commands and a comparison link for a failed proposal.
pub fn manual_instructions(
    repo: &RepoRef,
    branch: &str,
    target: &RollbackCandidate,
    review_branch: &str,
    reason: String,
) -> RollbackOutcome {
    let commands = vec![
        "git fetch origin".to_string(),
        format!("git checkout -b {review_branch} origin/{branch}"),
        format!("git read-tree -u --reset {}", target.commit_id),
        format!(
            "git commit -m \"Revert {branch} to {} ({})\"",
            target.short_id,
            target.summary().replace('"', "'")
        ),
        format!("git push origin {review_branch}"),
    ];
    RollbackOutcome::ManualInstructions {
        reason,
        commands,
        compare_url: format!(
            "{WEB_BASE}/{}/{}/compare/{branch}...{review_branch}?expand=1",
            repo.owner, repo.name
        ),
    }
}
