//! Rollback resolution and execution against the in-memory hosting fake.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use sentinel_core::rollback::{RollbackRequest, RollbackResult};
use sentinel_core::{
    CandidateResolver, RiskLevel, RollbackAdvisor, RollbackCandidate, RollbackError,
    RollbackExecutor, RollbackOutcome, ValidationError,
};
use sentinel_state::fakes::{CommitSeed, HostOperation, MemoryRepoHost};
use sentinel_state::{CommitStatus, HostError, RepoRef};

fn repo() -> RepoRef {
    RepoRef::new("acme", "widgets")
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap()
}

fn request(target: u32, force: bool) -> RollbackRequest {
    RollbackRequest {
        repo: repo(),
        branch: "main".to_string(),
        target,
        force,
    }
}

/// Ten hourly commits on main; returns the host and SHAs oldest first.
fn ten_commit_host() -> (Arc<MemoryRepoHost>, Vec<String>) {
    let host = Arc::new(MemoryRepoHost::new());
    let shas = host.seed_history(&repo(), "main", 10, now(), ChronoDuration::hours(1));
    (host, shas)
}

fn executor(host: &Arc<MemoryRepoHost>) -> RollbackExecutor {
    RollbackExecutor::new(CandidateResolver::new(host.clone()))
}

#[tokio::test]
async fn candidates_are_numbered_newest_first() {
    let (host, shas) = ten_commit_host();
    let resolver = CandidateResolver::new(host.clone());
    let candidates = resolver.resolve(&repo(), "main", 10, now()).await.unwrap();

    assert_eq!(candidates.len(), 10);
    assert_eq!(candidates[0].number, 1);
    assert!(candidates[0].is_current);
    assert_eq!(candidates[0].commit_id, shas[9]);
    assert_eq!(candidates[9].commit_id, shas[0]);
    assert!(candidates[1..].iter().all(|c| !c.is_current));
    assert_eq!(candidates[2].relative_age, "2 hours ago");
    assert_eq!(candidates[2].short_id.len(), 7);
}

#[tokio::test]
async fn rollback_to_current_is_rejected_without_side_effects() {
    let (host, shas) = ten_commit_host();
    let err = executor(&host)
        .execute_at(&request(1, true), now())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        RollbackError::Validation(ValidationError::RollbackToCurrent)
    );
    assert_eq!(host.branches(&repo()), vec!["main".to_string()]);
    assert_eq!(host.branch_sha(&repo(), "main").as_deref(), Some(shas[9].as_str()));
    assert!(host.pull_requests(&repo()).is_empty());
}

#[tokio::test]
async fn out_of_range_targets_are_rejected() {
    let (host, _) = ten_commit_host();
    let exec = executor(&host);
    for target in [0, 11] {
        let err = exec.execute_at(&request(target, true), now()).await.unwrap_err();
        assert_eq!(
            err,
            RollbackError::Validation(ValidationError::RollbackOutOfRange {
                requested: target,
                available: 10,
            })
        );
    }
    assert_eq!(host.branches(&repo()), vec!["main".to_string()]);
}

#[tokio::test]
async fn safe_rollback_adds_a_restoring_commit_on_a_review_branch() {
    let (host, shas) = ten_commit_host();
    let head = shas[9].clone();
    let target = shas[7].clone();

    let outcome = executor(&host)
        .execute_at(&request(3, false), now())
        .await
        .unwrap();
    let RollbackOutcome::Created {
        review_branch,
        revert_commit_sha,
        pull_request_number,
        pull_request_url,
    } = outcome
    else {
        panic!("expected a created rollback");
    };

    // The monitored branch is untouched.
    assert_eq!(host.branch_sha(&repo(), "main"), Some(head.clone()));

    assert!(review_branch.starts_with("rollback/main-to-"));
    assert!(review_branch.ends_with("-20260314120000"));
    assert_eq!(host.branch_sha(&repo(), &review_branch), Some(revert_commit_sha.clone()));

    let revert = host.commit(&repo(), &revert_commit_sha).unwrap();
    let restored = host.commit(&repo(), &target).unwrap();
    assert_eq!(revert.tree_sha, restored.tree_sha);
    assert_eq!(revert.parents, vec![head]);

    let prs = host.pull_requests(&repo());
    assert_eq!(prs.len(), 1);
    let (draft, pr) = &prs[0];
    assert_eq!(draft.base, "main");
    assert_eq!(draft.head, review_branch);
    assert!(draft.title.contains("#3"));
    assert_eq!(pr.number, pull_request_number);
    assert_eq!(pr.url, pull_request_url);
}

#[tokio::test]
async fn large_recent_target_needs_confirmation() {
    let host = Arc::new(MemoryRepoHost::new());
    host.commit_on(
        &repo(),
        "main",
        CommitSeed::new("base", now() - ChronoDuration::days(5)),
    );
    let target = host.commit_on(
        &repo(),
        "main",
        CommitSeed::new("big refactor", now() - ChronoDuration::days(3))
            .with_stats(75, 900, 400)
            .with_status(CommitStatus::Success),
    );
    host.commit_on(
        &repo(),
        "main",
        CommitSeed::new("hotfix", now() - ChronoDuration::hours(1)),
    );

    let exec = executor(&host);
    let outcome = exec.execute_at(&request(2, false), now()).await.unwrap();
    let RollbackOutcome::ConfirmationRequired { assessment } = outcome else {
        panic!("expected confirmation");
    };
    assert_eq!(assessment.risk_level, RiskLevel::Caution);
    assert!(assessment.requires_confirmation);
    assert_eq!(assessment.age_days, 3);
    assert!(assessment
        .warnings
        .iter()
        .any(|w| w.contains("75 files changed")));
    assert_eq!(host.branches(&repo()), vec!["main".to_string()]);

    let forced = exec.execute_at(&request(2, true), now()).await.unwrap();
    let RollbackOutcome::Created {
        revert_commit_sha, ..
    } = forced
    else {
        panic!("expected forced rollback to proceed");
    };
    let revert = host.commit(&repo(), &revert_commit_sha).unwrap();
    assert_eq!(revert.tree_sha, host.commit(&repo(), &target).unwrap().tree_sha);
}

#[tokio::test]
async fn failed_target_is_risky() {
    let host = Arc::new(MemoryRepoHost::new());
    host.commit_on(
        &repo(),
        "main",
        CommitSeed::new("broken", now() - ChronoDuration::hours(4))
            .with_status(CommitStatus::Failure),
    );
    host.commit_on(&repo(), "main", CommitSeed::new("head", now()));

    let outcome = executor(&host)
        .execute_at(&request(2, false), now())
        .await
        .unwrap();
    match outcome {
        RollbackOutcome::ConfirmationRequired { assessment } => {
            assert_eq!(assessment.risk_level, RiskLevel::Risky);
        }
        other => panic!("expected confirmation, got {other:?}"),
    }
}

#[tokio::test]
async fn host_failure_falls_back_to_manual_instructions() {
    let (host, shas) = ten_commit_host();
    host.fail(
        HostOperation::CreateCommit,
        HostError::PermissionDenied("token lacks contents:write".to_string()),
    );

    let outcome = executor(&host)
        .execute_at(&request(4, false), now())
        .await
        .unwrap();
    let RollbackOutcome::ManualInstructions {
        reason,
        commands,
        compare_url,
    } = outcome
    else {
        panic!("expected manual instructions");
    };

    assert!(reason.contains("contents:write"));
    assert_eq!(commands[0], "git fetch origin");
    assert!(commands.iter().any(|c| c.contains(&shas[6])));
    assert!(commands.iter().all(|c| !c.contains("--force") && !c.contains("reset --hard")));
    assert!(compare_url.starts_with("https://github.com/acme/widgets/compare/main...rollback/"));
    assert!(compare_url.ends_with("?expand=1"));
    assert_eq!(host.branch_sha(&repo(), "main"), Some(shas[9].clone()));
    assert!(host.pull_requests(&repo()).is_empty());
}

#[tokio::test]
async fn unknown_repository_is_a_host_error() {
    let host = Arc::new(MemoryRepoHost::new());
    let err = executor(&host)
        .execute_at(&request(2, false), now())
        .await
        .unwrap_err();
    assert!(matches!(err, RollbackError::Host(_)));
}

#[tokio::test]
async fn missing_stats_and_status_degrade() {
    let (host, _) = ten_commit_host();
    host.fail(HostOperation::CommitStats, HostError::Timeout(15));
    host.fail(
        HostOperation::CommitStatus,
        HostError::Api {
            status: 502,
            message: "bad gateway".to_string(),
        },
    );

    let resolver = CandidateResolver::new(host.clone());
    let candidates = resolver.resolve(&repo(), "main", 10, now()).await.unwrap();
    assert_eq!(candidates.len(), 10);
    assert!(candidates.iter().all(|c| c.files_changed == 0));
    assert!(candidates
        .iter()
        .all(|c| c.deployment_status == CommitStatus::Unknown));

    let outcome = RollbackExecutor::new(resolver)
        .execute_at(&request(2, false), now())
        .await
        .unwrap();
    assert!(matches!(outcome, RollbackOutcome::Created { .. }));
}

struct ScriptedAdvisor(String);

#[async_trait]
impl RollbackAdvisor for ScriptedAdvisor {
    async fn advise(
        &self,
        _repo: &RepoRef,
        _candidates: &[RollbackCandidate],
    ) -> RollbackResult<String> {
        Ok(self.0.clone())
    }
}

struct StalledAdvisor;

#[async_trait]
impl RollbackAdvisor for StalledAdvisor {
    async fn advise(
        &self,
        _repo: &RepoRef,
        _candidates: &[RollbackCandidate],
    ) -> RollbackResult<String> {
        tokio::time::sleep(Duration::from_secs(600)).await;
        Ok("RECOMMENDED_ROLLBACK: #2".to_string())
    }
}

struct BrokenAdvisor;

#[async_trait]
impl RollbackAdvisor for BrokenAdvisor {
    async fn advise(
        &self,
        _repo: &RepoRef,
        _candidates: &[RollbackCandidate],
    ) -> RollbackResult<String> {
        Err(RollbackError::Advisory("model offline".to_string()))
    }
}

#[tokio::test]
async fn report_includes_advice_and_heuristic() {
    let (host, shas) = ten_commit_host();
    let advisor = ScriptedAdvisor(
        "Looking at the history...\n\
         RECOMMENDED_ROLLBACK: #3\n\
         SAFETY_LEVEL: SAFE\n\
         REASON: last green build"
            .to_string(),
    );
    let resolver = CandidateResolver::new(host.clone())
        .with_advisor(Arc::new(advisor), Duration::from_secs(12));

    let report = resolver.report(&repo(), "main", 10, now()).await.unwrap();
    assert_eq!(report.total_candidates, 10);
    assert_eq!(report.heuristic_recommendation, Some(2));
    assert_eq!(
        report.current_candidate.as_ref().map(|c| c.commit_id.as_str()),
        Some(shas[9].as_str())
    );

    let advice = report.advisory_recommendation.unwrap();
    assert_eq!(advice.recommended, Some(3));
    assert_eq!(advice.safety_level, Some(RiskLevel::Safe));
    assert_eq!(advice.reason.as_deref(), Some("last green build"));
}

#[tokio::test(start_paused = true)]
async fn stalled_advisor_times_out_without_failing_the_report() {
    let (host, _) = ten_commit_host();
    let resolver = CandidateResolver::new(host.clone())
        .with_advisor(Arc::new(StalledAdvisor), Duration::from_secs(12));

    let report = resolver.report(&repo(), "main", 10, now()).await.unwrap();
    assert!(report.advisory_recommendation.is_none());
    assert_eq!(report.heuristic_recommendation, Some(2));
}

#[tokio::test]
async fn advisor_error_means_no_advice() {
    let (host, _) = ten_commit_host();
    let resolver = CandidateResolver::new(host.clone())
        .with_advisor(Arc::new(BrokenAdvisor), Duration::from_secs(12));
    let report = resolver.report(&repo(), "main", 10, now()).await.unwrap();
    assert!(report.advisory_recommendation.is_none());
    assert_eq!(report.candidates.len(), 10);
}
