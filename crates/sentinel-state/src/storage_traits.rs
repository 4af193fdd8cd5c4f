//! Storage and hosting trait definitions for Repo Sentinel
//!
//! These traits define the two collaborator seams of the orchestration core:
//! - `RepositoryStateStore`: per-repository mutable records (single writer per key)
//! - `RepoHost`: the hosting API calls the rollback machinery needs
//!
//! Both are async and backend-agnostic. In-memory implementations live in
//! [`crate::MemoryStateStore`] and [`crate::fakes`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{HostError, StoreError};
use crate::repository::{Credential, RepoRef, Registration, RepositoryState};

/// Result type for state store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type for hosting operations
pub type HostResult<T> = std::result::Result<T, HostError>;

// ---------------------------------------------------------------------------
// RepositoryStateStore
// ---------------------------------------------------------------------------

/// A single mutation applied atomically to one repository record.
pub type StateMutator = Box<dyn FnOnce(&mut RepositoryState) + Send>;

/// Per-repository state store.
///
/// Guarantees:
/// - `update` calls for the same URL are serialized; none is lost.
/// - updates for different URLs never wait on each other.
/// - `register` on an existing URL overwrites the record.
#[async_trait]
pub trait RepositoryStateStore: Send + Sync {
    /// Fetch a snapshot of the record, `None` if the URL was never registered.
    async fn get(&self, url: &str) -> StoreResult<Option<RepositoryState>>;

    /// Create or overwrite the record for `registration.url`.
    async fn register(&self, registration: Registration) -> StoreResult<RepositoryState>;

    /// Apply `mutator` under the record's write lock and return the new snapshot.
    async fn update(&self, url: &str, mutator: StateMutator) -> StoreResult<RepositoryState>;

    /// Credential supplied at registration time, if any.
    async fn credential(&self, url: &str) -> StoreResult<Option<Credential>>;

    /// All registered records, ordered by URL.
    async fn list(&self) -> StoreResult<Vec<RepositoryState>>;
}

// ---------------------------------------------------------------------------
// RepoHost
// ---------------------------------------------------------------------------

/// One entry of a branch's commit listing, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSummary {
    pub sha: String,
    pub message: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
}

/// Diff statistics of a single commit against its first parent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitStats {
    pub files_changed: u32,
    pub additions: u32,
    pub deletions: u32,
}

/// Last known deployment/CI outcome recorded against a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitStatus {
    Success,
    Failure,
    Unknown,
}

/// A commit to be created from an existing tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCommit {
    pub message: String,
    pub tree_sha: String,
    pub parents: Vec<String>,
}

/// A pull request to be opened from `head` into `base`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestDraft {
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
}

/// Locator of an opened pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestRef {
    pub number: u64,
    pub url: String,
}

/// Hosting API surface used by rollback resolution and execution.
///
/// There is deliberately no force-update operation: `update_branch` must
/// refuse anything that is not a fast-forward.
#[async_trait]
pub trait RepoHost: Send + Sync {
    /// SHA of the commit `branch` currently points at.
    async fn branch_head(&self, repo: &RepoRef, branch: &str) -> HostResult<String>;

    /// SHA of the tree object referenced by commit `sha`.
    async fn commit_tree(&self, repo: &RepoRef, sha: &str) -> HostResult<String>;

    /// Up to `limit` commits reachable from `branch`, newest first.
    async fn list_commits(
        &self,
        repo: &RepoRef,
        branch: &str,
        limit: usize,
    ) -> HostResult<Vec<CommitSummary>>;

    async fn commit_stats(&self, repo: &RepoRef, sha: &str) -> HostResult<CommitStats>;

    async fn commit_status(&self, repo: &RepoRef, sha: &str) -> HostResult<CommitStatus>;

    /// Create `branch` pointing at `sha`. Fails with `RefExists` if present.
    async fn create_branch(&self, repo: &RepoRef, branch: &str, sha: &str) -> HostResult<()>;

    /// Create a commit object and return its SHA. Does not move any ref.
    async fn create_commit(&self, repo: &RepoRef, commit: NewCommit) -> HostResult<String>;

    /// Fast-forward `branch` to `sha`.
    async fn update_branch(&self, repo: &RepoRef, branch: &str, sha: &str) -> HostResult<()>;

    async fn open_pull_request(
        &self,
        repo: &RepoRef,
        draft: PullRequestDraft,
    ) -> HostResult<PullRequestRef>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&CommitStatus::Failure).unwrap(),
            "\"failure\""
        );
        let back: CommitStatus = serde_json::from_str("\"unknown\"").unwrap();
        assert_eq!(back, CommitStatus::Unknown);
    }
}
