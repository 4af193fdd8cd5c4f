//! In-memory fakes for the hosting trait (testing only)
//!
//! `MemoryRepoHost` keeps a tiny git object model (commits, trees, branch
//! refs, pull requests) per repository and enforces the same rules a real
//! host does: branches cannot be created twice, and ref updates must be
//! fast-forwards. Individual operations can be made to fail on demand.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};

use crate::error::HostError;
use crate::repository::RepoRef;
use crate::storage_traits::*;

/// Hosting operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostOperation {
    BranchHead,
    CommitTree,
    ListCommits,
    CommitStats,
    CommitStatus,
    CreateBranch,
    CreateCommit,
    UpdateBranch,
    OpenPullRequest,
}

/// A commit stored by the fake host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeCommit {
    pub sha: String,
    pub tree_sha: String,
    pub parents: Vec<String>,
    pub message: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    pub stats: CommitStats,
    pub status: CommitStatus,
}

/// Description of a commit to seed onto a branch.
#[derive(Debug, Clone)]
pub struct CommitSeed {
    pub message: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    pub stats: CommitStats,
    pub status: CommitStatus,
}

impl CommitSeed {
    pub fn new(message: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            message: message.into(),
            author: "dev".to_string(),
            timestamp,
            stats: CommitStats {
                files_changed: 1,
                additions: 10,
                deletions: 2,
            },
            status: CommitStatus::Success,
        }
    }

    pub fn with_stats(mut self, files_changed: u32, additions: u32, deletions: u32) -> Self {
        self.stats = CommitStats {
            files_changed,
            additions,
            deletions,
        };
        self
    }

    pub fn with_status(mut self, status: CommitStatus) -> Self {
        self.status = status;
        self
    }
}

#[derive(Debug, Default)]
struct RepoObjects {
    commits: HashMap<String, FakeCommit>,
    trees: HashSet<String>,
    branches: HashMap<String, String>,
    pull_requests: Vec<(PullRequestDraft, PullRequestRef)>,
}

#[derive(Debug, Default)]
struct HostState {
    repos: HashMap<String, RepoObjects>,
    failures: HashMap<HostOperation, HostError>,
    counter: u64,
}

impl HostState {
    fn fail_if_armed(&self, op: HostOperation) -> HostResult<()> {
        match self.failures.get(&op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn next_sha(&mut self, kind: &str, content: &str) -> String {
        self.counter += 1;
        let mut hasher = Sha256::new();
        hasher.update(format!("{kind}:{content}:{}", self.counter).as_bytes());
        hex::encode(hasher.finalize())[..40].to_string()
    }

    fn repo(&self, repo: &RepoRef) -> HostResult<&RepoObjects> {
        self.repos
            .get(&repo.full_name())
            .ok_or_else(|| HostError::NotFound(repo.full_name()))
    }

    fn repo_mut(&mut self, repo: &RepoRef) -> HostResult<&mut RepoObjects> {
        self.repos
            .get_mut(&repo.full_name())
            .ok_or_else(|| HostError::NotFound(repo.full_name()))
    }
}

impl RepoObjects {
    fn head(&self, branch: &str) -> HostResult<&String> {
        self.branches
            .get(branch)
            .ok_or_else(|| HostError::NotFound(format!("branch {branch}")))
    }

    fn commit(&self, sha: &str) -> HostResult<&FakeCommit> {
        self.commits
            .get(sha)
            .ok_or_else(|| HostError::NotFound(format!("commit {sha}")))
    }

    fn is_ancestor(&self, ancestor: &str, descendant: &str) -> bool {
        let mut stack = vec![descendant.to_string()];
        let mut seen = HashSet::new();
        while let Some(sha) = stack.pop() {
            if sha == ancestor {
                return true;
            }
            if !seen.insert(sha.clone()) {
                continue;
            }
            if let Some(commit) = self.commits.get(&sha) {
                stack.extend(commit.parents.iter().cloned());
            }
        }
        false
    }
}

/// In-memory hosting backend.
#[derive(Debug, Default)]
pub struct MemoryRepoHost {
    state: Mutex<HostState>,
}

impl MemoryRepoHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every subsequent call to `op` fail with `err`.
    pub fn fail(&self, op: HostOperation, err: HostError) {
        self.lock().failures.insert(op, err);
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Append a commit on top of `branch` (creating repo and branch as needed)
    /// with a fresh tree, and advance the branch. Returns the commit SHA.
    pub fn commit_on(&self, repo: &RepoRef, branch: &str, seed: CommitSeed) -> String {
        let mut state = self.lock();
        let tree_sha = state.next_sha("tree", &seed.message);
        let sha = state.next_sha("commit", &seed.message);
        let objects = state.repos.entry(repo.full_name()).or_default();
        let parents = objects.branches.get(branch).cloned().into_iter().collect();
        objects.trees.insert(tree_sha.clone());
        objects.commits.insert(
            sha.clone(),
            FakeCommit {
                sha: sha.clone(),
                tree_sha,
                parents,
                message: seed.message,
                author: seed.author,
                timestamp: seed.timestamp,
                stats: seed.stats,
                status: seed.status,
            },
        );
        objects.branches.insert(branch.to_string(), sha.clone());
        sha
    }

    /// Seed `count` commits on `branch`, one every `spacing`, the newest at
    /// `newest`. Returns SHAs oldest first.
    pub fn seed_history(
        &self,
        repo: &RepoRef,
        branch: &str,
        count: usize,
        newest: DateTime<Utc>,
        spacing: Duration,
    ) -> Vec<String> {
        (0..count)
            .map(|i| {
                let steps_back = i32::try_from(count - 1 - i).unwrap_or(i32::MAX);
                let timestamp = newest - spacing * steps_back;
                self.commit_on(
                    repo,
                    branch,
                    CommitSeed::new(format!("change {}", i + 1), timestamp),
                )
            })
            .collect()
    }

    pub fn branch_sha(&self, repo: &RepoRef, branch: &str) -> Option<String> {
        let state = self.lock();
        state
            .repos
            .get(&repo.full_name())
            .and_then(|r| r.branches.get(branch).cloned())
    }

    pub fn commit(&self, repo: &RepoRef, sha: &str) -> Option<FakeCommit> {
        let state = self.lock();
        state
            .repos
            .get(&repo.full_name())
            .and_then(|r| r.commits.get(sha).cloned())
    }

    /// Branch names, sorted.
    pub fn branches(&self, repo: &RepoRef) -> Vec<String> {
        let state = self.lock();
        let mut names: Vec<String> = state
            .repos
            .get(&repo.full_name())
            .map(|r| r.branches.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    pub fn pull_requests(&self, repo: &RepoRef) -> Vec<(PullRequestDraft, PullRequestRef)> {
        let state = self.lock();
        state
            .repos
            .get(&repo.full_name())
            .map(|r| r.pull_requests.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl RepoHost for MemoryRepoHost {
    async fn branch_head(&self, repo: &RepoRef, branch: &str) -> HostResult<String> {
        let state = self.lock();
        state.fail_if_armed(HostOperation::BranchHead)?;
        state.repo(repo)?.head(branch).cloned()
    }

    async fn commit_tree(&self, repo: &RepoRef, sha: &str) -> HostResult<String> {
        let state = self.lock();
        state.fail_if_armed(HostOperation::CommitTree)?;
        Ok(state.repo(repo)?.commit(sha)?.tree_sha.clone())
    }

    async fn list_commits(
        &self,
        repo: &RepoRef,
        branch: &str,
        limit: usize,
    ) -> HostResult<Vec<CommitSummary>> {
        let state = self.lock();
        state.fail_if_armed(HostOperation::ListCommits)?;
        let objects = state.repo(repo)?;
        let mut next = Some(objects.head(branch)?.clone());
        let mut out = Vec::new();
        while let Some(sha) = next {
            if out.len() >= limit {
                break;
            }
            let commit = objects.commit(&sha)?;
            out.push(CommitSummary {
                sha: commit.sha.clone(),
                message: commit.message.clone(),
                author: commit.author.clone(),
                timestamp: commit.timestamp,
            });
            next = commit.parents.first().cloned();
        }
        Ok(out)
    }

    async fn commit_stats(&self, repo: &RepoRef, sha: &str) -> HostResult<CommitStats> {
        let state = self.lock();
        state.fail_if_armed(HostOperation::CommitStats)?;
        Ok(state.repo(repo)?.commit(sha)?.stats)
    }

    async fn commit_status(&self, repo: &RepoRef, sha: &str) -> HostResult<CommitStatus> {
        let state = self.lock();
        state.fail_if_armed(HostOperation::CommitStatus)?;
        Ok(state.repo(repo)?.commit(sha)?.status)
    }

    async fn create_branch(&self, repo: &RepoRef, branch: &str, sha: &str) -> HostResult<()> {
        let mut state = self.lock();
        state.fail_if_armed(HostOperation::CreateBranch)?;
        let objects = state.repo_mut(repo)?;
        if objects.branches.contains_key(branch) {
            return Err(HostError::RefExists(branch.to_string()));
        }
        objects.commit(sha)?;
        objects.branches.insert(branch.to_string(), sha.to_string());
        Ok(())
    }

    async fn create_commit(&self, repo: &RepoRef, commit: NewCommit) -> HostResult<String> {
        let mut state = self.lock();
        state.fail_if_armed(HostOperation::CreateCommit)?;
        {
            let objects = state.repo(repo)?;
            if !objects.trees.contains(&commit.tree_sha) {
                return Err(HostError::NotFound(format!("tree {}", commit.tree_sha)));
            }
            for parent in &commit.parents {
                objects.commit(parent)?;
            }
        }
        let sha = state.next_sha("commit", &commit.message);
        let objects = state.repo_mut(repo)?;
        objects.commits.insert(
            sha.clone(),
            FakeCommit {
                sha: sha.clone(),
                tree_sha: commit.tree_sha,
                parents: commit.parents,
                message: commit.message,
                author: "repo-sentinel".to_string(),
                timestamp: Utc::now(),
                stats: CommitStats::default(),
                status: CommitStatus::Unknown,
            },
        );
        Ok(sha)
    }

    async fn update_branch(&self, repo: &RepoRef, branch: &str, sha: &str) -> HostResult<()> {
        let mut state = self.lock();
        state.fail_if_armed(HostOperation::UpdateBranch)?;
        let objects = state.repo_mut(repo)?;
        let current = objects.head(branch)?.clone();
        objects.commit(sha)?;
        if !objects.is_ancestor(&current, sha) {
            return Err(HostError::NonFastForward(branch.to_string()));
        }
        objects.branches.insert(branch.to_string(), sha.to_string());
        Ok(())
    }

    async fn open_pull_request(
        &self,
        repo: &RepoRef,
        draft: PullRequestDraft,
    ) -> HostResult<PullRequestRef> {
        let mut state = self.lock();
        state.fail_if_armed(HostOperation::OpenPullRequest)?;
        let objects = state.repo_mut(repo)?;
        objects.head(&draft.head)?;
        objects.head(&draft.base)?;
        let number = objects.pull_requests.len() as u64 + 1;
        let pr = PullRequestRef {
            number,
            url: format!("https://github.com/{}/pull/{}", repo.full_name(), number),
        };
        objects.pull_requests.push((draft, pr.clone()));
        Ok(pr)
    }
}
