//! Sentinel-State: repository state and hosting backends for Repo Sentinel
//!
//! This crate is the only owner of mutable shared state in the system and the
//! only place that talks to a repository hosting API.
//!
//! ## Layer 0 - Data/Hosting
//!
//! Focus: single-writer updates per repository and a narrow, async hosting
//! API surface that the rollback executor can drive without ever rewriting
//! history.
//!
//! ## Key Components
//!
//! - `RepositoryStateStore` / `MemoryStateStore`: per-repository records
//! - `RepoHost` / `GitHubHost`: branch, tree, commit and pull request calls
//! - `fakes::MemoryRepoHost`: in-memory git object model for tests

mod error;
pub mod fakes;
pub mod github;
mod memory_store;
mod repository;
pub mod storage_traits;

pub use error::{HostError, StoreError};
pub use github::{GitHubHost, GitHubHostConfig};
pub use memory_store::MemoryStateStore;
pub use repository::{normalize_repo_url, Credential, RepoRef, Registration, RepositoryState};
pub use storage_traits::{
    CommitStats, CommitStatus, CommitSummary, HostResult, NewCommit, PullRequestDraft,
    PullRequestRef, RepoHost, RepositoryStateStore, StateMutator, StoreResult,
};
