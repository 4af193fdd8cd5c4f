//! GitHub REST backend for [`RepoHost`].
//!
//! Every request goes through one `reqwest::Client` built with a bounded
//! timeout. Ref updates are always sent with `force: false`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use crate::error::HostError;
use crate::repository::RepoRef;
use crate::storage_traits::{
    CommitStats, CommitStatus, CommitSummary, HostResult, NewCommit, PullRequestDraft,
    PullRequestRef, RepoHost,
};

const GITHUB_MAX_PAGE: usize = 100;

/// Connection settings for [`GitHubHost`].
#[derive(Clone)]
pub struct GitHubHostConfig {
    pub api_base: String,
    pub token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for GitHubHostConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            token: None,
            timeout_secs: 15,
        }
    }
}

impl std::fmt::Debug for GitHubHostConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubHostConfig")
            .field("api_base", &self.api_base)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

pub struct GitHubHost {
    client: reqwest::Client,
    api_base: String,
    token: Option<String>,
    timeout_secs: u64,
}

impl std::fmt::Debug for GitHubHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubHost")
            .field("api_base", &self.api_base)
            .field("authenticated", &self.token.is_some())
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Deserialize)]
struct ShaObject {
    sha: String,
}

#[derive(Deserialize)]
struct RefResponse {
    object: ShaObject,
}

#[derive(Deserialize)]
struct GitCommitResponse {
    tree: ShaObject,
}

#[derive(Deserialize)]
struct CommitAuthor {
    name: String,
    date: DateTime<Utc>,
}

#[derive(Deserialize)]
struct CommitBody {
    message: String,
    author: CommitAuthor,
}

#[derive(Deserialize)]
struct CommitListItem {
    sha: String,
    commit: CommitBody,
}

#[derive(Deserialize)]
struct DiffStats {
    additions: u32,
    deletions: u32,
}

#[derive(Deserialize)]
struct CommitDetail {
    stats: Option<DiffStats>,
    #[serde(default)]
    files: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct CombinedStatus {
    state: String,
}

#[derive(Deserialize)]
struct PullResponse {
    number: u64,
    html_url: String,
}

impl GitHubHost {
    pub fn new(config: GitHubHostConfig) -> HostResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("repo-sentinel/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HostError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: config.token,
            timeout_secs: config.timeout_secs,
        })
    }

    fn request(&self, method: Method, repo: &RepoRef, path: &str) -> RequestBuilder {
        let url = format!("{}/repos/{}{}", self.api_base, repo.full_name(), path);
        let builder = self
            .client
            .request(method, url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> HostResult<T> {
        let response = builder.send().await.map_err(|e| self.transport(e))?;
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| HostError::Malformed(e.to_string()));
        }
        let message = response.text().await.unwrap_or_default();
        debug!(status = status.as_u16(), "hosting API call failed");
        Err(map_status(status, message))
    }

    fn transport(&self, err: reqwest::Error) -> HostError {
        if err.is_timeout() {
            HostError::Timeout(self.timeout_secs)
        } else {
            HostError::Transport(err.to_string())
        }
    }
}

fn map_status(status: StatusCode, message: String) -> HostError {
    match status {
        StatusCode::NOT_FOUND => HostError::NotFound(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => HostError::PermissionDenied(message),
        StatusCode::UNPROCESSABLE_ENTITY if message.contains("Reference already exists") => {
            HostError::RefExists(message)
        }
        StatusCode::UNPROCESSABLE_ENTITY if message.contains("not a fast forward") => {
            HostError::NonFastForward(message)
        }
        other => HostError::Api {
            status: other.as_u16(),
            message,
        },
    }
}

fn map_combined_state(state: &str) -> CommitStatus {
    match state {
        "success" => CommitStatus::Success,
        "failure" | "error" => CommitStatus::Failure,
        _ => CommitStatus::Unknown,
    }
}

#[async_trait]
impl RepoHost for GitHubHost {
    #[instrument(skip(self, repo), fields(repo = %repo))]
    async fn branch_head(&self, repo: &RepoRef, branch: &str) -> HostResult<String> {
        let path = format!("/git/ref/heads/{branch}");
        let r: RefResponse = self.send(self.request(Method::GET, repo, &path)).await?;
        Ok(r.object.sha)
    }

    #[instrument(skip(self, repo), fields(repo = %repo))]
    async fn commit_tree(&self, repo: &RepoRef, sha: &str) -> HostResult<String> {
        let path = format!("/git/commits/{sha}");
        let c: GitCommitResponse = self.send(self.request(Method::GET, repo, &path)).await?;
        Ok(c.tree.sha)
    }

    #[instrument(skip(self, repo), fields(repo = %repo))]
    async fn list_commits(
        &self,
        repo: &RepoRef,
        branch: &str,
        limit: usize,
    ) -> HostResult<Vec<CommitSummary>> {
        let per_page = limit.clamp(1, GITHUB_MAX_PAGE).to_string();
        let builder = self
            .request(Method::GET, repo, "/commits")
            .query(&[("sha", branch), ("per_page", per_page.as_str())]);
        let items: Vec<CommitListItem> = self.send(builder).await?;
        Ok(items
            .into_iter()
            .take(limit)
            .map(|item| CommitSummary {
                sha: item.sha,
                message: item.commit.message,
                author: item.commit.author.name,
                timestamp: item.commit.author.date,
            })
            .collect())
    }

    async fn commit_stats(&self, repo: &RepoRef, sha: &str) -> HostResult<CommitStats> {
        let path = format!("/commits/{sha}");
        let detail: CommitDetail = self.send(self.request(Method::GET, repo, &path)).await?;
        let (additions, deletions) = detail
            .stats
            .map(|s| (s.additions, s.deletions))
            .unwrap_or((0, 0));
        Ok(CommitStats {
            files_changed: u32::try_from(detail.files.len()).unwrap_or(u32::MAX),
            additions,
            deletions,
        })
    }

    async fn commit_status(&self, repo: &RepoRef, sha: &str) -> HostResult<CommitStatus> {
        let path = format!("/commits/{sha}/status");
        let combined: CombinedStatus = self.send(self.request(Method::GET, repo, &path)).await?;
        Ok(map_combined_state(&combined.state))
    }

    #[instrument(skip(self, repo), fields(repo = %repo))]
    async fn create_branch(&self, repo: &RepoRef, branch: &str, sha: &str) -> HostResult<()> {
        let builder = self
            .request(Method::POST, repo, "/git/refs")
            .json(&json!({ "ref": format!("refs/heads/{branch}"), "sha": sha }));
        let _: serde_json::Value = self.send(builder).await?;
        Ok(())
    }

    #[instrument(skip(self, repo, commit), fields(repo = %repo, tree = %commit.tree_sha))]
    async fn create_commit(&self, repo: &RepoRef, commit: NewCommit) -> HostResult<String> {
        let builder = self.request(Method::POST, repo, "/git/commits").json(&json!({
            "message": commit.message,
            "tree": commit.tree_sha,
            "parents": commit.parents,
        }));
        let created: ShaObject = self.send(builder).await?;
        Ok(created.sha)
    }

    #[instrument(skip(self, repo), fields(repo = %repo))]
    async fn update_branch(&self, repo: &RepoRef, branch: &str, sha: &str) -> HostResult<()> {
        let path = format!("/git/refs/heads/{branch}");
        let builder = self
            .request(Method::PATCH, repo, &path)
            .json(&json!({ "sha": sha, "force": false }));
        let _: serde_json::Value = self.send(builder).await?;
        Ok(())
    }

    #[instrument(
        skip(self, repo, draft),
        fields(repo = %repo, head = %draft.head, base = %draft.base)
    )]
    async fn open_pull_request(
        &self,
        repo: &RepoRef,
        draft: PullRequestDraft,
    ) -> HostResult<PullRequestRef> {
        let builder = self.request(Method::POST, repo, "/pulls").json(&json!({
            "title": draft.title,
            "body": draft.body,
            "head": draft.head,
            "base": draft.base,
        }));
        let pr: PullResponse = self.send(builder).await?;
        Ok(PullRequestRef {
            number: pr.number,
            url: pr.html_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert!(matches!(
            map_status(StatusCode::NOT_FOUND, "x".into()),
            HostError::NotFound(_)
        ));
        assert!(matches!(
            map_status(StatusCode::FORBIDDEN, "x".into()),
            HostError::PermissionDenied(_)
        ));
        assert!(matches!(
            map_status(
                StatusCode::UNPROCESSABLE_ENTITY,
                "Reference already exists".into()
            ),
            HostError::RefExists(_)
        ));
        assert!(matches!(
            map_status(StatusCode::UNPROCESSABLE_ENTITY, "Update is not a fast forward".into()),
            HostError::NonFastForward(_)
        ));
        assert!(matches!(
            map_status(StatusCode::BAD_GATEWAY, "x".into()),
            HostError::Api { status: 502, .. }
        ));
    }

    #[test]
    fn combined_state_mapping() {
        assert_eq!(map_combined_state("success"), CommitStatus::Success);
        assert_eq!(map_combined_state("error"), CommitStatus::Failure);
        assert_eq!(map_combined_state("failure"), CommitStatus::Failure);
        assert_eq!(map_combined_state("pending"), CommitStatus::Unknown);
    }

    #[test]
    fn debug_hides_token() {
        let host = GitHubHost::new(GitHubHostConfig {
            token: Some("ghp_secret".to_string()),
            ..GitHubHostConfig::default()
        })
        .unwrap();
        let dbg = format!("{host:?}");
        assert!(!dbg.contains("ghp_secret"));
        assert!(dbg.contains("authenticated: true"));
    }
}
