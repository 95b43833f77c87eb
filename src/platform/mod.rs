//! Hosting-provider interface
//!
//! The rebase engine only talks to GitHub through this trait, so tests can
//! substitute a recording mock and the engine stays free of client details.

mod github;

pub use github::GitHubService;

use crate::error::Result;
use crate::types::PullRequest;
use async_trait::async_trait;

/// Request payload for opening a pull request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPullRequest {
    pub title: String,
    pub body: String,
    /// Head branch name
    pub head: String,
    /// `<ns>/<name>` of the head repository, required for cross-repository
    /// PRs inside one organization
    pub head_repo: String,
    /// Base branch name
    pub base: String,
}

/// Provider operations the engine consumes
#[async_trait]
pub trait ProviderService: Send + Sync {
    /// Open PRs into the given base branch, labels included
    async fn list_open_prs(&self, base: &str) -> Result<Vec<PullRequest>>;

    /// Open a new PR. Never retried.
    async fn create_pr(&self, req: &NewPullRequest) -> Result<PullRequest>;

    /// Update title and/or body of an existing PR. Never retried.
    async fn update_pr(
        &self,
        number: u64,
        title: Option<&str>,
        body: Option<&str>,
    ) -> Result<PullRequest>;

    /// Commit shas of a PR, oldest first
    async fn pr_commit_shas(&self, number: u64) -> Result<Vec<String>>;
}
