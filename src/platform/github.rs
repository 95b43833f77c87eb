//! GitHub provider implementation
//!
//! Backed by octocrab. Read operations are retried a bounded number of times
//! on transient failures; mutations never are.

use crate::error::{Error, Result};
use crate::platform::{NewPullRequest, ProviderService};
use crate::types::{GitHubBranch, PullRequest};
use async_trait::async_trait;
use octocrab::Octocrab;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_secs(1);

/// GitHub service scoped to one repository
pub struct GitHubService {
    client: Octocrab,
    owner: String,
    repo: String,
}

impl GitHubService {
    pub fn new(client: Octocrab, repo: &GitHubBranch) -> Self {
        Self {
            client,
            owner: repo.ns.clone(),
            repo: repo.name.clone(),
        }
    }
}

/// 5xx and transport failures are worth retrying; 4xx means the request
/// itself is wrong and repeats would not help.
fn is_transient(err: &octocrab::Error) -> bool {
    match err {
        octocrab::Error::GitHub { source, .. } => source.status_code.is_server_error(),
        _ => true,
    }
}

async fn with_retry<T, F, Fut>(what: &str, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, octocrab::Error>>,
{
    let mut attempt = 0;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt + 1 < MAX_ATTEMPTS && is_transient(&err) => {
                attempt += 1;
                let delay = BACKOFF_BASE * 2u32.pow(attempt - 1);
                warn!("{what} failed (attempt {attempt}/{MAX_ATTEMPTS}), retrying in {delay:?}: {err}");
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

fn convert(pr: octocrab::models::pulls::PullRequest) -> PullRequest {
    let head_repo = pr
        .head
        .repo
        .as_ref()
        .and_then(|r| r.full_name.clone())
        .unwrap_or_default();
    let head_repo_url = pr
        .head
        .repo
        .as_ref()
        .and_then(|r| r.clone_url.as_ref().or(r.html_url.as_ref()))
        .map(ToString::to_string)
        .unwrap_or_default();
    PullRequest {
        number: pr.number,
        html_url: pr
            .html_url
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default(),
        title: pr.title.clone().unwrap_or_default(),
        body: pr.body.clone().unwrap_or_default(),
        head_ref: pr.head.ref_field.clone(),
        head_repo,
        head_repo_url,
        base_ref: pr.base.ref_field.clone(),
        labels: pr
            .labels
            .unwrap_or_default()
            .into_iter()
            .map(|label| label.name)
            .collect(),
    }
}

#[derive(Debug, Deserialize)]
struct CommitEntry {
    sha: String,
}

#[async_trait]
impl ProviderService for GitHubService {
    async fn list_open_prs(&self, base: &str) -> Result<Vec<PullRequest>> {
        let page = with_retry("list pull requests", || {
            let client = self.client.clone();
            let owner = self.owner.clone();
            let repo = self.repo.clone();
            let base = base.to_string();
            async move {
                client
                    .pulls(&owner, &repo)
                    .list()
                    .state(octocrab::params::State::Open)
                    .base(base)
                    .per_page(100)
                    .send()
                    .await
            }
        })
        .await?;
        let items = self.client.all_pages(page).await?;
        Ok(items.into_iter().map(convert).collect())
    }

    async fn create_pr(&self, req: &NewPullRequest) -> Result<PullRequest> {
        // octocrab's typed builder cannot set head_repo, which GitHub
        // requires for cross-repository PRs within one organization.
        let route = format!("/repos/{}/{}/pulls", self.owner, self.repo);
        let body = serde_json::json!({
            "title": req.title,
            "body": req.body,
            "head": req.head,
            "head_repo": req.head_repo,
            "base": req.base,
            "maintainer_can_modify": false,
        });
        let pr: octocrab::models::pulls::PullRequest =
            self.client.post(route, Some(&body)).await?;
        Ok(convert(pr))
    }

    async fn update_pr(
        &self,
        number: u64,
        title: Option<&str>,
        body: Option<&str>,
    ) -> Result<PullRequest> {
        let route = format!("/repos/{}/{}/pulls/{number}", self.owner, self.repo);
        let mut payload = serde_json::Map::new();
        if let Some(title) = title {
            payload.insert("title".to_string(), title.into());
        }
        if let Some(body) = body {
            payload.insert("body".to_string(), body.into());
        }
        if payload.is_empty() {
            return Err(Error::Platform(format!(
                "update of PR #{number} carries no changes"
            )));
        }
        let payload = serde_json::Value::Object(payload);
        let pr: octocrab::models::pulls::PullRequest =
            self.client.patch(route, Some(&payload)).await?;
        Ok(convert(pr))
    }

    async fn pr_commit_shas(&self, number: u64) -> Result<Vec<String>> {
        let route = format!(
            "/repos/{}/{}/pulls/{number}/commits",
            self.owner, self.repo
        );
        let commits: Vec<CommitEntry> = with_retry("list pull request commits", || {
            let client = self.client.clone();
            let route = route.clone();
            async move { client.get(route, None::<&()>).await }
        })
        .await?;
        Ok(commits.into_iter().map(|c| c.sha).collect())
    }
}
