//! ART pull request pick
//!
//! The upstream build tooling periodically opens a PR updating the build
//! image. When a title pattern is configured and exactly one open PR against
//! the dest branch matches it, its commits are folded into the rebase branch
//! so the two do not race each other.

use crate::error::Result;
use crate::git::GitWorkspace;
use crate::platform::ProviderService;
use crate::types::RunContext;
use tracing::info;

const ART_REMOTE: &str = "art-pr";

pub async fn cherry_pick_art_pr(
    ws: &GitWorkspace,
    ctx: &RunContext,
    provider: &dyn ProviderService,
) -> Result<()> {
    let Some(pattern) = &ctx.art_pr_pattern else {
        return Ok(());
    };

    info!("Checking for an open ART pull request");
    let prs = provider.list_open_prs(&ctx.dest.branch).await?;
    let matches: Vec<_> = prs
        .iter()
        .filter(|pr| pattern.is_match(&pr.title))
        .collect();
    if matches.len() != 1 {
        info!(
            "Found {} PRs matching the ART pattern, skipping the pick",
            matches.len()
        );
        return Ok(());
    }

    let pr = matches[0];
    info!("Found open ART pull request: {:?} {}", pr.title, pr.html_url);

    ws.set_remote(ART_REMOTE, &pr.head_repo_url).await?;
    ws.fetch_ref(ART_REMOTE, &pr.head_ref).await?;

    for sha in provider.pr_commit_shas(pr.number).await? {
        info!("Picking ART commit: {sha}");
        ws.cherry_pick(&sha).await?;
    }
    Ok(())
}
