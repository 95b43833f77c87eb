//! Rebase planning
//!
//! Computes the divergence between dest and source, applies the tag policy
//! and the user exclusion list, and filters out commits the source already
//! contains. The result is the ordered carry set.

use crate::error::{Error, Result};
use crate::git::GitWorkspace;
use crate::rebase::classify::classify;
use crate::types::{CommitInfo, CommitTag, RebasePlan, RunContext, TagPolicy};
use tracing::info;

/// Whether the tag policy keeps a commit in the carry set
pub fn policy_keeps(policy: TagPolicy, tag: &CommitTag) -> bool {
    match policy {
        TagPolicy::None => true,
        TagPolicy::Soft => *tag != CommitTag::Drop,
        TagPolicy::Strict => matches!(tag, CommitTag::Carry | CommitTag::Other(_)),
    }
}

/// Whether a sha starts with one of the excluded prefixes
pub fn is_excluded(sha: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|prefix| sha.starts_with(prefix))
}

/// Exclusion prefixes must be hex and at least four characters; anything
/// shorter matches far too much history to be intentional.
pub fn validate_exclusions(prefixes: &[String]) -> Result<()> {
    for prefix in prefixes {
        if prefix.len() < 4 {
            return Err(Error::Config(format!(
                "excluded commit {prefix:?} is shorter than 4 characters"
            )));
        }
        if !prefix.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::Config(format!(
                "excluded commit {prefix:?} is not a hex sha prefix"
            )));
        }
    }
    Ok(())
}

/// Build the replay plan for this run
pub async fn build_plan(ws: &GitWorkspace, ctx: &RunContext) -> Result<RebasePlan> {
    let source_ref = format!("refs/remotes/source/{}", ctx.source.branch);
    let dest_ref = format!("refs/remotes/dest/{}", ctx.dest.branch);

    let source_tip = ws.rev_parse(&source_ref).await?;
    let merge_base = ws.merge_base(&source_ref, &dest_ref).await?;
    info!("Merge base of source and dest: {merge_base}");

    let candidates = ws.log_commits(&merge_base, &dest_ref).await?;
    // Everything not in this set has a counterpart in source, by ancestry or
    // by patch id, and replaying it would produce an empty pick.
    let unmerged = ws.cherry_unmerged(&source_ref, &dest_ref).await?;

    let mut carries = Vec::new();
    for (sha, subject, author) in candidates {
        let tag = classify(&subject);
        if !policy_keeps(ctx.tag_policy, &tag) {
            info!("Dropping commit by tag policy: {sha} - {subject}");
            continue;
        }
        if is_excluded(&sha, &ctx.exclude_commits) {
            info!("Explicitly dropping commit from rebase: {sha}");
            continue;
        }
        if !unmerged.contains(&sha) {
            info!("Commit already contained in source: {sha} - {subject}");
            continue;
        }
        carries.push(CommitInfo {
            sha,
            subject,
            author,
            tag,
        });
    }

    if carries.is_empty() {
        info!("Dest branch already contains the latest changes");
    } else {
        info!("Planned {} commits to carry", carries.len());
    }

    Ok(RebasePlan {
        carries,
        source_tip,
        merge_base,
    })
}
