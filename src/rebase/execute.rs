//! Carry execution
//!
//! Replays the planned carry set onto the source tip, running the rebase
//! lifecycle hooks at their attachment points. Conflicts are fatal; the
//! in-flight pick is aborted before the error surfaces.

use crate::error::Result;
use crate::git::{GitWorkspace, REBASE_BRANCH};
use crate::hooks::{HookPhase, LifecycleHooks};
use crate::types::{RebasePlan, RunContext};
use tracing::info;

/// Check out the rebase branch at the source tip and apply the plan.
/// With an empty plan this still resets the branch and runs the pre-rebase
/// and post-rebase phases, which is what `--always-run-hooks` relies on.
pub async fn apply_plan(
    ws: &GitWorkspace,
    ctx: &RunContext,
    plan: &RebasePlan,
    hooks: &LifecycleHooks,
) -> Result<()> {
    info!(
        "Preparing rebase branch at source/{} ({})",
        ctx.source.branch, plan.source_tip
    );
    ws.checkout_branch_at(REBASE_BRANCH, &plan.source_tip).await?;

    hooks.run_phase(HookPhase::PreRebase, ws.dir(), &[]).await?;

    for commit in &plan.carries {
        hooks
            .run_phase(
                HookPhase::PreCarryCommit,
                ws.dir(),
                &[("REBASEBOT_COMMIT", commit.sha.clone())],
            )
            .await?;
        info!("Picking commit: {} - {}", commit.sha, commit.subject);
        ws.cherry_pick(&commit.sha).await?;
    }

    hooks.run_phase(HookPhase::PostRebase, ws.dir(), &[]).await?;
    Ok(())
}
