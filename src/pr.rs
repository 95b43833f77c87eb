//! Push and pull request reconciliation
//!
//! Decides whether the rebase branch needs a force-push, whether the run
//! needs a PR, and how an existing PR's title is allowed to change. The
//! `rebase/manual` label is an indefinite human override: when it is present
//! on the matched PR, nothing is pushed and nothing is mutated.

use crate::auth::{CredentialRole, GithubAuth};
use crate::error::Result;
use crate::git::{GitWorkspace, REBASE_BRANCH};
use crate::hooks::{HookPhase, LifecycleHooks};
use crate::platform::{NewPullRequest, ProviderService};
use crate::types::{RebasePlan, RunContext, RunOutcome, RunReport};
use regex::Regex;
use std::sync::OnceLock;
use tracing::info;

/// The only label the bot observes. It never writes labels.
pub const MANUAL_LABEL: &str = "rebase/manual";

fn ticket_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Z][A-Z0-9]+-\d+:\s)(.*)$").unwrap())
}

fn title_template_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^Merge .+ \([0-9a-f]{7}\) into .+$").unwrap())
}

/// Canonical PR title for this run
pub fn generate_title(ctx: &RunContext, source_short_sha: &str) -> String {
    format!(
        "Merge {}:{} ({source_short_sha}) into {}",
        ctx.source.url, ctx.source.branch, ctx.dest.branch
    )
}

/// PR body for this run, regenerated on every reconcile
pub fn render_body(ctx: &RunContext, plan: &RebasePlan) -> String {
    let mut body = format!(
        "Automated rebase of {}:{} (tip {}) into {}:{}.\n",
        ctx.source.url, ctx.source.branch, plan.source_tip, ctx.dest.full_name(), ctx.dest.branch
    );
    if plan.carries.is_empty() {
        body.push_str("\nNo downstream commits were carried.\n");
    } else {
        body.push_str("\nCarried downstream commits:\n");
        for commit in &plan.carries {
            body.push_str(&format!("- {} {}\n", &commit.sha[..7.min(commit.sha.len())], commit.subject));
        }
    }
    body
}

/// Retitle policy: regenerate the title only when the existing one matches
/// the bot's template, preserving an optional leading `TICKET-ID: ` prefix.
/// Returns `None` when the title should be left alone.
pub fn reconcile_title(existing: &str, generated: &str) -> Option<String> {
    let (prefix, rest) = match ticket_prefix_re().captures(existing) {
        Some(caps) => (caps.get(1).unwrap().as_str(), caps.get(2).unwrap().as_str()),
        None => ("", existing),
    };
    if !title_template_re().is_match(rest) {
        info!("Open pull request title {existing:?} does not match the bot format, keeping it");
        return None;
    }
    let computed = format!("{prefix}{generated}");
    if computed == existing {
        None
    } else {
        Some(computed)
    }
}

/// Push the rebase branch and reconcile the PR on dest. `rebase_advanced`
/// records whether the carry phase ran this run; when it did not, the run is
/// read-only (no push, no PR mutation).
#[allow(clippy::too_many_arguments)]
pub async fn finalize(
    ws: &GitWorkspace,
    ctx: &RunContext,
    plan: &RebasePlan,
    provider: &dyn ProviderService,
    hooks: &LifecycleHooks,
    auth: &GithubAuth,
    rebase_advanced: bool,
) -> Result<RunReport> {
    let rebase_tip = if rebase_advanced {
        Some(ws.rev_parse(REBASE_BRANCH).await?)
    } else {
        None
    };

    info!("Checking for existing pull request");
    let existing = provider
        .list_open_prs(&ctx.dest.branch)
        .await?
        .into_iter()
        .find(|pr| pr.head_repo == ctx.rebase.full_name() && pr.head_ref == ctx.rebase.branch);
    match &existing {
        Some(pr) => info!("Found existing pull request: {:?} {}", pr.title, pr.html_url),
        None => info!("No existing pull request found"),
    }

    // The label check comes before the push so a manual override freezes the
    // rebase branch as well as the PR.
    if let Some(pr) = &existing {
        if pr.labels.iter().any(|label| label == MANUAL_LABEL) {
            info!(
                "PR {} carries the {MANUAL_LABEL} label, leaving everything alone",
                pr.html_url
            );
            return Ok(RunReport {
                outcome: RunOutcome::ManualOverride(pr.html_url.clone()),
                pushed: false,
                rebase_tip,
            });
        }
    }

    if ctx.dry_run {
        info!("Dry run mode is enabled, stopping before push and PR operations");
        return Ok(RunReport {
            outcome: RunOutcome::DryRun,
            pushed: false,
            rebase_tip,
        });
    }

    let dest_diff_empty = if rebase_advanced {
        ws.diff_is_empty(&format!(
            "refs/remotes/dest/{}...{REBASE_BRANCH}",
            ctx.dest.branch
        ))
        .await?
    } else {
        true
    };

    let mut pushed = false;
    if rebase_advanced {
        // An empty diff against dest means there is nothing worth a PR, so
        // the push is skipped too, unless hooks genuinely advanced the
        // branch beyond the source tip under --always-run-hooks.
        let hook_advanced =
            ctx.always_run_hooks && rebase_tip.as_deref() != Some(plan.source_tip.as_str());
        let remote_ref = format!("refs/remotes/rebase/{}", ctx.rebase.branch);
        // Content comparison, not sha comparison: cherry-picks get fresh
        // committer timestamps every run, but an unchanged tree means the
        // remote branch is already right (and keeps its head sha stable).
        let push_required = (!dest_diff_empty || hook_advanced)
            && match ws.rev_parse(&remote_ref).await {
                Ok(_) => !ws.diff_is_empty(&remote_ref).await?,
                Err(_) => true,
            };
        if push_required {
            hooks
                .run_phase(HookPhase::PrePushRebaseBranch, ws.dir(), &[])
                .await?;
            let url = auth
                .authenticated_url(CredentialRole::Rebase, &ctx.rebase)
                .await?;
            ws.set_remote("rebase", &url).await?;
            ws.push_force("rebase", &ctx.rebase.branch).await?;
            pushed = true;
        } else {
            info!("Existing rebase branch already matches the local result");
        }
    }

    let report = match existing {
        Some(pr) => {
            if !rebase_advanced {
                // Nothing was replayed this run; the open PR stays as it is.
                RunReport {
                    outcome: RunOutcome::UpToDate(pr.html_url.clone()),
                    pushed,
                    rebase_tip,
                }
            } else {
                let short = ws.rev_parse_short(&plan.source_tip).await?;
                let title = reconcile_title(&pr.title, &generate_title(ctx, &short));
                let body = render_body(ctx, plan);
                if let Some(new_title) = &title {
                    info!("Updating pull request title: {new_title}");
                }
                let updated = provider
                    .update_pr(pr.number, title.as_deref(), Some(&body))
                    .await?;
                RunReport {
                    outcome: RunOutcome::PrUpdated(updated.html_url),
                    pushed,
                    rebase_tip,
                }
            }
        }
        None => {
            let pr_required = rebase_advanced && !dest_diff_empty;
            if pr_required {
                hooks
                    .run_phase(HookPhase::PreCreatePr, ws.dir(), &[])
                    .await?;
                let short = ws.rev_parse_short(&plan.source_tip).await?;
                info!("Creating a pull request");
                let pr = provider
                    .create_pr(&NewPullRequest {
                        title: generate_title(ctx, &short),
                        body: render_body(ctx, plan),
                        head: ctx.rebase.branch.clone(),
                        head_repo: ctx.rebase.full_name(),
                        base: ctx.dest.branch.clone(),
                    })
                    .await?;
                RunReport {
                    outcome: RunOutcome::PrCreated(pr.html_url),
                    pushed,
                    rebase_tip,
                }
            } else {
                info!("No PR required, dest already contains the rebase result");
                RunReport {
                    outcome: RunOutcome::NoChanges,
                    pushed,
                    rebase_tip,
                }
            }
        }
    };
    Ok(report)
}
