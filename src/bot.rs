//! Run orchestration
//!
//! Drives the fixed phase sequence: workspace setup, hook fetch, planning,
//! carry execution, the ART pick, and push/PR reconciliation. Phases run
//! strictly one after another; each either completes or aborts the run.

use crate::auth::{CredentialRole, GithubAuth};
use crate::error::Result;
use crate::git::GitWorkspace;
use crate::hooks::LifecycleHooks;
use crate::notify::Notifier;
use crate::platform::ProviderService;
use crate::pr;
use crate::rebase;
use crate::types::{RunContext, RunOutcome, RunReport};
use tracing::{error, info};

/// Run the bot end to end. The outcome (or the failure) is reported through
/// the notifier before this returns.
pub async fn run(
    ctx: &RunContext,
    auth: &GithubAuth,
    provider: &dyn ProviderService,
    hooks: &mut LifecycleHooks,
    notifier: &Notifier,
) -> Result<RunReport> {
    match run_phases(ctx, auth, provider, hooks).await {
        Ok(report) => {
            // A manual override is reported even under --dry-run; the only
            // silent outcome is DryRun itself, which report_message skips.
            if let Some(message) = report_message(ctx, &report) {
                info!("{message}");
                notifier.send(&message).await;
            }
            Ok(report)
        }
        Err(err) => {
            error!(
                "Failed to rebase {}:{} into {}:{}: {err}",
                ctx.source.url, ctx.source.branch, ctx.dest.full_name(), ctx.dest.branch
            );
            notifier
                .send(&format!(
                    "Manual intervention is needed to rebase {}:{} into {}:{}: {err}",
                    ctx.source.url, ctx.source.branch, ctx.dest.full_name(), ctx.dest.branch
                ))
                .await;
            Err(err)
        }
    }
}

async fn run_phases(
    ctx: &RunContext,
    auth: &GithubAuth,
    provider: &dyn ProviderService,
    hooks: &mut LifecycleHooks,
) -> Result<RunReport> {
    let ws = init_working_dir(ctx, auth).await?;

    hooks.export_run_env(ctx);
    hooks.fetch_all(&ws).await?;

    let plan = rebase::build_plan(&ws, ctx).await?;

    let rebase_advanced = !plan.is_noop() || ctx.always_run_hooks;
    if rebase_advanced {
        rebase::apply_plan(&ws, ctx, &plan, hooks).await?;
        if !plan.is_noop() {
            rebase::cherry_pick_art_pr(&ws, ctx, provider).await?;
        }
    }

    pr::finalize(&ws, ctx, &plan, provider, hooks, auth, rebase_advanced).await
}

/// Create the working directory, wire the three remotes with fresh
/// credentials, and fetch the refs this run needs.
async fn init_working_dir(ctx: &RunContext, auth: &GithubAuth) -> Result<GitWorkspace> {
    let ws = GitWorkspace::init(&ctx.working_dir).await?;

    ws.set_remote("source", &ctx.source.url).await?;
    ws.set_remote(
        "dest",
        &auth
            .authenticated_url(CredentialRole::Dest, &ctx.dest)
            .await?,
    )
    .await?;
    ws.set_remote(
        "rebase",
        &auth
            .authenticated_url(CredentialRole::Rebase, &ctx.rebase)
            .await?,
    )
    .await?;

    if !ctx.git_username.is_empty() {
        ws.config_set("user.name", &ctx.git_username).await?;
    }
    if !ctx.git_email.is_empty() {
        ws.config_set("user.email", &ctx.git_email).await?;
    }

    ws.fetch_ref("dest", &ctx.dest.branch).await?;
    ws.fetch_ref("source", &ctx.source.branch).await?;
    if ws.remote_has_ref("rebase", &ctx.rebase.branch).await? {
        ws.fetch_ref("rebase", &ctx.rebase.branch).await?;
    } else {
        info!(
            "Rebase branch {} does not exist on the rebase remote yet",
            ctx.rebase.branch
        );
    }

    Ok(ws)
}

/// Human-readable summary of a finished run, mirrored to Slack
fn report_message(ctx: &RunContext, report: &RunReport) -> Option<String> {
    match &report.outcome {
        RunOutcome::PrCreated(url) => Some(format!("I created a new rebase PR: {url}")),
        RunOutcome::PrUpdated(url) => Some(format!("I updated the existing rebase PR: {url}")),
        RunOutcome::UpToDate(url) => Some(format!("PR {url} already contains the latest changes")),
        RunOutcome::NoChanges => Some(format!(
            "Destination repo {} already contains the latest changes",
            ctx.dest.url
        )),
        RunOutcome::ManualOverride(url) => Some(format!(
            "PR {url} has the {} label, skipping the rebase",
            pr::MANUAL_LABEL
        )),
        RunOutcome::DryRun => None,
    }
}
