//! rebasebot - rebase a fork on changes from an upstream repo
//!
//! CLI binary wiring flags into a run context, credentials, hooks, and the
//! provider client, then driving one bot run.

use clap::{ArgGroup, Parser};
use rebasebot::auth::{CredentialRole, GithubAuth};
use rebasebot::bot;
use rebasebot::error::{Error, Result};
use rebasebot::hooks::LifecycleHooks;
use rebasebot::notify::{load_webhook, Notifier};
use rebasebot::platform::GitHubService;
use rebasebot::rebase::validate_exclusions;
use rebasebot::remote::{parse_git_branch, parse_github_branch, resolve_source_ref};
use rebasebot::types::{GitBranch, RunContext, TagPolicy};
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rebasebot")]
#[command(about = "Rebase a fork on changes from an upstream repo")]
#[command(version)]
#[command(group(ArgGroup::new("source_spec").required(true).args(["source", "source_repo"])))]
struct Cli {
    /// The source/upstream git repo to rebase changes onto, in the form
    /// <git url>:<ref>. Unlike dest and rebase this does not need to be a
    /// GitHub url.
    #[arg(long, short = 's')]
    source: Option<String>,

    /// The source repository (<ns>/<name>) when the ref is computed by the
    /// source-ref hook
    #[arg(long, requires = "source_ref_hook")]
    source_repo: Option<String>,

    /// Script that prints the source ref to rebase from
    #[arg(long, requires = "source_repo")]
    source_ref_hook: Option<String>,

    /// The destination/downstream GitHub repo to merge changes into, in the
    /// form <user or organization>/<repo>:<branch>
    #[arg(long, short = 'd')]
    dest: String,

    /// The GitHub repo holding the rebase branch the pull request is created
    /// from, in the form <user or organization>/<repo>:<branch>
    #[arg(long)]
    rebase: String,

    /// Custom git username for commits made during the rebase
    #[arg(long, default_value = "")]
    git_username: String,

    /// Custom git email for commits made during the rebase
    #[arg(long, default_value = "")]
    git_email: String,

    /// The working directory where the git repos will be cloned
    #[arg(long, default_value = ".rebase")]
    working_dir: PathBuf,

    /// Path to a GitHub user access token
    #[arg(long)]
    github_user_token: Option<PathBuf>,

    /// The app ID of the GitHub app to use
    #[arg(long, default_value_t = 137509)]
    github_app_id: u64,

    /// Path to the GitHub app private key
    #[arg(long)]
    github_app_key: Option<PathBuf>,

    /// The app ID of the GitHub cloner app to use
    #[arg(long, default_value_t = 137497)]
    github_cloner_id: u64,

    /// Path to the GitHub cloner app private key
    #[arg(long)]
    github_cloner_key: Option<PathBuf>,

    /// Path to a file holding the Slack webhook url
    #[arg(long)]
    slack_webhook: Option<PathBuf>,

    /// Update and vendor go modules in a separate commit after the rebase
    #[arg(long)]
    update_go_modules: bool,

    /// Do not push and do not create or update the PR
    #[arg(long)]
    dry_run: bool,

    /// How UPSTREAM tags in commit messages are handled
    #[arg(long, value_enum, default_value = "none")]
    tag_policy: TagPolicy,

    /// Commit sha prefixes excluded from the rebase (at least 4 characters)
    #[arg(long, num_args = 1..)]
    exclude_commits: Vec<String>,

    /// Run rebase-phase lifecycle hooks even if no rebase is needed. Hooks
    /// tied to the push or PR creation steps still only run when those
    /// actions occur.
    #[arg(long)]
    always_run_hooks: bool,

    /// Title regex enabling the pick of an open ART update PR
    #[arg(long)]
    art_pr_pattern: Option<String>,

    /// Location of pre-rebase lifecycle hook scripts
    #[arg(long, num_args = 1..)]
    pre_rebase_hook: Vec<String>,

    /// Location of pre-carry-commit lifecycle hook scripts
    #[arg(long, num_args = 1..)]
    pre_carry_commit_hook: Vec<String>,

    /// Location of post-rebase lifecycle hook scripts
    #[arg(long, num_args = 1..)]
    post_rebase_hook: Vec<String>,

    /// Location of pre-push-rebase-branch lifecycle hook scripts
    #[arg(long, num_args = 1..)]
    pre_push_rebase_branch_hook: Vec<String>,

    /// Location of pre-create-pr lifecycle hook scripts
    #[arg(long, num_args = 1..)]
    pre_create_pr_hook: Vec<String>,
}

fn build_auth(cli: &Cli) -> Result<GithubAuth> {
    match (
        &cli.github_user_token,
        &cli.github_app_key,
        &cli.github_cloner_key,
    ) {
        (Some(token), None, None) => GithubAuth::from_user_token_file(token),
        (None, Some(app_key), Some(cloner_key)) => GithubAuth::from_app_key_files(
            cli.github_app_id,
            app_key,
            cli.github_cloner_id,
            cloner_key,
        ),
        _ => Err(Error::Config(
            "either --github-user-token or both --github-app-key and --github-cloner-key \
             must be provided"
                .to_string(),
        )),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let auth = build_auth(&cli)?;
    validate_exclusions(&cli.exclude_commits)?;

    let dest = parse_github_branch(&cli.dest)?;
    let rebase = parse_github_branch(&cli.rebase)?;

    let webhook = cli.slack_webhook.as_deref().map(load_webhook).transpose()?;
    let notifier = Notifier::new(webhook);

    let mut hooks = LifecycleHooks::from_specs(
        &cli.pre_rebase_hook,
        &cli.pre_carry_commit_hook,
        &cli.post_rebase_hook,
        &cli.pre_push_rebase_branch_hook,
        &cli.pre_create_pr_hook,
        cli.update_go_modules,
    )?;

    let source: GitBranch = match (&cli.source, &cli.source_repo) {
        (Some(spec), None) => parse_git_branch(spec)?,
        (None, Some(repo)) => {
            let hook = cli
                .source_ref_hook
                .as_deref()
                .expect("clap enforces --source-ref-hook with --source-repo");
            resolve_source_ref(repo, hook, hooks.scratch_dir()).await?
        }
        _ => unreachable!("clap enforces the source group"),
    };

    let art_pr_pattern = cli
        .art_pr_pattern
        .as_deref()
        .map(regex::Regex::new)
        .transpose()
        .map_err(|err| Error::Config(format!("invalid --art-pr-pattern: {err}")))?;

    let ctx = RunContext {
        source,
        dest,
        rebase,
        working_dir: cli.working_dir,
        git_username: cli.git_username,
        git_email: cli.git_email,
        tag_policy: cli.tag_policy,
        exclude_commits: cli.exclude_commits,
        dry_run: cli.dry_run,
        always_run_hooks: cli.always_run_hooks,
        art_pr_pattern,
    };

    let client = auth.api_client(CredentialRole::Dest, &ctx.dest).await?;
    let provider = GitHubService::new(client, &ctx.dest);

    bot::run(&ctx, &auth, &provider, &mut hooks, &notifier)
        .await
        .map(|_| ())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    if let Err(err) = run(cli).await {
        error!("{err}");
        std::process::exit(err.exit_code());
    }
}
