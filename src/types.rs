//! Core types for rebasebot

use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A git repository plus a ref there. The url may use any transport git
/// understands (https, ssh, local path).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GitBranch {
    /// Clone url
    pub url: String,
    /// Branch or tag name
    pub branch: String,
}

/// A GitHub-hosted repository plus a branch there
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GitHubBranch {
    /// Clone url (https form)
    pub url: String,
    /// Namespace, the user or organization owning the repository
    pub ns: String,
    /// Repository name
    pub name: String,
    /// Branch name
    pub branch: String,
}

impl GitHubBranch {
    /// `<ns>/<name>` as GitHub reports it in PR payloads
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.ns, self.name)
    }
}

/// Tag parsed from the leading `UPSTREAM: <...>:` token of a commit subject
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitTag {
    /// Subject carries no UPSTREAM prefix
    None,
    /// `UPSTREAM: <carry>:`
    Carry,
    /// `UPSTREAM: <drop>:`
    Drop,
    /// Any other bracketed token, kept verbatim
    Other(String),
}

/// How UPSTREAM tags decide which downstream commits are replayed
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TagPolicy {
    /// Replay every candidate, even `<drop>` commits
    None,
    /// Replay everything except `<drop>` commits
    Soft,
    /// Replay tagged commits only; untagged and `<drop>` are excluded
    Strict,
}

/// A downstream commit considered for the carry set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    /// Full hex sha
    pub sha: String,
    /// First line of the commit message
    pub subject: String,
    /// `Name <email>` of the author
    pub author: String,
    /// Parsed UPSTREAM tag
    pub tag: CommitTag,
}

/// Ordered replay plan on top of the source tip
#[derive(Debug, Clone)]
pub struct RebasePlan {
    /// Commits to cherry-pick, oldest first
    pub carries: Vec<CommitInfo>,
    /// Tip sha of `source/<ref>` at planning time
    pub source_tip: String,
    /// Divergence point of dest and source
    pub merge_base: String,
}

impl RebasePlan {
    /// True when nothing needs to be replayed
    pub fn is_noop(&self) -> bool {
        self.carries.is_empty()
    }
}

/// A pull request as seen through the hosting provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    /// PR number
    pub number: u64,
    /// Web url
    pub html_url: String,
    /// PR title
    pub title: String,
    /// PR body, empty when unset
    pub body: String,
    /// Head branch name
    pub head_ref: String,
    /// `<ns>/<name>` of the head repository
    pub head_repo: String,
    /// Clone url of the head repository
    pub head_repo_url: String,
    /// Base branch name
    pub base_ref: String,
    /// Label names attached to the PR
    pub labels: Vec<String>,
}

/// Process-wide immutable settings, built once after remote resolution and
/// passed explicitly to every phase.
#[derive(Debug)]
pub struct RunContext {
    /// Upstream being rebased onto
    pub source: GitBranch,
    /// Downstream fork receiving the PR
    pub dest: GitHubBranch,
    /// Intermediate repository carrying the rebase branch
    pub rebase: GitHubBranch,
    /// Where the git working directory lives
    pub working_dir: PathBuf,
    /// Committer name, empty to leave git defaults alone
    pub git_username: String,
    /// Committer email, empty to leave git defaults alone
    pub git_email: String,
    /// UPSTREAM tag handling
    pub tag_policy: TagPolicy,
    /// Sha prefixes excluded from the carry set
    pub exclude_commits: Vec<String>,
    /// Stop before any push or PR operation
    pub dry_run: bool,
    /// Run rebase-phase hooks even when the plan is empty
    pub always_run_hooks: bool,
    /// Title pattern enabling the ART PR pick, off when absent
    pub art_pr_pattern: Option<Regex>,
}

/// What a completed run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// A new rebase PR was opened
    PrCreated(String),
    /// The existing rebase PR was updated
    PrUpdated(String),
    /// An open PR already carries the latest changes
    UpToDate(String),
    /// The destination already contains the source; nothing to do
    NoChanges,
    /// A `rebase/manual` label suspended the bot
    ManualOverride(String),
    /// Dry run stopped before push and PR phases
    DryRun,
}

/// Result of a run, consumed by the CLI and by tests
#[derive(Debug, Clone)]
pub struct RunReport {
    /// What happened
    pub outcome: RunOutcome,
    /// Whether the rebase branch was force-pushed this run
    pub pushed: bool,
    /// Local tip of the rebase branch after the carry phase, when it ran
    pub rebase_tip: Option<String>,
}
