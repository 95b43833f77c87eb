//! Git working directory management
//!
//! All repository manipulation goes through the `git` binary. Every command
//! runs with captured output; non-zero exits surface verbatim stderr.

use crate::error::{Error, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Deadline for git operations that talk to a remote
const NETWORK_TIMEOUT: Duration = Duration::from_secs(300);

/// Bounded retry for idempotent remote operations
const NETWORK_MAX_ATTEMPTS: u32 = 3;
const NETWORK_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// The local branch carrying the replay result
pub const REBASE_BRANCH: &str = "rebase";

/// A git working directory owned exclusively by this process for the
/// duration of the run.
pub struct GitWorkspace {
    dir: PathBuf,
}

impl GitWorkspace {
    /// Create (or reuse) the directory and make sure it is a git repository
    pub async fn init(dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(dir).await?;
        let ws = Self {
            dir: dir.to_path_buf(),
        };
        if !dir.join(".git").exists() {
            ws.git(&["init", "--initial-branch", "main"]).await?;
        }
        Ok(ws)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn run_git(&self, args: &[&str], deadline: Option<Duration>) -> Result<std::process::Output> {
        debug!("git {}", args.join(" "));
        let mut cmd = Command::new("git");
        cmd.args(args).current_dir(&self.dir).kill_on_drop(true);
        let output = match deadline {
            Some(limit) => timeout(limit, cmd.output()).await.map_err(|_| Error::Git {
                command: args.join(" "),
                stderr: format!("timed out after {}s", limit.as_secs()),
            })??,
            None => cmd.output().await?,
        };
        Ok(output)
    }

    /// Run a git subcommand, returning trimmed stdout
    async fn git(&self, args: &[&str]) -> Result<String> {
        let output = self.run_git(args, None).await?;
        if !output.status.success() {
            return Err(Error::Git {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    }

    /// Like `git`, but with the network deadline applied. Runs exactly once;
    /// pushes go through here so they are never repeated.
    async fn git_remote_op(&self, args: &[&str]) -> Result<String> {
        let output = self.run_git(args, Some(NETWORK_TIMEOUT)).await?;
        if !output.status.success() {
            return Err(Error::Git {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    }

    /// Network deadline plus bounded retry with exponential backoff, for
    /// idempotent remote operations (fetch, ls-remote). A transient hiccup
    /// on one of the startup fetches must not abort the run.
    async fn git_remote_retried(&self, args: &[&str]) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.git_remote_op(args).await {
                Ok(out) => return Ok(out),
                Err(err) if attempt + 1 < NETWORK_MAX_ATTEMPTS => {
                    attempt += 1;
                    let delay = NETWORK_BACKOFF_BASE * 2u32.pow(attempt - 1);
                    warn!(
                        "git {} failed (attempt {attempt}/{NETWORK_MAX_ATTEMPTS}), retrying in {delay:?}: {err}",
                        args.join(" ")
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Run a git subcommand where a non-zero exit is an answer, not an error
    async fn git_ok(&self, args: &[&str]) -> Result<bool> {
        let output = self.run_git(args, None).await?;
        Ok(output.status.success())
    }

    /// Set a repository-local config value
    pub async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        self.git(&["config", key, value]).await?;
        Ok(())
    }

    /// Make sure a remote exists and points at the given url
    pub async fn set_remote(&self, name: &str, url: &str) -> Result<()> {
        if self.git_ok(&["remote", "get-url", name]).await? {
            self.git(&["remote", "set-url", name, url]).await?;
        } else {
            self.git(&["remote", "add", name, url]).await?;
        }
        Ok(())
    }

    /// Fetch a single ref from a remote and pin it under
    /// `refs/remotes/<remote>/<ref>`. Works for branches and tags alike; the
    /// pinned ref always points at the peeled commit.
    pub async fn fetch_ref(&self, remote: &str, reference: &str) -> Result<()> {
        info!("Fetching {reference} from {remote}");
        self.git_remote_retried(&["fetch", "--no-tags", remote, reference])
            .await?;
        let commit = self.git(&["rev-parse", "FETCH_HEAD^{commit}"]).await?;
        self.git(&[
            "update-ref",
            &format!("refs/remotes/{remote}/{reference}"),
            &commit,
        ])
        .await?;
        Ok(())
    }

    /// Whether the remote advertises the given branch head
    pub async fn remote_has_ref(&self, remote: &str, reference: &str) -> Result<bool> {
        let out = self
            .git_remote_retried(&["ls-remote", "--heads", "--tags", remote, reference])
            .await?;
        Ok(!out.is_empty())
    }

    pub async fn rev_parse(&self, rev: &str) -> Result<String> {
        self.git(&["rev-parse", rev]).await
    }

    /// Seven character sha prefix used in PR titles
    pub async fn rev_parse_short(&self, rev: &str) -> Result<String> {
        self.git(&["rev-parse", "--short=7", rev]).await
    }

    pub async fn merge_base(&self, a: &str, b: &str) -> Result<String> {
        self.git(&["merge-base", a, b]).await
    }

    /// Non-merge commits reachable from `to` but not `from`, oldest first.
    /// Each entry is `(sha, subject, author)`.
    pub async fn log_commits(&self, from: &str, to: &str) -> Result<Vec<(String, String, String)>> {
        let out = self
            .git(&[
                "log",
                "--reverse",
                "--topo-order",
                "--no-merges",
                "--format=%H%x1f%s%x1f%aN <%aE>",
                &format!("{from}..{to}"),
            ])
            .await?;
        let mut commits = Vec::new();
        for line in out.lines().filter(|l| !l.is_empty()) {
            let mut parts = line.splitn(3, '\u{1f}');
            let sha = parts.next().unwrap_or_default().to_string();
            let subject = parts.next().unwrap_or_default().to_string();
            let author = parts.next().unwrap_or_default().to_string();
            commits.push((sha, subject, author));
        }
        Ok(commits)
    }

    /// Commits in `head` with no patch-equivalent counterpart in `upstream`
    /// (the `+` lines of `git cherry`). A candidate missing from this set is
    /// already contained in upstream, by ancestry or by patch id.
    pub async fn cherry_unmerged(&self, upstream: &str, head: &str) -> Result<HashSet<String>> {
        let out = self.git(&["cherry", upstream, head]).await?;
        Ok(out
            .lines()
            .filter_map(|line| line.strip_prefix("+ "))
            .map(|sha| sha.trim().to_string())
            .collect())
    }

    /// Reset the named branch to `at` and check it out with a clean tree.
    /// Recovers from a cherry-pick a previous run left half-finished.
    pub async fn checkout_branch_at(&self, branch: &str, at: &str) -> Result<()> {
        let _ = self.git_ok(&["cherry-pick", "--abort"]).await;
        self.git(&["checkout", "-B", branch, at]).await?;
        self.git(&["reset", "--hard", at]).await?;
        self.git(&["clean", "-fd"]).await?;
        Ok(())
    }

    /// Cherry-pick one commit preserving authorship and message. Any failure
    /// aborts the in-flight pick before surfacing.
    pub async fn cherry_pick(&self, sha: &str) -> Result<()> {
        let output = self.run_git(&["cherry-pick", sha], None).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let _ = self.git_ok(&["cherry-pick", "--abort"]).await;
            return Err(Error::Conflict {
                sha: sha.to_string(),
                stderr,
            });
        }
        Ok(())
    }

    /// Whether `git diff <spec>` reports no changed paths
    pub async fn diff_is_empty(&self, spec: &str) -> Result<bool> {
        let out = self.git(&["diff", "--name-only", spec]).await?;
        Ok(out.is_empty())
    }

    /// Force-push `HEAD` to a branch on the remote
    pub async fn push_force(&self, remote: &str, branch: &str) -> Result<()> {
        info!("Force-pushing rebase branch to {remote}/{branch}");
        self.git_remote_op(&["push", "--force", remote, &format!("HEAD:refs/heads/{branch}")])
            .await?;
        Ok(())
    }

    /// Content of a file at a given rev, `git show <rev>:<path>`
    pub async fn show_file(&self, rev: &str, path: &str) -> Result<String> {
        self.git(&["show", &format!("{rev}:{path}")]).await
    }
}
