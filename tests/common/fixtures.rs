//! Test fixtures: real git repositories wired as the three remotes
//!
//! These are test utilities - not all may be used in current tests but are
//! available for future test development.

#![allow(dead_code)]

use rebasebot::auth::GithubAuth;
use rebasebot::types::{GitBranch, GitHubBranch, RunContext, TagPolicy};
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::process::Command;

/// Run a git command in `dir`, panicking on failure with stderr attached
pub async fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .await
        .expect("git binary available");
    assert!(
        output.status.success(),
        "git {} failed in {}: {}",
        args.join(" "),
        dir.display(),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim_end().to_string()
}

/// Three bare remotes plus a seed working repository used to grow their
/// histories. Source and dest start with the shared commits A and B.
pub struct TestRemotes {
    pub root: TempDir,
    pub source_git: PathBuf,
    pub dest_git: PathBuf,
    pub rebase_git: PathBuf,
    pub seed: PathBuf,
}

impl TestRemotes {
    pub async fn setup() -> Self {
        let root = TempDir::new().expect("tempdir");
        let source_git = root.path().join("source.git");
        let dest_git = root.path().join("dest.git");
        let rebase_git = root.path().join("rebase.git");
        for bare in [&source_git, &dest_git, &rebase_git] {
            std::fs::create_dir_all(bare).unwrap();
            git(bare, &["init", "--bare", "--initial-branch", "main"]).await;
        }

        let seed = root.path().join("seed");
        std::fs::create_dir_all(&seed).unwrap();
        git(&seed, &["init", "--initial-branch", "main"]).await;
        git(&seed, &["config", "user.name", "Fixture"]).await;
        git(&seed, &["config", "user.email", "fixture@example.com"]).await;

        let remotes = Self {
            root,
            source_git,
            dest_git,
            rebase_git,
            seed,
        };
        remotes.commit("a.txt", "base: A").await;
        remotes.commit("b.txt", "base: B").await;
        remotes.push_source().await;
        remotes.push_dest().await;
        remotes
    }

    /// Commit a file change in the seed repo, returning the new sha
    pub async fn commit(&self, file: &str, subject: &str) -> String {
        std::fs::write(self.seed.join(file), format!("{subject}\n")).unwrap();
        git(&self.seed, &["add", file]).await;
        git(&self.seed, &["commit", "-q", "-m", subject]).await;
        git(&self.seed, &["rev-parse", "HEAD"]).await
    }

    pub async fn push_source(&self) {
        let url = self.source_git.display().to_string();
        git(&self.seed, &["push", "-q", &url, "HEAD:refs/heads/main"]).await;
    }

    pub async fn push_dest(&self) {
        let url = self.dest_git.display().to_string();
        git(&self.seed, &["push", "-q", "--force", &url, "HEAD:refs/heads/main"]).await;
    }

    /// Current tip of source/main, the expected rebase base
    pub async fn source_tip(&self) -> String {
        git(&self.source_git, &["rev-parse", "refs/heads/main"]).await
    }

    /// Subjects on the pushed rebase branch, newest first
    pub async fn rebase_branch_subjects(&self) -> Vec<String> {
        git(
            &self.rebase_git,
            &["log", "--format=%s", "refs/heads/rebase-main"],
        )
        .await
        .lines()
        .map(ToString::to_string)
        .collect()
    }

    /// Tip sha of the pushed rebase branch
    pub async fn rebase_branch_tip(&self) -> String {
        git(&self.rebase_git, &["rev-parse", "refs/heads/rebase-main"]).await
    }

    /// Whether the rebase remote carries the branch at all
    pub async fn rebase_branch_exists(&self) -> bool {
        Command::new("git")
            .args(["rev-parse", "--verify", "refs/heads/rebase-main"])
            .current_dir(&self.rebase_git)
            .output()
            .await
            .map(|out| out.status.success())
            .unwrap_or(false)
    }

    /// Run context pointing the bot at the three local remotes
    pub fn run_context(&self) -> RunContext {
        RunContext {
            source: GitBranch {
                url: self.source_git.display().to_string(),
                branch: "main".to_string(),
            },
            dest: GitHubBranch {
                url: self.dest_git.display().to_string(),
                ns: "local".to_string(),
                name: "dest".to_string(),
                branch: "main".to_string(),
            },
            rebase: GitHubBranch {
                url: self.rebase_git.display().to_string(),
                ns: "local".to_string(),
                name: "rebase".to_string(),
                branch: "rebase-main".to_string(),
            },
            working_dir: self.root.path().join("workdir").join(".rebase"),
            git_username: "Rebase Bot".to_string(),
            git_email: "bot@example.com".to_string(),
            tag_policy: TagPolicy::None,
            exclude_commits: vec![],
            dry_run: false,
            always_run_hooks: false,
            art_pr_pattern: None,
        }
    }
}

/// Dummy user-token credentials; local paths never get tokens embedded
pub fn dummy_auth() -> GithubAuth {
    GithubAuth::Token(SecretString::from("dummy-token".to_string()))
}

/// One-shot HTTP sink standing in for a Slack webhook. Accepts a single
/// request, answers 200, and hands the raw request back through the join
/// handle so tests can assert on the delivered payload.
pub async fn spawn_webhook_sink() -> (String, tokio::task::JoinHandle<String>) {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if request_complete(&buf) {
                break;
            }
        }
        socket
            .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
            .await
            .unwrap();
        let _ = socket.shutdown().await;
        String::from_utf8_lossy(&buf).to_string()
    });
    (format!("http://{addr}/webhook"), handle)
}

fn request_complete(buf: &[u8]) -> bool {
    let Some(split) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
        return false;
    };
    let headers = String::from_utf8_lossy(&buf[..split]).to_lowercase();
    let body_len = buf.len() - (split + 4);
    match headers
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
    {
        Some(value) => value
            .trim()
            .parse::<usize>()
            .map(|expected| body_len >= expected)
            .unwrap_or(true),
        None => true,
    }
}

/// Write an executable shell script and return its path
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
    path
}
