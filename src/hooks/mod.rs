//! Lifecycle hook scripts
//!
//! User-provided executables attached to named points of the rebase process.
//! Scripts are external processes on purpose: the bot controls their
//! environment, working directory, and lifetime, and survives their crashes.

use crate::error::{Error, Result};
use crate::git::GitWorkspace;
use crate::types::RunContext;
use regex::Regex;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use tempfile::TempDir;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{info, warn};

/// Default per-hook deadline
pub const HOOK_TIMEOUT: Duration = Duration::from_secs(600);

/// Points of the rebase process where scripts can be attached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPhase {
    PreRebase,
    PreCarryCommit,
    PostRebase,
    PrePushRebaseBranch,
    PreCreatePr,
}

impl HookPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            HookPhase::PreRebase => "pre-rebase",
            HookPhase::PreCarryCommit => "pre-carry-commit",
            HookPhase::PostRebase => "post-rebase",
            HookPhase::PrePushRebaseBranch => "pre-push-rebase-branch",
            HookPhase::PreCreatePr => "pre-create-pr",
        }
    }
}

/// Where a hook script comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOrigin {
    /// Path on the invoking machine
    Local(PathBuf),
    /// Path under the bundled `builtin-hooks/` directory
    Builtin(String),
    /// Blob in a git repository; `url` of `None` means one of the three
    /// configured remotes, named in `remote`
    Git {
        url: Option<String>,
        remote: Option<String>,
        reference: String,
        path: String,
    },
}

fn remote_git_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^git:(https://[^/]+/[^/]+/[^/]+)/([^:]+):(.+)$").unwrap())
}

fn named_remote_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^git:(source|dest|rebase)/([^:]+):(.+)$").unwrap())
}

/// Parse a hook location spec:
/// `_BUILTIN_/<path>` | `git:<remote>/<ref>:<path>` | `git:<url>/<ref>:<path>`
/// | `<filesystem-path>`
pub fn parse_hook_spec(spec: &str) -> Result<HookOrigin> {
    if let Some(rest) = spec.strip_prefix("_BUILTIN_/") {
        if rest.is_empty() {
            return Err(Error::Parse(format!("hook spec {spec:?}: empty builtin path")));
        }
        return Ok(HookOrigin::Builtin(rest.to_string()));
    }
    if spec.starts_with("git:") {
        if let Some(caps) = remote_git_re().captures(spec) {
            return Ok(HookOrigin::Git {
                url: Some(caps[1].to_string()),
                remote: None,
                reference: caps[2].to_string(),
                path: caps[3].to_string(),
            });
        }
        if let Some(caps) = named_remote_re().captures(spec) {
            return Ok(HookOrigin::Git {
                url: None,
                remote: Some(caps[1].to_string()),
                reference: caps[2].to_string(),
                path: caps[3].to_string(),
            });
        }
        return Err(Error::Parse(format!("hook spec {spec:?}")));
    }
    Ok(HookOrigin::Local(PathBuf::from(spec)))
}

/// Directory holding the bundled hook scripts. Overridable through
/// `REBASEBOT_BUILTIN_HOOKS_DIR`; otherwise looked up next to the executable,
/// falling back to the crate root for development runs.
fn builtin_hooks_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("REBASEBOT_BUILTIN_HOOKS_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("builtin-hooks");
            if candidate.is_dir() {
                return candidate;
            }
        }
    }
    Path::new(env!("CARGO_MANIFEST_DIR")).join("builtin-hooks")
}

/// Captured result of one hook execution
#[derive(Debug)]
pub struct HookOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// One executable hook script
#[derive(Debug)]
pub struct HookScript {
    /// Original location spec, for logs and errors
    pub spec: String,
    origin: HookOrigin,
    resolved: Option<PathBuf>,
}

impl HookScript {
    /// Parse a spec. Local and builtin scripts must exist at config time;
    /// git-hosted ones are fetched later.
    pub fn new(spec: &str) -> Result<Self> {
        let origin = parse_hook_spec(spec)?;
        let resolved = match &origin {
            HookOrigin::Local(path) => {
                let abs = if path.is_absolute() {
                    path.clone()
                } else {
                    std::env::current_dir()?.join(path)
                };
                if !abs.is_file() {
                    return Err(Error::Config(format!(
                        "hook script {} does not exist",
                        abs.display()
                    )));
                }
                Some(abs)
            }
            HookOrigin::Builtin(rel) => {
                let abs = builtin_hooks_dir().join(rel);
                if !abs.is_file() {
                    return Err(Error::Config(format!(
                        "builtin hook {} not found under {}",
                        rel,
                        builtin_hooks_dir().display()
                    )));
                }
                Some(abs)
            }
            HookOrigin::Git { .. } => None,
        };
        Ok(Self {
            spec: spec.to_string(),
            origin,
            resolved,
        })
    }

    pub fn origin(&self) -> &HookOrigin {
        &self.origin
    }

    /// Materialize a git-hosted script into `scratch`. Named remotes read
    /// from the already-configured workspace; explicit urls get a one-off
    /// remote and a blobless fetch.
    pub async fn fetch(&mut self, scratch: &Path, workspace: &GitWorkspace) -> Result<()> {
        let HookOrigin::Git {
            url,
            remote,
            reference,
            path,
        } = &self.origin
        else {
            return Ok(());
        };
        let remote_name = match (url, remote) {
            (Some(url), _) => {
                let name = url.trim_start_matches("https://").to_string();
                workspace.set_remote(&name, url).await?;
                name
            }
            (None, Some(name)) => name.clone(),
            (None, None) => unreachable!("parse always sets url or remote"),
        };
        workspace.fetch_ref(&remote_name, reference).await?;
        let content = workspace
            .show_file(&format!("refs/remotes/{remote_name}/{reference}"), path)
            .await?;

        let mut hasher = DefaultHasher::new();
        self.spec.hash(&mut hasher);
        let basename = Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "hook".to_string());
        let target = scratch.join(format!("{:05x}-{basename}", hasher.finish() & 0xfffff));
        tokio::fs::write(&target, content).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&target, std::fs::Permissions::from_mode(0o755)).await?;
        }
        self.resolved = Some(target);
        Ok(())
    }

    /// Execute the script and capture its output. The child is killed when
    /// the deadline passes.
    pub async fn run(
        &self,
        cwd: &Path,
        env: &[(String, String)],
        deadline: Duration,
    ) -> Result<HookOutput> {
        let path = self.resolved.as_ref().ok_or_else(|| {
            Error::Platform(format!("hook {} was never fetched", self.spec))
        })?;
        let mut cmd = Command::new(path);
        cmd.current_dir(cwd)
            .env_clear()
            .envs(scrubbed_parent_env())
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .kill_on_drop(true);
        let output = match timeout(deadline, cmd.output()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(Error::HookTimeout {
                    phase: String::new(),
                    script: self.spec.clone(),
                    seconds: deadline.as_secs(),
                })
            }
        };
        Ok(HookOutput {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// The parent environment minus anything that smells like a credential
pub fn scrubbed_parent_env() -> Vec<(String, String)> {
    std::env::vars()
        .filter(|(name, _)| {
            let upper = name.to_uppercase();
            !(upper.contains("TOKEN")
                || upper.contains("SECRET")
                || upper.contains("PASSWORD")
                || upper.ends_with("_KEY"))
        })
        .collect()
}

/// All configured hooks, grouped by phase, plus the shared environment
/// exported to every script.
pub struct LifecycleHooks {
    scripts: Vec<(HookPhase, HookScript)>,
    scratch: TempDir,
    base_env: Vec<(String, String)>,
    deadline: Duration,
}

impl LifecycleHooks {
    /// Build the hook table from the CLI lists. `update_go_modules` appends
    /// the bundled go-modules script to the post-rebase phase.
    pub fn from_specs(
        pre_rebase: &[String],
        pre_carry_commit: &[String],
        post_rebase: &[String],
        pre_push_rebase_branch: &[String],
        pre_create_pr: &[String],
        update_go_modules: bool,
    ) -> Result<Self> {
        let mut hooks = Self {
            scripts: Vec::new(),
            scratch: TempDir::new()?,
            base_env: Vec::new(),
            deadline: HOOK_TIMEOUT,
        };
        for (phase, specs) in [
            (HookPhase::PreRebase, pre_rebase),
            (HookPhase::PreCarryCommit, pre_carry_commit),
            (HookPhase::PostRebase, post_rebase),
            (HookPhase::PrePushRebaseBranch, pre_push_rebase_branch),
            (HookPhase::PreCreatePr, pre_create_pr),
        ] {
            for spec in specs {
                hooks.attach(phase, HookScript::new(spec)?);
            }
        }
        if update_go_modules {
            hooks.attach(
                HookPhase::PostRebase,
                HookScript::new("_BUILTIN_/update_go_modules.sh")?,
            );
        }
        Ok(hooks)
    }

    pub fn attach(&mut self, phase: HookPhase, script: HookScript) {
        self.scripts.push((phase, script));
    }

    /// Scratch directory for materialized scripts, usable before the
    /// workspace exists (the source-ref hook runs first).
    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    /// Export the run parameters every hook receives
    pub fn export_run_env(&mut self, ctx: &RunContext) {
        self.base_env = vec![
            ("REBASEBOT_SOURCE".into(), ctx.source.branch.clone()),
            ("REBASEBOT_DEST".into(), ctx.dest.branch.clone()),
            ("REBASEBOT_REBASE".into(), ctx.rebase.branch.clone()),
            (
                "REBASEBOT_WORKING_DIR".into(),
                ctx.working_dir.display().to_string(),
            ),
            ("REBASEBOT_GIT_USERNAME".into(), ctx.git_username.clone()),
            ("REBASEBOT_GIT_EMAIL".into(), ctx.git_email.clone()),
        ];
    }

    /// Fetch every git-hosted script. Cached for the rest of the run.
    pub async fn fetch_all(&mut self, workspace: &GitWorkspace) -> Result<()> {
        let scratch = self.scratch.path().to_path_buf();
        for (_, script) in &mut self.scripts {
            script.fetch(&scratch, workspace).await?;
        }
        Ok(())
    }

    /// Execute every script attached to a phase, in configuration order.
    /// Non-zero exit or timeout is fatal.
    pub async fn run_phase(
        &self,
        phase: HookPhase,
        cwd: &Path,
        extra_env: &[(&str, String)],
    ) -> Result<()> {
        for (attached, script) in &self.scripts {
            if *attached != phase {
                continue;
            }
            info!("Running {} lifecycle hook {}", phase.as_str(), script.spec);
            let mut env = self.base_env.clone();
            env.extend(extra_env.iter().map(|(k, v)| ((*k).to_string(), v.clone())));
            let output = script.run(cwd, &env, self.deadline).await.map_err(|err| {
                match err {
                    Error::HookTimeout { script, seconds, .. } => Error::HookTimeout {
                        phase: phase.as_str().to_string(),
                        script,
                        seconds,
                    },
                    other => other,
                }
            })?;
            for line in output.stdout.lines() {
                info!("{}: {line}", script.spec);
            }
            for line in output.stderr.lines() {
                warn!("{}: {line}", script.spec);
            }
            if output.code != 0 {
                return Err(Error::Hook {
                    phase: phase.as_str().to_string(),
                    script: script.spec.clone(),
                    code: output.code,
                    stderr: output.stderr,
                });
            }
        }
        Ok(())
    }
}
