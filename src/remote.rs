//! Remote spec resolution
//!
//! Parses the `<url>:<ref>` triples from the command line and resolves a
//! dynamic source ref through the source-ref hook script.

use crate::error::{Error, Result};
use crate::git::GitWorkspace;
use crate::hooks::{HookOrigin, HookScript};
use crate::types::{GitBranch, GitHubBranch};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use tracing::info;

fn github_branch_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?P<ns>[^/]+)/(?P<name>[^:]+):(?P<branch>.+)$").unwrap())
}

fn ref_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9/._-]{1,100}$").unwrap())
}

/// Parse a `<url>:<ref>` source spec. Urls may contain colons (ssh, ports);
/// the final colon is the separator.
pub fn parse_git_branch(spec: &str) -> Result<GitBranch> {
    let (url, branch) = spec
        .rsplit_once(':')
        .ok_or_else(|| Error::Parse(format!("source spec {spec:?}: expected <url>:<ref>")))?;
    // A url without a trailing ref would otherwise split at the scheme or
    // ssh colon; what follows the real separator must look like a ref.
    if url.is_empty() || branch.starts_with('/') || !ref_name_re().is_match(branch) {
        return Err(Error::Parse(format!("source spec {spec:?}: expected <url>:<ref>")));
    }
    Ok(GitBranch {
        url: url.to_string(),
        branch: branch.to_string(),
    })
}

/// Parse a GitHub branch spec, `<ns>/<name>:<branch>` or the same with a
/// leading `https://github.com/`. Only github.com is accepted.
pub fn parse_github_branch(spec: &str) -> Result<GitHubBranch> {
    if spec.contains("://") {
        let host = url::Url::parse(spec)
            .ok()
            .and_then(|u| u.host_str().map(ToString::to_string));
        if host.as_deref() != Some("github.com") {
            return Err(Error::Parse(format!(
                "github branch {spec:?}: only github.com urls are supported"
            )));
        }
    }
    let stripped = spec.trim_start_matches("https://github.com/");
    let caps = github_branch_re().captures(stripped).ok_or_else(|| {
        Error::Parse(format!(
            "github branch {spec:?}: expected <user or organization>/<repo>:<branch>"
        ))
    })?;
    let ns = caps["ns"].to_string();
    let name = caps["name"].trim_end_matches(".git").to_string();
    Ok(GitHubBranch {
        url: format!("https://github.com/{ns}/{name}"),
        ns,
        name,
        branch: caps["branch"].to_string(),
    })
}

/// Resolve the source ref by running the source-ref hook. The script sees
/// `REBASEBOT_SOURCE_REPO=<ns>/<name>` and must print the ref as the first
/// line of stdout and exit 0.
pub async fn resolve_source_ref(
    source_repo: &str,
    hook_spec: &str,
    scratch: &Path,
) -> Result<GitBranch> {
    let mut script = HookScript::new(hook_spec)?;
    if matches!(script.origin(), HookOrigin::Git { url: None, .. }) {
        return Err(Error::Config(
            "source-ref-hook cannot reference a named remote: remotes are not configured yet"
                .to_string(),
        ));
    }
    // Git-hosted ref scripts are fetched through a scratch repository since
    // the working directory does not exist at this point of the run.
    let fetch_ws = GitWorkspace::init(&scratch.join("source-ref-fetch")).await?;
    script.fetch(scratch, &fetch_ws).await?;

    let env = [("REBASEBOT_SOURCE_REPO".to_string(), source_repo.to_string())];
    let output = script
        .run(scratch, &env, crate::hooks::HOOK_TIMEOUT)
        .await?;
    if output.code != 0 {
        return Err(Error::Hook {
            phase: "source-ref".to_string(),
            script: hook_spec.to_string(),
            code: output.code,
            stderr: output.stderr,
        });
    }
    let branch = output
        .stdout
        .lines()
        .next()
        .map(str::trim)
        .unwrap_or_default()
        .to_string();
    if !ref_name_re().is_match(&branch) {
        return Err(Error::Parse(format!(
            "source-ref-hook output {branch:?} is not a valid ref name"
        )));
    }
    info!("Resolved source ref for {source_repo}: {branch}");
    Ok(GitBranch {
        url: format!("https://github.com/{source_repo}"),
        branch,
    })
}
