//! Error types for rebasebot

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

/// All the ways a run can fail
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid flags, malformed specs, unreadable key files. Exit code 2.
    #[error("{0}")]
    Config(String),

    /// A value could not be parsed (remote spec, hook spec, branch name)
    #[error("cannot parse {0}")]
    Parse(String),

    /// A git subcommand failed; carries verbatim stderr
    #[error("git {command}: {stderr}")]
    Git { command: String, stderr: String },

    /// A cherry-pick could not be applied cleanly
    #[error("cherry-pick conflict on {sha}: {stderr}")]
    Conflict { sha: String, stderr: String },

    /// A lifecycle hook script exited non-zero
    #[error("{phase} hook {script} failed with exit code {code}: {stderr}")]
    Hook {
        phase: String,
        script: String,
        code: i32,
        stderr: String,
    },

    /// A lifecycle hook script exceeded its deadline and was killed
    #[error("{phase} hook {script} timed out after {seconds}s")]
    HookTimeout {
        phase: String,
        script: String,
        seconds: u64,
    },

    /// Authentication against the provider failed at run time
    #[error("auth: {0}")]
    Auth(String),

    /// A provider operation failed in a way octocrab does not surface itself
    #[error("provider: {0}")]
    Platform(String),

    #[error(transparent)]
    GitHubApi(#[from] octocrab::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Process exit code for this error: configuration problems exit 2,
    /// operational failures exit 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Config(_) | Error::Parse(_) => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_exit_two() {
        assert_eq!(Error::Config("bad flag".into()).exit_code(), 2);
        assert_eq!(Error::Parse("spec".into()).exit_code(), 2);
    }

    #[test]
    fn operational_errors_exit_one() {
        let err = Error::Git {
            command: "fetch".into(),
            stderr: "remote hung up".into(),
        };
        assert_eq!(err.exit_code(), 1);
        assert_eq!(
            Error::Conflict {
                sha: "abc".into(),
                stderr: String::new()
            }
            .exit_code(),
            1
        );
    }
}
