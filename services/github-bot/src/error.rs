//! Error Types
//!
//! [`PlatformError`] covers GitHub API failures, [`ProcessError`] a git or
//! update-script invocation that exited unsuccessfully. Both roll up into
//! [`BotError`], which every component returns.

use std::path::PathBuf;
use thiserror::Error;

/// Failure of a GitHub REST API call.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The request never produced a response (DNS, TLS, timeout, ...).
    #[error("GitHub API request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Bad or missing credentials, or insufficient permissions.
    #[error("GitHub rejected the credentials ({status}): {message}")]
    Unauthorized { status: u16, message: String },

    /// Primary or secondary rate limit hit.
    #[error("GitHub rate limit exceeded: {message}")]
    RateLimited { message: String },

    #[error("GitHub resource not found: {resource}")]
    NotFound { resource: String },

    /// 422, e.g. a ref that already exists or a pull request without commits.
    #[error("GitHub rejected the request: {message}")]
    Validation { message: String },

    #[error("GitHub API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("failed to decode GitHub response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A subprocess that ran but exited unsuccessfully.
#[derive(Debug, Error)]
#[error("`{command}` exited with {status}: {stderr}")]
pub struct ProcessError {
    /// Program and arguments, space separated. Never carries credentials.
    pub command: String,
    pub status: String,
    pub stderr: String,
}

/// Errors produced while handling a release event.
#[derive(Debug, Error)]
pub enum BotError {
    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// An internal invariant did not hold.
    #[error("internal invariant violated: {0}")]
    Logic(String),

    #[error("invalid release tag {tag:?}: {reason}")]
    InvalidReleaseTag { tag: String, reason: &'static str },

    #[error("invalid event payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("scratch workspace error at {}: {source}", path.display())]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T, E = BotError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_error_is_transparent() {
        let err: BotError = PlatformError::NotFound {
            resource: "repos/clEsperanto/gencle".to_string(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "GitHub resource not found: repos/clEsperanto/gencle"
        );
    }

    #[test]
    fn test_process_error_message() {
        let err = ProcessError {
            command: "git checkout update-clic-v1.2.0".to_string(),
            status: "exit status: 1".to_string(),
            stderr: "pathspec did not match".to_string(),
        };
        assert!(err.to_string().starts_with("`git checkout update-clic-v1.2.0`"));
    }
}
