//! Git Invocations
//!
//! Builders for the git commands the binding updater runs. Credentials are
//! handed to git through environment-scoped configuration
//! (`GIT_CONFIG_COUNT` / `GIT_CONFIG_KEY_n` / `GIT_CONFIG_VALUE_n`), never
//! through the remote URL or the argument list.

use base64::{engine::general_purpose, Engine as _};
use std::fmt;
use std::path::Path;

use crate::error::{BotError, Result};
use crate::process::Invocation;

/// Author and committer used for update commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitIdentity {
    pub name: String,
    pub email: String,
}

impl Default for CommitIdentity {
    fn default() -> Self {
        Self {
            name: "github-actions[bot]".to_string(),
            email: "github-actions[bot]@users.noreply.github.com".to_string(),
        }
    }
}

impl CommitIdentity {
    fn env(&self) -> Vec<(String, String)> {
        vec![
            ("GIT_AUTHOR_NAME".to_string(), self.name.clone()),
            ("GIT_AUTHOR_EMAIL".to_string(), self.email.clone()),
            ("GIT_COMMITTER_NAME".to_string(), self.name.clone()),
            ("GIT_COMMITTER_EMAIL".to_string(), self.email.clone()),
        ]
    }
}

/// Token used for authenticated clones, fetches and pushes.
#[derive(Clone)]
pub struct GitCredential {
    token: String,
}

impl GitCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// Environment that makes git send a basic-auth header to the host of
    /// `remote_url`.
    pub fn env_for(&self, remote_url: &str) -> Result<Vec<(String, String)>> {
        let url = reqwest::Url::parse(remote_url)
            .map_err(|e| BotError::Config(format!("invalid remote URL {remote_url:?}: {e}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| BotError::Config(format!("remote URL {remote_url:?} has no host")))?;
        let origin = match url.port() {
            Some(port) => format!("{}://{}:{}/", url.scheme(), host, port),
            None => format!("{}://{}/", url.scheme(), host),
        };

        let basic = general_purpose::STANDARD.encode(format!("x-access-token:{}", self.token));
        Ok(vec![
            ("GIT_CONFIG_COUNT".to_string(), "1".to_string()),
            ("GIT_CONFIG_KEY_0".to_string(), format!("http.{origin}.extraheader")),
            (
                "GIT_CONFIG_VALUE_0".to_string(),
                format!("AUTHORIZATION: basic {basic}"),
            ),
        ])
    }
}

impl fmt::Debug for GitCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("GitCredential(***)")
    }
}

fn git(dir: Option<&Path>) -> Invocation {
    let invocation =
        Invocation::new("git").envs([("GIT_TERMINAL_PROMPT".to_string(), "0".to_string())]);
    match dir {
        Some(dir) => invocation.current_dir(dir),
        None => invocation,
    }
}

fn remote_env(
    credential: Option<&GitCredential>,
    remote_url: &str,
) -> Result<Vec<(String, String)>> {
    match credential {
        Some(credential) => credential.env_for(remote_url),
        None => Ok(Vec::new()),
    }
}

pub fn clone(url: &str, dest: &Path, credential: Option<&GitCredential>) -> Result<Invocation> {
    Ok(git(None)
        .args(["clone", "--", url])
        .arg(dest.to_string_lossy())
        .envs(remote_env(credential, url)?))
}

pub fn fetch(
    repo_dir: &Path,
    remote_url: &str,
    credential: Option<&GitCredential>,
) -> Result<Invocation> {
    Ok(git(Some(repo_dir))
        .args(["fetch", "origin"])
        .envs(remote_env(credential, remote_url)?))
}

pub fn checkout(repo_dir: &Path, branch: &str) -> Invocation {
    git(Some(repo_dir)).args(["checkout", branch, "--"])
}

pub fn status_porcelain(repo_dir: &Path) -> Invocation {
    git(Some(repo_dir)).args(["status", "--porcelain"])
}

pub fn add_all(repo_dir: &Path) -> Invocation {
    git(Some(repo_dir)).args(["add", "--all"])
}

pub fn commit(repo_dir: &Path, message: &str, identity: &CommitIdentity) -> Invocation {
    git(Some(repo_dir))
        .args(["commit", "-m", message])
        .envs(identity.env())
}

pub fn push(
    repo_dir: &Path,
    branch: &str,
    remote_url: &str,
    credential: Option<&GitCredential>,
) -> Result<Invocation> {
    Ok(git(Some(repo_dir))
        .args(["push", "origin"])
        .arg(format!("HEAD:refs/heads/{branch}"))
        .envs(remote_env(credential, remote_url)?))
}

/// Paths listed by `git status --porcelain`.
pub fn changed_paths(porcelain: &str) -> Vec<String> {
    porcelain
        .lines()
        .filter(|line| line.len() > 3)
        .map(|line| line[3..].to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_env_is_scoped_to_host() {
        let credential = GitCredential::new("ghs_secret");
        let env = credential
            .env_for("https://github.com/clEsperanto/pyclesperanto.git")
            .unwrap();

        assert_eq!(env[0], ("GIT_CONFIG_COUNT".to_string(), "1".to_string()));
        assert_eq!(env[1].1, "http.https://github.com/.extraheader");
        let expected = general_purpose::STANDARD.encode("x-access-token:ghs_secret");
        assert_eq!(env[2].1, format!("AUTHORIZATION: basic {expected}"));
    }

    #[test]
    fn test_push_keeps_token_out_of_arguments() {
        let credential = GitCredential::new("ghs_secret");
        let invocation = push(
            Path::new("/tmp/ws/pyclesperanto"),
            "update-clic-v1.2.0",
            "https://github.com/clEsperanto/pyclesperanto.git",
            Some(&credential),
        )
        .unwrap();

        assert_eq!(
            invocation.args,
            vec!["push", "origin", "HEAD:refs/heads/update-clic-v1.2.0"]
        );
        assert!(!invocation.command_line().contains("ghs_secret"));
        assert!(!format!("{credential:?}").contains("ghs_secret"));
    }

    #[test]
    fn test_clone_without_credential() {
        let invocation = clone(
            "https://github.com/clEsperanto/gencle.git",
            Path::new("/tmp/ws/gencle"),
            None,
        )
        .unwrap();
        assert_eq!(
            invocation.args,
            vec!["clone", "--", "https://github.com/clEsperanto/gencle.git", "/tmp/ws/gencle"]
        );
        assert_eq!(invocation.env.len(), 1);
    }

    #[test]
    fn test_commit_sets_identity() {
        let invocation = commit(Path::new("/repo"), "Update to v1", &CommitIdentity::default());
        assert_eq!(invocation.args, vec!["commit", "-m", "Update to v1"]);
        assert!(invocation
            .env
            .contains(&("GIT_AUTHOR_NAME".to_string(), "github-actions[bot]".to_string())));
    }

    #[test]
    fn test_changed_paths() {
        let porcelain = " M pyclesperanto/_tier1.py\n?? pyclesperanto/_tier9.py\n";
        assert_eq!(
            changed_paths(porcelain),
            vec!["pyclesperanto/_tier1.py", "pyclesperanto/_tier9.py"]
        );
        assert!(changed_paths("").is_empty());
    }

    #[test]
    fn test_invalid_remote_url() {
        let credential = GitCredential::new("t");
        assert!(matches!(
            credential.env_for("not a url"),
            Err(BotError::Config(_))
        ));
    }
}
