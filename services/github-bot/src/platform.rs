//! Platform Capabilities
//!
//! The slice of the GitHub REST API the bot needs, expressed as a trait so
//! every component receives its client explicitly and tests can substitute
//! an in-memory fake.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PlatformError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Open,
    Closed,
}

impl IssueState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    pub full_name: String,
    pub clone_url: String,
    pub default_branch: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub state: IssueState,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub labels: Vec<Label>,
    /// Present when the "issue" is actually a pull request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: u64,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRef {
    pub sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,
    pub commit: CommitRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitObject {
    pub sha: String,
}

/// A git reference as returned by `POST /git/refs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitRef {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub object: GitObject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestRef {
    #[serde(rename = "ref")]
    pub ref_name: String,
    #[serde(default)]
    pub sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub state: String,
    #[serde(default)]
    pub html_url: String,
    pub head: PullRequestRef,
    pub base: PullRequestRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewIssue {
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewPullRequest {
    pub title: String,
    pub head: String,
    pub base: String,
    pub body: String,
}

/// GitHub operations used by the reconciler, the binding updater and the
/// orchestrator. All calls are scoped to one `owner/repo`.
#[async_trait]
pub trait GitHubPlatform: Send + Sync {
    async fn get_repository(&self, owner: &str, repo: &str) -> Result<Repository, PlatformError>;

    /// Issues in any state carrying all of `labels`. Pull requests are
    /// filtered out.
    async fn list_issues(
        &self,
        owner: &str,
        repo: &str,
        labels: &[String],
    ) -> Result<Vec<Issue>, PlatformError>;

    async fn create_issue(
        &self,
        owner: &str,
        repo: &str,
        issue: &NewIssue,
    ) -> Result<Issue, PlatformError>;

    async fn set_issue_state(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        state: IssueState,
    ) -> Result<Issue, PlatformError>;

    async fn create_issue_comment(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        body: &str,
    ) -> Result<Comment, PlatformError>;

    async fn list_branches(&self, owner: &str, repo: &str) -> Result<Vec<Branch>, PlatformError>;

    async fn get_branch(&self, owner: &str, repo: &str, branch: &str)
        -> Result<Branch, PlatformError>;

    /// Create `ref_name` (fully qualified, `refs/heads/...`) pointing at `sha`.
    async fn create_ref(
        &self,
        owner: &str,
        repo: &str,
        ref_name: &str,
        sha: &str,
    ) -> Result<GitRef, PlatformError>;

    async fn list_open_pull_requests(
        &self,
        owner: &str,
        repo: &str,
    ) -> Result<Vec<PullRequest>, PlatformError>;

    async fn create_pull_request(
        &self,
        owner: &str,
        repo: &str,
        pull_request: &NewPullRequest,
    ) -> Result<PullRequest, PlatformError>;

    /// Number of commits `head` has that `base` does not.
    async fn commits_ahead(
        &self,
        owner: &str,
        repo: &str,
        base: &str,
        head: &str,
    ) -> Result<u64, PlatformError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_deserializes_pull_request_marker() {
        let issue: Issue = serde_json::from_value(serde_json::json!({
            "number": 7,
            "title": "Update to CLIc@v1.0.0",
            "state": "closed",
            "html_url": "https://github.com/clEsperanto/pyclesperanto/issues/7",
            "labels": [{"name": "auto-update"}],
            "pull_request": {"url": "https://api.github.com/..."}
        }))
        .unwrap();

        assert_eq!(issue.state, IssueState::Closed);
        assert_eq!(issue.labels[0].name, "auto-update");
        assert!(issue.pull_request.is_some());
    }

    #[test]
    fn test_git_ref_field_rename() {
        let git_ref: GitRef = serde_json::from_value(serde_json::json!({
            "ref": "refs/heads/update-clic-v1.2.0",
            "object": {"sha": "abc123", "type": "commit"}
        }))
        .unwrap();
        assert_eq!(git_ref.ref_name, "refs/heads/update-clic-v1.2.0");
        assert_eq!(git_ref.object.sha, "abc123");
    }
}
