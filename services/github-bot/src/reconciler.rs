//! Find-or-Create Reconciler
//!
//! Idempotent lookups for the tracking issue, the update branch and the
//! update pull request. Each resource is identified by deterministic,
//! tag-derived names, so calling these repeatedly for the same tag returns
//! the same GitHub objects instead of creating duplicates.

use tracing::{error, info};

use crate::error::{BotError, Result};
use crate::platform::{
    Branch, CommitRef, GitHubPlatform, Issue, IssueState, NewIssue, NewPullRequest, PullRequest,
};

pub struct Reconciler<'a> {
    platform: &'a dyn GitHubPlatform,
}

impl<'a> Reconciler<'a> {
    pub fn new(platform: &'a dyn GitHubPlatform) -> Self {
        Self { platform }
    }

    /// Return the issue titled `title` among issues carrying `labels`,
    /// creating it when absent.
    ///
    /// A closed match is reopened and receives `body` as a new comment; an
    /// open match is returned untouched.
    pub async fn find_or_create_issue(
        &self,
        owner: &str,
        repo: &str,
        title: &str,
        body: &str,
        labels: &[String],
    ) -> Result<Issue> {
        let issues = self
            .platform
            .list_issues(owner, repo, labels)
            .await
            .inspect_err(|e| {
                error!(
                    owner = %owner,
                    repo = %repo,
                    error = %e,
                    "Failed to list issues"
                )
            })?;

        let Some(existing) = issues.into_iter().find(|issue| issue.title == title) else {
            let issue = self
                .platform
                .create_issue(
                    owner,
                    repo,
                    &NewIssue {
                        title: title.to_string(),
                        body: body.to_string(),
                        labels: labels.to_vec(),
                    },
                )
                .await
                .inspect_err(|e| {
                    error!(
                        owner = %owner,
                        repo = %repo,
                        error = %e,
                        "Failed to create issue"
                    )
                })?;

            if issue.title != title {
                return Err(BotError::Logic(format!(
                    "created issue #{} has title {:?}, expected {:?}",
                    issue.number, issue.title, title
                )));
            }
            info!(owner = %owner, repo = %repo, issue = issue.number, "Created tracking issue");
            return Ok(issue);
        };

        if existing.state == IssueState::Open {
            info!(
                owner = %owner,
                repo = %repo,
                issue = existing.number,
                "Tracking issue already open"
            );
            return Ok(existing);
        }

        let reopened = self
            .platform
            .set_issue_state(owner, repo, existing.number, IssueState::Open)
            .await
            .inspect_err(|e| {
                error!(
                    owner = %owner,
                    repo = %repo,
                    issue = existing.number,
                    error = %e,
                    "Failed to reopen issue"
                )
            })?;

        self.platform
            .create_issue_comment(owner, repo, existing.number, body)
            .await
            .inspect_err(|e| {
                error!(
                    owner = %owner,
                    repo = %repo,
                    issue = existing.number,
                    error = %e,
                    "Failed to comment on issue"
                )
            })?;

        info!(owner = %owner, repo = %repo, issue = reopened.number, "Reopened tracking issue");
        Ok(reopened)
    }

    /// Return the branch `name`, creating it at the head of the repository's
    /// default branch when absent.
    pub async fn find_or_create_branch(
        &self,
        owner: &str,
        repo: &str,
        name: &str,
    ) -> Result<Branch> {
        let branches = self
            .platform
            .list_branches(owner, repo)
            .await
            .inspect_err(|e| {
                error!(
                    owner = %owner,
                    repo = %repo,
                    error = %e,
                    "Failed to list branches"
                )
            })?;

        if let Some(existing) = branches.into_iter().find(|branch| branch.name == name) {
            info!(owner = %owner, repo = %repo, branch = %name, "Reusing update branch");
            return Ok(existing);
        }

        let repository = self.platform.get_repository(owner, repo).await?;
        let base = self
            .platform
            .get_branch(owner, repo, &repository.default_branch)
            .await
            .inspect_err(|e| {
                error!(
                    owner = %owner,
                    repo = %repo,
                    branch = %repository.default_branch,
                    error = %e,
                    "Failed to read default branch"
                )
            })?;

        let git_ref = self
            .platform
            .create_ref(owner, repo, &format!("refs/heads/{name}"), &base.commit.sha)
            .await
            .inspect_err(|e| {
                error!(
                    owner = %owner,
                    repo = %repo,
                    branch = %name,
                    error = %e,
                    "Failed to create branch"
                )
            })?;

        if git_ref.object.sha != base.commit.sha {
            return Err(BotError::Logic(format!(
                "branch {name} points at {} instead of {}",
                git_ref.object.sha, base.commit.sha
            )));
        }

        info!(
            owner = %owner,
            repo = %repo,
            branch = %name,
            base = %repository.default_branch,
            sha = %base.commit.sha,
            "Created update branch"
        );
        Ok(Branch {
            name: name.to_string(),
            commit: CommitRef {
                sha: git_ref.object.sha,
            },
        })
    }

    /// Look up an open pull request whose head is `head` and whose title is
    /// `title`.
    pub async fn find_pull_request(
        &self,
        owner: &str,
        repo: &str,
        head: &str,
        title: &str,
    ) -> Result<Option<PullRequest>> {
        let pulls = self
            .platform
            .list_open_pull_requests(owner, repo)
            .await
            .inspect_err(|e| {
                error!(
                    owner = %owner,
                    repo = %repo,
                    error = %e,
                    "Failed to list pull requests"
                )
            })?;

        Ok(pulls
            .into_iter()
            .find(|pr| pr.head.ref_name == head && pr.title == title))
    }

    /// Return the open pull request from `head` titled `title`, creating one
    /// against `base` when absent.
    pub async fn find_or_create_pull_request(
        &self,
        owner: &str,
        repo: &str,
        head: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> Result<PullRequest> {
        if let Some(existing) = self.find_pull_request(owner, repo, head, title).await? {
            info!(owner = %owner, repo = %repo, pr = existing.number, "Pull request already open");
            return Ok(existing);
        }

        let pr = self
            .platform
            .create_pull_request(
                owner,
                repo,
                &NewPullRequest {
                    title: title.to_string(),
                    head: head.to_string(),
                    base: base.to_string(),
                    body: body.to_string(),
                },
            )
            .await
            .inspect_err(|e| {
                error!(
                    owner = %owner,
                    repo = %repo,
                    head = %head,
                    error = %e,
                    "Failed to create pull request"
                )
            })?;

        info!(
            owner = %owner,
            repo = %repo,
            pr = pr.number,
            url = %pr.html_url,
            "Created pull request"
        );
        Ok(pr)
    }
}
