//! In-Memory Test Doubles
//!
//! [`FakePlatform`] keeps issues, branches and pull requests per repository
//! and records every mutation; [`RecordingRunner`] records invocations
//! instead of spawning processes.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::{BotError, PlatformError, ProcessError, Result};
use crate::platform::{
    Branch, Comment, CommitRef, GitHubPlatform, GitObject, GitRef, Issue, IssueState, Label,
    NewIssue, NewPullRequest, PullRequest, PullRequestRef, Repository,
};
use crate::process::{CommandOutput, CommandRunner, Invocation};

/// A GitHub write performed against the fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    CreateIssue { repo: String, title: String },
    SetIssueState { repo: String, number: u64, state: IssueState },
    CreateComment { repo: String, number: u64 },
    CreateRef { repo: String, ref_name: String },
    CreatePullRequest { repo: String, head: String, title: String },
}

#[derive(Default)]
struct RepoState {
    repository: Option<Repository>,
    issues: Vec<Issue>,
    comments: Vec<(u64, String)>,
    branches: Vec<Branch>,
    pull_requests: Vec<PullRequest>,
    commits_ahead: HashMap<String, u64>,
}

#[derive(Default)]
struct State {
    repos: HashMap<String, RepoState>,
    mutations: Vec<Mutation>,
    next_number: u64,
    mismatched_creates: bool,
}

#[derive(Default)]
pub struct FakePlatform {
    state: Mutex<State>,
}

fn key(owner: &str, repo: &str) -> String {
    format!("{owner}/{repo}")
}

fn not_found(resource: String) -> PlatformError {
    PlatformError::NotFound { resource }
}

impl FakePlatform {
    /// Head commit of every seeded default branch.
    pub const DEFAULT_HEAD_SHA: &'static str = "0000000000000000000000000000000000c11c00";

    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seed a repository whose default branch is `main`.
    pub fn with_repository(self, owner: &str, repo: &str) -> Self {
        {
            let mut state = self.lock();
            let entry = state.repos.entry(key(owner, repo)).or_default();
            entry.repository = Some(Repository {
                name: repo.to_string(),
                full_name: key(owner, repo),
                clone_url: format!("https://github.com/{owner}/{repo}.git"),
                default_branch: "main".to_string(),
            });
            entry.branches.push(Branch {
                name: "main".to_string(),
                commit: CommitRef {
                    sha: Self::DEFAULT_HEAD_SHA.to_string(),
                },
            });
        }
        self
    }

    /// Answer creations with a resource that differs from the request, as a
    /// misbehaving proxy or API would.
    pub fn with_mismatched_creates(self) -> Self {
        self.lock().mismatched_creates = true;
        self
    }

    fn next_number(state: &mut State) -> u64 {
        state.next_number += 1;
        state.next_number
    }

    pub fn seed_issue(
        &self,
        owner: &str,
        repo: &str,
        title: &str,
        issue_state: IssueState,
        labels: &[&str],
    ) -> u64 {
        let mut state = self.lock();
        let number = Self::next_number(&mut state);
        state
            .repos
            .entry(key(owner, repo))
            .or_default()
            .issues
            .push(Issue {
                number,
                title: title.to_string(),
                state: issue_state,
                html_url: format!("https://github.com/{owner}/{repo}/issues/{number}"),
                labels: labels
                    .iter()
                    .map(|name| Label {
                        name: name.to_string(),
                    })
                    .collect(),
                pull_request: None,
            });
        number
    }

    pub fn seed_branch(&self, owner: &str, repo: &str, name: &str, sha: &str) {
        self.lock()
            .repos
            .entry(key(owner, repo))
            .or_default()
            .branches
            .push(Branch {
                name: name.to_string(),
                commit: CommitRef {
                    sha: sha.to_string(),
                },
            });
    }

    pub fn seed_pull_request(&self, owner: &str, repo: &str, head: &str, title: &str) -> u64 {
        let mut state = self.lock();
        let number = Self::next_number(&mut state);
        state
            .repos
            .entry(key(owner, repo))
            .or_default()
            .pull_requests
            .push(PullRequest {
                number,
                title: title.to_string(),
                state: "open".to_string(),
                html_url: format!("https://github.com/{owner}/{repo}/pull/{number}"),
                head: PullRequestRef {
                    ref_name: head.to_string(),
                    sha: String::new(),
                },
                base: PullRequestRef {
                    ref_name: "main".to_string(),
                    sha: String::new(),
                },
            });
        number
    }

    /// Pretend `head` has `count` commits that the default branch lacks.
    pub fn set_commits_ahead(&self, owner: &str, repo: &str, head: &str, count: u64) {
        self.lock()
            .repos
            .entry(key(owner, repo))
            .or_default()
            .commits_ahead
            .insert(head.to_string(), count);
    }

    pub fn issues(&self, owner: &str, repo: &str) -> Vec<Issue> {
        self.lock()
            .repos
            .get(&key(owner, repo))
            .map(|r| r.issues.clone())
            .unwrap_or_default()
    }

    pub fn comments(&self, owner: &str, repo: &str, number: u64) -> Vec<String> {
        self.lock()
            .repos
            .get(&key(owner, repo))
            .map(|r| {
                r.comments
                    .iter()
                    .filter(|(n, _)| *n == number)
                    .map(|(_, body)| body.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn branches(&self, owner: &str, repo: &str) -> Vec<Branch> {
        self.lock()
            .repos
            .get(&key(owner, repo))
            .map(|r| r.branches.clone())
            .unwrap_or_default()
    }

    pub fn pull_requests(&self, owner: &str, repo: &str) -> Vec<PullRequest> {
        self.lock()
            .repos
            .get(&key(owner, repo))
            .map(|r| r.pull_requests.clone())
            .unwrap_or_default()
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        self.lock().mutations.clone()
    }
}

fn repo_mut<'s>(
    state: &'s mut State,
    owner: &str,
    repo: &str,
) -> Result<&'s mut RepoState, PlatformError> {
    state
        .repos
        .get_mut(&key(owner, repo))
        .filter(|r| r.repository.is_some())
        .ok_or_else(|| not_found(format!("/repos/{owner}/{repo}")))
}

#[async_trait]
impl GitHubPlatform for FakePlatform {
    async fn get_repository(&self, owner: &str, repo: &str) -> Result<Repository, PlatformError> {
        let mut state = self.lock();
        let entry = repo_mut(&mut state, owner, repo)?;
        entry
            .repository
            .clone()
            .ok_or_else(|| not_found(format!("/repos/{owner}/{repo}")))
    }

    async fn list_issues(
        &self,
        owner: &str,
        repo: &str,
        labels: &[String],
    ) -> Result<Vec<Issue>, PlatformError> {
        let mut state = self.lock();
        let entry = repo_mut(&mut state, owner, repo)?;
        Ok(entry
            .issues
            .iter()
            .filter(|issue| {
                labels
                    .iter()
                    .all(|wanted| issue.labels.iter().any(|l| &l.name == wanted))
            })
            .cloned()
            .collect())
    }

    async fn create_issue(
        &self,
        owner: &str,
        repo: &str,
        new_issue: &NewIssue,
    ) -> Result<Issue, PlatformError> {
        let mut state = self.lock();
        repo_mut(&mut state, owner, repo)?;
        let number = Self::next_number(&mut state);
        let issue = Issue {
            number,
            title: new_issue.title.clone(),
            state: IssueState::Open,
            html_url: format!("https://github.com/{owner}/{repo}/issues/{number}"),
            labels: new_issue
                .labels
                .iter()
                .map(|name| Label { name: name.clone() })
                .collect(),
            pull_request: None,
        };
        repo_mut(&mut state, owner, repo)?.issues.push(issue.clone());
        state.mutations.push(Mutation::CreateIssue {
            repo: key(owner, repo),
            title: new_issue.title.clone(),
        });
        if state.mismatched_creates {
            return Ok(Issue {
                title: format!("{} (copy)", issue.title),
                ..issue
            });
        }
        Ok(issue)
    }

    async fn set_issue_state(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        issue_state: IssueState,
    ) -> Result<Issue, PlatformError> {
        let mut state = self.lock();
        let issue = {
            let entry = repo_mut(&mut state, owner, repo)?;
            let issue = entry
                .issues
                .iter_mut()
                .find(|i| i.number == number)
                .ok_or_else(|| not_found(format!("/repos/{owner}/{repo}/issues/{number}")))?;
            issue.state = issue_state;
            issue.clone()
        };
        state.mutations.push(Mutation::SetIssueState {
            repo: key(owner, repo),
            number,
            state: issue_state,
        });
        Ok(issue)
    }

    async fn create_issue_comment(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        body: &str,
    ) -> Result<Comment, PlatformError> {
        let mut state = self.lock();
        let id = Self::next_number(&mut state);
        let entry = repo_mut(&mut state, owner, repo)?;
        if !entry.issues.iter().any(|i| i.number == number) {
            return Err(not_found(format!("/repos/{owner}/{repo}/issues/{number}")));
        }
        entry.comments.push((number, body.to_string()));
        state.mutations.push(Mutation::CreateComment {
            repo: key(owner, repo),
            number,
        });
        Ok(Comment {
            id,
            html_url: format!(
                "https://github.com/{owner}/{repo}/issues/{number}#issuecomment-{id}"
            ),
            body: Some(body.to_string()),
        })
    }

    async fn list_branches(&self, owner: &str, repo: &str) -> Result<Vec<Branch>, PlatformError> {
        let mut state = self.lock();
        Ok(repo_mut(&mut state, owner, repo)?.branches.clone())
    }

    async fn get_branch(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<Branch, PlatformError> {
        let mut state = self.lock();
        repo_mut(&mut state, owner, repo)?
            .branches
            .iter()
            .find(|b| b.name == branch)
            .cloned()
            .ok_or_else(|| not_found(format!("/repos/{owner}/{repo}/branches/{branch}")))
    }

    async fn create_ref(
        &self,
        owner: &str,
        repo: &str,
        ref_name: &str,
        sha: &str,
    ) -> Result<GitRef, PlatformError> {
        let mut state = self.lock();
        let entry = repo_mut(&mut state, owner, repo)?;
        let name = ref_name
            .strip_prefix("refs/heads/")
            .ok_or_else(|| PlatformError::Validation {
                message: format!("{ref_name} is not a branch ref"),
            })?;
        if entry.branches.iter().any(|b| b.name == name) {
            return Err(PlatformError::Validation {
                message: "Reference already exists".to_string(),
            });
        }
        entry.branches.push(Branch {
            name: name.to_string(),
            commit: CommitRef {
                sha: sha.to_string(),
            },
        });
        state.mutations.push(Mutation::CreateRef {
            repo: key(owner, repo),
            ref_name: ref_name.to_string(),
        });
        let sha = if state.mismatched_creates {
            sha.chars().rev().collect::<String>()
        } else {
            sha.to_string()
        };
        Ok(GitRef {
            ref_name: ref_name.to_string(),
            object: GitObject { sha },
        })
    }

    async fn list_open_pull_requests(
        &self,
        owner: &str,
        repo: &str,
    ) -> Result<Vec<PullRequest>, PlatformError> {
        let mut state = self.lock();
        Ok(repo_mut(&mut state, owner, repo)?
            .pull_requests
            .iter()
            .filter(|pr| pr.state == "open")
            .cloned()
            .collect())
    }

    async fn create_pull_request(
        &self,
        owner: &str,
        repo: &str,
        new_pr: &NewPullRequest,
    ) -> Result<PullRequest, PlatformError> {
        let mut state = self.lock();
        let number = Self::next_number(&mut state);
        let entry = repo_mut(&mut state, owner, repo)?;
        if !entry.branches.iter().any(|b| b.name == new_pr.head) {
            return Err(PlatformError::Validation {
                message: format!("head {} does not exist", new_pr.head),
            });
        }
        let pr = PullRequest {
            number,
            title: new_pr.title.clone(),
            state: "open".to_string(),
            html_url: format!("https://github.com/{owner}/{repo}/pull/{number}"),
            head: PullRequestRef {
                ref_name: new_pr.head.clone(),
                sha: String::new(),
            },
            base: PullRequestRef {
                ref_name: new_pr.base.clone(),
                sha: String::new(),
            },
        };
        entry.pull_requests.push(pr.clone());
        state.mutations.push(Mutation::CreatePullRequest {
            repo: key(owner, repo),
            head: new_pr.head.clone(),
            title: new_pr.title.clone(),
        });
        Ok(pr)
    }

    async fn commits_ahead(
        &self,
        owner: &str,
        repo: &str,
        _base: &str,
        head: &str,
    ) -> Result<u64, PlatformError> {
        let mut state = self.lock();
        Ok(repo_mut(&mut state, owner, repo)?
            .commits_ahead
            .get(head)
            .copied()
            .unwrap_or(0))
    }
}

/// [`CommandRunner`] that records invocations and answers
/// `git status --porcelain` with a canned result.
#[derive(Default)]
pub struct RecordingRunner {
    invocations: Mutex<Vec<Invocation>>,
    status: String,
    fail_program: Option<String>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Output returned for `git status --porcelain`.
    pub fn with_status(mut self, porcelain: impl Into<String>) -> Self {
        self.status = porcelain.into();
        self
    }

    /// Fail every invocation of `program` with a non-zero exit.
    pub fn failing_on(mut self, program: impl Into<String>) -> Self {
        self.fail_program = Some(program.into());
        self
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        self.invocations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(invocation.clone());

        if self.fail_program.as_deref() == Some(invocation.program.as_str()) {
            return Err(BotError::Process(ProcessError {
                command: invocation.command_line(),
                status: "exit status: 1".to_string(),
                stderr: "simulated failure".to_string(),
            }));
        }

        let is_status = invocation.program == "git"
            && invocation.args.first().map(String::as_str) == Some("status");
        Ok(CommandOutput {
            stdout: if is_status {
                self.status.clone()
            } else {
                String::new()
            },
            stderr: String::new(),
        })
    }
}
