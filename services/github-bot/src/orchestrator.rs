//! Release Update Orchestrator
//!
//! Runs the full flow for one binding repository and one CLIc release:
//! tracking issue, update branch, binding update, pull request.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{info, warn};

use crate::error::Result;
use crate::platform::GitHubPlatform;
use crate::reconciler::Reconciler;
use crate::release::{ReleaseEvent, ReleaseTag, ISSUE_LABEL, UPSTREAM_REPOSITORY};
use crate::updater::{BindingUpdater, UpdateOutcome, UpdateRequest};

/// What one release-update run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseUpdateReport {
    pub repository: String,
    pub release_tag: String,
    pub issue_number: u64,
    pub branch: String,
    pub outcome: UpdateOutcome,
    /// `None` when there was nothing to propose.
    pub pull_request: Option<u64>,
}

/// One async mutex per `owner/repo`. Runs against the same repository share
/// a scratch directory and race on the same GitHub names, so they are
/// serialized.
#[derive(Clone, Default)]
pub struct RepoLocks {
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl RepoLocks {
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

pub fn issue_body(tag: &ReleaseTag) -> String {
    format!(
        "\n## Release Update: {tag}\n\n\
         A new release of [CLIc](https://github.com/{UPSTREAM_REPOSITORY}) is available.\n\n\
         ### Info:\n\
         **Release Tag:** {tag}\n\
         **Release Notes:** [Release Notes]({notes})\n\n\
         Please review the changes and update the code bindings accordingly.\n\
         Cheers! :robot:\n",
        notes = tag.release_notes_url(),
    )
}

pub fn pull_request_body(tag: &ReleaseTag, issue_number: u64) -> String {
    format!("{}\ncloses #{issue_number}\n", issue_body(tag))
}

pub struct Orchestrator {
    platform: Arc<dyn GitHubPlatform>,
    updater: BindingUpdater,
    locks: RepoLocks,
}

impl Orchestrator {
    pub fn new(platform: Arc<dyn GitHubPlatform>, updater: BindingUpdater) -> Self {
        Self {
            platform,
            updater,
            locks: RepoLocks::default(),
        }
    }

    /// Bring `event.target_owner/event.target_repo` up to
    /// `event.release_tag` using `script`.
    pub async fn run(&self, event: &ReleaseEvent, script: &str) -> Result<ReleaseUpdateReport> {
        let owner = event.target_owner.as_str();
        let repo = event.target_repo.as_str();
        let tag = &event.release_tag;

        let _guard = self.locks.acquire(&event.full_name()).await;
        info!(
            owner = %owner,
            repo = %repo,
            tag = %tag,
            source = %event.source_action,
            "Starting release update"
        );

        let reconciler = Reconciler::new(self.platform.as_ref());
        let title = tag.issue_title();

        let issue = reconciler
            .find_or_create_issue(owner, repo, &title, &issue_body(tag), &[ISSUE_LABEL.to_string()])
            .await?;
        info!(issue = issue.number, url = %issue.html_url, "Tracking issue ready");

        let branch = reconciler
            .find_or_create_branch(owner, repo, &tag.branch_name())
            .await?;

        let outcome = self
            .updater
            .update(UpdateRequest {
                owner,
                repo,
                branch: &branch.name,
                tag,
                script,
            })
            .await?;
        info!(owner = %owner, repo = %repo, tag = %tag, "Bindings updated");

        let repository = self.platform.get_repository(owner, repo).await?;
        let pr_body = pull_request_body(tag, issue.number);

        let pull_request = match &outcome {
            UpdateOutcome::Committed { .. } => Some(
                reconciler
                    .find_or_create_pull_request(
                        owner,
                        repo,
                        &branch.name,
                        &repository.default_branch,
                        &title,
                        &pr_body,
                    )
                    .await?,
            ),
            UpdateOutcome::NoChanges => {
                let ahead = self
                    .platform
                    .commits_ahead(owner, repo, &repository.default_branch, &branch.name)
                    .await?;
                if ahead > 0 {
                    Some(
                        reconciler
                            .find_or_create_pull_request(
                                owner,
                                repo,
                                &branch.name,
                                &repository.default_branch,
                                &title,
                                &pr_body,
                            )
                            .await?,
                    )
                } else {
                    let existing = reconciler
                        .find_pull_request(owner, repo, &branch.name, &title)
                        .await?;
                    if existing.is_none() {
                        warn!(
                            owner = %owner,
                            repo = %repo,
                            branch = %branch.name,
                            "Update branch has no commits; not opening a pull request"
                        );
                    }
                    existing
                }
            }
        };

        Ok(ReleaseUpdateReport {
            repository: event.full_name(),
            release_tag: tag.to_string(),
            issue_number: issue.number,
            branch: branch.name,
            outcome,
            pull_request: pull_request.map(|pr| pr.number),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::CommitIdentity;
    use crate::platform::IssueState;
    use crate::testing::{FakePlatform, Mutation, RecordingRunner};
    use crate::updater::UpdaterSettings;
    use std::path::Path;

    const SCRIPT: &str = "pyclesperanto_auto_update.py";

    fn orchestrator(
        platform: Arc<FakePlatform>,
        runner: Arc<RecordingRunner>,
        scratch: &Path,
    ) -> Orchestrator {
        let updater = BindingUpdater::new(
            platform.clone(),
            runner,
            UpdaterSettings {
                tool_owner: "clEsperanto".to_string(),
                tool_repo: "gencle".to_string(),
                scratch_root: scratch.to_path_buf(),
                interpreter: "python3".to_string(),
                identity: CommitIdentity::default(),
                credential: None,
            },
        );
        Orchestrator::new(platform, updater)
    }

    fn event(tag: &str) -> ReleaseEvent {
        ReleaseEvent {
            source_action: "update-clic".to_string(),
            release_tag: ReleaseTag::parse(tag).unwrap(),
            target_owner: "clEsperanto".to_string(),
            target_repo: "pyclesperanto".to_string(),
        }
    }

    fn fake() -> Arc<FakePlatform> {
        Arc::new(
            FakePlatform::new()
                .with_repository("clEsperanto", "gencle")
                .with_repository("clEsperanto", "pyclesperanto"),
        )
    }

    #[test]
    fn test_pull_request_body_closes_issue() {
        let tag = ReleaseTag::parse("v1.2.0").unwrap();
        let body = pull_request_body(&tag, 42);
        assert!(body.contains("## Release Update: v1.2.0"));
        assert!(body.contains("https://github.com/clEsperanto/CLIc/releases/tag/v1.2.0"));
        assert!(body.trim_end().ends_with("closes #42"));
        assert!(!issue_body(&tag).contains("closes #"));
    }

    #[tokio::test]
    async fn test_full_flow_with_changes() {
        let scratch = tempfile::tempdir().unwrap();
        let platform = fake();
        let runner = Arc::new(RecordingRunner::new().with_status(" M pyclesperanto/_tier1.py\n"));
        let orchestrator = orchestrator(platform.clone(), runner, scratch.path());

        let report = orchestrator.run(&event("v1.2.0"), SCRIPT).await.unwrap();

        assert_eq!(report.branch, "update-clic-v1.2.0");
        let issues = platform.issues("clEsperanto", "pyclesperanto");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].title, "Update to CLIc@v1.2.0");
        assert_eq!(issues[0].labels[0].name, "auto-update");

        let prs = platform.pull_requests("clEsperanto", "pyclesperanto");
        assert_eq!(prs.len(), 1);
        assert_eq!(report.pull_request, Some(prs[0].number));
        assert_eq!(prs[0].title, "Update to CLIc@v1.2.0");
        assert_eq!(prs[0].head.ref_name, "update-clic-v1.2.0");
        assert_eq!(prs[0].base.ref_name, "main");
    }

    #[tokio::test]
    async fn test_running_twice_converges() {
        let scratch = tempfile::tempdir().unwrap();
        let platform = fake();
        let runner = Arc::new(RecordingRunner::new().with_status(" M pyclesperanto/_tier1.py\n"));
        let orchestrator = orchestrator(platform.clone(), runner, scratch.path());

        let first = orchestrator.run(&event("v1.2.0"), SCRIPT).await.unwrap();
        let mutations_after_first = platform.mutations().len();
        let second = orchestrator.run(&event("v1.2.0"), SCRIPT).await.unwrap();

        assert_eq!(first.issue_number, second.issue_number);
        assert_eq!(first.pull_request, second.pull_request);
        assert_eq!(platform.mutations().len(), mutations_after_first);
        assert_eq!(platform.issues("clEsperanto", "pyclesperanto").len(), 1);
        assert_eq!(
            platform
                .branches("clEsperanto", "pyclesperanto")
                .iter()
                .filter(|b| b.name == "update-clic-v1.2.0")
                .count(),
            1
        );
        assert_eq!(platform.pull_requests("clEsperanto", "pyclesperanto").len(), 1);
    }

    #[tokio::test]
    async fn test_closed_issue_reopened_not_duplicated() {
        let scratch = tempfile::tempdir().unwrap();
        let platform = fake();
        let number = platform.seed_issue(
            "clEsperanto",
            "pyclesperanto",
            "Update to CLIc@v1.2.0",
            IssueState::Closed,
            &["auto-update"],
        );
        let runner = Arc::new(RecordingRunner::new());
        let orchestrator = orchestrator(platform.clone(), runner, scratch.path());

        let report = orchestrator.run(&event("v1.2.0"), SCRIPT).await.unwrap();

        assert_eq!(report.issue_number, number);
        let issues = platform.issues("clEsperanto", "pyclesperanto");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].state, IssueState::Open);
        assert_eq!(platform.comments("clEsperanto", "pyclesperanto", number).len(), 1);
    }

    #[tokio::test]
    async fn test_no_changes_and_no_commits_skips_pull_request() {
        let scratch = tempfile::tempdir().unwrap();
        let platform = fake();
        let runner = Arc::new(RecordingRunner::new());
        let orchestrator = orchestrator(platform.clone(), runner, scratch.path());

        let report = orchestrator.run(&event("v1.2.0"), SCRIPT).await.unwrap();

        assert_eq!(report.outcome, UpdateOutcome::NoChanges);
        assert_eq!(report.pull_request, None);
        assert!(!platform
            .mutations()
            .iter()
            .any(|m| matches!(m, Mutation::CreatePullRequest { .. })));
    }

    #[tokio::test]
    async fn test_no_changes_but_branch_ahead_opens_pull_request() {
        let scratch = tempfile::tempdir().unwrap();
        let platform = fake();
        platform.set_commits_ahead("clEsperanto", "pyclesperanto", "update-clic-v1.2.0", 1);
        let runner = Arc::new(RecordingRunner::new());
        let orchestrator = orchestrator(platform.clone(), runner, scratch.path());

        let report = orchestrator.run(&event("v1.2.0"), SCRIPT).await.unwrap();

        assert_eq!(report.outcome, UpdateOutcome::NoChanges);
        assert!(report.pull_request.is_some());
    }

    #[tokio::test]
    async fn test_updater_failure_leaves_issue_and_branch_for_next_run() {
        let scratch = tempfile::tempdir().unwrap();
        let platform = fake();
        let failing = orchestrator(
            platform.clone(),
            Arc::new(RecordingRunner::new().failing_on("python3")),
            scratch.path(),
        );
        assert!(failing.run(&event("v1.2.0"), SCRIPT).await.is_err());
        assert_eq!(platform.issues("clEsperanto", "pyclesperanto").len(), 1);
        assert!(platform.pull_requests("clEsperanto", "pyclesperanto").is_empty());

        let working = orchestrator(
            platform.clone(),
            Arc::new(RecordingRunner::new().with_status("?? new.py\n")),
            scratch.path(),
        );
        let report = working.run(&event("v1.2.0"), SCRIPT).await.unwrap();
        assert_eq!(platform.issues("clEsperanto", "pyclesperanto").len(), 1);
        assert!(report.pull_request.is_some());
    }

    #[tokio::test]
    async fn test_repo_locks_serialize_same_repository() {
        let locks = RepoLocks::default();
        let guard = locks.acquire("clEsperanto/pyclesperanto").await;

        let other = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            locks.acquire("clEsperanto/clesperantoj"),
        )
        .await;
        assert!(other.is_ok());

        let same = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            locks.acquire("clEsperanto/pyclesperanto"),
        )
        .await;
        assert!(same.is_err());

        drop(guard);
        assert!(tokio::time::timeout(
            std::time::Duration::from_millis(50),
            locks.acquire("clEsperanto/pyclesperanto"),
        )
        .await
        .is_ok());
    }
}
