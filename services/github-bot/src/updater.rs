//! Binding Updater
//!
//! Clones the code-generation tool repository and one binding repository
//! into a scratch workspace, runs the binding's update script for a release
//! tag, and commits and pushes whatever the script changed.

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::error::{BotError, Result};
use crate::git::{self, CommitIdentity, GitCredential};
use crate::platform::GitHubPlatform;
use crate::process::{CommandOutput, CommandRunner, Invocation};
use crate::release::ReleaseTag;
use crate::workspace::{ensure_path_segment, ScratchWorkspace};

/// Where the tool lives, where to work, and how to commit and push.
#[derive(Debug, Clone)]
pub struct UpdaterSettings {
    pub tool_owner: String,
    pub tool_repo: String,
    pub scratch_root: PathBuf,
    /// Program that runs the update scripts (e.g. `python3`).
    pub interpreter: String,
    pub identity: CommitIdentity,
    pub credential: Option<GitCredential>,
}

#[derive(Debug, Clone, Copy)]
pub struct UpdateRequest<'a> {
    pub owner: &'a str,
    pub repo: &'a str,
    pub branch: &'a str,
    pub tag: &'a ReleaseTag,
    /// File name under the tool's `update_scripts/` directory.
    pub script: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The script changed the bindings; one commit was pushed.
    Committed {
        commit_message: String,
        changed_files: Vec<String>,
    },
    /// The bindings were already up to date.
    NoChanges,
}

pub struct BindingUpdater {
    platform: Arc<dyn GitHubPlatform>,
    runner: Arc<dyn CommandRunner>,
    settings: UpdaterSettings,
}

impl BindingUpdater {
    pub fn new(
        platform: Arc<dyn GitHubPlatform>,
        runner: Arc<dyn CommandRunner>,
        settings: UpdaterSettings,
    ) -> Self {
        Self {
            platform,
            runner,
            settings,
        }
    }

    /// Apply the update script for `request.tag` to `request.branch`.
    ///
    /// The scratch workspace is removed before this returns, whatever the
    /// outcome.
    pub async fn update(&self, request: UpdateRequest<'_>) -> Result<UpdateOutcome> {
        info!(
            owner = %request.owner,
            repo = %request.repo,
            branch = %request.branch,
            tag = %request.tag,
            script = %request.script,
            "Updating bindings"
        );

        let result = self.run_update(request).await;
        if let Err(e) = &result {
            error!(
                owner = %request.owner,
                repo = %request.repo,
                tag = %request.tag,
                error = %e,
                "Binding update failed"
            );
        }
        result
    }

    async fn run_update(&self, request: UpdateRequest<'_>) -> Result<UpdateOutcome> {
        ensure_path_segment(request.script)?;
        let credential = self.settings.credential.as_ref();

        let workspace =
            ScratchWorkspace::create(&self.settings.scratch_root, request.owner, request.repo)?;

        let tool = self
            .platform
            .get_repository(&self.settings.tool_owner, &self.settings.tool_repo)
            .await?;
        let tool_dir = workspace.clone_dir(&tool.name)?;
        self.exec(git::clone(&tool.clone_url, &tool_dir, credential)?)
            .await?;

        let target = self
            .platform
            .get_repository(request.owner, request.repo)
            .await?;
        let repo_dir = workspace.clone_dir(&target.name)?;
        if repo_dir == tool_dir {
            return Err(BotError::Logic(format!(
                "binding repository {} would share a clone directory with the tool",
                target.full_name
            )));
        }
        self.exec(git::clone(&target.clone_url, &repo_dir, credential)?)
            .await?;

        debug!(
            tool_dir = %tool_dir.display(),
            repo_dir = %repo_dir.display(),
            "Cloned repositories"
        );

        self.exec(git::fetch(&repo_dir, &target.clone_url, credential)?)
            .await?;
        self.exec(git::checkout(&repo_dir, request.branch)).await?;

        let script_path = tool_dir.join("update_scripts").join(request.script);
        let script_output = self
            .exec(
                Invocation::new(&self.settings.interpreter)
                    .arg(script_path.to_string_lossy())
                    .arg(repo_dir.to_string_lossy())
                    .arg(request.tag.as_str()),
            )
            .await?;
        debug!(stdout = %script_output.stdout, "Update script finished");

        let status = self.exec(git::status_porcelain(&repo_dir)).await?;
        let changed_files = git::changed_paths(&status.stdout);
        if changed_files.is_empty() {
            info!(
                owner = %request.owner,
                repo = %request.repo,
                tag = %request.tag,
                "No changes made by the update script"
            );
            return Ok(UpdateOutcome::NoChanges);
        }

        info!(
            owner = %request.owner,
            repo = %request.repo,
            files = changed_files.len(),
            "Update script changed bindings"
        );

        let commit_message = request.tag.commit_message();
        self.exec(git::add_all(&repo_dir)).await?;
        self.exec(git::commit(&repo_dir, &commit_message, &self.settings.identity))
            .await?;
        self.exec(git::push(
            &repo_dir,
            request.branch,
            &target.clone_url,
            credential,
        )?)
        .await?;

        info!(
            owner = %request.owner,
            repo = %request.repo,
            branch = %request.branch,
            "Pushed binding update"
        );

        Ok(UpdateOutcome::Committed {
            commit_message,
            changed_files,
        })
    }

    async fn exec(&self, invocation: Invocation) -> Result<CommandOutput> {
        self.runner.run(&invocation).await
    }
}
