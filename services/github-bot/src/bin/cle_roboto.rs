//! cle-roboto - CLIc release update bot
//!
//! Reads the event that started the workflow and runs the release update
//! flow for the binding repositories it names.
//!
//! ## Usage
//! ```bash
//! # Inside GitHub Actions the event variables are already set
//! GITHUB_TOKEN=ghs_xxx cle-roboto
//!
//! # As a GitHub App
//! GITHUB_APP_ID=123456 \
//! GITHUB_PRIVATE_KEY_PATH=./key.pem \
//! GITHUB_INSTALLATION_ID=78901234 \
//! cle-roboto --event-name workflow_dispatch --event-path ./event.json
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use cle_roboto::auth::Credentials;
use cle_roboto::config::{RepositorySlug, DEFAULT_INTERPRETER, DEFAULT_TOOL_REPOSITORY};
use cle_roboto::git::{CommitIdentity, GitCredential};
use cle_roboto::github::{self, DEFAULT_API_URL};
use cle_roboto::{
    BindingUpdater, BotConfig, DispatchOutcome, Dispatcher, GitHubClient, Orchestrator,
    ProcessRunner, ScriptMapping, TriggerEvent, UpdaterSettings,
};

/// CLIc release update bot
#[derive(Parser, Debug)]
#[command(name = "cle-roboto", version, about)]
struct Args {
    /// Name of the triggering event (repository_dispatch, workflow_dispatch)
    #[arg(long, env = "GITHUB_EVENT_NAME")]
    event_name: String,

    /// Path to the JSON event payload
    #[arg(long, env = "GITHUB_EVENT_PATH")]
    event_path: PathBuf,

    /// Token used when no GitHub App credentials are given
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// GitHub App ID
    #[arg(long, env = "GITHUB_APP_ID", requires_all = ["private_key_path", "installation_id"])]
    app_id: Option<String>,

    /// Path to the GitHub App private key PEM file
    #[arg(long, env = "GITHUB_PRIVATE_KEY_PATH")]
    private_key_path: Option<PathBuf>,

    /// GitHub App Installation ID
    #[arg(long, env = "GITHUB_INSTALLATION_ID")]
    installation_id: Option<u64>,

    /// GitHub REST API base URL
    #[arg(long, env = "GITHUB_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Directory under which per-repository workspaces are created
    #[arg(long, env = "CLE_SCRATCH_ROOT")]
    scratch_root: Option<PathBuf>,

    /// Repository to update script mapping (repo=script,...)
    #[arg(long, env = "CLE_SCRIPT_MAP")]
    script_map: Option<ScriptMapping>,

    /// Repository holding update_scripts/ (owner/repo)
    #[arg(long, env = "CLE_TOOL_REPO", default_value = DEFAULT_TOOL_REPOSITORY)]
    tool_repo: RepositorySlug,

    /// Interpreter that runs the update scripts
    #[arg(long, env = "CLE_PYTHON", default_value = DEFAULT_INTERPRETER)]
    python: String,
}

impl Args {
    fn config(&self) -> BotConfig {
        let defaults = BotConfig::default();
        BotConfig {
            api_url: self.api_url.clone(),
            scripts: self.script_map.clone().unwrap_or(defaults.scripts),
            tool_repository: self.tool_repo.clone(),
            scratch_root: self.scratch_root.clone().unwrap_or(defaults.scratch_root),
            interpreter: self.python.clone(),
        }
    }

    /// GitHub App credentials win over a plain token.
    fn credentials(&self) -> Result<Credentials> {
        if let (Some(app_id), Some(key_path), Some(installation_id)) =
            (&self.app_id, &self.private_key_path, self.installation_id)
        {
            let private_key_pem = fs::read(key_path).with_context(|| {
                format!("Failed to read private key: {}", key_path.display())
            })?;
            return Ok(Credentials::App {
                app_id: app_id.clone(),
                private_key_pem,
                installation_id,
            });
        }
        match &self.token {
            Some(token) if !token.is_empty() => Ok(Credentials::Token(token.clone())),
            _ => anyhow::bail!(
                "No credentials: set GITHUB_TOKEN, or GITHUB_APP_ID with \
                 GITHUB_PRIVATE_KEY_PATH and GITHUB_INSTALLATION_ID"
            ),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .json()
        .init();

    let args = Args::parse();
    let config = args.config();

    info!(
        event = %args.event_name,
        api_url = %config.api_url,
        tool_repo = %config.tool_repository,
        scripts = config.scripts.len(),
        "Starting cle-roboto"
    );

    let payload = fs::read(&args.event_path)
        .with_context(|| format!("Failed to read event payload: {}", args.event_path.display()))?;
    let Some(event) = TriggerEvent::from_json(&args.event_name, &payload)
        .context("Failed to parse event payload")?
    else {
        warn!(event = %args.event_name, "Unsupported event, nothing to do");
        return Ok(());
    };

    let http = github::http_client().context("Failed to build HTTP client")?;
    let token = args
        .credentials()?
        .resolve(&http, &config.api_url)
        .await
        .context("Failed to obtain a GitHub token")?;

    let platform = Arc::new(
        GitHubClient::new(config.api_url.clone(), token.clone())
            .context("Failed to build GitHub client")?,
    );
    let updater = BindingUpdater::new(
        platform.clone(),
        Arc::new(ProcessRunner),
        UpdaterSettings {
            tool_owner: config.tool_repository.owner.clone(),
            tool_repo: config.tool_repository.name.clone(),
            scratch_root: config.scratch_root.clone(),
            interpreter: config.interpreter.clone(),
            identity: CommitIdentity::default(),
            credential: Some(GitCredential::new(token)),
        },
    );
    let dispatcher = Dispatcher::new(Orchestrator::new(platform, updater), config.scripts);

    match dispatcher.dispatch(event).await.context("Release update failed")? {
        DispatchOutcome::Ignored { reason } => {
            info!(reason = %reason, "Nothing to update");
        }
        DispatchOutcome::Handled(reports) => {
            for report in reports {
                info!(
                    repository = %report.repository,
                    tag = %report.release_tag,
                    issue = report.issue_number,
                    branch = %report.branch,
                    outcome = ?report.outcome,
                    pull_request = ?report.pull_request,
                    "Release update complete"
                );
            }
        }
    }

    Ok(())
}
