//! Event Dispatcher
//!
//! Turns `repository_dispatch` and `workflow_dispatch` payloads into release
//! update runs.

use serde::Deserialize;
use tracing::info;

use crate::config::ScriptMapping;
use crate::error::Result;
use crate::orchestrator::{Orchestrator, ReleaseUpdateReport};
use crate::release::{ReleaseEvent, ReleaseTag};

/// `repository_dispatch` action sent by the CLIc release workflow.
pub const UPDATE_ACTION: &str = "update-clic";

pub const REPOSITORY_DISPATCH: &str = "repository_dispatch";
pub const WORKFLOW_DISPATCH: &str = "workflow_dispatch";

#[derive(Debug, Clone, Deserialize)]
pub struct OwnerPayload {
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryPayload {
    pub owner: OwnerPayload,
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientPayload {
    #[serde(default)]
    pub release_tag: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryDispatchPayload {
    pub action: String,
    pub repository: RepositoryPayload,
    #[serde(default)]
    pub client_payload: ClientPayload,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkflowInputs {
    #[serde(default)]
    pub release_tag: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowDispatchPayload {
    #[serde(default)]
    pub inputs: Option<WorkflowInputs>,
    pub repository: RepositoryPayload,
}

/// An inbound trigger the bot understands.
#[derive(Debug, Clone)]
pub enum TriggerEvent {
    /// Cross-repository dispatch from the CLIc release workflow.
    RepositoryDispatch(RepositoryDispatchPayload),
    /// Manually started workflow.
    WorkflowDispatch(WorkflowDispatchPayload),
}

impl TriggerEvent {
    /// Parse the payload of `event_name`. Other event kinds yield `None`.
    pub fn from_json(event_name: &str, payload: &[u8]) -> Result<Option<Self>> {
        let event = match event_name {
            REPOSITORY_DISPATCH => Some(Self::RepositoryDispatch(serde_json::from_slice(payload)?)),
            WORKFLOW_DISPATCH => Some(Self::WorkflowDispatch(serde_json::from_slice(payload)?)),
            _ => None,
        };
        Ok(event)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Nothing was changed on GitHub.
    Ignored { reason: String },
    Handled(Vec<ReleaseUpdateReport>),
}

pub struct Dispatcher {
    orchestrator: Orchestrator,
    scripts: ScriptMapping,
}

impl Dispatcher {
    pub fn new(orchestrator: Orchestrator, scripts: ScriptMapping) -> Self {
        Self {
            orchestrator,
            scripts,
        }
    }

    pub async fn dispatch(&self, event: TriggerEvent) -> Result<DispatchOutcome> {
        match event {
            TriggerEvent::RepositoryDispatch(payload) => self.repository_dispatch(payload).await,
            TriggerEvent::WorkflowDispatch(payload) => self.workflow_dispatch(payload).await,
        }
    }

    async fn repository_dispatch(
        &self,
        payload: RepositoryDispatchPayload,
    ) -> Result<DispatchOutcome> {
        let RepositoryDispatchPayload {
            action,
            repository,
            client_payload,
        } = payload;
        info!(
            action = %action,
            release_tag = ?client_payload.release_tag,
            owner = %repository.owner.login,
            repo = %repository.name,
            "Received repository_dispatch"
        );

        if action != UPDATE_ACTION {
            return Ok(ignored(format!("action {action:?} is not {UPDATE_ACTION:?}")));
        }
        let Some(raw_tag) = client_payload.release_tag.filter(|t| !t.is_empty()) else {
            return Ok(ignored("client_payload.release_tag is missing".to_string()));
        };
        let Some(script) = self.scripts.get(&repository.name) else {
            return Ok(ignored(format!("{} has no update script", repository.name)));
        };

        let event = ReleaseEvent {
            source_action: action,
            release_tag: ReleaseTag::parse(raw_tag)?,
            target_owner: repository.owner.login,
            target_repo: repository.name,
        };
        let report = self.orchestrator.run(&event, script).await?;
        Ok(DispatchOutcome::Handled(vec![report]))
    }

    async fn workflow_dispatch(&self, payload: WorkflowDispatchPayload) -> Result<DispatchOutcome> {
        let raw_tag = payload
            .inputs
            .and_then(|inputs| inputs.release_tag)
            .filter(|t| !t.is_empty());
        let Some(raw_tag) = raw_tag else {
            return Ok(ignored("inputs.release_tag is missing".to_string()));
        };
        let repository = payload.repository;
        info!(
            release_tag = %raw_tag,
            owner = %repository.owner.login,
            repo = %repository.name,
            "workflow_dispatch manually triggered"
        );
        let tag = ReleaseTag::parse(raw_tag)?;

        let targets: Vec<(&str, &str)> = match self.scripts.get(&repository.name) {
            Some(script) => vec![(repository.name.as_str(), script)],
            None => {
                info!(
                    repo = %repository.name,
                    count = self.scripts.len(),
                    "Repository has no update script; updating every mapped repository"
                );
                self.scripts.iter().collect()
            }
        };

        let mut reports = Vec::with_capacity(targets.len());
        for (repo, script) in targets {
            let event = ReleaseEvent {
                source_action: WORKFLOW_DISPATCH.to_string(),
                release_tag: tag.clone(),
                target_owner: repository.owner.login.clone(),
                target_repo: repo.to_string(),
            };
            reports.push(self.orchestrator.run(&event, script).await?);
        }
        Ok(DispatchOutcome::Handled(reports))
    }
}

fn ignored(reason: String) -> DispatchOutcome {
    info!(reason = %reason, "Event ignored");
    DispatchOutcome::Ignored { reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BotError;
    use crate::git::CommitIdentity;
    use crate::testing::{FakePlatform, RecordingRunner};
    use crate::updater::{BindingUpdater, UpdaterSettings};
    use std::path::Path;
    use std::sync::Arc;

    fn dispatcher(
        platform: Arc<FakePlatform>,
        runner: Arc<RecordingRunner>,
        scratch: &Path,
    ) -> Dispatcher {
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
        Dispatcher::new(Orchestrator::new(platform, updater), ScriptMapping::default())
    }

    fn fake() -> Arc<FakePlatform> {
        Arc::new(
            FakePlatform::new()
                .with_repository("clEsperanto", "gencle")
                .with_repository("clEsperanto", "pyclesperanto")
                .with_repository("clEsperanto", "clesperantoj")
                .with_repository("clEsperanto", "CLIc"),
        )
    }

    fn repository_dispatch(action: &str, repo: &str, tag: &str) -> TriggerEvent {
        let payload = serde_json::json!({
            "action": action,
            "repository": {"owner": {"login": "clEsperanto"}, "name": repo},
            "client_payload": {"release_tag": tag}
        });
        TriggerEvent::from_json(REPOSITORY_DISPATCH, payload.to_string().as_bytes())
            .unwrap()
            .unwrap()
    }

    fn workflow_dispatch(repo: &str, tag: Option<&str>) -> TriggerEvent {
        let payload = serde_json::json!({
            "inputs": {"release_tag": tag},
            "repository": {"owner": {"login": "clEsperanto"}, "name": repo}
        });
        TriggerEvent::from_json(WORKFLOW_DISPATCH, payload.to_string().as_bytes())
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_unknown_event_is_not_parsed() {
        assert!(TriggerEvent::from_json("issues", b"{}").unwrap().is_none());
    }

    #[test]
    fn test_malformed_payload_is_an_error() {
        let result = TriggerEvent::from_json(REPOSITORY_DISPATCH, br#"{"action": 1}"#);
        assert!(matches!(result, Err(BotError::Payload(_))));
    }

    #[tokio::test]
    async fn test_unrecognized_action_mutates_nothing() {
        let scratch = tempfile::tempdir().unwrap();
        let platform = fake();
        let runner = Arc::new(RecordingRunner::new());
        let dispatcher = dispatcher(platform.clone(), runner.clone(), scratch.path());

        let outcome = dispatcher
            .dispatch(repository_dispatch("something-else", "pyclesperanto", "v1.2.0"))
            .await
            .unwrap();

        assert!(matches!(outcome, DispatchOutcome::Ignored { .. }));
        assert!(platform.mutations().is_empty());
        assert!(runner.invocations().is_empty());
    }

    #[tokio::test]
    async fn test_unmapped_repository_dispatch_is_ignored() {
        let scratch = tempfile::tempdir().unwrap();
        let platform = fake();
        let runner = Arc::new(RecordingRunner::new());
        let dispatcher = dispatcher(platform.clone(), runner, scratch.path());

        let outcome = dispatcher
            .dispatch(repository_dispatch(UPDATE_ACTION, "CLIc", "v1.2.0"))
            .await
            .unwrap();

        assert!(matches!(outcome, DispatchOutcome::Ignored { .. }));
        assert!(platform.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_repository_dispatch_runs_mapped_script() {
        let scratch = tempfile::tempdir().unwrap();
        let platform = fake();
        let runner = Arc::new(RecordingRunner::new());
        let dispatcher = dispatcher(platform.clone(), runner.clone(), scratch.path());

        let outcome = dispatcher
            .dispatch(repository_dispatch(UPDATE_ACTION, "clesperantoj", "0.9.1"))
            .await
            .unwrap();

        let DispatchOutcome::Handled(reports) = outcome else {
            panic!("expected the event to be handled");
        };
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].repository, "clEsperanto/clesperantoj");
        let script = runner
            .invocations()
            .into_iter()
            .find(|i| i.program == "python3")
            .unwrap();
        assert!(script.args[0].ends_with("update_scripts/clesperantoj_auto_update.py"));
        assert_eq!(script.args[2], "0.9.1");
    }

    #[tokio::test]
    async fn test_invalid_tag_rejected_before_mutation() {
        let scratch = tempfile::tempdir().unwrap();
        let platform = fake();
        let runner = Arc::new(RecordingRunner::new());
        let dispatcher = dispatcher(platform.clone(), runner, scratch.path());

        let result = dispatcher
            .dispatch(repository_dispatch(UPDATE_ACTION, "pyclesperanto", "--upload-pack=x"))
            .await;

        assert!(matches!(result, Err(BotError::InvalidReleaseTag { .. })));
        assert!(platform.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_manual_trigger_for_unmapped_repo_runs_every_mapping_in_order() {
        let scratch = tempfile::tempdir().unwrap();
        let platform = fake();
        let runner = Arc::new(RecordingRunner::new());
        let dispatcher = dispatcher(platform.clone(), runner.clone(), scratch.path());

        let outcome = dispatcher
            .dispatch(workflow_dispatch("CLIc", Some("v1.2.0")))
            .await
            .unwrap();

        let DispatchOutcome::Handled(reports) = outcome else {
            panic!("expected the event to be handled");
        };
        let repos: Vec<_> = reports.iter().map(|r| r.repository.as_str()).collect();
        assert_eq!(repos, vec!["clEsperanto/pyclesperanto", "clEsperanto/clesperantoj"]);

        let scripts: Vec<String> = runner
            .invocations()
            .into_iter()
            .filter(|i| i.program == "python3")
            .map(|i| i.args[0].clone())
            .collect();
        assert_eq!(scripts.len(), 2);
        assert!(scripts[0].ends_with("pyclesperanto_auto_update.py"));
        assert!(scripts[1].ends_with("clesperantoj_auto_update.py"));
        assert!(platform.issues("clEsperanto", "CLIc").is_empty());
    }

    #[tokio::test]
    async fn test_manual_trigger_for_mapped_repo_runs_once() {
        let scratch = tempfile::tempdir().unwrap();
        let platform = fake();
        let runner = Arc::new(RecordingRunner::new());
        let dispatcher = dispatcher(platform.clone(), runner, scratch.path());

        let outcome = dispatcher
            .dispatch(workflow_dispatch("pyclesperanto", Some("v1.2.0")))
            .await
            .unwrap();

        assert!(matches!(outcome, DispatchOutcome::Handled(reports) if reports.len() == 1));
        assert!(platform.issues("clEsperanto", "clesperantoj").is_empty());
    }

    #[tokio::test]
    async fn test_manual_trigger_without_tag_is_ignored() {
        let scratch = tempfile::tempdir().unwrap();
        let platform = fake();
        let runner = Arc::new(RecordingRunner::new());
        let dispatcher = dispatcher(platform.clone(), runner, scratch.path());

        let outcome = dispatcher.dispatch(workflow_dispatch("pyclesperanto", None)).await.unwrap();

        assert!(matches!(outcome, DispatchOutcome::Ignored { .. }));
        assert!(platform.mutations().is_empty());
    }
}
