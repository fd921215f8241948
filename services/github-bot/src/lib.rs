//! cle-roboto
//!
//! Keeps the clEsperanto language bindings in step with CLIc releases.
//!
//! When CLIc publishes a release, its workflow sends a `repository_dispatch`
//! (`action: update-clic`) to each binding repository. The bot then:
//!
//! 1. finds or creates the tracking issue `Update to CLIc@<tag>`
//!    (labelled `auto-update`, reopened if it was closed)
//! 2. finds or creates the branch `update-clic-<tag>` from the default branch
//! 3. clones `gencle` and the binding, and runs the binding's update script
//! 4. commits and pushes the result when the script changed anything
//! 5. finds or opens the pull request that closes the tracking issue
//!
//! Every step is keyed by names derived from the tag, so re-running for the
//! same release converges instead of duplicating issues, branches or PRs.
//!
//! ## Binaries
//!
//! - `cle-roboto`: handle the event found at `GITHUB_EVENT_PATH`
//!
//! ## Example
//!
//! ```bash
//! GITHUB_EVENT_NAME=repository_dispatch \
//! GITHUB_EVENT_PATH=/github/workflow/event.json \
//! GITHUB_TOKEN=ghs_xxx \
//! cle-roboto
//! ```

pub mod auth;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod git;
pub mod github;
pub mod orchestrator;
pub mod platform;
pub mod process;
pub mod reconciler;
pub mod release;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
pub mod updater;
pub mod workspace;

pub use config::{BotConfig, ScriptMapping};
pub use dispatcher::{DispatchOutcome, Dispatcher, TriggerEvent};
pub use error::{BotError, PlatformError, Result};
pub use github::GitHubClient;
pub use orchestrator::{Orchestrator, ReleaseUpdateReport};
pub use platform::GitHubPlatform;
pub use process::{CommandRunner, ProcessRunner};
pub use release::{ReleaseEvent, ReleaseTag};
pub use updater::{BindingUpdater, UpdateOutcome, UpdaterSettings};
