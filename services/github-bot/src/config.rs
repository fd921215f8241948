//! Bot Configuration
//!
//! The repository-to-update-script mapping and the settings shared by all
//! runs. Values come from the command line or the environment (see the
//! `cle-roboto` binary); the defaults match the clEsperanto organisation.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::BotError;

pub const DEFAULT_TOOL_REPOSITORY: &str = "clEsperanto/gencle";
pub const DEFAULT_INTERPRETER: &str = "python3";

/// Ordered mapping from binding repository name to update script file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptMapping {
    entries: Vec<(String, String)>,
}

impl Default for ScriptMapping {
    fn default() -> Self {
        Self {
            entries: vec![
                (
                    "pyclesperanto".to_string(),
                    "pyclesperanto_auto_update.py".to_string(),
                ),
                (
                    "clesperantoj".to_string(),
                    "clesperantoj_auto_update.py".to_string(),
                ),
            ],
        }
    }
}

impl ScriptMapping {
    pub fn new(entries: Vec<(String, String)>) -> Result<Self, BotError> {
        if entries.is_empty() {
            return Err(BotError::Config("script mapping is empty".to_string()));
        }
        for (i, (repo, script)) in entries.iter().enumerate() {
            if repo.is_empty() || script.is_empty() {
                return Err(BotError::Config(format!(
                    "script mapping entry {repo:?}={script:?} is incomplete"
                )));
            }
            if entries[..i].iter().any(|(other, _)| other == repo) {
                return Err(BotError::Config(format!(
                    "repository {repo:?} is mapped more than once"
                )));
            }
        }
        Ok(Self { entries })
    }

    /// Script for `repo`, if the repository is handled.
    pub fn get(&self, repo: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(name, _)| name == repo)
            .map(|(_, script)| script.as_str())
    }

    /// Entries in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(repo, script)| (repo.as_str(), script.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parses `repo=script[,repo=script...]`.
impl FromStr for ScriptMapping {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let entries = s
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                entry
                    .split_once('=')
                    .map(|(repo, script)| (repo.trim().to_string(), script.trim().to_string()))
                    .ok_or_else(|| {
                        BotError::Config(format!(
                            "invalid script mapping entry {entry:?}, expected repo=script"
                        ))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(entries)
    }
}

/// A repository named as `owner/repo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositorySlug {
    pub owner: String,
    pub name: String,
}

impl FromStr for RepositorySlug {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        match parts.as_slice() {
            [owner, name] if !owner.is_empty() && !name.is_empty() => Ok(Self {
                owner: owner.to_string(),
                name: name.to_string(),
            }),
            _ => Err(BotError::Config(format!("invalid repository {s:?}, expected owner/repo"))),
        }
    }
}

impl fmt::Display for RepositorySlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Settings for one bot process.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub api_url: String,
    pub scripts: ScriptMapping,
    /// Repository holding `update_scripts/`.
    pub tool_repository: RepositorySlug,
    pub scratch_root: PathBuf,
    pub interpreter: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            api_url: crate::github::DEFAULT_API_URL.to_string(),
            scripts: ScriptMapping::default(),
            tool_repository: RepositorySlug {
                owner: "clEsperanto".to_string(),
                name: "gencle".to_string(),
            },
            scratch_root: std::env::temp_dir(),
            interpreter: DEFAULT_INTERPRETER.to_string(),
        }
    }
}
