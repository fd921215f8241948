//! Release Events
//!
//! A CLIc release tag and the deterministic names derived from it. Every
//! GitHub resource the bot touches is keyed by one of these names, which is
//! what makes re-running the flow for the same tag converge.

use std::fmt;

use crate::error::{BotError, Result};

/// Label attached to every tracking issue.
pub const ISSUE_LABEL: &str = "auto-update";

/// Upstream repository whose releases drive the updates.
pub const UPSTREAM_REPOSITORY: &str = "clEsperanto/CLIc";

/// A validated CLIc release tag (e.g. `v1.2.0`).
///
/// Tags reach ref names and subprocess arguments, so anything git would
/// refuse as a ref component, or that could be read as an option, is
/// rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReleaseTag(String);

impl ReleaseTag {
    pub fn parse(value: impl Into<String>) -> Result<Self> {
        let tag = value.into();
        let reject = |reason: &'static str| BotError::InvalidReleaseTag {
            tag: tag.clone(),
            reason,
        };

        if tag.is_empty() {
            return Err(reject("tag is empty"));
        }
        if tag.starts_with('-') {
            return Err(reject("tag starts with '-'"));
        }
        if tag.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(reject("tag contains whitespace or control characters"));
        }
        if tag.chars().any(|c| matches!(c, '~' | '^' | ':' | '?' | '*' | '[' | '\\')) {
            return Err(reject("tag contains a character git forbids in refs"));
        }
        if tag.contains("..") || tag.contains("@{") || tag.contains("//") {
            return Err(reject("tag contains a forbidden sequence"));
        }
        if tag.starts_with('/')
            || tag.ends_with('/')
            || tag.ends_with('.')
            || tag.ends_with(".lock")
        {
            return Err(reject("tag has a forbidden prefix or suffix"));
        }

        Ok(Self(tag))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Title shared by the tracking issue and the pull request.
    pub fn issue_title(&self) -> String {
        format!("Update to CLIc@{}", self.0)
    }

    pub fn branch_name(&self) -> String {
        format!("update-clic-{}", self.0)
    }

    pub fn commit_message(&self) -> String {
        format!("Update to {}", self.0)
    }

    pub fn release_notes_url(&self) -> String {
        format!(
            "https://github.com/{}/releases/tag/{}",
            UPSTREAM_REPOSITORY, self.0
        )
    }
}

impl fmt::Display for ReleaseTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One request to bring a binding repository up to a CLIc release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseEvent {
    /// Action or event name that produced this request (e.g. `update-clic`).
    pub source_action: String,
    pub release_tag: ReleaseTag,
    pub target_owner: String,
    pub target_repo: String,
}

impl ReleaseEvent {
    /// `owner/repo` of the binding repository.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.target_owner, self.target_repo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_names() {
        let tag = ReleaseTag::parse("v1.2.0").unwrap();
        assert_eq!(tag.issue_title(), "Update to CLIc@v1.2.0");
        assert_eq!(tag.branch_name(), "update-clic-v1.2.0");
        assert_eq!(tag.commit_message(), "Update to v1.2.0");
        assert_eq!(
            tag.release_notes_url(),
            "https://github.com/clEsperanto/CLIc/releases/tag/v1.2.0"
        );
    }

    #[test]
    fn test_branch_like_tags_are_accepted() {
        assert!(ReleaseTag::parse("feature/new-kernels").is_ok());
        assert!(ReleaseTag::parse("0.14.1-rc.1").is_ok());
    }

    #[test]
    fn test_invalid_tags_are_rejected() {
        for tag in [
            "",
            "-v1",
            "v1 2",
            "v1;rm -rf /",
            "v1..2",
            "v1~1",
            "v1:2",
            "v1/",
            "v1.",
            "v1.lock",
            "a@{b",
        ] {
            let result = ReleaseTag::parse(tag);
            assert!(
                matches!(result, Err(BotError::InvalidReleaseTag { .. })),
                "expected {tag:?} to be rejected"
            );
        }
    }

    #[test]
    fn test_event_full_name() {
        let event = ReleaseEvent {
            source_action: "update-clic".to_string(),
            release_tag: ReleaseTag::parse("v1.2.0").unwrap(),
            target_owner: "clEsperanto".to_string(),
            target_repo: "pyclesperanto".to_string(),
        };
        assert_eq!(event.full_name(), "clEsperanto/pyclesperanto");
    }
}
