//! Normalized trigger events.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PlanError;

const HEADS_PREFIX: &str = "refs/heads/";

/// Event names the planner understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Push,
    PullRequest,
    PullRequestTarget,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Push => "push",
            EventKind::PullRequest => "pull_request",
            EventKind::PullRequestTarget => "pull_request_target",
        }
    }
}

impl FromStr for EventKind {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "push" => Ok(EventKind::Push),
            "pull_request" => Ok(EventKind::PullRequest),
            "pull_request_target" => Ok(EventKind::PullRequestTarget),
            other => Err(PlanError::UnsupportedEvent {
                event: other.to_string(),
            }),
        }
    }
}

/// A `{name, ref, baseRef}` triple supplied by the event collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerEvent {
    pub name: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_ref: Option<String>,
}

impl TriggerEvent {
    pub fn push(git_ref: impl Into<String>) -> Self {
        Self {
            name: EventKind::Push.as_str().to_string(),
            git_ref: git_ref.into(),
            base_ref: None,
        }
    }

    pub fn pull_request(git_ref: impl Into<String>, base_ref: impl Into<String>) -> Self {
        Self {
            name: EventKind::PullRequest.as_str().to_string(),
            git_ref: git_ref.into(),
            base_ref: Some(base_ref.into()),
        }
    }

    /// Validate the event name.
    pub fn kind(&self) -> Result<EventKind, PlanError> {
        self.name.parse()
    }

    /// The branch that trigger patterns are matched against.
    ///
    /// Push events use the ref without its `refs/heads/` prefix; pull-request
    /// style events use the base branch, or `""` when there is none.
    pub fn branch_for(&self, kind: EventKind) -> &str {
        match kind {
            EventKind::Push => self
                .git_ref
                .strip_prefix(HEADS_PREFIX)
                .unwrap_or(&self.git_ref),
            EventKind::PullRequest | EventKind::PullRequestTarget => {
                self.base_ref.as_deref().unwrap_or("")
            }
        }
    }
}
