//! Provision decision table.
//!
//! Given an action and the live instance status, decide exactly one
//! operation. The caller performs it; nothing here has side effects.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Observed state of an agent's instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveStatus {
    /// Describe reported not found.
    Absent,
    Running,
    Stopped,
    Terminated,
    /// Provisioning, staging, stopping, suspending, repairing.
    Transitioning,
}

impl LiveStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Terminated => "terminated",
            Self::Transitioning => "transitioning",
        }
    }
}

impl fmt::Display for LiveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Provision,
    Deprovision,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Provision => "provision",
            Self::Deprovision => "deprovision",
        })
    }
}

/// Why nothing needs doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoOpReason {
    AlreadyExists,
    NotFound,
    /// The instance is mid-transition; the next pass decides again.
    InProgress,
}

/// Serialized as its [`Decision::code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "&'static str")]
pub enum Decision {
    /// Reconcile every resource, then create the instance.
    Create,
    /// Start the existing instance; the secret still gets a new version.
    Start,
    /// Stop the instance. Instances are never deleted, the disk is kept.
    Stop,
    NoOp(NoOpReason),
}

impl Decision {
    #[must_use]
    pub fn mutates(self) -> bool {
        !matches!(self, Self::NoOp(_))
    }

    /// Stable label for JSON output.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::NoOp(NoOpReason::AlreadyExists) => "already_exists",
            Self::NoOp(NoOpReason::NotFound) => "not_found",
            Self::NoOp(NoOpReason::InProgress) => "in_progress",
        }
    }
}

impl From<Decision> for &'static str {
    fn from(decision: Decision) -> Self {
        decision.code()
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => f.write_str("create"),
            Self::Start => f.write_str("start"),
            Self::Stop => f.write_str("stop"),
            Self::NoOp(NoOpReason::AlreadyExists) => f.write_str("no-op (already exists)"),
            Self::NoOp(NoOpReason::NotFound) => f.write_str("no-op (not found)"),
            Self::NoOp(NoOpReason::InProgress) => f.write_str("no-op (in progress)"),
        }
    }
}

/// The decision for `action` against an instance in `status`.
#[must_use]
pub fn decide(action: Action, status: LiveStatus) -> Decision {
    match (action, status) {
        (Action::Provision, LiveStatus::Absent) => Decision::Create,
        (Action::Provision, LiveStatus::Stopped | LiveStatus::Terminated) => Decision::Start,
        (Action::Provision, LiveStatus::Running) => Decision::NoOp(NoOpReason::AlreadyExists),
        (Action::Provision, LiveStatus::Transitioning) => Decision::NoOp(NoOpReason::InProgress),
        (Action::Deprovision, LiveStatus::Running | LiveStatus::Transitioning) => Decision::Stop,
        (Action::Deprovision, LiveStatus::Absent | LiveStatus::Stopped | LiveStatus::Terminated) => {
            Decision::NoOp(NoOpReason::NotFound)
        }
    }
}
