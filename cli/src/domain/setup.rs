//! Plane setup steps.
//!
//! The order is part of the persisted format: `setup-state.json` stores the
//! 1-based index of the last completed step.

use std::fmt;

/// One step of the one-time plane bootstrap sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetupStep {
    Auth,
    Project,
    Apis,
    ServiceAccount,
    DirectoryDelegation,
    Configuration,
    Persistence,
    Verification,
    DirectorySchema,
    Automation,
}

impl SetupStep {
    pub const ALL: [SetupStep; 10] = [
        SetupStep::Auth,
        SetupStep::Project,
        SetupStep::Apis,
        SetupStep::ServiceAccount,
        SetupStep::DirectoryDelegation,
        SetupStep::Configuration,
        SetupStep::Persistence,
        SetupStep::Verification,
        SetupStep::DirectorySchema,
        SetupStep::Automation,
    ];

    /// 1-based position; the value written to the progress marker.
    #[must_use]
    pub fn index(self) -> u32 {
        match self {
            Self::Auth => 1,
            Self::Project => 2,
            Self::Apis => 3,
            Self::ServiceAccount => 4,
            Self::DirectoryDelegation => 5,
            Self::Configuration => 6,
            Self::Persistence => 7,
            Self::Verification => 8,
            Self::DirectorySchema => 9,
            Self::Automation => 10,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Project => "project",
            Self::Apis => "apis",
            Self::ServiceAccount => "service-account",
            Self::DirectoryDelegation => "directory-delegation",
            Self::Configuration => "configuration",
            Self::Persistence => "persistence",
            Self::Verification => "verification",
            Self::DirectorySchema => "directory-schema",
            Self::Automation => "automation",
        }
    }

    /// Human-readable progress message.
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Auth => "checking cloud credentials",
            Self::Project => "selecting project",
            Self::Apis => "enabling cloud APIs",
            Self::ServiceAccount => "creating control service account",
            Self::DirectoryDelegation => "verifying directory access",
            Self::Configuration => "writing plane configuration",
            Self::Persistence => "storing plane configuration secret",
            Self::Verification => "reconciling shared plane resources",
            Self::DirectorySchema => "ensuring directory attribute schema",
            Self::Automation => "testing directory watch",
        }
    }

    /// Steps still to run when the marker is at `last_completed`.
    pub fn remaining(last_completed: u32) -> impl Iterator<Item = SetupStep> {
        Self::ALL
            .into_iter()
            .filter(move |step| step.index() > last_completed)
    }
}

impl fmt::Display for SetupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
