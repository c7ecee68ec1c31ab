//! Directory users and the net-delta computation behind `plane watch`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::agent::AgentSpec;
use crate::domain::decision::Action;
use crate::domain::error::ValidationError;
use crate::domain::plane::PlaneConfig;

/// Attribute keys read from a directory user.
pub const ATTR_MODEL: &str = "model";
pub const ATTR_BUDGET: &str = "budget";
pub const ATTR_DISK: &str = "disk";
pub const ATTR_MACHINE_TYPE: &str = "machine_type";

/// One user as listed by the identity directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryUser {
    /// Owner identifier (primary e-mail).
    pub id: String,
    /// Whether the user should have an agent.
    pub enabled: bool,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

/// Query passed through to the directory collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserFilter {
    pub query: Option<String>,
}

/// Enabled flag per owner as of the last change acted on.
pub type WatchSnapshot = BTreeMap<String, bool>;

/// A net change between the committed snapshot and the current listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryChange {
    pub owner: String,
    pub action: Action,
    /// Absent when the user disappeared from the listing.
    pub user: Option<DirectoryUser>,
}

impl DirectoryChange {
    /// Enabled flag to commit once this change has been applied.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.action == Action::Provision
    }
}

/// Changes needed to move from `snapshot` to `users`.
///
/// Only the boolean enabled flag is compared, so several edits within one
/// interval collapse into their net effect. Users missing from the listing
/// count as disabled. Output is sorted by owner.
#[must_use]
pub fn net_delta(snapshot: &WatchSnapshot, users: &[DirectoryUser]) -> Vec<DirectoryChange> {
    let current: BTreeMap<&str, &DirectoryUser> =
        users.iter().map(|u| (u.id.as_str(), u)).collect();

    let mut changes = Vec::new();
    for (owner, user) in &current {
        let before = snapshot.get(*owner).copied().unwrap_or(false);
        if user.enabled != before {
            changes.push(DirectoryChange {
                owner: (*owner).to_string(),
                action: if user.enabled {
                    Action::Provision
                } else {
                    Action::Deprovision
                },
                user: Some((*user).clone()),
            });
        }
    }
    for (owner, enabled) in snapshot {
        if *enabled && !current.contains_key(owner.as_str()) {
            changes.push(DirectoryChange {
                owner: owner.clone(),
                action: Action::Deprovision,
                user: None,
            });
        }
    }
    changes.sort_by(|a, b| a.owner.cmp(&b.owner));
    changes
}

/// Agent spec for a directory user: plane defaults overridden by attributes.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidAttribute`] for non-numeric budget or
/// disk values, or any error from [`AgentSpec::validate`].
pub fn spec_from_user(user: &DirectoryUser, plane: &PlaneConfig) -> Result<AgentSpec, ValidationError> {
    let mut spec = AgentSpec::with_defaults(&user.id, plane);
    if let Some(model) = non_empty(user, ATTR_MODEL) {
        spec.model = model.to_string();
    }
    if let Some(budget) = non_empty(user, ATTR_BUDGET) {
        spec.monthly_budget_usd = parse_number(ATTR_BUDGET, budget)?;
    }
    if let Some(disk) = non_empty(user, ATTR_DISK) {
        spec.disk_gb = parse_number(ATTR_DISK, disk)?;
    }
    if let Some(machine_type) = non_empty(user, ATTR_MACHINE_TYPE) {
        spec.machine_type = Some(machine_type.to_string());
    }
    spec.validate()?;
    Ok(spec)
}

fn non_empty<'a>(user: &'a DirectoryUser, key: &str) -> Option<&'a str> {
    user.attributes
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

fn parse_number(key: &str, value: &str) -> Result<u32, ValidationError> {
    value.parse().map_err(|_| ValidationError::InvalidAttribute {
        key: key.to_string(),
        value: value.to_string(),
    })
}
