//! Directory watch: turn enabled-flag changes into provision and deprovision calls.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::application::ports::{
    AgentRecordStore, IdentityDirectory, InfraProvider, ProgressReporter, WatchSnapshotStore,
};
use crate::application::services::provision::{deprovision_agent, provision_agent};
use crate::application::services::reconcile::Reconciler;
use crate::domain::{
    Action, Decision, DirectoryChange, NoOpReason, PlaneConfig, UserFilter, net_delta,
    spec_from_user,
};

/// Where directory changes come from.
#[allow(async_fn_in_trait)]
pub trait ChangeSource {
    /// Net changes since the last committed state.
    async fn poll(&self) -> Result<Vec<DirectoryChange>>;
    /// Mark `owner` as handled; only called after the change succeeded.
    async fn commit(&self, owner: &str, enabled: bool) -> Result<()>;
}

/// Polls the directory and diffs against a persisted snapshot.
pub struct PollingChangeSource<'a, D, S> {
    directory: &'a D,
    snapshots: &'a S,
    filter: UserFilter,
}

impl<'a, D, S> PollingChangeSource<'a, D, S> {
    pub fn new(directory: &'a D, snapshots: &'a S, filter: UserFilter) -> Self {
        Self {
            directory,
            snapshots,
            filter,
        }
    }
}

impl<D: IdentityDirectory, S: WatchSnapshotStore> ChangeSource for PollingChangeSource<'_, D, S> {
    async fn poll(&self) -> Result<Vec<DirectoryChange>> {
        let users = self
            .directory
            .list_users(&self.filter)
            .await
            .context("listing directory users")?;
        let snapshot = self.snapshots.load_snapshot().await?;
        Ok(net_delta(&snapshot, &users))
    }

    async fn commit(&self, owner: &str, enabled: bool) -> Result<()> {
        let mut snapshot = self.snapshots.load_snapshot().await?;
        snapshot.insert(owner.to_string(), enabled);
        self.snapshots.save_snapshot(&snapshot).await
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickSummary {
    pub handled: Vec<String>,
    /// Owners whose change failed; they are retried next tick.
    pub failed: Vec<String>,
    /// Owners whose instance was mid-transition; decided again next tick.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pending: Vec<String>,
}

/// Apply every pending change once. A failure for one owner never blocks the others.
///
/// A change is committed only once its decision has been carried out, so a
/// change that met an instance in transition stays pending.
///
/// # Errors
///
/// Returns an error only if the source cannot be polled.
pub async fn process_tick(
    source: &impl ChangeSource,
    records: &impl AgentRecordStore,
    reporter: &impl ProgressReporter,
    reconciler: &Reconciler<'_, impl InfraProvider>,
    plane: &PlaneConfig,
) -> Result<TickSummary> {
    let changes = source.poll().await?;
    tracing::debug!(count = changes.len(), "directory changes");
    let mut summary = TickSummary::default();
    for change in changes {
        let result = match apply(&change, records, reporter, reconciler, plane).await {
            Ok(Decision::NoOp(NoOpReason::InProgress)) => {
                tracing::info!(owner = %change.owner, action = %change.action, "instance in transition, will retry");
                summary.pending.push(change.owner);
                continue;
            }
            // A dry run must not consume the change.
            Ok(_) if reconciler.dry_run() => Ok(()),
            Ok(_) => source
                .commit(&change.owner, change.enabled())
                .await
                .context("recording the handled change"),
            Err(err) => Err(err),
        };
        match result {
            Ok(()) => summary.handled.push(change.owner),
            Err(err) => {
                tracing::warn!(owner = %change.owner, action = %change.action, error = %format!("{err:#}"), "change failed, will retry");
                reporter.warn(&format!("{} {}: {err:#}", change.action, change.owner));
                summary.failed.push(change.owner);
            }
        }
    }
    Ok(summary)
}

async fn apply(
    change: &DirectoryChange,
    records: &impl AgentRecordStore,
    reporter: &impl ProgressReporter,
    reconciler: &Reconciler<'_, impl InfraProvider>,
    plane: &PlaneConfig,
) -> Result<Decision> {
    let outcome = match (change.action, &change.user) {
        (Action::Provision, Some(user)) => {
            let spec = spec_from_user(user, plane)?;
            provision_agent(records, reporter, reconciler, plane, &spec).await?
        }
        (Action::Provision, None) => {
            anyhow::bail!("provision change for {} carries no user", change.owner)
        }
        (Action::Deprovision, _) => {
            deprovision_agent(records, reporter, reconciler, plane, &change.owner, false).await?
        }
    };
    Ok(outcome.decision)
}
