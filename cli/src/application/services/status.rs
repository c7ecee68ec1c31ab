//! Plane and agent status.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;

use crate::application::ports::{
    AgentRecordStore, InfraProvider, PlaneStore, ProgressReporter, SetupStateStore,
};
use crate::application::services::reconcile::Reconciler;
use crate::domain::{AgentRecord, SetupStep};

#[derive(Debug, Clone, Serialize)]
pub struct PlaneStatus {
    /// `None` before `create-plane` has written `plane.yaml`.
    pub plane: Option<String>,
    pub project: Option<String>,
    pub setup_completed: u32,
    pub setup_total: u32,
    pub agents: Vec<AgentRecord>,
}

impl PlaneStatus {
    #[must_use]
    pub fn setup_complete(&self) -> bool {
        self.setup_completed >= self.setup_total
    }
}

/// Collect stored state without touching the cloud.
///
/// # Errors
///
/// Returns an error if a state file cannot be read.
pub async fn plane_status(
    store: &(impl PlaneStore + SetupStateStore + AgentRecordStore),
) -> Result<PlaneStatus> {
    let plane = store.load_plane().await?;
    Ok(PlaneStatus {
        plane: plane.as_ref().map(|p| p.name.clone()),
        project: plane.and_then(|p| p.project),
        setup_completed: store.current_step().await?,
        setup_total: u32::try_from(SetupStep::ALL.len()).unwrap_or(u32::MAX),
        agents: store.list_records().await?,
    })
}

/// Re-describe every recorded instance and store the observed status and phase.
///
/// An instance that cannot be described keeps its stored values and is
/// reported as a warning.
///
/// # Errors
///
/// Returns an error if a record cannot be saved.
pub async fn refresh_records(
    records: &impl AgentRecordStore,
    reporter: &impl ProgressReporter,
    reconciler: &Reconciler<'_, impl InfraProvider>,
    agents: Vec<AgentRecord>,
) -> Result<Vec<AgentRecord>> {
    let mut refreshed = Vec::with_capacity(agents.len());
    for mut record in agents {
        match reconciler
            .live_status(&record.instance_name, &record.zone)
            .await
        {
            Ok((status, phase)) => {
                if status != record.last_status || (phase.is_some() && phase != record.phase) {
                    record.last_status = status;
                    record.phase = phase.or(record.phase);
                    record.updated_at = Utc::now();
                    records.save_record(&record).await?;
                }
            }
            Err(error) => {
                tracing::warn!(owner = %record.owner, name = %record.instance_name, error = %error, "refresh failed");
                reporter.warn(&format!("{}: {error}", record.instance_name));
            }
        }
        refreshed.push(record);
    }
    Ok(refreshed)
}
