//! Plane setup: a fixed sequence of steps with a persisted progress marker.
//!
//! A step advances the marker only after its side effects succeeded, so a
//! re-run resumes at the first step that has not completed. Steps never rely
//! on values computed by earlier steps in the same process; they re-read the
//! persisted plane configuration instead.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::application::ports::{
    CloudSession, IdentityDirectory, InfraProvider, PlaneStore, ProgressReporter, SetupStateStore,
};
use crate::application::services::reconcile::Reconciler;
use crate::domain::directory::{ATTR_BUDGET, ATTR_DISK, ATTR_MACHINE_TYPE, ATTR_MODEL};
use crate::domain::{
    InfraError, InfraErrorKind, PlaneConfig, SetupError, SetupStep, UserFilter, ValidationError,
    plan_control_account, plan_plane, plan_plane_secret, validate_plane_name,
};

/// Cloud services the plane depends on.
pub const REQUIRED_APIS: &[&str] = &[
    "compute.googleapis.com",
    "iam.googleapis.com",
    "secretmanager.googleapis.com",
    "logging.googleapis.com",
];

/// Executes one setup step.
#[allow(async_fn_in_trait)]
pub trait SetupActions {
    async fn run_step(&self, step: SetupStep, reporter: &impl ProgressReporter) -> Result<()>;
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SetupSummary {
    /// Steps skipped because the marker already covered them.
    pub skipped: Vec<&'static str>,
    pub executed: Vec<&'static str>,
    pub last_completed: u32,
}

/// Run every step after the stored marker.
///
/// `restart` resets the marker to zero first.
///
/// # Errors
///
/// Returns a [`SetupError`] for the first failing step; the marker stays at
/// the last step that completed.
pub async fn run_setup(
    actions: &impl SetupActions,
    tracker: &impl SetupStateStore,
    restart: bool,
    reporter: &impl ProgressReporter,
) -> Result<SetupSummary> {
    if restart {
        tracker.reset().await.context("resetting setup progress")?;
        tracing::info!("setup progress reset");
    }
    let last = tracker.current_step().await.context("reading setup progress")?;
    let total = SetupStep::ALL.len();
    let mut summary = SetupSummary {
        skipped: SetupStep::ALL
            .iter()
            .filter(|s| s.index() <= last)
            .map(|s| s.name())
            .collect(),
        executed: Vec::new(),
        last_completed: last,
    };

    for step in SetupStep::remaining(last) {
        reporter.step(&format!(
            "[{}/{total}] {}...",
            step.index(),
            step.description()
        ));
        tracing::debug!(stage = step.name(), "running setup step");
        actions
            .run_step(step, reporter)
            .await
            .map_err(|source| SetupError {
                index: step.index(),
                step: step.name(),
                source,
            })?;
        tracker
            .advance(step.index())
            .await
            .with_context(|| format!("recording completion of step {}", step.name()))?;
        summary.executed.push(step.name());
        summary.last_completed = step.index();
        reporter.success(&format!("[{}/{total}] {}", step.index(), step.name()));
    }
    Ok(summary)
}

/// Operator-supplied plane settings; unset fields keep their current value.
#[derive(Debug, Clone, Default)]
pub struct PlaneOptions {
    pub name: Option<String>,
    pub project: Option<String>,
    pub region: Option<String>,
    pub zone: Option<String>,
    pub model: Option<String>,
    pub machine_type: Option<String>,
    pub monthly_budget_usd: Option<u32>,
    pub disk_gb: Option<u32>,
    pub directory_program: Option<String>,
    pub directory_args: Vec<String>,
    pub directory_filter: Option<String>,
    pub watch_interval_secs: Option<u64>,
}

impl PlaneOptions {
    /// Overlay the set fields onto `plane`.
    pub fn apply(&self, plane: &mut PlaneConfig) {
        if let Some(region) = &self.region {
            plane.region.clone_from(region);
        }
        if let Some(zone) = &self.zone {
            plane.zone.clone_from(zone);
        }
        if let Some(model) = &self.model {
            plane.model.clone_from(model);
        }
        if let Some(machine_type) = &self.machine_type {
            plane.machine_type.clone_from(machine_type);
        }
        if let Some(budget) = self.monthly_budget_usd {
            plane.monthly_budget_usd = budget;
        }
        if let Some(disk) = self.disk_gb {
            plane.disk_gb = disk;
        }
        if let Some(program) = &self.directory_program {
            plane.directory.program = Some(program.clone());
            plane.directory.args.clone_from(&self.directory_args);
        }
        if let Some(filter) = &self.directory_filter {
            plane.directory.filter = Some(filter.clone());
        }
        if let Some(interval) = self.watch_interval_secs {
            plane.watch_interval_secs = interval;
        }
    }
}

/// The production step implementations, reached entirely through ports.
pub struct PlaneSetup<'a, C, D, S> {
    pub cloud: &'a C,
    pub directory: &'a D,
    pub store: &'a S,
    pub reconciler: Reconciler<'a, C>,
    pub options: PlaneOptions,
}

impl<C, D, S> PlaneSetup<'_, C, D, S>
where
    C: CloudSession + InfraProvider,
    D: IdentityDirectory,
    S: PlaneStore,
{
    /// The persisted draft, or a fresh one named after the options.
    async fn draft(&self) -> Result<PlaneConfig> {
        if let Some(plane) = self.store.load_plane().await? {
            return Ok(plane);
        }
        let name = self
            .options
            .name
            .as_deref()
            .unwrap_or(crate::domain::plane::DEFAULT_PLANE_NAME);
        validate_plane_name(name)?;
        Ok(PlaneConfig::named(name))
    }

    async fn persisted(&self) -> Result<PlaneConfig> {
        Ok(self
            .store
            .load_plane()
            .await?
            .ok_or(ValidationError::PlaneNotConfigured)?)
    }

    async fn project(&self) -> Result<String> {
        self.persisted()
            .await?
            .project
            .context("plane has no project; re-run create-plane with --restart")
    }

    async fn auth(&self) -> Result<()> {
        match self.cloud.active_account().await? {
            Some(account) => {
                tracing::info!(account = %account, "authenticated");
                Ok(())
            }
            None => Err(InfraError::new(
                InfraErrorKind::PermissionDenied,
                "no active cloud account; log in with the provider CLI first",
            )
            .into()),
        }
    }

    async fn select_project(&self) -> Result<()> {
        let mut plane = self.draft().await?;
        let requested = self.options.project.as_deref().or(plane.project.as_deref());
        let project = self.cloud.resolve_project(requested).await?;
        tracing::info!(project = %project, "project selected");
        plane.project = Some(project);
        self.store.save_plane(&plane).await
    }

    async fn configure(&self) -> Result<()> {
        let mut plane = self.persisted().await?;
        self.options.apply(&mut plane);
        validate_plane_name(&plane.name)?;
        self.store.save_plane(&plane).await
    }
}

impl<C, D, S> SetupActions for PlaneSetup<'_, C, D, S>
where
    C: CloudSession + InfraProvider,
    D: IdentityDirectory,
    S: PlaneStore,
{
    async fn run_step(&self, step: SetupStep, reporter: &impl ProgressReporter) -> Result<()> {
        match step {
            SetupStep::Auth => self.auth().await,
            SetupStep::Project => self.select_project().await,
            SetupStep::Apis => {
                let project = self.project().await?;
                Ok(self.cloud.enable_apis(&project, REQUIRED_APIS).await?)
            }
            SetupStep::ServiceAccount => {
                let plane = self.persisted().await?;
                self.reconciler.ensure(&plan_control_account(&plane)).await?;
                Ok(())
            }
            SetupStep::DirectoryDelegation => {
                let account = self.directory.verify_access().await?;
                tracing::info!(account = %account, "directory access verified");
                Ok(())
            }
            SetupStep::Configuration => self.configure().await,
            SetupStep::Persistence => {
                let plane = self.persisted().await?;
                let outcome = self.reconciler.ensure(&plan_plane_secret(&plane)).await?;
                tracing::info!(name = %outcome.id.name, version = ?outcome.secret_version, "plane config stored");
                Ok(())
            }
            SetupStep::Verification => {
                let plane = self.persisted().await?;
                self.reconciler
                    .reconcile(&plan_plane(&plane), reporter)
                    .await?
                    .into_result()?;
                Ok(())
            }
            SetupStep::DirectorySchema => Ok(self
                .directory
                .ensure_schema(&[ATTR_MODEL, ATTR_BUDGET, ATTR_DISK, ATTR_MACHINE_TYPE])
                .await?),
            SetupStep::Automation => {
                let plane = self.persisted().await?;
                let filter = UserFilter {
                    query: plane.directory.filter.clone(),
                };
                let users = self.directory.list_users(&filter).await?;
                let enabled = users.iter().filter(|u| u.enabled).count();
                reporter.success(&format!(
                    "directory poll ok: {} users, {enabled} enabled; run 'plane watch' to start provisioning",
                    users.len()
                ));
                Ok(())
            }
        }
    }
}
