//! Provision and deprovision use-cases.
//!
//! Describe the instance, decide, act, then upsert the agent record.
//! Imports only from `crate::domain` and `crate::application::ports`.

use anyhow::{Context, Result};
use chrono::Utc;
use plane_common::BootstrapPhase;
use serde::Serialize;

use crate::application::ports::{AgentRecordStore, InfraProvider, ProgressReporter};
use crate::application::services::reconcile::{EnsureOutcome, Reconciler, ResourceOutcome};
use crate::domain::{
    Action, AgentNames, AgentRecord, AgentSpec, Decision, LiveStatus, PlaneConfig, ProvisionError,
    ResourceDescriptor, ResourceGraph, ResourceId, ResourceKind, config_digest, decide,
    plan_agent_with, validate_owner,
};

/// What a provision or deprovision pass did.
#[derive(Debug, Clone, Serialize)]
pub struct AgentOutcome {
    pub owner: String,
    pub instance_name: String,
    pub action: Action,
    pub live_status: LiveStatus,
    pub decision: Decision,
    pub dry_run: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<ResourceOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_version: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<BootstrapPhase>,
    /// Record removed with `--forget`.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub forgotten: bool,
}

/// Converge one agent towards `spec`.
///
/// Validation runs before any collaborator call. An agent with a record stays
/// in the record's zone. The record is written only after the decided
/// operation succeeded, and never in a dry run.
///
/// # Errors
///
/// Returns a `ValidationError` for bad input or an owner whose instance name
/// is already recorded for someone else, or a [`ProvisionError`] naming the
/// stage that failed.
pub async fn provision_agent(
    records: &impl AgentRecordStore,
    reporter: &impl ProgressReporter,
    reconciler: &Reconciler<'_, impl InfraProvider>,
    plane: &PlaneConfig,
    spec: &AgentSpec,
) -> Result<AgentOutcome> {
    spec.validate()?;
    let names = AgentNames::derive(&spec.owner);
    let existing = records.load_record(&names.instance).await?;
    if let Some(record) = &existing {
        record.claim(&spec.owner)?;
    }
    let placed = existing
        .as_ref()
        .map_or_else(|| plane.clone(), |r| plane.in_zone(&r.zone));
    let stage = format!("{}/{}", ResourceKind::Instance, names.instance);

    let (status, phase) = reconciler
        .live_status(&names.instance, &placed.zone)
        .await
        .map_err(|e| ProvisionError::new(stage.clone(), e))?;
    let decision = decide(Action::Provision, status);
    tracing::info!(owner = %spec.owner, name = %names.instance, zone = %placed.zone, status = %status, decision = %decision, "provision decided");

    let mut resources = Vec::new();
    match decision {
        Decision::Create => {
            let graph = plan_with_latest_payload(reconciler, &placed, spec, &names).await?;
            let report = reconciler
                .reconcile(&graph, reporter)
                .await
                .context("planning agent resources")?;
            resources = report.into_result()?;
        }
        Decision::Start => {
            let graph = plan_with_latest_payload(reconciler, &placed, spec, &names).await?;
            let secret = secret_node(&graph)?;
            reporter.step(&format!("writing new version of {}...", secret.id));
            let outcome = reconciler
                .ensure(secret)
                .await
                .map_err(|e| ProvisionError::new(secret.id.to_string(), e))?;
            resources.push(outcome);
            reporter.step(&format!("starting {}...", names.instance));
            reconciler
                .start_instance(&names.instance, &placed.zone)
                .await
                .map_err(|e| ProvisionError::new(stage.clone(), e))?;
            resources.push(ResourceOutcome {
                id: ResourceId::new(ResourceKind::Instance, &names.instance),
                outcome: if reconciler.dry_run() {
                    EnsureOutcome::WouldUpdate
                } else {
                    EnsureOutcome::Updated
                },
                secret_version: None,
            });
        }
        Decision::NoOp(_) => {
            reporter.success(&format!("{} is {status}, nothing to do", names.instance));
        }
        Decision::Stop => anyhow::bail!("provisioning never decides to stop an instance"),
    }

    let secret_version = resources.iter().rev().find_map(|r| r.secret_version);
    let outcome = AgentOutcome {
        owner: spec.owner.clone(),
        instance_name: names.instance.clone(),
        action: Action::Provision,
        live_status: status,
        decision,
        dry_run: reconciler.dry_run(),
        resources,
        secret_version,
        phase,
        forgotten: false,
    };
    if reconciler.dry_run() {
        return Ok(outcome);
    }

    let after = match decision {
        Decision::Create | Decision::Start => LiveStatus::Running,
        _ => status,
    };
    upsert_record(records, existing, &placed, spec, after, phase, secret_version).await?;
    Ok(outcome)
}

/// Stop the owner's instance if it runs. The record is updated, and only
/// removed when `forget` is set.
///
/// # Errors
///
/// Returns a `ValidationError` for a malformed owner, or a [`ProvisionError`]
/// if describing or stopping the instance fails.
pub async fn deprovision_agent(
    records: &impl AgentRecordStore,
    reporter: &impl ProgressReporter,
    reconciler: &Reconciler<'_, impl InfraProvider>,
    plane: &PlaneConfig,
    owner: &str,
    forget: bool,
) -> Result<AgentOutcome> {
    validate_owner(owner)?;
    let names = AgentNames::derive(owner);
    let stage = format!("{}/{}", ResourceKind::Instance, names.instance);
    let existing = records.load_record(&names.instance).await?;
    if let Some(record) = &existing {
        record.claim(owner)?;
    }
    let zone = existing
        .as_ref()
        .map_or(plane.zone.as_str(), |r| r.zone.as_str());

    let (status, phase) = reconciler
        .live_status(&names.instance, zone)
        .await
        .map_err(|e| ProvisionError::new(stage.clone(), e))?;
    let decision = decide(Action::Deprovision, status);
    tracing::info!(owner = %owner, name = %names.instance, status = %status, decision = %decision, "deprovision decided");

    if decision == Decision::Stop && reconciler.dry_run() {
        reporter.success(&format!("{} is {status}, would stop", names.instance));
    } else if decision == Decision::Stop {
        reporter.step(&format!("stopping {}...", names.instance));
        reconciler
            .stop_instance(&names.instance, zone)
            .await
            .map_err(|e| ProvisionError::new(stage.clone(), e))?;
        reporter.success(&format!("{} stopped, disk kept", names.instance));
    } else {
        reporter.success(&format!("{} is {status}, nothing to stop", names.instance));
    }

    let mut outcome = AgentOutcome {
        owner: owner.to_string(),
        instance_name: names.instance.clone(),
        action: Action::Deprovision,
        live_status: status,
        decision,
        dry_run: reconciler.dry_run(),
        resources: Vec::new(),
        secret_version: None,
        phase,
        forgotten: false,
    };
    if reconciler.dry_run() {
        return Ok(outcome);
    }

    if forget {
        outcome.forgotten = records.delete_record(&names.instance).await?;
    } else if let Some(mut record) = existing {
        record.last_status = if decision == Decision::Stop {
            LiveStatus::Stopped
        } else {
            status
        };
        record.phase = phase.or(record.phase);
        record.updated_at = Utc::now();
        records.save_record(&record).await?;
    }
    Ok(outcome)
}

/// The agent's plan, with the secret payload carrying forward the credential
/// from the latest version already stored.
async fn plan_with_latest_payload(
    reconciler: &Reconciler<'_, impl InfraProvider>,
    plane: &PlaneConfig,
    spec: &AgentSpec,
    names: &AgentNames,
) -> Result<ResourceGraph> {
    let stage = format!("{}/{}", ResourceKind::Secret, names.secret);
    let latest = reconciler
        .latest_secret_version(&names.secret)
        .await
        .map_err(|e| ProvisionError::new(stage, e))?;
    let previous = match latest {
        Some(version) => match version.payload() {
            Ok(payload) => Some(payload),
            Err(e) => {
                tracing::warn!(secret = %names.secret, version = version.version, error = %e, "latest secret version is unreadable, not carried forward");
                None
            }
        },
        None => None,
    };
    Ok(plan_agent_with(plane, spec, &spec.payload_after(previous.as_ref())))
}

async fn upsert_record(
    records: &impl AgentRecordStore,
    existing: Option<AgentRecord>,
    plane: &PlaneConfig,
    spec: &AgentSpec,
    status: LiveStatus,
    phase: Option<BootstrapPhase>,
    secret_version: Option<u64>,
) -> Result<AgentRecord> {
    let now = Utc::now();
    let mut record = match existing {
        Some(mut record) => {
            record.updated_at = now;
            record
        }
        None => AgentRecord::new(spec, plane, now),
    };
    record.last_status = status;
    record.phase = phase.or(record.phase);
    if let Some(version) = secret_version {
        record.spec = spec.clone();
        record.config_digest = config_digest(&spec.payload());
        record.secret_version = Some(version);
    }
    records
        .save_record(&record)
        .await
        .with_context(|| format!("saving record for {}", spec.owner))?;
    Ok(record)
}

fn secret_node(graph: &ResourceGraph) -> Result<&ResourceDescriptor> {
    graph
        .ordered()?
        .into_iter()
        .find(|n| n.id.kind == ResourceKind::Secret)
        .context("agent plan has no secret")
}
