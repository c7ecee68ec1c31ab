//! Domain logic for agents: pure functions, no I/O, no async.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.

pub mod validate;

use chrono::{DateTime, Utc};
use plane_common::{BootstrapPhase, SecretPayload};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::decision::LiveStatus;
use crate::domain::error::ValidationError;
use crate::domain::plane::PlaneConfig;

pub use validate::{
    derive_instance_name, derive_secret_name, derive_service_account_id, validate_budget,
    validate_disk, validate_machine_type, validate_model, validate_owner,
};

/// What an agent should look like. Built from CLI flags or directory
/// attributes, with plane defaults filling the gaps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub owner: String,
    pub model: String,
    pub monthly_budget_usd: u32,
    pub disk_gb: u32,
    /// Overrides the plane's default machine type when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_type: Option<String>,
}

impl AgentSpec {
    /// Spec for `owner` using the plane's defaults.
    #[must_use]
    pub fn with_defaults(owner: &str, plane: &PlaneConfig) -> Self {
        Self {
            owner: owner.to_string(),
            model: plane.model.clone(),
            monthly_budget_usd: plane.monthly_budget_usd,
            disk_gb: plane.disk_gb,
            machine_type: None,
        }
    }

    /// Check every field; run before any collaborator is called.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_owner(&self.owner)?;
        validate_model(&self.model)?;
        validate_budget(self.monthly_budget_usd)?;
        validate_disk(self.disk_gb)?;
        if let Some(machine_type) = &self.machine_type {
            validate_machine_type(machine_type)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn machine_type<'a>(&'a self, plane: &'a PlaneConfig) -> &'a str {
        self.machine_type.as_deref().unwrap_or(&plane.machine_type)
    }

    /// Runtime configuration written to the agent's secret.
    #[must_use]
    pub fn payload(&self) -> SecretPayload {
        SecretPayload {
            owner: self.owner.clone(),
            model: self.model.clone(),
            monthly_budget_usd: self.monthly_budget_usd,
            credential: None,
        }
    }

    /// Like [`Self::payload`], keeping the credential the owner already migrated.
    #[must_use]
    pub fn payload_after(&self, previous: Option<&SecretPayload>) -> SecretPayload {
        SecretPayload {
            credential: previous.and_then(|p| p.credential.clone()),
            ..self.payload()
        }
    }
}

/// Every resource name belonging to one agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentNames {
    pub instance: String,
    pub service_account: String,
    pub secret: String,
}

impl AgentNames {
    #[must_use]
    pub fn derive(owner: &str) -> Self {
        let instance = derive_instance_name(owner);
        Self {
            service_account: derive_service_account_id(owner),
            secret: derive_secret_name(&instance),
            instance,
        }
    }
}

/// Persisted per-agent metadata, stored as `agents/<instance>.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub owner: String,
    pub instance_name: String,
    pub zone: String,
    pub service_account: String,
    pub secret: String,
    /// Last phase the instance published; never written by the control plane.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<BootstrapPhase>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_status: LiveStatus,
    pub spec: AgentSpec,
    /// SHA-256 of the secret payload last written.
    pub config_digest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_version: Option<u64>,
}

impl AgentRecord {
    /// A fresh record for a spec that has just been provisioned.
    #[must_use]
    pub fn new(spec: &AgentSpec, plane: &PlaneConfig, now: DateTime<Utc>) -> Self {
        let names = AgentNames::derive(&spec.owner);
        Self {
            owner: spec.owner.clone(),
            instance_name: names.instance,
            zone: plane.zone.clone(),
            service_account: names.service_account,
            secret: names.secret,
            phase: None,
            created_at: now,
            updated_at: now,
            last_status: LiveStatus::Absent,
            spec: spec.clone(),
            config_digest: config_digest(&spec.payload()),
            secret_version: None,
        }
    }

    /// Fails when `owner` derives the same instance name as this record's owner.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NameCollision`] for a different owner.
    pub fn claim(&self, owner: &str) -> Result<(), ValidationError> {
        if self.owner == owner {
            return Ok(());
        }
        Err(ValidationError::NameCollision {
            owner: owner.to_string(),
            instance: self.instance_name.clone(),
            existing: self.owner.clone(),
        })
    }
}

/// Hex SHA-256 of the serialized payload; changes whenever the config does.
#[must_use]
pub fn config_digest(payload: &SecretPayload) -> String {
    // Serializing a struct of strings and integers cannot fail.
    let bytes = serde_json::to_vec(payload).unwrap_or_default();
    validate::hex_encode(&Sha256::digest(&bytes))
}
