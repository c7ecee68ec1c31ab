//! Plane configuration: the shared infrastructure every agent lives under.
//!
//! Persisted as `plane.yaml` in the state directory.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::error::ValidationError;

static PLANE_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    // Safety: this is a compile-time constant pattern; cannot fail.
    #[allow(clippy::expect_used)]
    Regex::new(r"^[a-z]([a-z0-9-]{0,18}[a-z0-9])?$").expect("valid regex")
});

/// Default plane name used when `create-plane` is run without `--name`.
pub const DEFAULT_PLANE_NAME: &str = "agents";

/// Org-wide plane configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaneConfig {
    pub name: String,
    /// Cloud project id; filled in by the `project` setup step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    pub region: String,
    pub zone: String,
    pub network: String,
    pub subnet: String,
    pub subnet_cidr: String,
    /// Network tag carried by every agent instance; firewall rules target it.
    pub firewall_tag: String,
    pub machine_type: String,
    pub model: String,
    pub monthly_budget_usd: u32,
    pub disk_gb: u32,
    pub image_family: String,
    pub image_project: String,
    /// Cloud CLI used by the provider adapter.
    pub provider_program: String,
    pub directory: DirectoryConfig,
    pub watch_interval_secs: u64,
}

/// How the identity directory is reached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Program implementing `list-users`, `whoami` and `ensure-schema`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Directory query restricting which users are considered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl Default for PlaneConfig {
    fn default() -> Self {
        Self::named(DEFAULT_PLANE_NAME)
    }
}

impl PlaneConfig {
    /// Configuration for a plane called `name`, with resource names derived from it.
    #[must_use]
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            project: None,
            region: "us-central1".to_string(),
            zone: "us-central1-a".to_string(),
            network: format!("{name}-net"),
            subnet: format!("{name}-subnet"),
            subnet_cidr: "10.10.0.0/24".to_string(),
            firewall_tag: format!("{name}-agent"),
            machine_type: "e2-standard-2".to_string(),
            model: "claude-sonnet".to_string(),
            monthly_budget_usd: 50,
            disk_gb: 30,
            image_family: "debian-12".to_string(),
            image_project: "debian-cloud".to_string(),
            provider_program: "gcloud".to_string(),
            directory: DirectoryConfig::default(),
            watch_interval_secs: 300,
        }
    }

    /// The same plane with instances placed in `zone`.
    #[must_use]
    pub fn in_zone(&self, zone: &str) -> Self {
        Self {
            zone: zone.to_string(),
            ..self.clone()
        }
    }

    /// Secret holding the plane config for instances to read at boot.
    #[must_use]
    pub fn config_secret(&self) -> String {
        format!("{}-plane-config", self.name)
    }

    /// Service account the control plane itself acts as.
    #[must_use]
    pub fn control_account(&self) -> String {
        format!("{}-control", self.name)
    }
}

/// Validate a plane name. Plane names prefix every shared resource, so they
/// follow the cloud's resource naming rule with room left for suffixes.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidPlaneName`] if the name does not match.
pub fn validate_plane_name(name: &str) -> Result<(), ValidationError> {
    if PLANE_NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(ValidationError::InvalidPlaneName(name.to_string()))
    }
}
