//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain` and `plane_common`; never
//! from `crate::infra`, `crate::commands`, or `crate::output`.

use std::process::Output;

use anyhow::Result;
use plane_common::{BootstrapPhase, SecretPayload};

use crate::domain::{
    AgentRecord, DirectoryUser, FirewallRule, InfraError, InstanceSpec, LiveStatus, PlaneConfig,
    ResourceId, UserFilter, WatchSnapshot,
};

/// Result of a single collaborator call.
pub type InfraResult<T> = std::result::Result<T, InfraError>;

// ── Value Types ───────────────────────────────────────────────────────────────

/// What a describe call found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedResource {
    /// Project roles bound to a service account; empty for other kinds.
    pub roles: Vec<String>,
}

/// One numbered snapshot of a secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretVersion {
    pub version: u64,
    pub data: Vec<u8>,
}

impl SecretVersion {
    /// Decode the version as an agent runtime payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is not a JSON-encoded [`SecretPayload`].
    pub fn payload(&self) -> serde_json::Result<SecretPayload> {
        serde_json::from_slice(&self.data)
    }
}

/// A described compute instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceDescription {
    pub name: String,
    pub zone: String,
    pub status: LiveStatus,
    /// Phase published by the instance's heartbeat, if any.
    pub bootstrap_phase: Option<BootstrapPhase>,
}

// ── Cloud Ports ───────────────────────────────────────────────────────────────

/// Cloud resource operations. Every call either succeeds or returns a
/// classified [`InfraError`]; creating something that exists fails with
/// `AlreadyExists`.
#[allow(async_fn_in_trait)]
pub trait InfraProvider {
    /// Describe a network, subnet, firewall, service account or secret.
    async fn describe(&self, id: &ResourceId) -> InfraResult<Option<ObservedResource>>;
    async fn ensure_network(&self, name: &str) -> InfraResult<()>;
    async fn ensure_subnet(
        &self,
        name: &str,
        network: &str,
        region: &str,
        cidr: &str,
    ) -> InfraResult<()>;
    async fn ensure_firewall(&self, name: &str, rule: &FirewallRule) -> InfraResult<()>;
    async fn create_service_account(&self, account_id: &str, display_name: &str)
    -> InfraResult<()>;
    /// Bind project roles to a service account. Binding an existing role is a no-op.
    async fn bind_roles(&self, account_id: &str, roles: &[String]) -> InfraResult<()>;
    async fn create_secret(&self, name: &str) -> InfraResult<()>;
    /// Append a version and return its number.
    async fn add_secret_version(&self, name: &str, data: &[u8]) -> InfraResult<u64>;
    async fn latest_secret_version(&self, name: &str) -> InfraResult<Option<SecretVersion>>;
    async fn describe_instance(
        &self,
        name: &str,
        zone: &str,
    ) -> InfraResult<Option<InstanceDescription>>;
    async fn create_instance(&self, name: &str, spec: &InstanceSpec) -> InfraResult<()>;
    async fn start_instance(&self, name: &str, zone: &str) -> InfraResult<()>;
    async fn stop_instance(&self, name: &str, zone: &str) -> InfraResult<()>;
}

/// Account- and project-level operations used by plane setup.
#[allow(async_fn_in_trait)]
pub trait CloudSession {
    /// The authenticated account, or `None` when logged out.
    async fn active_account(&self) -> InfraResult<Option<String>>;
    /// The project to use: `requested` if given, else the CLI's configured default.
    async fn resolve_project(&self, requested: Option<&str>) -> InfraResult<String>;
    async fn enable_apis(&self, project: &str, apis: &[&str]) -> InfraResult<()>;
}

// ── Directory Port ────────────────────────────────────────────────────────────

/// Identity directory, polled on a fixed interval. No push capability.
#[allow(async_fn_in_trait)]
pub trait IdentityDirectory {
    async fn list_users(&self, filter: &UserFilter) -> InfraResult<Vec<DirectoryUser>>;
    /// Confirm delegated access; returns the account the directory acts as.
    async fn verify_access(&self) -> InfraResult<String>;
    /// Ensure the custom attribute schema carrying agent settings exists.
    async fn ensure_schema(&self, attributes: &[&str]) -> InfraResult<()>;
}

// ── Command Runner Port ───────────────────────────────────────────────────────

/// Abstracts process execution so infrastructure can be swapped or mocked.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a program and capture its output.
    ///
    /// Implementations should delegate to `run_with_timeout` using the
    /// instance's configured default timeout.
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output>;
    /// Run a program with a custom timeout override.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or exceeds `timeout`.
    /// On timeout, the child process must be killed (not left orphaned).
    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: std::time::Duration,
    ) -> Result<Output>;
    /// Run a program with stdin piped from `stdin`.
    async fn run_with_stdin(&self, program: &str, args: &[&str], stdin: &[u8]) -> Result<Output>;
}

// ── Progress Reporting Port ───────────────────────────────────────────────────

/// Abstracts progress reporting so services can emit events without
/// depending on the Presentation layer. Sync trait; no async needed.
pub trait ProgressReporter {
    /// Emit an in-progress step message.
    fn step(&self, message: &str);
    /// Emit a success message.
    fn success(&self, message: &str);
    /// Emit a warning message.
    fn warn(&self, message: &str);
}

// ── State Ports ───────────────────────────────────────────────────────────────

/// Persistence for `plane.yaml`.
#[allow(async_fn_in_trait)]
pub trait PlaneStore {
    async fn load_plane(&self) -> Result<Option<PlaneConfig>>;
    async fn save_plane(&self, plane: &PlaneConfig) -> Result<()>;
}

/// The setup progress marker: index of the last completed setup step.
#[allow(async_fn_in_trait)]
pub trait SetupStateStore {
    /// `0` when no step has completed.
    async fn current_step(&self) -> Result<u32>;
    /// Record `step` as completed. The marker never moves backwards.
    async fn advance(&self, step: u32) -> Result<()>;
    /// Explicit operator restart: back to zero.
    async fn reset(&self) -> Result<()>;
}

/// One [`AgentRecord`] per agent, keyed by instance name.
#[allow(async_fn_in_trait)]
pub trait AgentRecordStore {
    async fn load_record(&self, instance_name: &str) -> Result<Option<AgentRecord>>;
    async fn save_record(&self, record: &AgentRecord) -> Result<()>;
    /// All records, sorted by instance name.
    async fn list_records(&self) -> Result<Vec<AgentRecord>>;
    /// Returns whether a record existed.
    async fn delete_record(&self, instance_name: &str) -> Result<bool>;
}

/// Last committed enabled flag per owner, for the directory watch.
#[allow(async_fn_in_trait)]
pub trait WatchSnapshotStore {
    async fn load_snapshot(&self) -> Result<WatchSnapshot>;
    async fn save_snapshot(&self, snapshot: &WatchSnapshot) -> Result<()>;
}
