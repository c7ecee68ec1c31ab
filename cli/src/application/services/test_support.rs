//! Shared in-memory collaborators for service tests.

#![allow(clippy::unwrap_used)]

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use plane_common::BootstrapPhase;

use super::reconcile::RetryPolicy;
use crate::application::ports::{
    AgentRecordStore, CloudSession, IdentityDirectory, InfraProvider, InfraResult,
    InstanceDescription, ObservedResource, PlaneStore, ProgressReporter, SecretVersion,
    SetupStateStore, WatchSnapshotStore,
};
use crate::domain::{
    AgentRecord, DirectoryUser, FirewallRule, InfraError, InfraErrorKind, InstanceSpec,
    LiveStatus, PlaneConfig, ResourceId, ResourceKind, UserFilter, WatchSnapshot,
};

/// Retries immediately so tests stay fast.
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        attempts: 3,
        backoff: Duration::ZERO,
        call_timeout: Duration::from_secs(5),
    }
}

const READ_ONLY_CALLS: &[&str] = &[
    "describe",
    "describe_instance",
    "latest_secret_version",
    "active_account",
    "resolve_project",
];

#[derive(Default)]
struct CloudState {
    resources: HashSet<ResourceId>,
    roles: HashMap<String, Vec<String>>,
    secrets: HashMap<String, Vec<Vec<u8>>>,
    instances: HashMap<String, InstanceDescription>,
    enabled_apis: Vec<String>,
}

/// In-memory cloud that records every call as `"<op> <target>"`.
#[derive(Default)]
pub struct FakeCloud {
    state: Mutex<CloudState>,
    calls: Mutex<Vec<String>>,
    failures: Mutex<HashMap<String, VecDeque<InfraError>>>,
    delay: Mutex<Option<Duration>>,
    account: Mutex<Option<String>>,
}

impl FakeCloud {
    pub fn logged_in(account: &str) -> Self {
        let cloud = Self::default();
        *cloud.account.lock().unwrap() = Some(account.to_string());
        cloud
    }

    /// Queue an error for the next call of `op`; queued errors are consumed in order.
    pub fn fail_next(&self, op: &str, error: InfraError) {
        self.failures
            .lock()
            .unwrap()
            .entry(op.to_string())
            .or_default()
            .push_back(error);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn with_instance(self, name: &str, status: LiveStatus) -> Self {
        self.with_instance_in(name, "us-central1-a", status)
    }

    pub fn with_instance_in(self, name: &str, zone: &str, status: LiveStatus) -> Self {
        self.state.lock().unwrap().instances.insert(
            name.to_string(),
            InstanceDescription {
                name: name.to_string(),
                zone: zone.to_string(),
                status,
                bootstrap_phase: None,
            },
        );
        self
    }

    pub fn set_status(&self, name: &str, status: LiveStatus) {
        if let Some(instance) = self.state.lock().unwrap().instances.get_mut(name) {
            instance.status = status;
        }
    }

    pub fn set_phase(&self, name: &str, phase: BootstrapPhase) {
        if let Some(instance) = self.state.lock().unwrap().instances.get_mut(name) {
            instance.bootstrap_phase = Some(phase);
        }
    }

    pub fn instance_status(&self, name: &str) -> Option<LiveStatus> {
        self.state
            .lock()
            .unwrap()
            .instances
            .get(name)
            .map(|i| i.status)
    }

    pub fn revoke_roles(&self, account: &str) {
        self.state.lock().unwrap().roles.remove(account);
    }

    pub fn secret_versions(&self, name: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .secrets
            .get(name)
            .map_or(0, Vec::len)
    }

    pub fn enabled_apis(&self) -> Vec<String> {
        self.state.lock().unwrap().enabled_apis.clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count_calls(&self, op: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.split(' ').next() == Some(op))
            .count()
    }

    /// Calls that would change cloud state.
    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| {
                let op = c.split(' ').next().unwrap_or_default();
                !READ_ONLY_CALLS.contains(&op)
            })
            .collect()
    }

    async fn record(&self, op: &str, target: &str) -> InfraResult<()> {
        self.calls.lock().unwrap().push(format!("{op} {target}"));
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let queued = self
            .failures
            .lock()
            .unwrap()
            .get_mut(op)
            .and_then(VecDeque::pop_front);
        match queued {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn create(&self, id: ResourceId) -> InfraResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.resources.contains(&id) {
            return Err(InfraError::new(
                InfraErrorKind::AlreadyExists,
                format!("{id} already exists"),
            ));
        }
        state.resources.insert(id);
        Ok(())
    }
}

impl InfraProvider for FakeCloud {
    async fn describe(&self, id: &ResourceId) -> InfraResult<Option<ObservedResource>> {
        self.record("describe", &id.to_string()).await?;
        let state = self.state.lock().unwrap();
        if !state.resources.contains(id) {
            return Ok(None);
        }
        Ok(Some(ObservedResource {
            roles: state.roles.get(&id.name).cloned().unwrap_or_default(),
        }))
    }

    async fn ensure_network(&self, name: &str) -> InfraResult<()> {
        self.record("ensure_network", name).await?;
        self.create(ResourceId::new(ResourceKind::Network, name))
    }

    async fn ensure_subnet(&self, name: &str, _: &str, _: &str, _: &str) -> InfraResult<()> {
        self.record("ensure_subnet", name).await?;
        self.create(ResourceId::new(ResourceKind::Subnet, name))
    }

    async fn ensure_firewall(&self, name: &str, _: &FirewallRule) -> InfraResult<()> {
        self.record("ensure_firewall", name).await?;
        self.create(ResourceId::new(ResourceKind::Firewall, name))
    }

    async fn create_service_account(&self, account_id: &str, _: &str) -> InfraResult<()> {
        self.record("create_service_account", account_id).await?;
        self.create(ResourceId::new(ResourceKind::ServiceAccount, account_id))
    }

    async fn bind_roles(&self, account_id: &str, roles: &[String]) -> InfraResult<()> {
        self.record("bind_roles", account_id).await?;
        let mut state = self.state.lock().unwrap();
        let bound = state.roles.entry(account_id.to_string()).or_default();
        for role in roles {
            if !bound.contains(role) {
                bound.push(role.clone());
            }
        }
        Ok(())
    }

    async fn create_secret(&self, name: &str) -> InfraResult<()> {
        self.record("create_secret", name).await?;
        self.create(ResourceId::new(ResourceKind::Secret, name))
    }

    async fn add_secret_version(&self, name: &str, data: &[u8]) -> InfraResult<u64> {
        self.record("add_secret_version", name).await?;
        let mut state = self.state.lock().unwrap();
        let versions = state.secrets.entry(name.to_string()).or_default();
        versions.push(data.to_vec());
        Ok(versions.len() as u64)
    }

    async fn latest_secret_version(&self, name: &str) -> InfraResult<Option<SecretVersion>> {
        self.record("latest_secret_version", name).await?;
        let state = self.state.lock().unwrap();
        Ok(state.secrets.get(name).and_then(|versions| {
            versions.last().map(|data| SecretVersion {
                version: versions.len() as u64,
                data: data.clone(),
            })
        }))
    }

    async fn describe_instance(
        &self,
        name: &str,
        zone: &str,
    ) -> InfraResult<Option<InstanceDescription>> {
        self.record("describe_instance", &format!("{name}@{zone}")).await?;
        Ok(self.instance_in(name, zone))
    }

    async fn create_instance(&self, name: &str, spec: &InstanceSpec) -> InfraResult<()> {
        self.record("create_instance", name).await?;
        let mut state = self.state.lock().unwrap();
        if state.instances.contains_key(name) {
            return Err(InfraError::new(InfraErrorKind::AlreadyExists, name));
        }
        state.instances.insert(
            name.to_string(),
            InstanceDescription {
                name: name.to_string(),
                zone: spec.zone.clone(),
                status: LiveStatus::Running,
                bootstrap_phase: None,
            },
        );
        Ok(())
    }

    async fn start_instance(&self, name: &str, zone: &str) -> InfraResult<()> {
        self.record("start_instance", &format!("{name}@{zone}")).await?;
        self.transition(name, zone, LiveStatus::Running)
    }

    async fn stop_instance(&self, name: &str, zone: &str) -> InfraResult<()> {
        self.record("stop_instance", &format!("{name}@{zone}")).await?;
        self.transition(name, zone, LiveStatus::Stopped)
    }
}

impl FakeCloud {
    /// Instances are only visible in the zone they were created in.
    fn instance_in(&self, name: &str, zone: &str) -> Option<InstanceDescription> {
        self.state
            .lock()
            .unwrap()
            .instances
            .get(name)
            .filter(|i| i.zone == zone)
            .cloned()
    }

    fn transition(&self, name: &str, zone: &str, status: LiveStatus) -> InfraResult<()> {
        match self.state.lock().unwrap().instances.get_mut(name) {
            Some(instance) if instance.zone == zone => {
                instance.status = status;
                Ok(())
            }
            _ => Err(InfraError::new(InfraErrorKind::NotFound, format!("{name}@{zone}"))),
        }
    }
}

impl CloudSession for FakeCloud {
    async fn active_account(&self) -> InfraResult<Option<String>> {
        self.record("active_account", "").await?;
        Ok(self.account.lock().unwrap().clone())
    }

    async fn resolve_project(&self, requested: Option<&str>) -> InfraResult<String> {
        self.record("resolve_project", requested.unwrap_or_default())
            .await?;
        Ok(requested.unwrap_or("default-project").to_string())
    }

    async fn enable_apis(&self, project: &str, apis: &[&str]) -> InfraResult<()> {
        self.record("enable_apis", project).await?;
        self.state
            .lock()
            .unwrap()
            .enabled_apis
            .extend(apis.iter().map(|a| (*a).to_string()));
        Ok(())
    }
}

/// Directory holding a fixed user list.
#[derive(Default)]
pub struct FakeDirectory {
    pub users: Mutex<Vec<DirectoryUser>>,
    pub schema: Mutex<Vec<String>>,
    pub fail_list: Mutex<Option<InfraError>>,
}

impl FakeDirectory {
    pub fn with_users(users: Vec<DirectoryUser>) -> Self {
        Self {
            users: Mutex::new(users),
            ..Self::default()
        }
    }
}

impl IdentityDirectory for FakeDirectory {
    async fn list_users(&self, _: &UserFilter) -> InfraResult<Vec<DirectoryUser>> {
        if let Some(error) = self.fail_list.lock().unwrap().take() {
            return Err(error);
        }
        Ok(self.users.lock().unwrap().clone())
    }

    async fn verify_access(&self) -> InfraResult<String> {
        Ok("admin@example.com".to_string())
    }

    async fn ensure_schema(&self, attributes: &[&str]) -> InfraResult<()> {
        *self.schema.lock().unwrap() = attributes.iter().map(|a| (*a).to_string()).collect();
        Ok(())
    }
}

/// Every store port backed by memory.
#[derive(Default)]
pub struct MemoryStore {
    pub plane: Mutex<Option<PlaneConfig>>,
    pub step: Mutex<u32>,
    pub records: Mutex<BTreeMap<String, AgentRecord>>,
    pub snapshot: Mutex<WatchSnapshot>,
}

impl MemoryStore {
    pub fn with_plane(plane: PlaneConfig) -> Self {
        Self {
            plane: Mutex::new(Some(plane)),
            ..Self::default()
        }
    }

    pub fn record(&self, instance: &str) -> Option<AgentRecord> {
        self.records.lock().unwrap().get(instance).cloned()
    }
}

impl PlaneStore for MemoryStore {
    async fn load_plane(&self) -> Result<Option<PlaneConfig>> {
        Ok(self.plane.lock().unwrap().clone())
    }

    async fn save_plane(&self, plane: &PlaneConfig) -> Result<()> {
        *self.plane.lock().unwrap() = Some(plane.clone());
        Ok(())
    }
}

impl SetupStateStore for MemoryStore {
    async fn current_step(&self) -> Result<u32> {
        Ok(*self.step.lock().unwrap())
    }

    async fn advance(&self, step: u32) -> Result<()> {
        let mut current = self.step.lock().unwrap();
        *current = (*current).max(step);
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        *self.step.lock().unwrap() = 0;
        Ok(())
    }
}

impl AgentRecordStore for MemoryStore {
    async fn load_record(&self, instance_name: &str) -> Result<Option<AgentRecord>> {
        Ok(self.record(instance_name))
    }

    async fn save_record(&self, record: &AgentRecord) -> Result<()> {
        self.records
            .lock()
            .unwrap()
            .insert(record.instance_name.clone(), record.clone());
        Ok(())
    }

    async fn list_records(&self) -> Result<Vec<AgentRecord>> {
        Ok(self.records.lock().unwrap().values().cloned().collect())
    }

    async fn delete_record(&self, instance_name: &str) -> Result<bool> {
        Ok(self.records.lock().unwrap().remove(instance_name).is_some())
    }
}

impl WatchSnapshotStore for MemoryStore {
    async fn load_snapshot(&self) -> Result<WatchSnapshot> {
        Ok(self.snapshot.lock().unwrap().clone())
    }

    async fn save_snapshot(&self, snapshot: &WatchSnapshot) -> Result<()> {
        *self.snapshot.lock().unwrap() = snapshot.clone();
        Ok(())
    }
}

/// Reporter that keeps every message.
#[derive(Default)]
pub struct RecordingReporter {
    pub messages: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl ProgressReporter for RecordingReporter {
    fn step(&self, message: &str) {
        self.messages.lock().unwrap().push(format!("step: {message}"));
    }

    fn success(&self, message: &str) {
        self.messages.lock().unwrap().push(format!("ok: {message}"));
    }

    fn warn(&self, message: &str) {
        self.messages.lock().unwrap().push(format!("warn: {message}"));
    }
}
