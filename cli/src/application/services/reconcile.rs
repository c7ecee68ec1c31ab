//! Resource reconciliation: describe, then create only what is missing.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use std::future::Future;
use std::time::Duration;

use plane_common::BootstrapPhase;
use serde::Serialize;

use crate::application::ports::{
    InfraProvider, InfraResult, InstanceDescription, ProgressReporter, SecretVersion,
};
use crate::domain::{
    ExistenceCheck, GraphError, InfraError, InfraErrorKind, InstanceSpec, LiveStatus,
    ProvisionError, ResourceDescriptor, ResourceGraph, ResourceId, ResourceKind, ResourceSpec,
};

/// Result of ensuring one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnsureOutcome {
    Created,
    AlreadyExists,
    /// Present, and a safe-to-patch field or secret version was written.
    Updated,
    /// Dry run: would have been created.
    WouldCreate,
    /// Dry run: would have been patched or versioned.
    WouldUpdate,
}

impl EnsureOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::AlreadyExists => "already exists",
            Self::Updated => "updated",
            Self::WouldCreate => "would create",
            Self::WouldUpdate => "would update",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceOutcome {
    pub id: ResourceId,
    pub outcome: EnsureOutcome,
    /// Version appended when the resource is a secret.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_version: Option<u64>,
}

impl ResourceOutcome {
    fn new(id: &ResourceId, outcome: EnsureOutcome) -> Self {
        Self {
            id: id.clone(),
            outcome,
            secret_version: None,
        }
    }
}

/// Bounds on every collaborator call. Only `Transient` and `Timeout`
/// failures are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    /// Multiplied by the attempt number before each retry.
    pub backoff: Duration,
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_secs(2),
            call_timeout: Duration::from_secs(120),
        }
    }
}

/// The stage that stopped a reconciliation pass.
#[derive(Debug, Clone)]
pub struct StageFailure {
    pub stage: ResourceId,
    pub error: InfraError,
    /// Nodes after the failing stage that were not attempted.
    pub skipped: Vec<ResourceId>,
}

#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    pub outcomes: Vec<ResourceOutcome>,
    pub failure: Option<StageFailure>,
}

impl ReconcileReport {
    /// Latest secret version written during this pass.
    #[must_use]
    pub fn secret_version(&self) -> Option<u64> {
        self.outcomes.iter().rev().find_map(|o| o.secret_version)
    }

    /// # Errors
    ///
    /// Returns a [`ProvisionError`] naming the failed stage.
    pub fn into_result(self) -> Result<Vec<ResourceOutcome>, ProvisionError> {
        match self.failure {
            None => Ok(self.outcomes),
            Some(failure) => Err(ProvisionError::new(failure.stage.to_string(), failure.error)),
        }
    }
}

/// Converges declared resources against an [`InfraProvider`].
pub struct Reconciler<'a, P> {
    provider: &'a P,
    policy: RetryPolicy,
    dry_run: bool,
}

impl<'a, P: InfraProvider> Reconciler<'a, P> {
    pub fn new(provider: &'a P, policy: RetryPolicy, dry_run: bool) -> Self {
        Self {
            provider,
            policy,
            dry_run,
        }
    }

    #[must_use]
    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// Walk the graph in dependency order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns a [`GraphError`] if the graph cannot be ordered. Collaborator
    /// failures are reported through [`ReconcileReport::failure`].
    pub async fn reconcile(
        &self,
        graph: &ResourceGraph,
        reporter: &impl ProgressReporter,
    ) -> Result<ReconcileReport, GraphError> {
        let order = graph.ordered()?;
        let mut report = ReconcileReport::default();
        for (i, node) in order.iter().enumerate() {
            reporter.step(&format!("ensuring {}...", node.id));
            match self.ensure(node).await {
                Ok(outcome) => {
                    reporter.success(&format!("{} {}", node.id, outcome.outcome.as_str()));
                    report.outcomes.push(outcome);
                }
                Err(error) => {
                    tracing::warn!(stage = %node.id, kind = %error.kind, error = %error.message, "reconciliation stopped");
                    report.failure = Some(StageFailure {
                        stage: node.id.clone(),
                        error,
                        skipped: order[i + 1..].iter().map(|n| n.id.clone()).collect(),
                    });
                    break;
                }
            }
        }
        Ok(report)
    }

    /// Converge one resource.
    ///
    /// # Errors
    ///
    /// Returns the classified error of the first call that failed after retries.
    pub async fn ensure(&self, node: &ResourceDescriptor) -> InfraResult<ResourceOutcome> {
        match &node.spec {
            ResourceSpec::Instance(spec) => self.ensure_instance(node, spec).await,
            ResourceSpec::Secret { data } => self.ensure_secret(&node.id, data).await,
            ResourceSpec::ServiceAccount { display_name, roles } => {
                self.ensure_service_account(&node.id, display_name, roles)
                    .await
            }
            _ => self.ensure_simple(node).await,
        }
    }

    async fn ensure_simple(&self, node: &ResourceDescriptor) -> InfraResult<ResourceOutcome> {
        let provider = self.provider;
        let id = &node.id;
        if self.call(id, "describe", || provider.describe(id)).await?.is_some() {
            return Ok(ResourceOutcome::new(id, EnsureOutcome::AlreadyExists));
        }
        if self.dry_run {
            return Ok(ResourceOutcome::new(id, EnsureOutcome::WouldCreate));
        }
        let name = id.name.as_str();
        let created = match &node.spec {
            ResourceSpec::Network => self.call(id, "create", || provider.ensure_network(name)).await,
            ResourceSpec::Subnet {
                network,
                region,
                cidr,
            } => {
                self.call(id, "create", || {
                    provider.ensure_subnet(name, network, region, cidr)
                })
                .await
            }
            ResourceSpec::Firewall(rule) => {
                self.call(id, "create", || provider.ensure_firewall(name, rule))
                    .await
            }
            _ => Err(InfraError::new(
                InfraErrorKind::Failed,
                format!("no create operation for {id}"),
            )),
        };
        tolerate_existing(id, created)
    }

    async fn ensure_service_account(
        &self,
        id: &ResourceId,
        display_name: &str,
        roles: &[String],
    ) -> InfraResult<ResourceOutcome> {
        let provider = self.provider;
        let account = id.name.as_str();
        if let Some(observed) = self.call(id, "describe", || provider.describe(id)).await? {
            let missing: Vec<String> = roles
                .iter()
                .filter(|role| !observed.roles.contains(role))
                .cloned()
                .collect();
            if missing.is_empty() {
                return Ok(ResourceOutcome::new(id, EnsureOutcome::AlreadyExists));
            }
            if self.dry_run {
                return Ok(ResourceOutcome::new(id, EnsureOutcome::WouldUpdate));
            }
            tracing::info!(kind = %id.kind, name = %id.name, roles = ?missing, "binding missing roles");
            self.call(id, "bind roles", || provider.bind_roles(account, &missing))
                .await?;
            return Ok(ResourceOutcome::new(id, EnsureOutcome::Updated));
        }
        if self.dry_run {
            return Ok(ResourceOutcome::new(id, EnsureOutcome::WouldCreate));
        }
        let created = self
            .call(id, "create", || {
                provider.create_service_account(account, display_name)
            })
            .await;
        let outcome = tolerate_existing(id, created)?;
        self.call(id, "bind roles", || provider.bind_roles(account, roles))
            .await?;
        Ok(outcome)
    }

    /// Create the container if needed, then always append a version.
    async fn ensure_secret(&self, id: &ResourceId, data: &[u8]) -> InfraResult<ResourceOutcome> {
        let provider = self.provider;
        let name = id.name.as_str();
        let exists = self
            .call(id, "describe", || provider.describe(id))
            .await?
            .is_some();
        if self.dry_run {
            let outcome = if exists {
                EnsureOutcome::WouldUpdate
            } else {
                EnsureOutcome::WouldCreate
            };
            return Ok(ResourceOutcome::new(id, outcome));
        }
        let mut outcome = EnsureOutcome::Updated;
        if !exists {
            let created = self.call(id, "create", || provider.create_secret(name)).await;
            if tolerate_existing(id, created)?.outcome == EnsureOutcome::Created {
                outcome = EnsureOutcome::Created;
            }
        }
        let version = self
            .call(id, "add version", || provider.add_secret_version(name, data))
            .await?;
        tracing::info!(kind = %id.kind, name = %id.name, version, "secret version added");
        Ok(ResourceOutcome {
            id: id.clone(),
            outcome,
            secret_version: Some(version),
        })
    }

    async fn ensure_instance(
        &self,
        node: &ResourceDescriptor,
        spec: &InstanceSpec,
    ) -> InfraResult<ResourceOutcome> {
        let id = &node.id;
        let zone = match &node.check {
            ExistenceCheck::InstanceInZone(zone) => zone.as_str(),
            ExistenceCheck::ByName => spec.zone.as_str(),
        };
        if self.describe_instance(&id.name, zone).await?.is_some() {
            return Ok(ResourceOutcome::new(id, EnsureOutcome::AlreadyExists));
        }
        if self.dry_run {
            return Ok(ResourceOutcome::new(id, EnsureOutcome::WouldCreate));
        }
        let provider = self.provider;
        let name = id.name.as_str();
        let created = self
            .call(id, "create", || provider.create_instance(name, spec))
            .await;
        tolerate_existing(id, created)
    }

    /// # Errors
    ///
    /// Returns the classified describe failure.
    pub async fn describe_instance(
        &self,
        name: &str,
        zone: &str,
    ) -> InfraResult<Option<InstanceDescription>> {
        let provider = self.provider;
        let id = ResourceId::new(ResourceKind::Instance, name);
        self.call(&id, "describe", || provider.describe_instance(name, zone))
            .await
    }

    /// # Errors
    ///
    /// Returns the classified read failure.
    pub async fn latest_secret_version(&self, name: &str) -> InfraResult<Option<SecretVersion>> {
        let provider = self.provider;
        let id = ResourceId::new(ResourceKind::Secret, name);
        self.call(&id, "read latest version", || provider.latest_secret_version(name))
            .await
    }

    /// Live status plus the phase the instance last published.
    ///
    /// # Errors
    ///
    /// Returns the classified describe failure.
    pub async fn live_status(
        &self,
        name: &str,
        zone: &str,
    ) -> InfraResult<(LiveStatus, Option<BootstrapPhase>)> {
        Ok(match self.describe_instance(name, zone).await? {
            Some(found) => (found.status, found.bootstrap_phase),
            None => (LiveStatus::Absent, None),
        })
    }

    /// # Errors
    ///
    /// Returns the classified start failure. Never reaches the provider in a dry run.
    pub async fn start_instance(&self, name: &str, zone: &str) -> InfraResult<()> {
        if self.dry_run {
            return Ok(());
        }
        let provider = self.provider;
        let id = ResourceId::new(ResourceKind::Instance, name);
        self.call(&id, "start", || provider.start_instance(name, zone))
            .await
    }

    /// # Errors
    ///
    /// Returns the classified stop failure. Never reaches the provider in a dry run.
    pub async fn stop_instance(&self, name: &str, zone: &str) -> InfraResult<()> {
        if self.dry_run {
            return Ok(());
        }
        let provider = self.provider;
        let id = ResourceId::new(ResourceKind::Instance, name);
        self.call(&id, "stop", || provider.stop_instance(name, zone))
            .await
    }

    /// Run one collaborator call under the timeout, retrying transient failures.
    async fn call<T, F, Fut>(&self, id: &ResourceId, op: &str, f: F) -> InfraResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = InfraResult<T>>,
    {
        let attempts = self.policy.attempts.max(1);
        let mut attempt = 1;
        loop {
            let result = match tokio::time::timeout(self.policy.call_timeout, f()).await {
                Ok(result) => result,
                Err(_) => Err(InfraError::new(
                    InfraErrorKind::Timeout,
                    format!(
                        "{op} {id} did not finish within {}s",
                        self.policy.call_timeout.as_secs()
                    ),
                )),
            };
            match result {
                Err(error) if error.kind.is_retryable() && attempt < attempts => {
                    tracing::warn!(kind = %id.kind, name = %id.name, attempt, error = %error, "{op} failed, retrying");
                    tokio::time::sleep(self.policy.backoff * attempt).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

/// A create that raced with another invocation still converged.
fn tolerate_existing(id: &ResourceId, created: InfraResult<()>) -> InfraResult<ResourceOutcome> {
    match created {
        Ok(()) => {
            tracing::debug!(kind = %id.kind, name = %id.name, "created");
            Ok(ResourceOutcome::new(id, EnsureOutcome::Created))
        }
        Err(error) if error.kind == InfraErrorKind::AlreadyExists => {
            tracing::info!(kind = %id.kind, name = %id.name, "already exists, continuing");
            Ok(ResourceOutcome::new(id, EnsureOutcome::AlreadyExists))
        }
        Err(error) => Err(error),
    }
}
