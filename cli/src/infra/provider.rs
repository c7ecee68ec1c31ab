//! Cloud provider adapter backed by the `gcloud` CLI.
//!
//! `GcloudProvider<R>` routes every call through a `CommandRunner`, so tests
//! can script the CLI's output without spawning processes. Failures are
//! classified from stderr into an [`InfraErrorKind`].

use std::process::Output;
use std::sync::{Mutex, PoisonError};

use plane_common::BootstrapPhase;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::application::ports::{
    CloudSession, CommandRunner, InfraProvider, InfraResult, InstanceDescription, ObservedResource,
    SecretVersion,
};
use crate::domain::{
    FirewallAction, FirewallRule, InfraError, InfraErrorKind, InstanceSpec, LiveStatus, PlaneConfig,
    ResourceId, ResourceKind,
};

/// Instance metadata key the heartbeat publishes its phase under.
pub const PHASE_METADATA_KEY: &str = "bootstrap-phase";

/// Map provider stderr onto an error kind.
#[must_use]
pub fn classify(stderr: &str) -> InfraErrorKind {
    let lower = stderr.to_ascii_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));
    if has(&["already exists", "already_exists"]) {
        InfraErrorKind::AlreadyExists
    } else if has(&["billing"]) {
        InfraErrorKind::BillingDisabled
    } else if has(&["not found", "not_found"]) {
        InfraErrorKind::NotFound
    } else if has(&["quota", "resource_exhausted"]) {
        InfraErrorKind::QuotaExceeded
    } else if has(&["permission", "forbidden", "403"]) {
        InfraErrorKind::PermissionDenied
    } else if has(&["deadline exceeded", "timed out"]) {
        InfraErrorKind::Timeout
    } else if has(&[
        "unavailable",
        "503",
        "502",
        "ratelimitexceeded",
        "try again",
        "internal error",
    ]) {
        InfraErrorKind::Transient
    } else {
        InfraErrorKind::Failed
    }
}

/// Map the provider's instance status onto [`LiveStatus`].
#[must_use]
pub fn live_status(status: &str) -> LiveStatus {
    match status {
        "RUNNING" => LiveStatus::Running,
        "TERMINATED" => LiveStatus::Terminated,
        "STOPPED" | "SUSPENDED" => LiveStatus::Stopped,
        _ => LiveStatus::Transitioning,
    }
}

#[derive(Debug, Deserialize)]
struct InstanceJson {
    name: String,
    zone: String,
    status: String,
    #[serde(default)]
    metadata: MetadataJson,
}

#[derive(Debug, Default, Deserialize)]
struct MetadataJson {
    #[serde(default)]
    items: Vec<MetadataItem>,
}

#[derive(Debug, Deserialize)]
struct MetadataItem {
    key: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct PolicyRow {
    bindings: BindingJson,
}

#[derive(Debug, Deserialize)]
struct BindingJson {
    role: String,
}

#[derive(Debug, Deserialize)]
struct VersionJson {
    name: String,
}

/// Version number from a resource name ending in `/versions/<n>`.
fn version_number(name: &str) -> Option<u64> {
    name.rsplit_once("/versions/")?.1.parse().ok()
}

/// `gcloud`-backed implementation of [`InfraProvider`] and [`CloudSession`].
pub struct GcloudProvider<R> {
    runner: R,
    program: String,
    /// Set at construction or by [`CloudSession::resolve_project`].
    project: Mutex<Option<String>>,
    region: String,
}

impl<R: CommandRunner> GcloudProvider<R> {
    pub fn new(
        runner: R,
        program: impl Into<String>,
        project: Option<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            runner,
            program: program.into(),
            project: Mutex::new(project),
            region: region.into(),
        }
    }

    /// Provider scoped to a plane's project and region.
    pub fn for_plane(runner: R, plane: &PlaneConfig) -> Self {
        Self::new(
            runner,
            plane.provider_program.clone(),
            plane.project.clone(),
            plane.region.clone(),
        )
    }

    fn current_project(&self) -> Option<String> {
        self.project
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn project(&self) -> InfraResult<String> {
        self.current_project().ok_or_else(|| {
            InfraError::new(InfraErrorKind::Failed, "no cloud project configured for the plane")
        })
    }

    fn account_email(&self, account_id: &str) -> InfraResult<String> {
        Ok(format!("{account_id}@{}.iam.gserviceaccount.com", self.project()?))
    }

    fn full_args(&self, args: &[String]) -> Vec<String> {
        let mut full = args.to_vec();
        if let Some(project) = self.current_project() {
            full.push(format!("--project={project}"));
        }
        full.push("--quiet".to_string());
        full
    }

    async fn exec(&self, args: &[String]) -> InfraResult<Output> {
        let full = self.full_args(args);
        let full: Vec<&str> = full.iter().map(String::as_str).collect();
        let output = self
            .runner
            .run(&self.program, &full)
            .await
            .map_err(runner_error)?;
        check(output)
    }

    async fn exec_stdin(&self, args: &[String], stdin: &[u8]) -> InfraResult<Output> {
        let full = self.full_args(args);
        let full: Vec<&str> = full.iter().map(String::as_str).collect();
        let output = self
            .runner
            .run_with_stdin(&self.program, &full, stdin)
            .await
            .map_err(runner_error)?;
        check(output)
    }

    async fn exec_json<T: DeserializeOwned>(&self, args: &[String]) -> InfraResult<T> {
        let mut args = args.to_vec();
        args.push("--format=json".to_string());
        let output = self.exec(&args).await?;
        serde_json::from_slice(&output.stdout).map_err(|e| {
            InfraError::new(
                InfraErrorKind::Failed,
                format!("unexpected {} output: {e}", self.program),
            )
        })
    }

    /// Run a describe-style call, mapping `NotFound` to `None`.
    async fn exists(&self, args: &[String]) -> InfraResult<bool> {
        match self.exec(args).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind == InfraErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn account_roles(&self, email: &str) -> InfraResult<Vec<String>> {
        let rows: Vec<PolicyRow> = self
            .exec_json(&args([
                "projects",
                "get-iam-policy",
                &self.project()?,
                "--flatten=bindings[].members",
                &format!("--filter=bindings.members:serviceAccount:{email}"),
            ]))
            .await?;
        Ok(rows.into_iter().map(|r| r.bindings.role).collect())
    }
}

fn args<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(|p| (*p).to_string()).collect()
}

/// A runner failure: the process could not be spawned or hit its deadline.
pub(crate) fn runner_error(err: anyhow::Error) -> InfraError {
    let message = format!("{err:#}");
    let kind = if message.contains("timed out") {
        InfraErrorKind::Timeout
    } else {
        InfraErrorKind::Failed
    };
    InfraError::new(kind, message)
}

pub(crate) fn check(output: Output) -> InfraResult<Output> {
    if output.status.success() {
        return Ok(output);
    }
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    Err(InfraError::new(classify(&stderr), stderr))
}

impl<R: CommandRunner> InfraProvider for GcloudProvider<R> {
    async fn describe(&self, id: &ResourceId) -> InfraResult<Option<ObservedResource>> {
        let name = id.name.as_str();
        let found = match id.kind {
            ResourceKind::Network => {
                self.exists(&args(["compute", "networks", "describe", name]))
                    .await?
            }
            ResourceKind::Subnet => {
                let region = format!("--region={}", self.region);
                self.exists(&args(["compute", "networks", "subnets", "describe", name, &region]))
                    .await?
            }
            ResourceKind::Firewall => {
                self.exists(&args(["compute", "firewall-rules", "describe", name]))
                    .await?
            }
            ResourceKind::Secret => self.exists(&args(["secrets", "describe", name])).await?,
            ResourceKind::ServiceAccount => {
                let email = self.account_email(name)?;
                if !self
                    .exists(&args(["iam", "service-accounts", "describe", &email]))
                    .await?
                {
                    return Ok(None);
                }
                let roles = self.account_roles(&email).await?;
                return Ok(Some(ObservedResource { roles }));
            }
            ResourceKind::Instance => {
                return Err(InfraError::new(
                    InfraErrorKind::Failed,
                    "instances are described by zone",
                ));
            }
        };
        Ok(found.then(ObservedResource::default))
    }

    async fn ensure_network(&self, name: &str) -> InfraResult<()> {
        self.exec(&args(["compute", "networks", "create", name, "--subnet-mode=custom"]))
            .await
            .map(drop)
    }

    async fn ensure_subnet(
        &self,
        name: &str,
        network: &str,
        region: &str,
        cidr: &str,
    ) -> InfraResult<()> {
        self.exec(&args([
            "compute",
            "networks",
            "subnets",
            "create",
            name,
            &format!("--network={network}"),
            &format!("--region={region}"),
            &format!("--range={cidr}"),
            "--enable-private-ip-google-access",
        ]))
        .await
        .map(drop)
    }

    async fn ensure_firewall(&self, name: &str, rule: &FirewallRule) -> InfraResult<()> {
        let action = match rule.action {
            FirewallAction::Allow => "ALLOW",
            FirewallAction::Deny => "DENY",
        };
        self.exec(&args([
            "compute",
            "firewall-rules",
            "create",
            name,
            &format!("--network={}", rule.network),
            "--direction=INGRESS",
            &format!("--action={action}"),
            &format!("--rules={}", rule.rules.join(",")),
            &format!("--source-ranges={}", rule.source_ranges.join(",")),
            &format!("--target-tags={}", rule.target_tag),
            &format!("--priority={}", rule.priority),
        ]))
        .await
        .map(drop)
    }

    async fn create_service_account(
        &self,
        account_id: &str,
        display_name: &str,
    ) -> InfraResult<()> {
        self.exec(&args([
            "iam",
            "service-accounts",
            "create",
            account_id,
            &format!("--display-name={display_name}"),
        ]))
        .await
        .map(drop)
    }

    async fn bind_roles(&self, account_id: &str, roles: &[String]) -> InfraResult<()> {
        let member = format!("--member=serviceAccount:{}", self.account_email(account_id)?);
        let project = self.project()?;
        for role in roles {
            self.exec(&args([
                "projects",
                "add-iam-policy-binding",
                &project,
                &member,
                &format!("--role={role}"),
                "--condition=None",
            ]))
            .await?;
        }
        Ok(())
    }

    async fn create_secret(&self, name: &str) -> InfraResult<()> {
        self.exec(&args([
            "secrets",
            "create",
            name,
            "--replication-policy=automatic",
        ]))
        .await
        .map(drop)
    }

    async fn add_secret_version(&self, name: &str, data: &[u8]) -> InfraResult<u64> {
        let output = self
            .exec_stdin(
                &args(["secrets", "versions", "add", name, "--data-file=-", "--format=json"]),
                data,
            )
            .await?;
        let created: VersionJson = serde_json::from_slice(&output.stdout).map_err(|e| {
            InfraError::new(InfraErrorKind::Failed, format!("unexpected version output: {e}"))
        })?;
        version_number(&created.name).ok_or_else(|| {
            InfraError::new(
                InfraErrorKind::Failed,
                format!("cannot read version number from '{}'", created.name),
            )
        })
    }

    async fn latest_secret_version(&self, name: &str) -> InfraResult<Option<SecretVersion>> {
        let secret = format!("--secret={name}");
        let described: VersionJson = match self
            .exec_json(&args(["secrets", "versions", "describe", "latest", &secret]))
            .await
        {
            Ok(v) => v,
            Err(e) if e.kind == InfraErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let Some(version) = version_number(&described.name) else {
            return Ok(None);
        };
        let output = self
            .exec(&args([
                "secrets",
                "versions",
                "access",
                &version.to_string(),
                &secret,
            ]))
            .await?;
        Ok(Some(SecretVersion {
            version,
            data: output.stdout,
        }))
    }

    async fn describe_instance(
        &self,
        name: &str,
        zone: &str,
    ) -> InfraResult<Option<InstanceDescription>> {
        let zone_flag = format!("--zone={zone}");
        let found: InstanceJson = match self
            .exec_json(&args(["compute", "instances", "describe", name, &zone_flag]))
            .await
        {
            Ok(found) => found,
            Err(e) if e.kind == InfraErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let phase = found
            .metadata
            .items
            .iter()
            .find(|item| item.key == PHASE_METADATA_KEY)
            .and_then(|item| match item.value.parse::<BootstrapPhase>() {
                Ok(phase) => Some(phase),
                Err(e) => {
                    tracing::warn!(instance = name, value = %item.value, error = %e, "ignoring unknown bootstrap phase");
                    None
                }
            });
        Ok(Some(InstanceDescription {
            name: found.name,
            // The API returns the zone as a URL.
            zone: found
                .zone
                .rsplit('/')
                .next()
                .unwrap_or(zone)
                .to_string(),
            status: live_status(&found.status),
            bootstrap_phase: phase,
        }))
    }

    async fn create_instance(&self, name: &str, spec: &InstanceSpec) -> InfraResult<()> {
        let metadata = spec
            .metadata
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",");
        let mut cmd = args([
            "compute",
            "instances",
            "create",
            name,
            &format!("--zone={}", spec.zone),
            &format!("--machine-type={}", spec.machine_type),
            &format!("--boot-disk-size={}GB", spec.disk_gb),
            &format!("--subnet={}", spec.subnet),
            "--no-address",
            &format!("--tags={}", spec.network_tag),
            &format!("--service-account={}", self.account_email(&spec.service_account)?),
            "--scopes=cloud-platform",
            &format!("--image-family={}", spec.image_family),
            &format!("--image-project={}", spec.image_project),
            "--shielded-secure-boot",
        ]);
        if !metadata.is_empty() {
            cmd.push(format!("--metadata={metadata}"));
        }
        self.exec(&cmd).await.map(drop)
    }

    async fn start_instance(&self, name: &str, zone: &str) -> InfraResult<()> {
        self.exec(&args(["compute", "instances", "start", name, &format!("--zone={zone}")]))
            .await
            .map(drop)
    }

    async fn stop_instance(&self, name: &str, zone: &str) -> InfraResult<()> {
        self.exec(&args(["compute", "instances", "stop", name, &format!("--zone={zone}")]))
            .await
            .map(drop)
    }
}

impl<R: CommandRunner> CloudSession for GcloudProvider<R> {
    async fn active_account(&self) -> InfraResult<Option<String>> {
        let output = self
            .exec(&args([
                "auth",
                "list",
                "--filter=status:ACTIVE",
                "--format=value(account)",
            ]))
            .await?;
        let account = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok((!account.is_empty()).then_some(account))
    }

    async fn resolve_project(&self, requested: Option<&str>) -> InfraResult<String> {
        let project = match requested {
            Some(project) => {
                self.exec(&args(["projects", "describe", project, "--format=value(projectId)"]))
                    .await?;
                project.to_string()
            }
            None => {
                let output = self.exec(&args(["config", "get-value", "project"])).await?;
                let project = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if project.is_empty() || project == "(unset)" {
                    return Err(InfraError::new(
                        InfraErrorKind::Failed,
                        "no project given and no default project configured; pass --project",
                    ));
                }
                project
            }
        };
        *self.project.lock().unwrap_or_else(PoisonError::into_inner) = Some(project.clone());
        Ok(project)
    }

    async fn enable_apis(&self, project: &str, apis: &[&str]) -> InfraResult<()> {
        let mut cmd = args(["services", "enable"]);
        cmd.extend(apis.iter().map(|a| (*a).to_string()));
        if self.current_project().is_none() {
            cmd.push(format!("--project={project}"));
        }
        self.exec(&cmd).await.map(drop)
    }
}
