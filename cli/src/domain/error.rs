//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

// ── Infrastructure errors ─────────────────────────────────────────────────────

/// Classification of a failed collaborator call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InfraErrorKind {
    NotFound,
    AlreadyExists,
    PermissionDenied,
    QuotaExceeded,
    BillingDisabled,
    Transient,
    Timeout,
    /// Anything the provider reported that fits no other class.
    Failed,
}

impl InfraErrorKind {
    /// Worth retrying in-process after a short backoff.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Transient | Self::Timeout)
    }

    /// Fatal for this run, but a re-run succeeds once the operator fixes the account.
    #[must_use]
    pub fn is_fatal_resumable(self) -> bool {
        matches!(self, Self::QuotaExceeded | Self::BillingDisabled)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not found",
            Self::AlreadyExists => "already exists",
            Self::PermissionDenied => "permission denied",
            Self::QuotaExceeded => "quota exceeded",
            Self::BillingDisabled => "billing disabled",
            Self::Transient => "transient failure",
            Self::Timeout => "timed out",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for InfraErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified collaborator failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct InfraError {
    pub kind: InfraErrorKind,
    pub message: String,
}

impl InfraError {
    pub fn new(kind: InfraErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// A reconciliation or lifecycle stage that failed, e.g. `firewall/agents-deny-external`.
#[derive(Debug, Error)]
#[error("stage '{stage}' failed ({retry}): {source}", retry = retry_hint(source))]
pub struct ProvisionError {
    pub stage: String,
    #[source]
    pub source: InfraError,
}

impl ProvisionError {
    pub fn new(stage: impl Into<String>, source: InfraError) -> Self {
        Self {
            stage: stage.into(),
            source,
        }
    }

    /// Whether re-running the same command may succeed without operator action.
    #[must_use]
    pub fn retryable(&self) -> bool {
        self.source.kind.is_retryable()
    }
}

fn retry_hint(source: &InfraError) -> &'static str {
    match source.kind {
        kind if kind.is_retryable() => "retryable",
        kind if kind.is_fatal_resumable() => "fix quota or billing, then re-run",
        InfraErrorKind::PermissionDenied => "grant the missing permission, then re-run",
        _ => "not retryable",
    }
}

/// A plane setup step that failed; the progress marker stays at the previous step.
#[derive(Debug, Error)]
#[error("setup step {index} ({step}) failed: {source}")]
pub struct SetupError {
    pub index: u32,
    pub step: &'static str,
    #[source]
    pub source: anyhow::Error,
}

// ── Validation errors ─────────────────────────────────────────────────────────

/// Input rejected before any side effect is attempted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid owner identifier '{0}': expected an e-mail address.")]
    InvalidOwner(String),

    #[error("Monthly budget {value} USD is out of range ({min}-{max}).")]
    BudgetOutOfRange { value: u32, min: u32, max: u32 },

    #[error("Disk size {value} GB is out of range ({min}-{max}).")]
    DiskOutOfRange { value: u32, min: u32, max: u32 },

    #[error("Invalid model identifier '{0}'.")]
    InvalidModel(String),

    #[error("Invalid machine type '{0}'.")]
    InvalidMachineType(String),

    #[error("Invalid plane name '{0}': must match ^[a-z]([a-z0-9-]{{0,18}}[a-z0-9])?$")]
    InvalidPlaneName(String),

    #[error("Invalid value '{value}' for directory attribute '{key}'.")]
    InvalidAttribute { key: String, value: String },

    #[error("Plane is not configured. Run 'plane create-plane' first.")]
    PlaneNotConfigured,

    #[error("Owner '{owner}' maps to instance '{instance}', which already belongs to '{existing}'.")]
    NameCollision {
        owner: String,
        instance: String,
        existing: String,
    },
}

// ── Exit classification ───────────────────────────────────────────────────────

/// How a failed command is reported: process exit code plus a stable label
/// for `--json` error objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureClass {
    pub exit_code: u8,
    pub code: &'static str,
}

impl FailureClass {
    pub const INTERNAL: Self = Self {
        exit_code: 1,
        code: "internal",
    };
    pub const VALIDATION: Self = Self {
        exit_code: 10,
        code: "validation",
    };
    pub const INFRA: Self = Self {
        exit_code: 20,
        code: "infra",
    };
    pub const QUOTA: Self = Self {
        exit_code: 21,
        code: "quota",
    };
    pub const TRANSIENT: Self = Self {
        exit_code: 22,
        code: "transient",
    };
    pub const PERMISSION: Self = Self {
        exit_code: 30,
        code: "permission",
    };

    #[must_use]
    pub fn for_infra(kind: InfraErrorKind) -> Self {
        match kind {
            InfraErrorKind::PermissionDenied => Self::PERMISSION,
            InfraErrorKind::QuotaExceeded | InfraErrorKind::BillingDisabled => Self::QUOTA,
            InfraErrorKind::Transient | InfraErrorKind::Timeout => Self::TRANSIENT,
            _ => Self::INFRA,
        }
    }
}

/// Classify an error chain by the first typed error found in it.
#[must_use]
pub fn classify_failure(err: &anyhow::Error) -> FailureClass {
    for cause in err.chain() {
        if cause.downcast_ref::<ValidationError>().is_some() {
            return FailureClass::VALIDATION;
        }
        if let Some(infra) = cause.downcast_ref::<InfraError>() {
            return FailureClass::for_infra(infra.kind);
        }
    }
    FailureClass::INTERNAL
}
