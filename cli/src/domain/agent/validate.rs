//! Pure agent validation and name derivation: no I/O, no async.
//!
//! Every derived name is a function of the owner identifier alone, so
//! re-deriving on a later run always lands on the same resources.

use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

use crate::domain::error::ValidationError;

/// Owner identifiers are e-mail addresses from the identity directory.
pub static OWNER_RE: LazyLock<Regex> = LazyLock::new(|| {
    // Safety: this is a compile-time constant pattern; cannot fail.
    #[allow(clippy::expect_used)]
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}$")
        .expect("valid regex")
});

pub static MODEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^[a-z0-9][a-z0-9._-]{0,63}$").expect("valid regex")
});

pub static MACHINE_TYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^[a-z][a-z0-9-]{1,62}$").expect("valid regex")
});

pub const BUDGET_RANGE_USD: (u32, u32) = (1, 10_000);
pub const DISK_RANGE_GB: (u32, u32) = (10, 2_000);

const INSTANCE_PREFIX: &str = "agent-";
const MAX_INSTANCE_NAME: usize = 63;
const SERVICE_ACCOUNT_PREFIX: &str = "ag-";
const SERVICE_ACCOUNT_STEM: usize = 18;

/// # Errors
///
/// Returns [`ValidationError::InvalidOwner`] unless `owner` looks like an e-mail address.
pub fn validate_owner(owner: &str) -> Result<(), ValidationError> {
    if OWNER_RE.is_match(owner) {
        Ok(())
    } else {
        Err(ValidationError::InvalidOwner(owner.to_string()))
    }
}

/// # Errors
///
/// Returns [`ValidationError::BudgetOutOfRange`] outside [`BUDGET_RANGE_USD`].
pub fn validate_budget(value: u32) -> Result<(), ValidationError> {
    let (min, max) = BUDGET_RANGE_USD;
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::BudgetOutOfRange { value, min, max })
    }
}

/// # Errors
///
/// Returns [`ValidationError::DiskOutOfRange`] outside [`DISK_RANGE_GB`].
pub fn validate_disk(value: u32) -> Result<(), ValidationError> {
    let (min, max) = DISK_RANGE_GB;
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::DiskOutOfRange { value, min, max })
    }
}

/// # Errors
///
/// Returns [`ValidationError::InvalidModel`] for anything but a short lowercase identifier.
pub fn validate_model(model: &str) -> Result<(), ValidationError> {
    if MODEL_RE.is_match(model) {
        Ok(())
    } else {
        Err(ValidationError::InvalidModel(model.to_string()))
    }
}

/// # Errors
///
/// Returns [`ValidationError::InvalidMachineType`] if the value cannot be a machine type.
pub fn validate_machine_type(machine_type: &str) -> Result<(), ValidationError> {
    if MACHINE_TYPE_RE.is_match(machine_type) {
        Ok(())
    } else {
        Err(ValidationError::InvalidMachineType(machine_type.to_string()))
    }
}

/// Lowercase, replace every non-alphanumeric run with one `-`, trim dashes.
fn sanitize(owner: &str) -> String {
    let mut out = String::with_capacity(owner.len());
    for c in owner.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}

fn truncate_name(name: &str, max: usize) -> &str {
    // `sanitize` output is ASCII, so byte slicing is char-safe.
    let cut = &name[..name.len().min(max)];
    cut.trim_end_matches('-')
}

/// Deterministic instance name for an owner, e.g. `alice@example.com` →
/// `agent-alice-example-com`.
#[must_use]
pub fn derive_instance_name(owner: &str) -> String {
    let full = format!("{INSTANCE_PREFIX}{}", sanitize(owner));
    truncate_name(&full, MAX_INSTANCE_NAME).to_string()
}

/// Service account ids are capped at 30 characters, so a hash suffix keeps
/// truncated stems from colliding.
#[must_use]
pub fn derive_service_account_id(owner: &str) -> String {
    let stem = sanitize(owner);
    let stem = truncate_name(&stem, SERVICE_ACCOUNT_STEM);
    let digest = Sha256::digest(owner.to_ascii_lowercase().as_bytes());
    let suffix = hex_encode(&digest[..4]);
    if stem.is_empty() {
        format!("{SERVICE_ACCOUNT_PREFIX}{suffix}")
    } else {
        format!("{SERVICE_ACCOUNT_PREFIX}{stem}-{suffix}")
    }
}

/// Secret holding the agent's runtime configuration.
#[must_use]
pub fn derive_secret_name(instance_name: &str) -> String {
    format!("{instance_name}-config")
}

pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(char::from(HEX[(b >> 4) as usize]));
        out.push(char::from(HEX[(b & 0xf) as usize]));
    }
    out
}
