use std::path::PathBuf;

use chrono::TimeDelta;
use serde::Deserialize;

use crate::handshake::HandshakePolicy;

/// In-instance heartbeat configuration.
///
/// Deserialized from `PLANE_HEARTBEAT_*` environment variables by the
/// heartbeat binary; every field except `owner` and `secret_name` has a
/// default.
#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatConfig {
    /// Owner identifier (e-mail) the instance belongs to.
    pub owner: String,

    /// Secret holding the agent's runtime configuration.
    pub secret_name: String,

    /// Seconds between heartbeat ticks.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Seconds a pairing artifact stays valid.
    #[serde(default = "default_pairing_validity_secs")]
    pub pairing_validity_secs: u64,

    /// Word the owner replies with to request a pairing artifact.
    #[serde(default = "default_trigger_phrase")]
    pub trigger_phrase: String,

    /// Consecutive expiries before the administrator is notified.
    #[serde(default = "default_max_expiries")]
    pub max_expiries: u32,

    /// Administrator address for escalation; escalation is off when unset.
    pub admin_contact: Option<String>,

    /// Directory for handshake state and onboarding artifacts.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Program that talks to the messaging, pairing and secret services.
    #[serde(default = "default_bridge")]
    pub bridge: String,

    /// Upper bound for a single bridge call.
    #[serde(default = "default_bridge_timeout_secs")]
    pub bridge_timeout_secs: u64,
}

fn default_interval_secs() -> u64 {
    300
}

fn default_pairing_validity_secs() -> u64 {
    60
}

fn default_trigger_phrase() -> String {
    "connect".to_string()
}

fn default_max_expiries() -> u32 {
    3
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("/var/lib/agents-plane")
}

fn default_bridge() -> String {
    "plane-bridge".to_string()
}

fn default_bridge_timeout_secs() -> u64 {
    30
}

impl HeartbeatConfig {
    /// Handshake policy derived from this configuration.
    #[must_use]
    pub fn policy(&self) -> HandshakePolicy {
        HandshakePolicy {
            pairing_validity: secs(self.pairing_validity_secs),
            tick_interval: secs(self.interval_secs),
            max_expiries: self.max_expiries.max(1),
            can_escalate: self.admin_contact.is_some(),
        }
    }
}

fn secs(value: u64) -> TimeDelta {
    TimeDelta::seconds(i64::try_from(value).unwrap_or(i64::MAX / 1000))
}
