use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Onboarding sub-phase, in the order the instance walks through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStep {
    Identity,
    Personality,
    CredentialMigration,
    Engage,
}

impl OnboardingStep {
    pub const ALL: [OnboardingStep; 4] = [
        OnboardingStep::Identity,
        OnboardingStep::Personality,
        OnboardingStep::CredentialMigration,
        OnboardingStep::Engage,
    ];

    #[must_use]
    pub fn first() -> Self {
        Self::Identity
    }

    /// The step after this one, or `None` after `Engage`.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Identity => Some(Self::Personality),
            Self::Personality => Some(Self::CredentialMigration),
            Self::CredentialMigration => Some(Self::Engage),
            Self::Engage => None,
        }
    }

    /// File name of the artifact whose existence marks this step complete.
    #[must_use]
    pub fn artifact(self) -> &'static str {
        match self {
            Self::Identity => "identity.md",
            Self::Personality => "personality.md",
            Self::CredentialMigration => "credential.migrated",
            Self::Engage => "engaged",
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Personality => "personality",
            Self::CredentialMigration => "credential-migration",
            Self::Engage => "engage",
        }
    }
}

impl fmt::Display for OnboardingStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bootstrap phase of a provisioned instance.
///
/// Owned and mutated only by the instance. The control plane reads the
/// published value back from instance metadata for display.
///
/// Serialized as a flat string (`"pairing_sent"`, `"onboarding:identity"`)
/// so the same form works in state files and instance metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BootstrapPhase {
    WelcomePending,
    AwaitingConnectReply,
    PairingSent,
    Connected,
    Onboarding(OnboardingStep),
    Complete,
}

impl BootstrapPhase {
    #[must_use]
    pub fn as_string(self) -> String {
        match self {
            Self::WelcomePending => "welcome_pending".to_string(),
            Self::AwaitingConnectReply => "awaiting_connect_reply".to_string(),
            Self::PairingSent => "pairing_sent".to_string(),
            Self::Connected => "connected".to_string(),
            Self::Onboarding(step) => format!("onboarding:{step}"),
            Self::Complete => "complete".to_string(),
        }
    }

    /// `Connected` is left on the same tick it is entered.
    #[must_use]
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for BootstrapPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown bootstrap phase: {0}")]
pub struct UnknownPhase(pub String);

impl FromStr for BootstrapPhase {
    type Err = UnknownPhase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let phase = match s {
            "welcome_pending" => Self::WelcomePending,
            "awaiting_connect_reply" => Self::AwaitingConnectReply,
            "pairing_sent" => Self::PairingSent,
            "connected" => Self::Connected,
            "complete" => Self::Complete,
            other => {
                let step = other
                    .strip_prefix("onboarding:")
                    .and_then(|step| {
                        OnboardingStep::ALL
                            .into_iter()
                            .find(|candidate| candidate.as_str() == step)
                    })
                    .ok_or_else(|| UnknownPhase(other.to_string()))?;
                Self::Onboarding(step)
            }
        };
        Ok(phase)
    }
}

impl TryFrom<String> for BootstrapPhase {
    type Error = UnknownPhase;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BootstrapPhase> for String {
    fn from(phase: BootstrapPhase) -> Self {
        phase.as_string()
    }
}

/// Runtime configuration stored in an agent's secret.
///
/// Every provisioning pass appends a new version carrying the current spec;
/// the instance later appends one more with the migrated credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretPayload {
    pub owner: String,
    pub model: String,
    pub monthly_budget_usd: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

/// One message read from the messaging channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    pub from: String,
    pub body: String,
    pub received_at: DateTime<Utc>,
}
