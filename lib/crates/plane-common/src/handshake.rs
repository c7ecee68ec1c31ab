//! Bootstrap handshake transitions.
//!
//! `plan` is a pure function of the current state, what the heartbeat
//! observed this tick, and the clock. It returns the next state plus the
//! side effects that must all succeed before that state may be persisted.
//! The heartbeat driver owns every I/O call.

use std::sync::LazyLock;

use chrono::{DateTime, TimeDelta, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::types::{BootstrapPhase, InboundMessage, OnboardingStep};

/// Timing and escalation knobs for the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakePolicy {
    /// How long a pairing artifact stays valid.
    pub pairing_validity: TimeDelta,
    /// Heartbeat interval; one tick is allowed as margin before expiry.
    pub tick_interval: TimeDelta,
    /// Expiries after which an administrator is notified (once).
    pub max_expiries: u32,
    /// Whether an administrator contact exists.
    pub can_escalate: bool,
}

impl HandshakePolicy {
    /// Deadline after which an unlinked pairing is treated as expired.
    #[must_use]
    pub fn expiry_window(&self) -> TimeDelta {
        self.pairing_validity + self.tick_interval
    }
}

/// Persisted handshake progress for one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeState {
    pub phase: BootstrapPhase,
    /// When the current pairing artifact was delivered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pairing_sent_at: Option<DateTime<Utc>>,
    /// Identifier of the current pairing artifact, filled in by the driver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pairing_id: Option<String>,
    /// Consecutive pairing expiries since the last successful link.
    #[serde(default)]
    pub expiries: u32,
    #[serde(default)]
    pub escalated: bool,
    /// Onboarding step whose prompt has already been sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompted: Option<OnboardingStep>,
    /// When that prompt went out; only later messages answer it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompted_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl HandshakeState {
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            phase: BootstrapPhase::WelcomePending,
            pairing_sent_at: None,
            pairing_id: None,
            expiries: 0,
            escalated: false,
            prompted: None,
            prompted_at: None,
            updated_at: now,
        }
    }
}

/// What the driver observed on this tick for the current phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// Nothing to query in this phase.
    Tick,
    /// Unread owner messages matching the trigger phrase, oldest first.
    ConnectReplies(Vec<InboundMessage>),
    /// Whether the messaging channel reports a successful link.
    Link { linked: bool },
    /// Onboarding: whether the step's artifact exists, and the owner's
    /// oldest unread reply received after the prompt (if any).
    Onboarding {
        artifact_present: bool,
        reply: Option<InboundMessage>,
    },
}

/// Side effects the driver performs, in order, for one transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    SendWelcome,
    MarkRead(String),
    /// Generate a fresh pairing artifact and deliver it to the owner.
    IssuePairing,
    SendGreeting,
    NotifyExpired,
    EscalateToAdmin { expiries: u32 },
    SendPrompt(OnboardingStep),
    WriteArtifact { step: OnboardingStep, content: String },
    StoreCredential(String),
    DeleteMessage(String),
    RestartRuntime,
    RejectCredential,
    SendEngagement,
}

/// Result of `plan`: the candidate next state and the effects gating it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: HandshakeState,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn stay(state: &HandshakeState) -> Self {
        Self {
            next: state.clone(),
            effects: Vec::new(),
        }
    }

    /// True when neither the state nor the outside world changes.
    #[must_use]
    pub fn is_noop(&self, current: &HandshakeState) -> bool {
        self.effects.is_empty() && self.next == *current
    }
}

/// Compute the next handshake state.
#[must_use]
pub fn plan(
    state: &HandshakeState,
    observation: &Observation,
    now: DateTime<Utc>,
    policy: &HandshakePolicy,
) -> Transition {
    let mut next = state.clone();
    let mut effects = Vec::new();

    match (state.phase, observation) {
        (BootstrapPhase::WelcomePending, _) => {
            effects.push(Effect::SendWelcome);
            next.phase = BootstrapPhase::AwaitingConnectReply;
        }
        (BootstrapPhase::AwaitingConnectReply, Observation::ConnectReplies(replies))
            if !replies.is_empty() =>
        {
            // Replies are consumed only once the artifact went out.
            effects.push(Effect::IssuePairing);
            effects.extend(replies.iter().map(|m| Effect::MarkRead(m.id.clone())));
            next.phase = BootstrapPhase::PairingSent;
            next.pairing_sent_at = Some(now);
            next.pairing_id = None;
        }
        (BootstrapPhase::PairingSent, Observation::Link { linked: true }) => {
            effects.push(Effect::SendGreeting);
            next.phase = BootstrapPhase::Connected;
            next.pairing_sent_at = None;
            next.pairing_id = None;
            next.expiries = 0;
        }
        (BootstrapPhase::PairingSent, Observation::Link { linked: false }) => {
            let expired = state
                .pairing_sent_at
                .is_none_or(|sent| now - sent > policy.expiry_window());
            if !expired {
                return Transition::stay(state);
            }
            effects.push(Effect::NotifyExpired);
            next.phase = BootstrapPhase::AwaitingConnectReply;
            next.pairing_sent_at = None;
            next.pairing_id = None;
            next.expiries = state.expiries.saturating_add(1);
            if policy.can_escalate && !state.escalated && next.expiries >= policy.max_expiries {
                effects.push(Effect::EscalateToAdmin {
                    expiries: next.expiries,
                });
                next.escalated = true;
            }
        }
        (BootstrapPhase::Connected, _) => {
            next.phase = BootstrapPhase::Onboarding(OnboardingStep::first());
            next.prompted = None;
            next.prompted_at = None;
        }
        (
            BootstrapPhase::Onboarding(step),
            Observation::Onboarding {
                artifact_present,
                reply,
            },
        ) => {
            if *artifact_present {
                advance_onboarding(&mut next, step);
            } else {
                plan_onboarding(state, step, reply.as_ref(), now, &mut next, &mut effects);
            }
        }
        _ => return Transition::stay(state),
    }

    if next != *state || !effects.is_empty() {
        next.updated_at = now;
    }
    Transition { next, effects }
}

fn advance_onboarding(next: &mut HandshakeState, step: OnboardingStep) {
    next.phase = step
        .next()
        .map_or(BootstrapPhase::Complete, BootstrapPhase::Onboarding);
    next.prompted = None;
    next.prompted_at = None;
}

fn plan_onboarding(
    state: &HandshakeState,
    step: OnboardingStep,
    reply: Option<&InboundMessage>,
    now: DateTime<Utc>,
    next: &mut HandshakeState,
    effects: &mut Vec<Effect>,
) {
    if step == OnboardingStep::Engage {
        effects.push(Effect::SendEngagement);
        effects.push(Effect::WriteArtifact {
            step,
            content: now.to_rfc3339(),
        });
        advance_onboarding(next, step);
        return;
    }

    if state.prompted != Some(step) {
        effects.push(Effect::SendPrompt(step));
        next.prompted = Some(step);
        next.prompted_at = Some(now);
        return;
    }

    let Some(reply) = reply.filter(|r| answers_prompt(state, r)) else {
        return;
    };

    if step == OnboardingStep::CredentialMigration {
        match extract_credential(&reply.body) {
            Some(credential) => {
                effects.push(Effect::StoreCredential(credential));
                effects.push(Effect::DeleteMessage(reply.id.clone()));
                effects.push(Effect::RestartRuntime);
                effects.push(Effect::WriteArtifact {
                    step,
                    content: now.to_rfc3339(),
                });
                advance_onboarding(next, step);
            }
            None => {
                effects.push(Effect::MarkRead(reply.id.clone()));
                effects.push(Effect::RejectCredential);
            }
        }
        return;
    }

    effects.push(Effect::MarkRead(reply.id.clone()));
    effects.push(Effect::WriteArtifact {
        step,
        content: reply.body.trim().to_string(),
    });
    advance_onboarding(next, step);
}

/// Whether `message` arrived after the current step's prompt.
#[must_use]
pub fn answers_prompt(state: &HandshakeState, message: &InboundMessage) -> bool {
    state
        .prompted_at
        .is_none_or(|prompted| message.received_at > prompted)
}

#[allow(clippy::expect_used)] // Pattern is a compile-time constant
static CREDENTIAL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(sk-[A-Za-z0-9][A-Za-z0-9_-]{19,})\b").expect("valid credential pattern")
});

/// Pull a provider API credential out of a message body.
#[must_use]
pub fn extract_credential(body: &str) -> Option<String> {
    CREDENTIAL_PATTERN
        .captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Whether `body` contains `phrase` as a whole word, ignoring case.
#[must_use]
pub fn matches_trigger(body: &str, phrase: &str) -> bool {
    let phrase = phrase.trim().to_lowercase();
    if phrase.is_empty() {
        return false;
    }
    body.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| word == phrase)
}
