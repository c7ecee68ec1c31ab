//! One heartbeat tick: observe, plan, act, persist.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use plane_common::{
    BootstrapPhase, Effect, HandshakePolicy, HandshakeState, HeartbeatConfig, Observation,
    OnboardingStep, SecretPayload, answers_prompt, matches_trigger, plan,
};

use crate::messages;
use crate::ports::{Messaging, Pairing, Runtime, SecretVault};
use crate::store::{ArtifactDir, StateFile};

/// Upper bound on transitions taken within a single tick.
const MAX_STEPS_PER_TICK: usize = 8;

pub struct Heartbeat<B> {
    bridge: B,
    config: HeartbeatConfig,
    policy: HandshakePolicy,
    state: StateFile,
    artifacts: ArtifactDir,
}

impl<B> Heartbeat<B>
where
    B: Messaging + Pairing + SecretVault + Runtime,
{
    pub fn new(bridge: B, config: HeartbeatConfig) -> Self {
        Self {
            policy: config.policy(),
            state: StateFile::new(&config.state_dir),
            artifacts: ArtifactDir::new(&config.state_dir),
            bridge,
            config,
        }
    }

    /// Advance the handshake as far as the outside world allows right now.
    ///
    /// A transition is persisted only after all of its effects succeeded. A
    /// failed effect leaves the stored state untouched, so the same
    /// transition is retried on the next tick. Phase changes chain within one
    /// tick until the handshake has to wait for the owner again.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<BootstrapPhase> {
        let mut state = self
            .state
            .load()
            .await?
            .unwrap_or_else(|| HandshakeState::new(now));

        for _ in 0..MAX_STEPS_PER_TICK {
            let observation = self.observe(&state).await?;
            let transition = plan(&state, &observation, now, &self.policy);
            if transition.is_noop(&state) {
                break;
            }

            let mut next = transition.next;
            for effect in &transition.effects {
                if let Err(e) = self.apply(effect, &mut next).await {
                    tracing::warn!(
                        phase = %state.phase.as_string(),
                        error = %format!("{e:#}"),
                        "handshake step failed, retrying next tick"
                    );
                    return Ok(state.phase);
                }
            }

            self.state.save(&next).await?;
            let changed = next.phase != state.phase;
            if changed {
                tracing::info!(
                    from = %state.phase.as_string(),
                    to = %next.phase.as_string(),
                    "bootstrap phase changed"
                );
                if let Err(e) = self.bridge.publish_phase(next.phase).await {
                    tracing::warn!(error = %format!("{e:#}"), "failed to publish phase");
                }
            }
            state = next;
            if !changed {
                break;
            }
        }
        Ok(state.phase)
    }

    async fn observe(&self, state: &HandshakeState) -> Result<Observation> {
        let owner = &self.config.owner;
        let observation = match state.phase {
            BootstrapPhase::AwaitingConnectReply => {
                let replies = self
                    .bridge
                    .list_unread(owner)
                    .await
                    .context("failed to list owner messages")?
                    .into_iter()
                    .filter(|m| matches_trigger(&m.body, &self.config.trigger_phrase))
                    .collect();
                Observation::ConnectReplies(replies)
            }
            BootstrapPhase::PairingSent => Observation::Link {
                linked: self
                    .bridge
                    .is_linked()
                    .await
                    .context("failed to check link status")?,
            },
            BootstrapPhase::Onboarding(step) => {
                let artifact_present = self.artifacts.exists(step).await?;
                let awaiting_reply = !artifact_present
                    && step != OnboardingStep::Engage
                    && state.prompted == Some(step);
                let reply = if awaiting_reply {
                    self.bridge
                        .list_unread(owner)
                        .await
                        .context("failed to list owner messages")?
                        .into_iter()
                        .find(|m| answers_prompt(state, m))
                } else {
                    None
                };
                Observation::Onboarding {
                    artifact_present,
                    reply,
                }
            }
            BootstrapPhase::WelcomePending
            | BootstrapPhase::Connected
            | BootstrapPhase::Complete => Observation::Tick,
        };
        Ok(observation)
    }

    async fn apply(&self, effect: &Effect, next: &mut HandshakeState) -> Result<()> {
        let owner = &self.config.owner;
        let trigger = &self.config.trigger_phrase;
        match effect {
            Effect::SendWelcome => {
                self.bridge
                    .send_text(owner, &messages::welcome(trigger))
                    .await
            }
            Effect::MarkRead(id) => self.bridge.mark_read(id).await,
            Effect::IssuePairing => {
                let artifact = self
                    .bridge
                    .issue(self.config.pairing_validity_secs)
                    .await
                    .context("failed to generate pairing artifact")?;
                let caption = messages::pairing_caption(self.config.pairing_validity_secs, trigger);
                self.bridge
                    .send_image(owner, &artifact.image_path, &caption)
                    .await?;
                tracing::info!(pairing_id = %artifact.id, "pairing artifact delivered");
                next.pairing_id = Some(artifact.id);
                Ok(())
            }
            Effect::SendGreeting => self.bridge.send_text(owner, messages::greeting()).await,
            Effect::NotifyExpired => {
                self.bridge
                    .send_text(owner, &messages::expired(trigger))
                    .await
            }
            Effect::EscalateToAdmin { expiries } => {
                let Some(admin) = &self.config.admin_contact else {
                    return Ok(());
                };
                tracing::warn!(expiries, "pairing keeps expiring, notifying administrator");
                self.bridge
                    .send_text(admin, &messages::escalation(owner, *expiries))
                    .await
            }
            Effect::SendPrompt(step) => {
                self.bridge.send_text(owner, messages::prompt(*step)).await?;
                self.discard_unanswerable(next).await
            }
            Effect::WriteArtifact { step, content } => self.artifacts.write(*step, content).await,
            Effect::StoreCredential(credential) => self.store_credential(credential).await,
            Effect::DeleteMessage(id) => self.bridge.delete(id).await,
            Effect::RestartRuntime => self
                .bridge
                .restart()
                .await
                .context("failed to restart agent runtime"),
            Effect::RejectCredential => {
                self.bridge
                    .send_text(owner, messages::credential_rejected())
                    .await
            }
            Effect::SendEngagement => self.bridge.send_text(owner, messages::engagement()).await,
        }
    }

    /// Mark read every owner message that predates the prompt just sent.
    async fn discard_unanswerable(&self, next: &HandshakeState) -> Result<()> {
        let stale: Vec<_> = self
            .bridge
            .list_unread(&self.config.owner)
            .await
            .context("failed to list owner messages")?
            .into_iter()
            .filter(|m| !answers_prompt(next, m))
            .collect();
        for message in &stale {
            self.bridge.mark_read(&message.id).await?;
        }
        if !stale.is_empty() {
            tracing::debug!(count = stale.len(), "older messages marked read");
        }
        Ok(())
    }

    /// Append a secret version carrying the owner's credential on top of the
    /// current runtime configuration.
    async fn store_credential(&self, credential: &str) -> Result<()> {
        let secret = &self.config.secret_name;
        let raw = self
            .bridge
            .latest(secret)
            .await?
            .with_context(|| format!("secret {secret} has no versions"))?;
        let mut payload: SecretPayload = serde_json::from_slice(&raw)
            .with_context(|| format!("secret {secret} holds no runtime configuration"))?;
        payload.credential = Some(credential.to_string());
        let data = serde_json::to_vec(&payload).context("failed to serialize secret payload")?;
        let version = self.bridge.add_version(secret, &data).await?;
        tracing::info!(secret = %secret, version, "credential stored");
        Ok(())
    }
}
