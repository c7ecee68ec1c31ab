//! Collaborators the heartbeat drives. Production reaches all of them
//! through the bridge program; tests use in-memory fakes.

use std::path::PathBuf;

use anyhow::Result;
use plane_common::{BootstrapPhase, InboundMessage};

/// A freshly generated pairing artifact, ready to be shown to the owner.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct PairingArtifact {
    pub id: String,
    /// Image the owner scans to link the channel.
    pub image_path: PathBuf,
}

/// Messaging channel to the owner and the administrator.
#[allow(async_fn_in_trait)]
pub trait Messaging {
    async fn send_text(&self, to: &str, body: &str) -> Result<()>;
    async fn send_image(&self, to: &str, image: &std::path::Path, caption: &str) -> Result<()>;
    /// Unread messages from `from`, oldest first.
    async fn list_unread(&self, from: &str) -> Result<Vec<InboundMessage>>;
    async fn mark_read(&self, id: &str) -> Result<()>;
    async fn delete(&self, id: &str) -> Result<()>;
}

/// Device-linking service behind the pairing artifact.
#[allow(async_fn_in_trait)]
pub trait Pairing {
    async fn issue(&self, validity_secs: u64) -> Result<PairingArtifact>;
    async fn is_linked(&self) -> Result<bool>;
}

/// The agent's configuration secret.
#[allow(async_fn_in_trait)]
pub trait SecretVault {
    /// Latest version's payload, or `None` when the secret has no versions.
    async fn latest(&self, secret: &str) -> Result<Option<Vec<u8>>>;
    /// Append a version; returns its number.
    async fn add_version(&self, secret: &str, data: &[u8]) -> Result<u64>;
}

/// The agent runtime on this instance and its metadata.
#[allow(async_fn_in_trait)]
pub trait Runtime {
    async fn restart(&self) -> Result<()>;
    /// Publish the phase where the control plane can read it back.
    async fn publish_phase(&self, phase: BootstrapPhase) -> Result<()>;
}
