//! On-disk handshake state and onboarding artifacts.
//!
//! Everything lives under one state directory. Writes go to a temp file that
//! is renamed over the target, so a crash mid-tick leaves either the old or
//! the new content, never a torn file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use plane_common::{HandshakeState, OnboardingStep};

const STATE_FILE: &str = "handshake.json";

async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .with_context(|| format!("{} has no parent directory", path.display()))?;
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("failed to create {}", dir.display()))?;

    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, data)
        .await
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("failed to replace {}", path.display()))
}

/// The persisted `HandshakeState`.
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join(STATE_FILE),
        }
    }

    /// Stored state, or `None` before the first successful tick.
    pub async fn load(&self) -> Result<Option<HandshakeState>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", self.path.display()));
            }
        };
        let state = serde_json::from_slice(&raw)
            .with_context(|| format!("{} is not valid handshake state", self.path.display()))?;
        Ok(Some(state))
    }

    pub async fn save(&self, state: &HandshakeState) -> Result<()> {
        let json = serde_json::to_vec_pretty(state).context("failed to serialize state")?;
        write_atomic(&self.path, &json).await
    }
}

/// Onboarding artifacts, one file per step.
///
/// Presence of a step's file is what marks the step done, so onboarding
/// resumes correctly even if the state file is lost.
#[derive(Debug, Clone)]
pub struct ArtifactDir {
    dir: PathBuf,
}

impl ArtifactDir {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            dir: state_dir.join("onboarding"),
        }
    }

    pub fn path(&self, step: OnboardingStep) -> PathBuf {
        self.dir.join(step.artifact())
    }

    pub async fn exists(&self, step: OnboardingStep) -> Result<bool> {
        let path = self.path(step);
        tokio::fs::try_exists(&path)
            .await
            .with_context(|| format!("failed to check {}", path.display()))
    }

    pub async fn write(&self, step: OnboardingStep, content: &str) -> Result<()> {
        write_atomic(&self.path(step), content.as_bytes()).await
    }
}
