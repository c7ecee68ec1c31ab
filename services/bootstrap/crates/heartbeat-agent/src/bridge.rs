//! Collaborator adapter: one bridge program invocation per call.
//!
//! The bridge is invoked as `<bridge> <subcommand> [--flag value..]`, reads
//! bulk input on stdin and answers with JSON on stdout. A non-zero exit is a
//! failure; its stderr becomes the error message.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::Result;
use plane_common::{BootstrapPhase, InboundMessage};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::ports::{Messaging, Pairing, PairingArtifact, Runtime, SecretVault};

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("{subcommand} timed out after {secs}s")]
    Timeout { subcommand: String, secs: u64 },
    #[error("{subcommand} failed: {stderr}")]
    Failed { subcommand: String, stderr: String },
    #[error("{subcommand} returned unexpected output: {source}")]
    Decode {
        subcommand: String,
        source: serde_json::Error,
    },
}

#[derive(Debug, Deserialize)]
struct LinkStatus {
    linked: bool,
}

#[derive(Debug, Deserialize)]
struct CreatedVersion {
    version: u64,
}

/// Bridge program client implementing every collaborator port.
pub struct BridgeClient {
    program: String,
    timeout: Duration,
}

impl BridgeClient {
    #[must_use]
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    async fn call(
        &self,
        subcommand: &str,
        flags: &[(&str, &str)],
        stdin: Option<&[u8]>,
    ) -> Result<Vec<u8>, BridgeError> {
        let mut command = Command::new(&self.program);
        command.arg(subcommand);
        for (flag, value) in flags {
            command.arg(format!("--{flag}")).arg(value);
        }
        command
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        tracing::debug!(subcommand, "bridge call");

        let mut child = command.spawn().map_err(|source| BridgeError::Spawn {
            program: self.program.clone(),
            source,
        })?;
        let pipe = child.stdin.take();
        let exchange = async move {
            if let (Some(mut pipe), Some(input)) = (pipe, stdin) {
                // A child that exits early closes the pipe; its exit status reports why.
                let _ = pipe.write_all(input).await;
            }
            child.wait_with_output().await
        };

        // The deadline covers feeding stdin too. Dropping the future on
        // timeout drops the child, which kills it.
        let output = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| BridgeError::Timeout {
                subcommand: subcommand.to_string(),
                secs: self.timeout.as_secs(),
            })?
            .map_err(|source| BridgeError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(BridgeError::Failed {
                subcommand: subcommand.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }

    async fn call_json<T: DeserializeOwned>(
        &self,
        subcommand: &str,
        flags: &[(&str, &str)],
        stdin: Option<&[u8]>,
    ) -> Result<T, BridgeError> {
        let stdout = self.call(subcommand, flags, stdin).await?;
        serde_json::from_slice(&stdout).map_err(|source| BridgeError::Decode {
            subcommand: subcommand.to_string(),
            source,
        })
    }
}

impl Messaging for BridgeClient {
    async fn send_text(&self, to: &str, body: &str) -> Result<()> {
        self.call("send-text", &[("to", to)], Some(body.as_bytes()))
            .await?;
        Ok(())
    }

    async fn send_image(&self, to: &str, image: &Path, caption: &str) -> Result<()> {
        let file = image.to_string_lossy();
        self.call(
            "send-image",
            &[("to", to), ("file", &file)],
            Some(caption.as_bytes()),
        )
        .await?;
        Ok(())
    }

    async fn list_unread(&self, from: &str) -> Result<Vec<InboundMessage>> {
        let mut messages: Vec<InboundMessage> =
            self.call_json("list-unread", &[("from", from)], None).await?;
        messages.sort_by_key(|m| m.received_at);
        Ok(messages)
    }

    async fn mark_read(&self, id: &str) -> Result<()> {
        self.call("mark-read", &[("id", id)], None).await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.call("delete", &[("id", id)], None).await?;
        Ok(())
    }
}

impl Pairing for BridgeClient {
    async fn issue(&self, validity_secs: u64) -> Result<PairingArtifact> {
        let validity = validity_secs.to_string();
        Ok(self
            .call_json("pair", &[("validity-secs", &validity)], None)
            .await?)
    }

    async fn is_linked(&self) -> Result<bool> {
        let status: LinkStatus = self.call_json("link-status", &[], None).await?;
        Ok(status.linked)
    }
}

impl SecretVault for BridgeClient {
    async fn latest(&self, secret: &str) -> Result<Option<Vec<u8>>> {
        let data = self.call("secret-latest", &[("secret", secret)], None).await?;
        Ok((!data.is_empty()).then_some(data))
    }

    async fn add_version(&self, secret: &str, data: &[u8]) -> Result<u64> {
        let created: CreatedVersion = self
            .call_json("secret-add", &[("secret", secret)], Some(data))
            .await?;
        Ok(created.version)
    }
}

impl Runtime for BridgeClient {
    async fn restart(&self) -> Result<()> {
        self.call("restart-runtime", &[], None).await?;
        Ok(())
    }

    async fn publish_phase(&self, phase: BootstrapPhase) -> Result<()> {
        self.call("publish-phase", &[("phase", &phase.as_string())], None)
            .await?;
        Ok(())
    }
}
