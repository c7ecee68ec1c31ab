//! In-instance heartbeat.
//!
//! Loads configuration from `PLANE_HEARTBEAT_*` environment variables and
//! advances the bootstrap handshake once per interval until stopped.

mod bridge;
mod driver;
mod messages;
mod ports;
mod store;

use std::time::Duration;

use anyhow::{Context, Result};
use plane_common::HeartbeatConfig;
use tokio::time::MissedTickBehavior;
use tracing_subscriber::EnvFilter;

use crate::bridge::BridgeClient;
use crate::driver::Heartbeat;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config: HeartbeatConfig = envy::prefixed("PLANE_HEARTBEAT_").from_env().context(
        "failed to load config from PLANE_HEARTBEAT_* env vars \
         (PLANE_HEARTBEAT_OWNER and PLANE_HEARTBEAT_SECRET_NAME are required)",
    )?;

    tracing::info!(
        owner = %config.owner,
        state_dir = %config.state_dir.display(),
        interval_secs = config.interval_secs,
        escalation = config.admin_contact.is_some(),
        "heartbeat starting"
    );

    let bridge = BridgeClient::new(
        config.bridge.clone(),
        Duration::from_secs(config.bridge_timeout_secs),
    );
    let mut ticker = tokio::time::interval(Duration::from_secs(config.interval_secs.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let heartbeat = Heartbeat::new(bridge, config);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match heartbeat.tick(chrono::Utc::now()).await {
                    Ok(phase) => tracing::debug!(phase = %phase.as_string(), "tick done"),
                    Err(e) => tracing::warn!(error = %format!("{e:#}"), "tick failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                break;
            }
        }
    }
    Ok(())
}
