//! `plane watch`: poll the directory and apply enable/disable changes.

use std::time::Duration;

use anyhow::Result;
use clap::Args;
use tokio::time::MissedTickBehavior;

use crate::app::AppContext;
use crate::application::ports::ProgressReporter as _;
use crate::application::services::watch::{PollingChangeSource, process_tick};
use crate::domain::UserFilter;

/// Arguments for the watch command.
#[derive(Args, Default)]
pub struct WatchArgs {
    /// Seconds between polls (defaults to the plane's setting)
    #[arg(long)]
    pub interval: Option<u64>,

    /// Poll once and exit
    #[arg(long)]
    pub once: bool,

    /// Report changes without acting on them
    #[arg(long)]
    pub dry_run: bool,
}

/// Run `plane watch` until interrupted.
///
/// # Errors
///
/// Returns an error if the plane is not configured, or with `--once` if the
/// directory cannot be polled.
pub async fn run(args: &WatchArgs, app: &AppContext) -> Result<()> {
    let plane = app.load_plane().await?;
    let provider = app.provider(&plane);
    let directory = app.directory(&plane);
    let reconciler = app.reconciler(&provider, args.dry_run);
    let reporter = app.reporter();
    let source = PollingChangeSource::new(
        &directory,
        &app.state,
        UserFilter {
            query: plane.directory.filter.clone(),
        },
    );

    if args.once {
        let tick = process_tick(&source, &app.state, &reporter, &reconciler, &plane).await?;
        return app.renderer().render_tick(&tick);
    }

    let period = Duration::from_secs(args.interval.unwrap_or(plane.watch_interval_secs).max(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    reporter.step(&format!(
        "watching directory every {}s (Ctrl-C to stop)",
        period.as_secs()
    ));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match process_tick(&source, &app.state, &reporter, &reconciler, &plane).await {
                    Ok(tick) => app.renderer().render_tick(&tick)?,
                    Err(err) => {
                        tracing::warn!(error = %format!("{err:#}"), "poll failed");
                        reporter.warn(&format!("poll failed, retrying next tick: {err:#}"));
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("watch stopped");
                return Ok(());
            }
        }
    }
}
