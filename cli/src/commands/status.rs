//! `plane status`: setup progress and known agents.

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::services::status::{plane_status, refresh_records};
use crate::output::progress;

/// Arguments for the status command.
#[derive(Args, Default)]
pub struct StatusArgs {
    /// Describe every instance and store its current status first
    #[arg(long)]
    pub refresh: bool,
}

/// Run `plane status`.
///
/// # Errors
///
/// Returns an error if local state cannot be read.
pub async fn run(args: &StatusArgs, app: &AppContext) -> Result<()> {
    let mut status = plane_status(&app.state).await?;
    if args.refresh && !status.agents.is_empty() {
        let plane = app.load_plane().await?;
        let provider = app.provider(&plane);
        let reconciler = app.reconciler(&provider, false);
        let agents = std::mem::take(&mut status.agents);
        let spinner = app.spinner(&format!("Describing {} instance(s)...", agents.len()));
        status.agents = refresh_records(&app.state, &app.reporter(), &reconciler, agents).await?;
        if let Some(pb) = spinner {
            progress::finish_ok(&pb, "Instances refreshed");
        }
    }
    app.renderer().render_status(&status)
}
