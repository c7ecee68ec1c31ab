//! `plane remove-agent`: stop a user's agent.

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::services::provision::deprovision_agent;

/// Arguments for the remove-agent command.
#[derive(Args)]
pub struct RemoveAgentArgs {
    /// Owner email address
    pub owner: String,

    /// Also delete the local record of the agent
    #[arg(long)]
    pub forget: bool,

    /// Show what would happen without changing anything
    #[arg(long)]
    pub dry_run: bool,
}

/// Run `plane remove-agent`. The instance is stopped, never deleted.
///
/// # Errors
///
/// Returns a validation error for a malformed owner, or a `ProvisionError`
/// if the instance cannot be stopped.
pub async fn run(args: &RemoveAgentArgs, app: &AppContext) -> Result<()> {
    let plane = app.load_plane().await?;
    let forget = args.forget
        && app.confirm(
            &format!("Delete the local record for {}?", args.owner),
            true,
        )?;

    let provider = app.provider(&plane);
    let reconciler = app.reconciler(&provider, args.dry_run);
    let outcome = deprovision_agent(
        &app.state,
        &app.reporter(),
        &reconciler,
        &plane,
        &args.owner,
        forget,
    )
    .await?;
    app.renderer().render_agent(&outcome)
}
