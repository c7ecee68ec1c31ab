//! `plane add-agent`: provision or reconcile one user's agent.

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::services::provision::provision_agent;
use crate::domain::AgentSpec;

/// Arguments for the add-agent command.
#[derive(Args)]
pub struct AddAgentArgs {
    /// Owner email address
    pub owner: String,

    /// Model the agent runs (defaults to the plane's)
    #[arg(long)]
    pub model: Option<String>,

    /// Monthly budget in USD
    #[arg(long)]
    pub budget: Option<u32>,

    /// Boot disk size in GB
    #[arg(long)]
    pub disk: Option<u32>,

    /// Machine type override
    #[arg(long)]
    pub machine_type: Option<String>,

    /// Show what would happen without changing anything
    #[arg(long)]
    pub dry_run: bool,
}

impl AddAgentArgs {
    fn spec(&self, defaults: AgentSpec) -> AgentSpec {
        AgentSpec {
            model: self.model.clone().unwrap_or(defaults.model),
            monthly_budget_usd: self.budget.unwrap_or(defaults.monthly_budget_usd),
            disk_gb: self.disk.unwrap_or(defaults.disk_gb),
            machine_type: self.machine_type.clone().or(defaults.machine_type),
            ..defaults
        }
    }
}

/// Run `plane add-agent`.
///
/// # Errors
///
/// Returns a validation error for bad flags, or a `ProvisionError` naming
/// the resource that failed.
pub async fn run(args: &AddAgentArgs, app: &AppContext) -> Result<()> {
    let plane = app.load_plane().await?;
    let spec = args.spec(AgentSpec::with_defaults(&args.owner, &plane));
    // Validate before any provider call.
    spec.validate()?;

    let provider = app.provider(&plane);
    let reconciler = app.reconciler(&provider, args.dry_run);
    let outcome =
        provision_agent(&app.state, &app.reporter(), &reconciler, &plane, &spec).await?;
    app.renderer().render_agent(&outcome)
}
