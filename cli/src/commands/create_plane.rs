//! `plane create-plane`: run or resume the plane setup.

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::ports::{PlaneStore as _, SetupStateStore as _};
use crate::application::services::setup::{PlaneOptions, PlaneSetup, run_setup};
use crate::domain::plane::DEFAULT_PLANE_NAME;
use crate::domain::{PlaneConfig, validate_plane_name};

/// Arguments for the create-plane command.
#[derive(Args, Default)]
pub struct CreatePlaneArgs {
    /// Plane name; prefixes every shared resource
    #[arg(long)]
    pub name: Option<String>,

    /// Cloud project id (defaults to the CLI's configured project)
    #[arg(long)]
    pub project: Option<String>,

    #[arg(long)]
    pub region: Option<String>,

    #[arg(long)]
    pub zone: Option<String>,

    /// Default model for new agents
    #[arg(long)]
    pub model: Option<String>,

    /// Default machine type for new agents
    #[arg(long)]
    pub machine_type: Option<String>,

    /// Default monthly budget in USD for new agents
    #[arg(long)]
    pub budget: Option<u32>,

    /// Default boot disk size in GB for new agents
    #[arg(long)]
    pub disk: Option<u32>,

    /// Program answering directory queries
    #[arg(long)]
    pub directory_program: Option<String>,

    /// Extra argument passed to the directory program (repeatable)
    #[arg(long = "directory-arg", allow_hyphen_values = true)]
    pub directory_args: Vec<String>,

    /// Directory query selecting the users this plane manages
    #[arg(long)]
    pub directory_filter: Option<String>,

    /// Seconds between directory polls in `plane watch`
    #[arg(long)]
    pub watch_interval: Option<u64>,

    /// Forget completed steps and run the whole setup again
    #[arg(long)]
    pub restart: bool,
}

impl CreatePlaneArgs {
    fn options(&self) -> PlaneOptions {
        PlaneOptions {
            name: self.name.clone(),
            project: self.project.clone(),
            region: self.region.clone(),
            zone: self.zone.clone(),
            model: self.model.clone(),
            machine_type: self.machine_type.clone(),
            monthly_budget_usd: self.budget,
            disk_gb: self.disk,
            directory_program: self.directory_program.clone(),
            directory_args: self.directory_args.clone(),
            directory_filter: self.directory_filter.clone(),
            watch_interval_secs: self.watch_interval,
        }
    }
}

/// Run `plane create-plane`.
///
/// # Errors
///
/// Returns the first failing step as a `SetupError`; the next run resumes there.
pub async fn run(args: &CreatePlaneArgs, app: &AppContext) -> Result<()> {
    let restart = args.restart
        && app.state.current_step().await? > 0
        && app.confirm("Run every setup step again?", true)?;

    let options = args.options();
    let mut draft = match app.state.load_plane().await? {
        Some(plane) => plane,
        None => {
            let name = options.name.as_deref().unwrap_or(DEFAULT_PLANE_NAME);
            validate_plane_name(name)?;
            PlaneConfig::named(name)
        }
    };
    options.apply(&mut draft);
    if options.project.is_some() {
        draft.project.clone_from(&options.project);
    }

    let provider = app.provider(&draft);
    let directory = app.directory(&draft);
    let setup = PlaneSetup {
        cloud: &provider,
        directory: &directory,
        store: &app.state,
        reconciler: app.reconciler(&provider, false),
        options,
    };

    let summary = run_setup(&setup, &app.state, restart, &app.reporter()).await?;
    let plane = app.state.load_plane().await?;
    app.renderer().render_setup(&summary, plane.as_ref())
}
