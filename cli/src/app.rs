//! Application context: the state every command handler receives.
//!
//! Handlers build cloud and directory adapters through this type so that
//! process spawning stays in one place.

use anyhow::Result;
use indicatif::ProgressBar;

use crate::application::ports::PlaneStore as _;
use crate::application::services::reconcile::{Reconciler, RetryPolicy};
use crate::domain::{PlaneConfig, ValidationError};
use crate::infra::command_runner::TokioCommandRunner;
use crate::infra::directory::CommandDirectory;
use crate::infra::provider::GcloudProvider;
use crate::infra::state::StateDir;
use crate::output::{
    HumanRenderer, JsonRenderer, OutputContext, Renderer, TerminalReporter, progress,
};

/// Output rendering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

/// Flags passed from the top-level CLI to [`AppContext::new`].
#[allow(clippy::struct_excessive_bools)]
pub struct AppFlags {
    pub no_color: bool,
    pub quiet: bool,
    pub json: bool,
    /// Skip interactive prompts (also set by `CI` / `PLANE_YES`).
    pub yes: bool,
}

/// Unified application context passed to every command handler.
pub struct AppContext {
    pub output: OutputContext,
    pub mode: OutputMode,
    /// Local state: plane config, setup marker, agent records, watch snapshot.
    pub state: StateDir,
    pub policy: RetryPolicy,
    /// When `true`, prompts return their default answer.
    pub non_interactive: bool,
}

impl AppContext {
    /// # Errors
    ///
    /// Returns an error if the state directory cannot be located.
    pub fn new(flags: &AppFlags) -> Result<Self> {
        let ci_env = std::env::var("CI").is_ok() || std::env::var("PLANE_YES").is_ok();
        let mode = if flags.json {
            OutputMode::Json
        } else {
            OutputMode::Human
        };
        Ok(Self {
            output: OutputContext::new(flags.no_color, flags.quiet),
            mode,
            state: StateDir::from_env()?,
            policy: RetryPolicy::default(),
            non_interactive: flags.yes || ci_env,
        })
    }

    #[must_use]
    pub fn is_json(&self) -> bool {
        self.mode == OutputMode::Json
    }

    #[must_use]
    pub fn renderer(&self) -> Renderer<'_> {
        match self.mode {
            OutputMode::Human => Renderer::Human(HumanRenderer::new(&self.output)),
            OutputMode::Json => Renderer::Json(JsonRenderer),
        }
    }

    /// Progress reporter; silent in JSON mode so stdout stays one document.
    #[must_use]
    pub fn reporter(&self) -> TerminalReporter<'_> {
        match self.mode {
            OutputMode::Human => TerminalReporter::new(&self.output),
            OutputMode::Json => TerminalReporter::silent(&self.output),
        }
    }

    /// A spinner for a slow step, or `None` when output is not an interactive
    /// human terminal.
    #[must_use]
    pub fn spinner(&self, msg: &str) -> Option<ProgressBar> {
        (self.mode == OutputMode::Human && self.output.show_progress())
            .then(|| progress::spinner(msg))
    }

    /// Ask the user for confirmation, or return `default` when non-interactive.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal prompt fails (e.g. no TTY available).
    pub fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
        if self.non_interactive {
            return Ok(default);
        }
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(default)
            .interact()?;
        Ok(confirmed)
    }

    /// The persisted plane configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::PlaneNotConfigured`] before `create-plane` has run.
    pub async fn load_plane(&self) -> Result<PlaneConfig> {
        Ok(self
            .state
            .load_plane()
            .await?
            .ok_or(ValidationError::PlaneNotConfigured)?)
    }

    #[must_use]
    pub fn provider(&self, plane: &PlaneConfig) -> GcloudProvider<TokioCommandRunner> {
        GcloudProvider::for_plane(TokioCommandRunner::default(), plane)
    }

    #[must_use]
    pub fn directory(&self, plane: &PlaneConfig) -> CommandDirectory<TokioCommandRunner> {
        CommandDirectory::new(TokioCommandRunner::default(), &plane.directory)
    }

    #[must_use]
    pub fn reconciler<'a>(
        &self,
        provider: &'a GcloudProvider<TokioCommandRunner>,
        dry_run: bool,
    ) -> Reconciler<'a, GcloudProvider<TokioCommandRunner>> {
        Reconciler::new(provider, self.policy, dry_run)
    }
}
