//! Human-readable terminal renderer.

use owo_colors::OwoColorize as _;

use crate::application::services::provision::AgentOutcome;
use crate::application::services::setup::SetupSummary;
use crate::application::services::status::PlaneStatus;
use crate::application::services::watch::TickSummary;
use crate::domain::{Action, AgentRecord, Decision, NoOpReason, PlaneConfig};
use crate::output::OutputContext;

/// Renders results as terminal output using `OutputContext`.
pub struct HumanRenderer<'a> {
    ctx: &'a OutputContext,
}

impl<'a> HumanRenderer<'a> {
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self { ctx }
    }

    pub fn render_agent(&self, outcome: &AgentOutcome) {
        if self.ctx.quiet {
            return;
        }
        println!();
        self.ctx.kv("Agent:", &format!("{} ({})", outcome.instance_name, outcome.owner));
        self.ctx.kv("Instance:", outcome.live_status.as_str());
        if let Some(phase) = outcome.phase {
            self.ctx.kv("Bootstrap:", &phase.to_string());
        }
        if let Some(version) = outcome.secret_version {
            self.ctx.kv("Config:", &format!("secret version {version}"));
        }
        println!();
        let summary = decision_summary(outcome.action, outcome.decision, outcome.dry_run);
        if outcome.dry_run {
            self.ctx.info(&format!("Dry run: {summary}. No changes were made."));
        } else {
            self.ctx.success(&summary);
        }
        if outcome.forgotten {
            self.ctx.info("Local record removed.");
        }
    }

    pub fn render_setup(&self, summary: &SetupSummary, plane: Option<&PlaneConfig>) {
        if self.ctx.quiet {
            return;
        }
        println!();
        if summary.executed.is_empty() {
            self.ctx
                .success("Plane setup already complete. Use --restart to run it again.");
        } else {
            self.ctx.success(&format!(
                "Plane setup complete ({} steps run, {} already done).",
                summary.executed.len(),
                summary.skipped.len()
            ));
        }
        if let Some(plane) = plane {
            self.ctx.kv("Plane:", &plane.name);
            self.ctx
                .kv("Project:", plane.project.as_deref().unwrap_or("(unset)"));
            self.ctx.kv("Zone:", &plane.zone);
        }
        self.ctx.info("Add an agent: plane add-agent <owner>");
    }

    pub fn render_status(&self, status: &PlaneStatus) {
        let Some(name) = &status.plane else {
            self.ctx.info("No plane configured. Run: plane create-plane");
            return;
        };
        if self.ctx.quiet {
            return;
        }
        self.ctx.kv("Plane:", name);
        self.ctx
            .kv("Project:", status.project.as_deref().unwrap_or("(unset)"));
        self.ctx.kv(
            "Setup:",
            &format!("{}/{} steps", status.setup_completed, status.setup_total),
        );
        if !status.setup_complete() {
            self.ctx.warn("Setup incomplete. Resume: plane create-plane");
        }
        println!();
        if status.agents.is_empty() {
            println!("  No agents. Add one: plane add-agent <owner>");
            return;
        }
        self.ctx.header("Agents:");
        for record in &status.agents {
            self.render_record(record);
        }
    }

    fn render_record(&self, record: &AgentRecord) {
        let phase = record
            .phase
            .map_or_else(|| "-".to_string(), |p| p.to_string());
        println!(
            "  {:<36} {:<13} {:<28} {}",
            record.instance_name,
            record.last_status.as_str(),
            phase,
            record.owner.style(self.ctx.styles.dim)
        );
    }

    pub fn render_tick(&self, tick: &TickSummary) {
        if self.ctx.quiet
            || (tick.handled.is_empty() && tick.failed.is_empty() && tick.pending.is_empty())
        {
            return;
        }
        self.ctx.info(&format!(
            "{} changes applied, {} failed, {} waiting on a transition",
            tick.handled.len(),
            tick.failed.len(),
            tick.pending.len()
        ));
    }
}

/// One sentence describing what a decision did.
#[must_use]
pub fn decision_summary(action: Action, decision: Decision, dry_run: bool) -> String {
    let (done, pending) = match decision {
        Decision::Create => ("Agent created", "would create the agent"),
        Decision::Start => ("Agent started with fresh config", "would start the agent"),
        Decision::Stop => ("Agent stopped; its disk is kept", "would stop the agent"),
        Decision::NoOp(NoOpReason::AlreadyExists) => {
            ("Agent is already running", "agent is already running")
        }
        Decision::NoOp(NoOpReason::InProgress) => (
            "Instance is changing state; re-run shortly",
            "instance is changing state",
        ),
        Decision::NoOp(NoOpReason::NotFound) if action == Action::Deprovision => {
            ("Nothing to stop", "nothing to stop")
        }
        Decision::NoOp(NoOpReason::NotFound) => ("Nothing to do", "nothing to do"),
    };
    if dry_run { pending } else { done }.to_string()
}
