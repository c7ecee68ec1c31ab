//! CLI argument parsing with clap derive

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::app::{AppContext, AppFlags};
use crate::commands;

/// Provision and manage per-user AI agent instances in a cloud project
#[derive(Parser)]
#[command(
    name = "plane",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Answer yes to every prompt
    #[arg(short = 'y', long, global = true)]
    pub yes: bool,

    /// Log provider calls to stderr (repeat for more detail)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run (or resume) the ten-step plane setup
    CreatePlane(commands::create_plane::CreatePlaneArgs),

    /// Provision an agent for a user, or reconcile an existing one
    AddAgent(commands::add_agent::AddAgentArgs),

    /// Stop a user's agent; its disk is kept
    RemoveAgent(commands::remove_agent::RemoveAgentArgs),

    /// Show setup progress and known agents
    Status(commands::status::StatusArgs),

    /// Poll the directory and apply enable/disable changes
    Watch(commands::watch::WatchArgs),
}

impl Cli {
    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn run(self) -> Result<()> {
        let app = AppContext::new(&AppFlags {
            no_color: self.no_color,
            quiet: self.quiet,
            json: self.json,
            yes: self.yes,
        })?;
        match self.command {
            Command::CreatePlane(args) => commands::create_plane::run(&args, &app).await,
            Command::AddAgent(args) => commands::add_agent::run(&args, &app).await,
            Command::RemoveAgent(args) => commands::remove_agent::run(&args, &app).await,
            Command::Status(args) => commands::status::run(&args, &app).await,
            Command::Watch(args) => commands::watch::run(&args, &app).await,
        }
    }
}
