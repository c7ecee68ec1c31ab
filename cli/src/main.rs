//! Agents plane CLI - per-user AI agent instances in a cloud project

#![cfg_attr(test, allow(clippy::expect_used))]

use std::process::ExitCode;

use clap::Parser;
use plane_cli::cli::Cli;
use plane_cli::domain::classify_failure;
use plane_cli::output::json::format_error;
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "plane_cli=info",
        _ => "plane_cli=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let json = cli.json;
    match cli.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let class = classify_failure(&e);
            match format_error(&format!("{e:#}"), class.code) {
                Ok(out) if json => println!("{out}"),
                _ => eprintln!("Error: {e:#}"),
            }
            ExitCode::from(class.exit_code)
        }
    }
}
