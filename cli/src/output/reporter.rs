//! `TerminalReporter`: Presentation-layer implementation of `ProgressReporter`.
//!
//! Application services emit progress through the port; this adapter prints
//! it with the context's styles. In JSON mode the reporter is silent so that
//! stdout carries a single JSON document.

use owo_colors::OwoColorize as _;

use crate::application::ports::ProgressReporter;
use crate::output::OutputContext;

pub struct TerminalReporter<'a> {
    ctx: &'a OutputContext,
    silent: bool,
}

impl<'a> TerminalReporter<'a> {
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self { ctx, silent: false }
    }

    /// A reporter that prints nothing; warnings still reach the log.
    #[must_use]
    pub fn silent(ctx: &'a OutputContext) -> Self {
        Self { ctx, silent: true }
    }

    fn muted(&self) -> bool {
        self.silent || self.ctx.quiet
    }
}

impl ProgressReporter for TerminalReporter<'_> {
    fn step(&self, message: &str) {
        if !self.muted() {
            println!("  {} {message}", "→".style(self.ctx.styles.step));
        }
    }

    fn success(&self, message: &str) {
        if !self.muted() {
            println!("  {} {message}", "✓".style(self.ctx.styles.success));
        }
    }

    fn warn(&self, message: &str) {
        if self.muted() {
            tracing::warn!("{message}");
        } else {
            eprintln!("  {} {message}", "!".style(self.ctx.styles.warning));
        }
    }
}
