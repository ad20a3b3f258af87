//! `TerminalReporter` — Presentation-layer implementation of `ProgressReporter`.
//!
//! Implements the `application::ports::ProgressReporter` trait so application
//! services can emit progress events without depending on any presentation
//! type directly. Owns a copy of the stylesheet so it can be shared with
//! provisioning flows running on other tasks.

use owo_colors::OwoColorize as _;

use crate::application::ports::ProgressReporter;
use crate::output::{OutputContext, Styles};

/// Terminal progress reporter.
///
/// - `step()` prints `"  → {message}"` (suppressed when quiet)
/// - `success()` prints `"  ✓ {message}"` (suppressed when quiet)
/// - `warn()` prints `"  ⚠ {message}"` (suppressed when quiet)
/// - `error()` prints `"  ✗ {message}"` to stderr (never suppressed)
pub struct TerminalReporter {
    styles: Styles,
    quiet: bool,
}

impl TerminalReporter {
    /// Create a reporter with the given output context's styling.
    #[must_use]
    pub fn new(ctx: &OutputContext) -> Self {
        Self {
            styles: ctx.styles,
            quiet: ctx.quiet,
        }
    }
}

impl ProgressReporter for TerminalReporter {
    fn step(&self, message: &str) {
        if !self.quiet {
            println!("  {} {message}", "→".style(self.styles.step));
        }
    }

    fn success(&self, message: &str) {
        if !self.quiet {
            println!("  {} {message}", "✓".style(self.styles.success));
        }
    }

    fn warn(&self, message: &str) {
        if !self.quiet {
            println!("  {} {message}", "⚠".style(self.styles.warning));
        }
    }

    fn error(&self, message: &str) {
        eprintln!("  {} {message}", "✗".style(self.styles.error));
    }
}
