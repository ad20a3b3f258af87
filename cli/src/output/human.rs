//! Human-readable terminal renderer.

use owo_colors::OwoColorize as _;

use crate::application::services::fleet::TeardownReport;
use crate::application::services::proxied_exec::{ExecOutcome, SessionSummary};
use crate::domain::InstanceSummary;
use crate::output::OutputContext;

/// Renders domain types as human-readable terminal output using `OutputContext`.
pub struct HumanRenderer<'a> {
    ctx: &'a OutputContext,
}

impl<'a> HumanRenderer<'a> {
    /// Create a new `HumanRenderer` wrapping the given output context.
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self { ctx }
    }

    /// Render the published fleet, one tunnel per line.
    pub fn render_fleet(&self, records: &[InstanceSummary], requested: usize) {
        if self.ctx.quiet {
            return;
        }
        println!();
        self.ctx.header(&format!(
            "Fleet ready: {} of {requested} tunnels live",
            records.len()
        ));
        self.render_records(records);
    }

    /// Render records as an aligned table.
    pub fn render_records(&self, records: &[InstanceSummary]) {
        if self.ctx.quiet {
            return;
        }
        if records.is_empty() {
            self.ctx.info("No tunnels recorded.");
            return;
        }
        for r in records {
            println!(
                "  {:<12} {:<15} {}  {}",
                r.id,
                r.address,
                r.proxy_url(),
                r.created_at.to_rfc3339().style(self.ctx.styles.dim)
            );
        }
    }

    /// Render the outcome of a teardown.
    pub fn render_teardown(&self, report: &TeardownReport) {
        if report.is_clean() {
            self.ctx.success(&format!(
                "Torn down: {} tunnels killed, {} instances destroyed",
                report.killed, report.destroyed
            ));
        } else {
            self.ctx.error(&format!(
                "Teardown finished with {} failure(s); {} tunnels killed, {} instances destroyed",
                report.failures.len(),
                report.killed,
                report.destroyed
            ));
        }
    }

    /// Render where a proxied command ran and how it ended.
    pub fn render_exec(&self, outcome: &ExecOutcome) {
        self.ctx.kv("instance", &outcome.record.id.to_string());
        self.ctx.kv("tunnel  ", &outcome.record.proxy_url());
        self.ctx.kv("egress  ", &outcome.egress_ip);
        self.ctx.kv("status  ", &outcome.status().to_string());
    }

    /// Render the tally of an interactive session.
    pub fn render_session(&self, summary: &SessionSummary) {
        self.ctx.header("Session finished");
        self.ctx.kv("succeeded", &summary.succeeded.to_string());
        self.ctx.kv("failed   ", &summary.failed.to_string());
        self.ctx.kv("skipped  ", &summary.skipped.to_string());
    }
}
