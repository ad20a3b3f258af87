//! Run operator commands through a randomly chosen tunnel.
//!
//! Every command is wrapped in a proxychains launcher whose per-run config
//! pins all TCP connections (and DNS) to the chosen tunnel's SOCKS port.
//! The proxy environment variables are set too, for tools that honor them.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use std::process::ExitStatus;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use rand::Rng;
use rand::seq::SliceRandom;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::application::ports::{
    CommandLogSink, CommandRunner, ProgressReporter, ProxyChainWriter,
};
use crate::domain::{CommandLogRow, CommandStatus, InstanceSummary};

/// Endpoint that echoes the caller's public address.
pub const EGRESS_PROBE_URL: &str = "https://ipinfo.io/ip";

/// Upper bound for the egress probe.
pub const EGRESS_PROBE_TIMEOUT: Duration = Duration::from_secs(30);

const NO_TUNNELS: &str = "record log has no tunnels; run `proxyfleet up` first";

/// Result of one proxied command.
#[derive(Debug)]
pub struct ExecOutcome {
    pub record: InstanceSummary,
    pub egress_ip: String,
    pub exit: ExitStatus,
}

impl ExecOutcome {
    #[must_use]
    pub fn status(&self) -> CommandStatus {
        if self.exit.success() {
            CommandStatus::Success
        } else {
            CommandStatus::Failed
        }
    }
}

/// Tally of an interactive session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub succeeded: usize,
    pub failed: usize,
    /// Commands not run because no egress address could be obtained.
    pub skipped: usize,
}

impl SessionSummary {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }
}

/// Pick one record uniformly at random.
///
/// # Errors
///
/// Returns an error if `records` is empty.
pub fn pick_record<'a>(
    records: &'a [InstanceSummary],
    rng: &mut impl Rng,
) -> Result<&'a InstanceSummary> {
    records.choose(rng).context(NO_TUNNELS)
}

/// Ask a public echo service which address traffic leaves from.
///
/// Uses the runner's default timeout.
///
/// # Errors
///
/// Returns an error if curl fails, times out, or prints nothing.
pub async fn probe_egress(runner: &impl CommandRunner, record: &InstanceSummary) -> Result<String> {
    let proxy = record.proxy_url();
    let failed = || {
        format!(
            "failed to obtain external IP for local port {}",
            record.local_port
        )
    };
    let output = runner
        .run("curl", &["-s", "-x", &proxy, EGRESS_PROBE_URL])
        .await
        .with_context(failed)?;
    let ip = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if !output.status.success() || ip.is_empty() {
        anyhow::bail!("{}", failed());
    }
    Ok(ip)
}

/// Collaborators for running commands through tunnels.
pub struct TunnelExec<'a, R, C, L> {
    pub runner: &'a R,
    pub chain: &'a C,
    pub log: &'a L,
    pub reporter: &'a dyn ProgressReporter,
    /// proxychains-compatible launcher accepting `-q -f <config>`.
    pub launcher: &'a str,
}

impl<R, C, L> TunnelExec<'_, R, C, L>
where
    R: CommandRunner,
    C: ProxyChainWriter,
    L: CommandLogSink,
{
    /// Run `command` with its traffic routed through a random logged tunnel.
    ///
    /// The command inherits stdio. A command-log row is appended whatever
    /// the command's exit status; only a failed egress probe skips the
    /// command.
    ///
    /// # Errors
    ///
    /// Returns an error if no record is available, the egress probe fails,
    /// the launcher cannot be spawned, or the command log cannot be written.
    pub async fn run_once(
        &self,
        records: &[InstanceSummary],
        command: &[String],
        rng: &mut impl Rng,
    ) -> Result<ExecOutcome> {
        if command.is_empty() {
            anyhow::bail!("no command given");
        }
        let record = pick_record(records, rng)?.clone();
        let egress_ip = self.probe(&record).await?;
        self.run_through(record, egress_ip, command).await
    }

    async fn probe(&self, record: &InstanceSummary) -> Result<String> {
        self.reporter.step(&format!(
            "probing egress of droplet {} via local port {}",
            record.id, record.local_port
        ));
        let egress_ip = probe_egress(self.runner, record).await?;
        self.reporter.step(&format!("external IP: {egress_ip}"));
        Ok(egress_ip)
    }

    async fn run_through(
        &self,
        record: InstanceSummary,
        egress_ip: String,
        command: &[String],
    ) -> Result<ExecOutcome> {
        let (program, args) = command.split_first().context("no command given")?;
        let conf = self.chain.write_chain(record.local_port)?;
        let conf_path = conf.as_ref().to_string_lossy().into_owned();
        let proxy = record.proxy_url();

        let mut argv = vec!["-q", "-f", conf_path.as_str(), program.as_str()];
        argv.extend(args.iter().map(String::as_str));
        let env = [
            ("PROXYCHAINS_CONF_FILE", conf_path.as_str()),
            ("ALL_PROXY", proxy.as_str()),
            ("all_proxy", proxy.as_str()),
        ];
        tracing::info!(
            instance_id = %record.id,
            port = record.local_port,
            launcher = self.launcher,
            %program,
            "running proxied command"
        );
        let exit = self
            .runner
            .run_status_with_env(self.launcher, &argv, &env)
            .await
            .with_context(|| {
                format!(
                    "failed to run {program} through {}; is proxychains-ng installed?",
                    self.launcher
                )
            })?;
        drop(conf);

        let outcome = ExecOutcome {
            record,
            egress_ip,
            exit,
        };
        self.log
            .append_command(&CommandLogRow {
                instance_id: outcome.record.id,
                egress_ip: outcome.egress_ip.clone(),
                ran_at: Utc::now(),
                command: command.join(" "),
                status: outcome.status(),
            })
            .await
            .context("failed to write command log")?;

        match outcome.status() {
            CommandStatus::Success => {
                self.reporter
                    .success(&format!("command succeeded via {}", outcome.egress_ip));
            }
            CommandStatus::Failed => {
                self.reporter.warn(&format!(
                    "command failed via {} ({})",
                    outcome.egress_ip, outcome.exit
                ));
            }
        }
        Ok(outcome)
    }

    /// Read commands from `input`, one per line, until `exit` or end of
    /// input. Each command goes through a freshly picked tunnel. A command
    /// whose egress probe fails is reported and skipped; the session goes on.
    ///
    /// # Errors
    ///
    /// Returns an error if `records` is empty, `input` cannot be read, or
    /// the launcher cannot be spawned or the command log written.
    pub async fn run_session(
        &self,
        records: &[InstanceSummary],
        input: impl AsyncBufRead + Unpin,
        rng: &mut impl Rng,
    ) -> Result<SessionSummary> {
        if records.is_empty() {
            anyhow::bail!(NO_TUNNELS);
        }
        self.reporter
            .step("enter one command per line; `exit` ends the session");

        let mut summary = SessionSummary::default();
        let mut lines = input.lines();
        while let Some(line) = lines.next_line().await.context("cannot read commands")? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line.eq_ignore_ascii_case("exit") {
                break;
            }
            let command: Vec<String> = line.split_whitespace().map(String::from).collect();
            let record = pick_record(records, rng)?.clone();
            let egress_ip = match self.probe(&record).await {
                Ok(ip) => ip,
                Err(e) => {
                    self.reporter.error(&format!("{e:#}"));
                    summary.skipped += 1;
                    continue;
                }
            };
            match self.run_through(record, egress_ip, &command).await?.status() {
                CommandStatus::Success => summary.succeeded += 1,
                CommandStatus::Failed => summary.failed += 1,
            }
        }
        Ok(summary)
    }
}
