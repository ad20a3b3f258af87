//! `proxyfleet exec` — run commands through random tunnels from the record log.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use tokio::io::BufReader;

use crate::app::AppContext;
use crate::application::services::proxied_exec::{EGRESS_PROBE_TIMEOUT, TunnelExec};
use crate::commands::records::RecordLogArgs;
use crate::infra::command_runner::TokioCommandRunner;
use crate::infra::proxychains::{DEFAULT_LAUNCHER, TempChainWriter};
use crate::infra::record_log::{CsvCommandLog, DEFAULT_COMMAND_LOG, read_records};

/// Arguments for the exec command.
#[derive(Args)]
#[command(trailing_var_arg = true)]
pub struct ExecArgs {
    #[command(flatten)]
    pub records: RecordLogArgs,

    /// Where to append the command log row
    #[arg(long, default_value = DEFAULT_COMMAND_LOG)]
    pub command_log: PathBuf,

    /// proxychains-compatible launcher that pins the command to the tunnel
    #[arg(long, env = "PROXYFLEET_LAUNCHER", default_value = DEFAULT_LAUNCHER)]
    pub launcher: String,

    /// Read commands from stdin, one per line, until `exit`
    #[arg(short, long, conflicts_with = "command")]
    pub repeat: bool,

    /// Command and arguments to run through the tunnel
    #[arg(required_unless_present = "repeat", allow_hyphen_values = true)]
    pub command: Vec<String>,
}

/// Entry point for `proxyfleet exec`.
///
/// A single command's exit code is mirrored. A `--repeat` session exits
/// non-zero if any command failed or was skipped.
///
/// # Errors
///
/// Returns an error if no tunnel is recorded, the egress probe of a single
/// command fails, or the launcher cannot be spawned.
pub async fn run(app: &AppContext, args: &ExecArgs) -> Result<ExitCode> {
    let records = read_records(&args.records.resolve()?)?;
    let log = CsvCommandLog::open(&args.command_log)?;
    let runner = TokioCommandRunner::new(EGRESS_PROBE_TIMEOUT);
    let reporter = app.reporter();
    let exec = TunnelExec {
        runner: &runner,
        chain: &TempChainWriter,
        log: &log,
        reporter: &reporter,
        launcher: &args.launcher,
    };
    let mut rng = rand::thread_rng();

    if args.repeat {
        let stdin = BufReader::new(tokio::io::stdin());
        let summary = exec.run_session(&records, stdin, &mut rng).await?;
        if app.is_json() {
            let obj = serde_json::json!({
                "succeeded": summary.succeeded,
                "failed": summary.failed,
                "skipped": summary.skipped,
            });
            println!("{}", serde_json::to_string_pretty(&obj)?);
        } else {
            app.human().render_session(&summary);
        }
        return Ok(if summary.is_clean() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    let outcome = exec.run_once(&records, &args.command, &mut rng).await?;
    if app.is_json() {
        let obj = serde_json::json!({
            "instance_id": outcome.record.id,
            "local_port": outcome.record.local_port,
            "egress_ip": outcome.egress_ip,
            "status": outcome.status().to_string(),
            "exit_code": outcome.exit.code(),
        });
        println!("{}", serde_json::to_string_pretty(&obj)?);
    } else {
        app.human().render_exec(&outcome);
    }

    Ok(ExitCode::from(exit_byte(outcome.exit.code())))
}

/// Map a child exit code onto a process exit byte. Codes that do not fit
/// in a byte, and deaths by signal, become 1.
fn exit_byte(code: Option<i32>) -> u8 {
    code.map_or(1, |code| u8::try_from(code).unwrap_or(1))
}
