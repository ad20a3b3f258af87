//! CLI argument parsing with clap derive

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::app::{AppContext, OutputFlags};
use crate::commands;

/// Provision a fleet of cloud instances and hold SOCKS tunnels through them
#[derive(Parser)]
#[command(
    name = "proxyfleet",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Log more detail to stderr (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Provision the fleet and hold its tunnels until interrupted
    Up(commands::up::UpArgs),

    /// List tunnels in the record log
    Records(commands::records::RecordLogArgs),

    /// Run a command through a random tunnel
    Exec(commands::exec::ExecArgs),

    /// Show version
    Version,
}

impl Cli {
    /// Default tracing filter for the chosen verbosity. `RUST_LOG` wins.
    #[must_use]
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    }

    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn run(self) -> Result<ExitCode> {
        let Cli {
            no_color,
            quiet,
            json,
            command,
            ..
        } = self;
        let app = AppContext::new(&OutputFlags {
            no_color,
            quiet,
            json,
        });
        match command {
            Command::Up(args) => commands::up::run(&app, &args).await?,
            Command::Records(args) => commands::records::run(&app, &args)?,
            Command::Exec(args) => return commands::exec::run(&app, &args).await,
            Command::Version => commands::version::run(&app)?,
        }
        Ok(ExitCode::SUCCESS)
    }
}
