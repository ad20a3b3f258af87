//! `proxyfleet records` — list the tunnels in the record log.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::domain::config::DEFAULT_RECORD_LOG;
use crate::infra::config::YamlConfigStore;
use crate::infra::record_log::read_records;
use crate::output::json;

/// Arguments shared by commands that read the record log.
#[derive(Args, Default)]
pub struct RecordLogArgs {
    /// Record log path
    #[arg(long, env = "PROXYFLEET_RECORD_LOG")]
    pub record_log: Option<PathBuf>,
}

impl RecordLogArgs {
    /// Flag or env value, then the config file, then `droplets.csv`.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn resolve(&self) -> Result<PathBuf> {
        if let Some(path) = &self.record_log {
            return Ok(path.clone());
        }
        let file = YamlConfigStore::from_env()?.load()?;
        Ok(file
            .record_log
            .unwrap_or_else(|| PathBuf::from(DEFAULT_RECORD_LOG)))
    }
}

/// Entry point for `proxyfleet records`.
///
/// # Errors
///
/// Returns an error if the record log cannot be read or parsed.
pub fn run(app: &AppContext, args: &RecordLogArgs) -> Result<()> {
    let path = args.resolve()?;
    list(app, &path)
}

fn list(app: &AppContext, path: &Path) -> Result<()> {
    let records = read_records(path)?;
    if app.is_json() {
        println!("{}", json::format_records(&records)?);
    } else {
        app.output.header(&format!("{} ({} tunnels)", path.display(), records.len()));
        app.human().render_records(&records);
    }
    Ok(())
}
