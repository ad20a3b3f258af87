//! `proxyfleet up` — provision the fleet, hold it until interrupted, tear down.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use tokio_util::sync::CancellationToken;

use crate::app::AppContext;
use crate::application::ports::{
    InstanceApi, PortProbe, ProgressReporter, RecordSink, TunnelSpawner,
};
use crate::application::services::fleet::FleetCoordinator;
use crate::domain::{ConfigOverrides, FleetConfig, FleetError};
use crate::infra::config::{YamlConfigStore, load_access_token};
use crate::infra::digitalocean::DigitalOceanApi;
use crate::infra::network::TcpPortProbe;
use crate::infra::record_log::CsvRecordLog;
use crate::infra::signals::install_interrupt_handler;
use crate::infra::ssh::SshTunnelSpawner;
use crate::output::json;

/// Arguments for the up command.
#[derive(Args, Default)]
pub struct UpArgs {
    /// Number of instances to provision
    #[arg(short = 'n', long, env = "PROXYFLEET_COUNT")]
    pub count: Option<usize>,

    /// Regions to pick from, comma separated (e.g. nyc1,lon1)
    #[arg(long, env = "PROXYFLEET_REGIONS", value_delimiter = ',')]
    pub regions: Vec<String>,

    /// Image slug
    #[arg(long, env = "PROXYFLEET_IMAGE")]
    pub image: Option<String>,

    /// Size slug
    #[arg(long, env = "PROXYFLEET_SIZE")]
    pub size: Option<String>,

    /// Provider SSH key id or fingerprint to install on each instance
    #[arg(long, env = "PROXYFLEET_SSH_KEY")]
    pub ssh_key: Option<String>,

    /// Remote login user for tunnels
    #[arg(long)]
    pub ssh_user: Option<String>,

    /// Private key passed to ssh with -i
    #[arg(long)]
    pub identity_file: Option<PathBuf>,

    /// Record log path
    #[arg(long, env = "PROXYFLEET_RECORD_LOG")]
    pub record_log: Option<PathBuf>,
}

impl UpArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            count: self.count,
            image: self.image.clone(),
            size: self.size.clone(),
            regions: self.regions.clone(),
            ssh_key: self.ssh_key.clone(),
            ssh_user: self.ssh_user.clone(),
            identity_file: self.identity_file.clone(),
            record_log: self.record_log.clone(),
        }
    }
}

/// Entry point for `proxyfleet up`.
///
/// Never returns `Ok`: after an interrupt the fleet is torn down and
/// [`FleetError::Interrupted`] is returned so the process exits non-zero.
///
/// # Errors
///
/// Returns an error if configuration is invalid, the token is missing, the
/// record log cannot be opened, or the fleet hits a fatal error.
pub async fn run(app: &AppContext, args: &UpArgs) -> Result<()> {
    let store = YamlConfigStore::from_env()?;
    tracing::debug!(path = %store.path().display(), "loading config");
    let file = store.load()?;
    let config = FleetConfig::resolve(file, args.overrides())?;
    let api = DigitalOceanApi::new(load_access_token()?)?;
    let spawner = SshTunnelSpawner::new(config.ssh_user.clone(), config.identity_file.clone());
    let log = CsvRecordLog::open(&config.record_log)?;

    let cancel = CancellationToken::new();
    let _handler = install_interrupt_handler(cancel.clone());

    hold_fleet(app, config, api, spawner, TcpPortProbe, log, &cancel).await
}

/// Provision, publish, wait for `cancel`, then tear everything down.
///
/// # Errors
///
/// Returns the fleet's fatal error, or [`FleetError::Interrupted`] once
/// `cancel` fires and teardown completes.
pub async fn hold_fleet<A, S, P, L>(
    app: &AppContext,
    config: FleetConfig,
    api: A,
    spawner: S,
    probe: P,
    log: L,
    cancel: &CancellationToken,
) -> Result<()>
where
    A: InstanceApi,
    S: TunnelSpawner,
    P: PortProbe,
    L: RecordSink,
{
    let config = Arc::new(config);
    let reporter: Arc<dyn ProgressReporter> = Arc::new(app.reporter());
    let coordinator = FleetCoordinator::new(
        Arc::clone(&config),
        Arc::new(api),
        Arc::new(spawner),
        probe,
        Arc::new(log),
        reporter,
    );

    app.output.info(&format!(
        "Provisioning {} instance(s) in {}",
        config.count,
        config.regions.join(", ")
    ));
    tracing::info!(
        count = config.count,
        record_log = %config.record_log.display(),
        "fleet starting"
    );

    let outcome = coordinator.run(config.count, cancel).await;

    if let Ok(records) = &outcome {
        if app.is_json() {
            match json::format_records(records) {
                Ok(out) => println!("{out}"),
                Err(e) => app.output.error(&format!("{e:#}")),
            }
        } else {
            app.human().render_fleet(records, config.count);
        }
        if !cancel.is_cancelled() {
            app.output.info("Tunnels are up. Press Ctrl-C to tear down the fleet.");
            cancel.cancelled().await;
        }
    }

    app.output.info("Tearing down fleet...");
    let report = coordinator.teardown().await;
    app.human().render_teardown(&report);

    match outcome {
        Ok(_) => Err(FleetError::Interrupted.into()),
        Err(e) => Err(e.into()),
    }
}
