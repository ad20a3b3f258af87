//! Domain types and validators for fleet configuration.
//!
//! Pure functions only — no I/O, no async, no filesystem access.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::error::ConfigError;

// ── Constants ────────────────────────────────────────────────────────────────

pub const DEFAULT_COUNT: usize = 5;
pub const DEFAULT_IMAGE: &str = "ubuntu-20-04-x64";
pub const DEFAULT_SIZE: &str = "s-1vcpu-1gb";
pub const DEFAULT_REGIONS: &[&str] = &["nyc1", "lon1", "sgp1"];
pub const DEFAULT_SSH_USER: &str = "root";
pub const DEFAULT_RECORD_LOG: &str = "droplets.csv";
pub const DEFAULT_NAME_PREFIX: &str = "droplet";

/// Environment variable holding the provider access token.
pub const TOKEN_ENV_VAR: &str = "DIGITALOCEAN_ACCESS_TOKEN";

// ── Config file schema ───────────────────────────────────────────────────────

/// Persistent defaults stored in `~/.proxyfleet/config.yaml`.
///
/// Every field is optional; anything missing falls back to the built-in
/// defaults above.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct FileConfig {
    pub count: Option<usize>,
    pub image: Option<String>,
    pub size: Option<String>,
    pub regions: Option<Vec<String>>,
    pub ssh_key: Option<String>,
    pub ssh_user: Option<String>,
    pub identity_file: Option<PathBuf>,
    pub record_log: Option<PathBuf>,
    pub name_prefix: Option<String>,
}

/// Values supplied on the command line (or through their `env` fallbacks).
/// These win over [`FileConfig`].
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub count: Option<usize>,
    pub image: Option<String>,
    pub size: Option<String>,
    pub regions: Vec<String>,
    pub ssh_key: Option<String>,
    pub ssh_user: Option<String>,
    pub identity_file: Option<PathBuf>,
    pub record_log: Option<PathBuf>,
}

// ── Resolved config ──────────────────────────────────────────────────────────

/// Fixed delays and bounds of the provisioning flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetTimings {
    /// Delay between successive flow launches.
    pub stagger: Duration,
    /// Interval between address lookups.
    pub poll_interval: Duration,
    /// Wait before the first tunnel attempt so the instance can finish booting.
    pub pre_connect: Duration,
    /// Wait between tunnel attempts.
    pub retry_backoff: Duration,
    /// Total tunnel attempts before the flow is abandoned.
    pub max_attempts: u32,
    /// A tunnel that exits within this window counts as a setup failure.
    pub settle: Duration,
}

impl Default for FleetTimings {
    fn default() -> Self {
        Self {
            stagger: Duration::from_secs(1),
            poll_interval: Duration::from_secs(10),
            pre_connect: Duration::from_secs(30),
            retry_backoff: Duration::from_secs(60),
            max_attempts: 3,
            settle: Duration::from_secs(5),
        }
    }
}

/// Immutable fleet configuration, built once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetConfig {
    pub count: usize,
    pub image: String,
    pub size: String,
    pub regions: Vec<String>,
    pub ssh_key: String,
    pub ssh_user: String,
    pub identity_file: Option<PathBuf>,
    pub record_log: PathBuf,
    pub name_prefix: String,
    pub timings: FleetTimings,
}

impl FleetConfig {
    /// Merge CLI overrides over the config file over built-in defaults, then
    /// validate the result.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the merged configuration is invalid.
    pub fn resolve(file: FileConfig, overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        let regions = if overrides.regions.is_empty() {
            file.regions
                .unwrap_or_else(|| DEFAULT_REGIONS.iter().map(|r| (*r).to_string()).collect())
        } else {
            overrides.regions
        };
        let config = Self {
            count: overrides.count.or(file.count).unwrap_or(DEFAULT_COUNT),
            image: overrides
                .image
                .or(file.image)
                .unwrap_or_else(|| DEFAULT_IMAGE.to_string()),
            size: overrides
                .size
                .or(file.size)
                .unwrap_or_else(|| DEFAULT_SIZE.to_string()),
            regions,
            ssh_key: overrides.ssh_key.or(file.ssh_key).unwrap_or_default(),
            ssh_user: overrides
                .ssh_user
                .or(file.ssh_user)
                .unwrap_or_else(|| DEFAULT_SSH_USER.to_string()),
            identity_file: overrides.identity_file.or(file.identity_file),
            record_log: overrides
                .record_log
                .or(file.record_log)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_RECORD_LOG)),
            name_prefix: file
                .name_prefix
                .unwrap_or_else(|| DEFAULT_NAME_PREFIX.to_string()),
            timings: FleetTimings::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.count == 0 {
            return Err(ConfigError::EmptyFleet);
        }
        if self.regions.iter().all(|r| r.trim().is_empty()) {
            return Err(ConfigError::NoRegions);
        }
        for (name, value) in [
            ("image", &self.image),
            ("size", &self.size),
            ("ssh key", &self.ssh_key),
            ("ssh user", &self.ssh_user),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingValue(name));
            }
        }
        if self.timings.max_attempts == 0 {
            return Err(ConfigError::NoAttempts);
        }
        Ok(())
    }
}

// ── Credential ───────────────────────────────────────────────────────────────

/// Provider access token. `Debug` never prints the secret.
#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wrap a raw token.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingCredential`] if the token is blank.
    pub fn new(raw: impl Into<String>) -> Result<Self, ConfigError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(ConfigError::MissingCredential(TOKEN_ENV_VAR));
        }
        Ok(Self(raw.trim().to_string()))
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

// ── Unit tests ───────────────────────────────────────────────────────────────
