//! Configuration sources: the YAML defaults file and the provider credential.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::domain::config::{AccessToken, FileConfig};

/// Environment variable that overrides the config file location.
pub const CONFIG_PATH_ENV_VAR: &str = "PROXYFLEET_CONFIG";

/// Loads persistent fleet defaults from a YAML file on disk.
pub struct YamlConfigStore {
    path: PathBuf,
}

impl YamlConfigStore {
    /// Store at `$PROXYFLEET_CONFIG`, or `~/.proxyfleet/config.yaml`.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn from_env() -> Result<Self> {
        if let Ok(val) = std::env::var(CONFIG_PATH_ENV_VAR) {
            return Ok(Self::at(val));
        }
        let home =
            dirs::home_dir().ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
        Ok(Self::at(home.join(".proxyfleet").join("config.yaml")))
    }

    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the file. A missing file yields the empty configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(&self) -> Result<FileConfig> {
        if !self.path.exists() {
            return Ok(FileConfig::default());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("cannot read {}", self.path.display()))?;
        if content.trim().is_empty() {
            return Ok(FileConfig::default());
        }
        serde_yaml::from_str(&content)
            .with_context(|| format!("cannot parse {}", self.path.display()))
    }
}

/// Provider credentials loaded from the environment via `envy`.
///
/// Maps `DIGITALOCEAN_ACCESS_TOKEN` to `digitalocean_access_token`.
#[derive(Debug, Deserialize)]
struct Credentials {
    digitalocean_access_token: Option<String>,
}

/// Load the provider token from the process environment.
///
/// # Errors
///
/// Returns an error if the variable is unset or blank.
pub fn load_access_token() -> Result<AccessToken> {
    access_token_from(std::env::vars())
}

fn access_token_from(vars: impl Iterator<Item = (String, String)>) -> Result<AccessToken> {
    let credentials: Credentials =
        envy::from_iter(vars).context("failed to read credentials from the environment")?;
    let raw = credentials.digitalocean_access_token.unwrap_or_default();
    Ok(AccessToken::new(raw)?)
}
