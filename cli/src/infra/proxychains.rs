//! Per-run proxychains configuration.
//!
//! Each proxied command gets its own config file in the temp directory,
//! handed to the launcher with `-f`. The system-wide `/etc/proxychains.conf`
//! is never touched.

use std::io::Write;

use anyhow::{Context, Result};
use tempfile::TempPath;

use crate::application::ports::ProxyChainWriter;

/// Launcher used when none is configured (proxychains-ng).
pub const DEFAULT_LAUNCHER: &str = "proxychains4";

/// Render a strict single-hop chain through the SOCKS listener on
/// `local_port`. DNS is resolved through the tunnel as well.
#[must_use]
pub fn chain_config(local_port: u16) -> String {
    format!(
        "strict_chain\n\
         quiet_mode\n\
         proxy_dns\n\
         tcp_read_time_out 15000\n\
         tcp_connect_time_out 8000\n\
         \n\
         [ProxyList]\n\
         socks5 127.0.0.1 {local_port}\n"
    )
}

/// Writes chain configs to named temp files that are removed on drop.
#[derive(Debug, Default, Clone, Copy)]
pub struct TempChainWriter;

impl ProxyChainWriter for TempChainWriter {
    type Config = TempPath;

    fn write_chain(&self, local_port: u16) -> Result<TempPath> {
        let mut file = tempfile::Builder::new()
            .prefix("proxyfleet-chain-")
            .suffix(".conf")
            .tempfile()
            .context("cannot create proxychains config")?;
        file.write_all(chain_config(local_port).as_bytes())
            .and_then(|()| file.flush())
            .context("cannot write proxychains config")?;
        tracing::debug!(path = %file.path().display(), local_port, "wrote proxychains config");
        Ok(file.into_temp_path())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_config_has_single_socks_hop() {
        let conf = chain_config(8123);
        assert!(conf.contains("strict_chain"));
        assert!(conf.contains("proxy_dns"));
        let proxies: Vec<&str> = conf
            .split("[ProxyList]")
            .nth(1)
            .unwrap()
            .lines()
            .filter(|l| !l.trim().is_empty())
            .collect();
        assert_eq!(proxies, ["socks5 127.0.0.1 8123"]);
    }

    #[test]
    fn test_temp_chain_is_written_and_removed_on_drop() {
        let conf = TempChainWriter.write_chain(8456).expect("write");
        let path = conf.to_path_buf();
        let written = std::fs::read_to_string(&path).expect("read");
        assert_eq!(written, chain_config(8456));
        drop(conf);
        assert!(!path.exists());
    }
}
