//! Instance domain types and the record-log row format.
//!
//! This module is intentionally free of I/O, async, and external layer imports.
//! All functions take data in and return data out.

use std::fmt;
use std::net::Ipv4Addr;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Provider-assigned instance identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(pub u64);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parameters sent to the provider when creating an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRequest {
    pub name: String,
    pub region: String,
    pub size: String,
    pub image: String,
    /// Provider SSH key id or fingerprint installed for the tunnel user.
    pub ssh_key: String,
}

/// What the provider hands back for an accepted create request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedInstance {
    pub id: InstanceId,
    pub created_at: DateTime<Utc>,
}

/// A published instance as shown to the operator and written to the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSummary {
    pub id: InstanceId,
    pub address: Ipv4Addr,
    pub created_at: DateTime<Utc>,
    pub local_port: u16,
}

impl InstanceSummary {
    /// Format as one record-log line (without the trailing newline):
    /// `id,address,created_at_rfc3339,local_port`.
    #[must_use]
    pub fn to_row(&self) -> String {
        format!(
            "{},{},{},{}",
            self.id,
            self.address,
            self.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.local_port
        )
    }

    /// Parse one record-log line.
    ///
    /// # Errors
    ///
    /// Returns an error if the line does not have exactly four fields or any
    /// field fails to parse.
    pub fn parse_row(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.trim().split(',').collect();
        let [id, address, created_at, port] = fields.as_slice() else {
            anyhow::bail!("expected 4 fields, found {}", fields.len());
        };
        Ok(Self {
            id: InstanceId(id.parse().with_context(|| format!("bad instance id {id:?}"))?),
            address: address
                .parse()
                .with_context(|| format!("bad address {address:?}"))?,
            created_at: DateTime::parse_from_rfc3339(created_at)
                .with_context(|| format!("bad timestamp {created_at:?}"))?
                .with_timezone(&Utc),
            local_port: port.parse().with_context(|| format!("bad port {port:?}"))?,
        })
    }

    /// SOCKS endpoint of this instance's tunnel.
    #[must_use]
    pub fn proxy_url(&self) -> String {
        format!("socks5h://127.0.0.1:{}", self.local_port)
    }
}

// ── Command log ───────────────────────────────────────────────────────────────

/// Outcome of a command run through a tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Success,
    Failed,
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "Success",
            Self::Failed => "Failed",
        })
    }
}

/// One row of the command log written by `proxyfleet exec`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLogRow {
    pub instance_id: InstanceId,
    pub egress_ip: String,
    pub ran_at: DateTime<Utc>,
    pub command: String,
    pub status: CommandStatus,
}

impl CommandLogRow {
    /// Format as one CSV line; the command field is always quoted.
    #[must_use]
    pub fn to_row(&self) -> String {
        format!(
            "{},{},{},\"{}\",{}",
            self.instance_id,
            self.egress_ip,
            self.ran_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.command.replace('"', "\"\""),
            self.status
        )
    }
}
