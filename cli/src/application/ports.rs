//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain` — never from `crate::infra`,
//! `crate::commands`, or `crate::output`.
//!
//! Ports used from spawned provisioning flows return `Send` futures so the
//! flows can run on the multi-threaded runtime.

use std::future::Future;
use std::net::Ipv4Addr;
use std::path::Path;
use std::process::{ExitStatus, Output};
use std::time::Duration;

use anyhow::Result;
use tokio::io::AsyncRead;

use crate::domain::{CommandLogRow, CreatedInstance, InstanceId, InstanceRequest, InstanceSummary};

// ── Provider Port ─────────────────────────────────────────────────────────────

/// Cloud provider instance API: create, look up, delete.
pub trait InstanceApi: Send + Sync + 'static {
    /// Submit a creation request. Errors mean the provider rejected it.
    fn create_instance(
        &self,
        request: &InstanceRequest,
    ) -> impl Future<Output = Result<CreatedInstance>> + Send;

    /// Look up the instance's public IPv4 address.
    ///
    /// `Ok(None)` means the address is not assigned yet.
    fn public_ipv4(&self, id: InstanceId) -> impl Future<Output = Result<Option<Ipv4Addr>>> + Send;

    /// Delete the instance.
    fn delete_instance(&self, id: InstanceId) -> impl Future<Output = Result<()>> + Send;
}

// ── Tunnel Ports ──────────────────────────────────────────────────────────────

/// Diagnostic stream of a tunnel process.
pub type TunnelStderr = Box<dyn AsyncRead + Send + Unpin>;

/// Starts dynamic port-forward processes.
pub trait TunnelSpawner: Send + Sync + 'static {
    type Process: TunnelProcess;

    /// Spawn a tunnel forwarding `local_port` through `address`.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be started.
    fn spawn(&self, address: Ipv4Addr, local_port: u16) -> Result<Self::Process>;
}

/// A running tunnel process owned by the supervisor.
pub trait TunnelProcess: Send + 'static {
    /// OS process id, if known.
    fn id(&self) -> Option<u32>;

    /// Take the stderr stream. Returns `None` after the first call.
    fn take_stderr(&mut self) -> Option<TunnelStderr>;

    /// Wait for the process to exit.
    fn wait(&mut self) -> impl Future<Output = std::io::Result<ExitStatus>> + Send;

    /// Send a termination signal and reap the process.
    fn kill(&mut self) -> impl Future<Output = std::io::Result<()>> + Send;
}

// ── Port Probe ────────────────────────────────────────────────────────────────

/// Checks whether a local TCP port can currently be bound.
pub trait PortProbe: Send + Sync + 'static {
    /// Bind the port and release it immediately. `true` if the bind succeeded.
    fn try_bind(&self, port: u16) -> bool;
}

// ── Record Log Port ───────────────────────────────────────────────────────────

/// Durable, append-only store of published instances.
pub trait RecordSink: Send + Sync + 'static {
    /// Append one record and make it durable before returning.
    fn append(&self, record: &InstanceSummary) -> impl Future<Output = Result<()>> + Send;
}

/// Append-only log of commands run through a tunnel.
#[allow(async_fn_in_trait)]
pub trait CommandLogSink {
    /// Append one row.
    ///
    /// # Errors
    ///
    /// Returns an error if the row cannot be written.
    async fn append_command(&self, row: &CommandLogRow) -> Result<()>;
}

// ── Proxy Chain Port ──────────────────────────────────────────────────────────

/// Writes the proxychains configuration that pins a command to one tunnel.
pub trait ProxyChainWriter {
    /// Handle to the written file. Dropping it removes the file.
    type Config: AsRef<Path>;

    /// Write a chain whose only hop is the SOCKS listener on `local_port`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written.
    fn write_chain(&self, local_port: u16) -> Result<Self::Config>;
}

// ── Command Runner Port ───────────────────────────────────────────────────────

/// Abstracts process execution so infrastructure can be swapped or mocked.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a program and capture its output.
    ///
    /// Implementations should delegate to `run_with_timeout` using the
    /// instance's configured default timeout.
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output>;
    /// Run a program with a custom timeout override.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or exceeds `timeout`.
    /// On timeout, the child process must be killed (not left orphaned).
    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output>;
    /// Run a program with inherited stdio and extra environment variables,
    /// returning only its exit status.
    async fn run_status_with_env(
        &self,
        program: &str,
        args: &[&str],
        env: &[(&str, &str)],
    ) -> Result<ExitStatus>;
}

// ── Progress Reporting Port ───────────────────────────────────────────────────

/// Abstracts progress reporting so services can emit events without
/// depending on the Presentation layer. Sync trait — no async needed.
pub trait ProgressReporter: Send + Sync {
    /// Emit an in-progress step message.
    fn step(&self, message: &str);
    /// Emit a success message.
    fn success(&self, message: &str);
    /// Emit a warning message.
    fn warn(&self, message: &str);
    /// Emit an error message. Never suppressed.
    fn error(&self, message: &str);
}
