//! Tunnel supervision: establish a dynamic port-forward with bounded retries,
//! watch it for the rest of its life, and kill it on request.
//!
//! State machine per tunnel: `Idle -> Connecting -> Live -> {Failed, Terminated}`.
//! `Failed` is reached only from `Connecting`; `Terminated` only from `Live`.

use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{TunnelProcess, TunnelSpawner};
use crate::application::services::port_allocator::PortLease;
use crate::application::services::wait::pause;
use crate::domain::{FleetError, FleetTimings, InstanceId};

/// Lifecycle of one supervised tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    Idle,
    Connecting,
    Live,
    Failed,
    Terminated,
}

impl fmt::Display for TunnelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Live => "live",
            Self::Failed => "failed",
            Self::Terminated => "terminated",
        })
    }
}

type KillReply = oneshot::Sender<std::io::Result<()>>;

/// Handle to a live tunnel. The process itself is owned by a background
/// watcher task; the handle observes its state and can ask for a kill.
pub struct TunnelHandle {
    pid: Option<u32>,
    lease: PortLease,
    state: watch::Receiver<TunnelState>,
    kill_tx: oneshot::Sender<KillReply>,
}

impl fmt::Debug for TunnelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TunnelHandle")
            .field("pid", &self.pid)
            .field("local_port", &self.lease.port())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl TunnelHandle {
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    #[must_use]
    pub fn local_port(&self) -> u16 {
        self.lease.port()
    }

    /// Current observed state.
    #[must_use]
    pub fn state(&self) -> TunnelState {
        *self.state.borrow()
    }

    /// Send a termination signal to the tunnel process and wait for the
    /// watcher to confirm. A tunnel that already exited counts as killed.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::KillFailed`] if signalling the process fails.
    pub async fn kill(self, id: InstanceId) -> Result<(), FleetError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.kill_tx.send(reply_tx).is_err() {
            tracing::debug!(instance_id = %id, "tunnel already exited");
            return Ok(());
        }
        match reply_rx.await {
            Ok(Ok(())) => {
                tracing::info!(instance_id = %id, local_port = self.lease.port(), "tunnel killed");
                Ok(())
            }
            Ok(Err(e)) => Err(FleetError::KillFailed {
                id,
                reason: e.to_string(),
            }),
            // Watcher saw the exit before it saw our request.
            Err(_) => Ok(()),
        }
    }
}

/// Spawns and owns tunnel processes.
pub struct TunnelSupervisor<S> {
    spawner: Arc<S>,
    timings: FleetTimings,
}

impl<S: TunnelSpawner> TunnelSupervisor<S> {
    #[must_use]
    pub fn new(spawner: Arc<S>, timings: FleetTimings) -> Self {
        Self { spawner, timings }
    }

    /// Establish a tunnel to `address` on the leased local port.
    ///
    /// Waits `pre_connect` first, then makes up to `max_attempts` attempts
    /// separated by `retry_backoff`. An attempt fails if the process cannot
    /// be spawned or exits within the `settle` window.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::TunnelSetupFailed`] once every attempt failed, or
    /// [`FleetError::Cancelled`] if `cancel` fires during a wait.
    pub async fn establish(
        &self,
        address: Ipv4Addr,
        lease: PortLease,
        cancel: Option<&CancellationToken>,
    ) -> Result<TunnelHandle, FleetError> {
        let port = lease.port();
        let (state_tx, state_rx) = watch::channel(TunnelState::Idle);

        pause(self.timings.pre_connect, cancel).await?;
        state_tx.send_replace(TunnelState::Connecting);

        let max_attempts = self.timings.max_attempts.max(1);
        let mut last_error = String::new();
        for attempt in 1..=max_attempts {
            match self.start(address, port).await {
                Ok(process) => {
                    state_tx.send_replace(TunnelState::Live);
                    tracing::info!(%address, local_port = port, attempt, "tunnel live");
                    let pid = process.id();
                    let kill_tx = watch_process(process, address, port, state_tx);
                    return Ok(TunnelHandle {
                        pid,
                        lease,
                        state: state_rx,
                        kill_tx,
                    });
                }
                Err(reason) => {
                    last_error = reason;
                    if attempt < max_attempts {
                        tracing::warn!(
                            %address,
                            local_port = port,
                            attempt,
                            "tunnel setup failed, will retry in {}s: {last_error}",
                            self.timings.retry_backoff.as_secs()
                        );
                        if let Err(e) = pause(self.timings.retry_backoff, cancel).await {
                            state_tx.send_replace(TunnelState::Failed);
                            return Err(e);
                        }
                    }
                }
            }
        }

        state_tx.send_replace(TunnelState::Failed);
        tracing::warn!(%address, local_port = port, "tunnel setup failed after retries: {last_error}");
        Err(FleetError::TunnelSetupFailed {
            address: address.to_string(),
            port,
            attempts: max_attempts,
            reason: last_error,
        })
    }

    /// One attempt: spawn, hook up stderr logging, and require the process
    /// to survive the settle window.
    async fn start(&self, address: Ipv4Addr, port: u16) -> Result<S::Process, String> {
        let mut process = self
            .spawner
            .spawn(address, port)
            .map_err(|e| format!("{e:#}"))?;

        if let Some(stderr) = process.take_stderr() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::warn!(%address, local_port = port, "tunnel stderr: {line}");
                }
            });
        }

        match tokio::time::timeout(self.timings.settle, process.wait()).await {
            Ok(Ok(status)) => Err(format!("tunnel exited during setup ({status})")),
            Ok(Err(e)) => Err(format!("waiting for tunnel: {e}")),
            Err(_elapsed) => Ok(process),
        }
    }
}

/// Move the process into a watcher task that logs its exit or kills it on
/// request. Returns the kill request channel.
fn watch_process<P: TunnelProcess>(
    mut process: P,
    address: Ipv4Addr,
    port: u16,
    state_tx: watch::Sender<TunnelState>,
) -> oneshot::Sender<KillReply> {
    let (kill_tx, kill_rx) = oneshot::channel::<KillReply>();
    tokio::spawn(async move {
        tokio::select! {
            status = process.wait() => match status {
                Ok(status) => tracing::warn!(%address, local_port = port, "tunnel process ended: {status}"),
                Err(e) => tracing::warn!(%address, local_port = port, "tunnel process ended with error: {e}"),
            },
            Ok(reply) = kill_rx => {
                let result = process.kill().await;
                let _ = reply.send(result);
            }
        }
        state_tx.send_replace(TunnelState::Terminated);
    });
    kill_tx
}
