//! Shared fakes for application service tests.
//!
//! Provides cross-platform `exit_status()` plus in-memory implementations of
//! every port the fleet services depend on.

#![allow(clippy::unwrap_used)]

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::process::ExitStatus;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::{TimeZone, Utc};
use tokio::sync::watch;

use crate::application::ports::{
    InstanceApi, PortProbe, ProgressReporter, RecordSink, TunnelProcess, TunnelSpawner,
    TunnelStderr,
};
use crate::domain::config::{ConfigOverrides, FileConfig};
use crate::domain::{CreatedInstance, FleetConfig, InstanceId, InstanceRequest, InstanceSummary};

/// Build an `ExitStatus` from a logical exit code (cross-platform).
#[cfg(unix)]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;
    ExitStatus::from_raw(code << 8)
}

#[cfg(windows)]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;
    #[allow(clippy::cast_sign_loss)]
    ExitStatus::from_raw(code as u32)
}

/// Fleet config with two regions and the production timings.
pub fn test_config(count: usize) -> FleetConfig {
    FleetConfig::resolve(
        FileConfig {
            regions: Some(vec!["nyc1".into(), "lon1".into()]),
            ..FileConfig::default()
        },
        ConfigOverrides {
            count: Some(count),
            ssh_key: Some("12345853".into()),
            ..ConfigOverrides::default()
        },
    )
    .unwrap()
}

// ── Provider ──────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeApiState {
    pub next_id: u64,
    pub created: Vec<InstanceRequest>,
    pub lookups: HashMap<InstanceId, u32>,
    /// Instance → number of lookups that still report "no address".
    pub ready_after: HashMap<InstanceId, u32>,
    pub lookup_errors: HashSet<InstanceId>,
    pub deleted: HashSet<InstanceId>,
    pub delete_calls: HashMap<InstanceId, u32>,
    pub failing_deletes: HashSet<InstanceId>,
}

/// In-memory provider. Instances never get an address unless configured.
#[derive(Clone, Default)]
pub struct FakeApi {
    pub state: Arc<Mutex<FakeApiState>>,
    pub reject_create: bool,
}

impl FakeApi {
    pub fn address_after(self, id: InstanceId, empty_lookups: u32) -> Self {
        self.state.lock().unwrap().ready_after.insert(id, empty_lookups);
        self
    }

    pub fn lookup_error(self, id: InstanceId) -> Self {
        self.state.lock().unwrap().lookup_errors.insert(id);
        self
    }

    pub fn failing_delete(self, id: InstanceId) -> Self {
        self.state.lock().unwrap().failing_deletes.insert(id);
        self
    }

    pub fn lookups(&self, id: InstanceId) -> u32 {
        self.state.lock().unwrap().lookups.get(&id).copied().unwrap_or(0)
    }

    pub fn deletes(&self, id: InstanceId) -> u32 {
        self.state.lock().unwrap().delete_calls.get(&id).copied().unwrap_or(0)
    }

    pub fn total_deletes(&self) -> u32 {
        self.state.lock().unwrap().delete_calls.values().sum()
    }

    pub fn created(&self) -> usize {
        self.state.lock().unwrap().created.len()
    }
}

pub fn address_of(id: InstanceId) -> Ipv4Addr {
    let [.., a, b] = id.0.to_be_bytes();
    Ipv4Addr::new(10, 0, a, b)
}

impl InstanceApi for FakeApi {
    async fn create_instance(&self, request: &InstanceRequest) -> Result<CreatedInstance> {
        if self.reject_create {
            anyhow::bail!("422 Unprocessable Entity: size is not available");
        }
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        state.created.push(request.clone());
        Ok(CreatedInstance {
            id: InstanceId(state.next_id),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
        })
    }

    async fn public_ipv4(&self, id: InstanceId) -> Result<Option<Ipv4Addr>> {
        let mut state = self.state.lock().unwrap();
        *state.lookups.entry(id).or_default() += 1;
        if state.lookup_errors.contains(&id) {
            anyhow::bail!("503 Service Unavailable");
        }
        let looked = state.lookups[&id];
        Ok(match state.ready_after.get(&id) {
            Some(empty) if looked > *empty => Some(address_of(id)),
            _ => None,
        })
    }

    async fn delete_instance(&self, id: InstanceId) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        *state.delete_calls.entry(id).or_default() += 1;
        if state.failing_deletes.contains(&id) {
            anyhow::bail!("500 Internal Server Error");
        }
        if !state.deleted.insert(id) {
            anyhow::bail!("404 Not Found: droplet {id}");
        }
        Ok(())
    }
}

// ── Tunnels ───────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeSpawnerState {
    pub fail_first: u32,
    pub exit_immediately: bool,
    pub kill_fails: bool,
    pub spawns: AtomicU32,
    pub kills: AtomicU32,
    pub dead: Option<watch::Sender<bool>>,
}

/// Tunnel spawner whose processes live until killed or told to die.
#[derive(Clone)]
pub struct FakeSpawner(pub Arc<FakeSpawnerState>);

impl FakeSpawner {
    fn build(state: FakeSpawnerState) -> Self {
        let (dead, _) = watch::channel(false);
        Self(Arc::new(FakeSpawnerState {
            dead: Some(dead),
            ..state
        }))
    }

    pub fn healthy() -> Self {
        Self::build(FakeSpawnerState::default())
    }

    pub fn failing_first(n: u32) -> Self {
        Self::build(FakeSpawnerState {
            fail_first: n,
            ..FakeSpawnerState::default()
        })
    }

    pub fn always_failing() -> Self {
        Self::failing_first(u32::MAX)
    }

    pub fn exiting_immediately() -> Self {
        Self::build(FakeSpawnerState {
            exit_immediately: true,
            ..FakeSpawnerState::default()
        })
    }

    pub fn with_failing_kill(self) -> Self {
        let state = Arc::try_unwrap(self.0).ok().unwrap();
        Self::build(FakeSpawnerState {
            kill_fails: true,
            ..state
        })
    }

    pub fn spawns(&self) -> u32 {
        self.0.spawns.load(Ordering::SeqCst)
    }

    pub fn kills(&self) -> u32 {
        self.0.kills.load(Ordering::SeqCst)
    }

    /// Make every live process exit as if the remote end dropped.
    pub fn kill_all_from_outside(&self) {
        if let Some(dead) = &self.0.dead {
            dead.send_replace(true);
        }
    }
}

impl TunnelSpawner for FakeSpawner {
    type Process = FakeProcess;

    fn spawn(&self, _address: Ipv4Addr, _local_port: u16) -> Result<FakeProcess> {
        let n = self.0.spawns.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= self.0.fail_first {
            anyhow::bail!("ssh: connect to host port 22: Connection refused");
        }
        let dead = self.0.dead.as_ref().unwrap().subscribe();
        Ok(FakeProcess {
            owner: Arc::clone(&self.0),
            dead,
            stderr: Some(b"Warning: Permanently added host (ED25519)\n".to_vec()),
        })
    }
}

pub struct FakeProcess {
    owner: Arc<FakeSpawnerState>,
    dead: watch::Receiver<bool>,
    stderr: Option<Vec<u8>>,
}

impl TunnelProcess for FakeProcess {
    fn id(&self) -> Option<u32> {
        Some(4242)
    }

    fn take_stderr(&mut self) -> Option<TunnelStderr> {
        self.stderr
            .take()
            .map(|bytes| Box::new(std::io::Cursor::new(bytes)) as TunnelStderr)
    }

    async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        if !self.owner.exit_immediately {
            let _ = self.dead.wait_for(|dead| *dead).await;
        }
        Ok(exit_status(255))
    }

    async fn kill(&mut self) -> std::io::Result<()> {
        self.owner.kills.fetch_add(1, Ordering::SeqCst);
        if self.owner.kill_fails {
            return Err(std::io::Error::from(std::io::ErrorKind::PermissionDenied));
        }
        Ok(())
    }
}

// ── Ports, log, reporter ──────────────────────────────────────────────────────

/// Probe that accepts every port.
pub struct AnyPort;

impl PortProbe for AnyPort {
    fn try_bind(&self, _port: u16) -> bool {
        true
    }
}

/// Record sink that keeps rows in memory.
#[derive(Clone, Default)]
pub struct MemorySink {
    pub rows: Arc<Mutex<Vec<InstanceSummary>>>,
    pub broken: bool,
}

impl MemorySink {
    pub fn broken() -> Self {
        Self {
            broken: true,
            ..Self::default()
        }
    }

    pub fn rows(&self) -> Vec<InstanceSummary> {
        self.rows.lock().unwrap().clone()
    }
}

impl RecordSink for MemorySink {
    async fn append(&self, record: &InstanceSummary) -> Result<()> {
        if self.broken {
            anyhow::bail!("No space left on device");
        }
        self.rows.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// Reporter that records every message.
#[derive(Default)]
pub struct RecordingReporter {
    pub lines: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn errors(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .filter_map(|l| l.strip_prefix("error: ").map(String::from))
            .collect()
    }
}

impl ProgressReporter for RecordingReporter {
    fn step(&self, message: &str) {
        self.lines.lock().unwrap().push(format!("step: {message}"));
    }
    fn success(&self, message: &str) {
        self.lines.lock().unwrap().push(format!("success: {message}"));
    }
    fn warn(&self, message: &str) {
        self.lines.lock().unwrap().push(format!("warn: {message}"));
    }
    fn error(&self, message: &str) {
        self.lines.lock().unwrap().push(format!("error: {message}"));
    }
}
