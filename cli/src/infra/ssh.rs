//! `ssh -D` tunnel processes — implements `TunnelSpawner` / `TunnelProcess`.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use anyhow::{Context, Result};
use tokio::process::{Child, Command};

use crate::application::ports::{TunnelProcess, TunnelSpawner, TunnelStderr};

/// Spawns `ssh -N -D <port>` dynamic forwards to provisioned instances.
pub struct SshTunnelSpawner {
    program: String,
    user: String,
    identity_file: Option<PathBuf>,
}

impl SshTunnelSpawner {
    #[must_use]
    pub fn new(user: impl Into<String>, identity_file: Option<PathBuf>) -> Self {
        Self {
            program: "ssh".to_string(),
            user: user.into(),
            identity_file,
        }
    }

    /// Use a different ssh binary.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Arguments passed to ssh for one tunnel.
    #[must_use]
    pub fn args(&self, address: Ipv4Addr, local_port: u16) -> Vec<String> {
        let mut args = vec![
            "-N".to_string(),
            "-o".to_string(),
            "ExitOnForwardFailure=yes".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
        ];
        if let Some(identity) = &self.identity_file {
            args.push("-i".to_string());
            args.push(identity.display().to_string());
        }
        args.push("-D".to_string());
        args.push(local_port.to_string());
        args.push(format!("{}@{address}", self.user));
        args
    }
}

impl TunnelSpawner for SshTunnelSpawner {
    type Process = SshProcess;

    fn spawn(&self, address: Ipv4Addr, local_port: u16) -> Result<SshProcess> {
        let child = Command::new(&self.program)
            .args(self.args(address, local_port))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.program))?;
        Ok(SshProcess { child })
    }
}

/// A running ssh child process.
pub struct SshProcess {
    child: Child,
}

impl TunnelProcess for SshProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn take_stderr(&mut self) -> Option<TunnelStderr> {
        self.child
            .stderr
            .take()
            .map(|stderr| Box::new(stderr) as TunnelStderr)
    }

    async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    async fn kill(&mut self) -> std::io::Result<()> {
        self.child.kill().await
    }
}
