//! Fleet coordination: fan out provisioning flows, fan their results into a
//! shared state, and tear everything down on request.
//!
//! `FleetState` is the only shared mutable structure. It tracks instances
//! from the moment the provider accepts them (`provisional`) until their
//! tunnel is live and logged (`published`). Teardown closes the state and
//! drains both sets in one critical section, so no flow can publish into a
//! fleet that is already being torn down.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    InstanceApi, PortProbe, ProgressReporter, RecordSink, TunnelSpawner,
};
use crate::application::services::port_allocator::PortAllocator;
use crate::application::services::provisioner::InstanceProvisioner;
use crate::application::services::tunnel::{TunnelHandle, TunnelSupervisor};
use crate::application::services::wait::pause;
use crate::domain::{FleetConfig, FleetError, InstanceId, InstanceSummary};

/// One instance with a live, logged tunnel.
#[derive(Debug)]
pub struct InstanceRecord {
    pub id: InstanceId,
    pub address: Ipv4Addr,
    pub created_at: DateTime<Utc>,
    pub tunnel: TunnelHandle,
}

impl InstanceRecord {
    #[must_use]
    pub fn summary(&self) -> InstanceSummary {
        InstanceSummary {
            id: self.id,
            address: self.address,
            created_at: self.created_at,
            local_port: self.tunnel.local_port(),
        }
    }
}

// ── Shared state ──────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct FleetInner {
    published: Vec<InstanceRecord>,
    provisional: BTreeSet<InstanceId>,
    closed: bool,
}

/// Published records plus instances created but not yet published.
#[derive(Debug, Default)]
pub struct FleetState {
    inner: Mutex<FleetInner>,
}

impl FleetState {
    /// Track a freshly created instance so teardown can destroy it even if
    /// its flow never finishes.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::FleetClosed`] once teardown has started.
    pub async fn register(&self, id: InstanceId) -> Result<(), FleetError> {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return Err(FleetError::FleetClosed(id));
        }
        inner.provisional.insert(id);
        Ok(())
    }

    /// Move a record from provisional to published.
    ///
    /// # Errors
    ///
    /// Hands the record back if teardown has started; the caller owns its
    /// cleanup.
    pub async fn publish(&self, record: InstanceRecord) -> Result<(), InstanceRecord> {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return Err(record);
        }
        inner.provisional.remove(&record.id);
        inner.published.push(record);
        Ok(())
    }

    /// Snapshot of every published record.
    pub async fn summaries(&self) -> Vec<InstanceSummary> {
        let inner = self.inner.lock().await;
        inner.published.iter().map(InstanceRecord::summary).collect()
    }

    /// Instances created but not (yet) published.
    pub async fn pending(&self) -> Vec<InstanceId> {
        self.inner.lock().await.provisional.iter().copied().collect()
    }

    /// Close the fleet and take everything it holds. Later calls return
    /// empty sets.
    pub async fn close(&self) -> (Vec<InstanceRecord>, Vec<InstanceId>) {
        let mut inner = self.inner.lock().await;
        inner.closed = true;
        let records = std::mem::take(&mut inner.published);
        let pending = std::mem::take(&mut inner.provisional);
        (records, pending.into_iter().collect())
    }
}

// ── Teardown ──────────────────────────────────────────────────────────────────

/// Outcome of a teardown pass.
#[derive(Debug, Default)]
pub struct TeardownReport {
    pub killed: usize,
    pub destroyed: usize,
    pub failures: Vec<FleetError>,
}

impl TeardownReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Kill every record's tunnel and destroy every instance, including ones
/// that were created but never published. Each step is attempted even if an
/// earlier one failed; failures are reported and collected, never raised.
pub async fn teardown<A: InstanceApi>(
    records: Vec<InstanceRecord>,
    pending: Vec<InstanceId>,
    provisioner: &InstanceProvisioner<A>,
    reporter: &dyn ProgressReporter,
) -> TeardownReport {
    let mut report = TeardownReport::default();

    for record in records {
        let id = record.id;
        reporter.step(&format!("killing tunnel for instance {id}..."));
        match record.tunnel.kill(id).await {
            Ok(()) => report.killed += 1,
            Err(e) => {
                reporter.error(&e.to_string());
                report.failures.push(e);
            }
        }
        destroy_one(id, provisioner, reporter, &mut report).await;
    }

    for id in pending {
        reporter.step(&format!("destroying unfinished instance {id}..."));
        destroy_one(id, provisioner, reporter, &mut report).await;
    }

    report
}

async fn destroy_one<A: InstanceApi>(
    id: InstanceId,
    provisioner: &InstanceProvisioner<A>,
    reporter: &dyn ProgressReporter,
    report: &mut TeardownReport,
) {
    match provisioner.destroy(id).await {
        Ok(()) => {
            reporter.success(&format!("destroyed instance {id}"));
            report.destroyed += 1;
        }
        Err(e) => {
            reporter.error(&e.to_string());
            report.failures.push(e);
        }
    }
}

// ── Coordinator ───────────────────────────────────────────────────────────────

/// Orchestrates the provisioning flows and owns the shared fleet state.
pub struct FleetCoordinator<A, S, P, L> {
    config: Arc<FleetConfig>,
    provisioner: Arc<InstanceProvisioner<A>>,
    supervisor: Arc<TunnelSupervisor<S>>,
    ports: Arc<PortAllocator<P>>,
    log: Arc<L>,
    state: Arc<FleetState>,
    reporter: Arc<dyn ProgressReporter>,
}

impl<A, S, P, L> FleetCoordinator<A, S, P, L>
where
    A: InstanceApi,
    S: TunnelSpawner,
    P: PortProbe,
    L: RecordSink,
{
    #[must_use]
    pub fn new(
        config: Arc<FleetConfig>,
        api: Arc<A>,
        spawner: Arc<S>,
        probe: P,
        log: Arc<L>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Self {
        Self {
            provisioner: Arc::new(InstanceProvisioner::new(api, Arc::clone(&config))),
            supervisor: Arc::new(TunnelSupervisor::new(spawner, config.timings.clone())),
            ports: Arc::new(PortAllocator::new(probe)),
            log,
            state: Arc::default(),
            reporter,
            config,
        }
    }

    #[must_use]
    pub fn state(&self) -> &Arc<FleetState> {
        &self.state
    }

    /// Launch `n` provisioning flows, staggered, and wait for all of them.
    ///
    /// A failing flow is reported and dropped; its siblings keep going.
    /// Cancelling `cancel` stops new launches and interrupts every wait.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::LogWriteFailed`] if any flow could not log its
    /// record. The remaining flows are cancelled first.
    pub async fn run(
        &self,
        n: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<InstanceSummary>, FleetError> {
        let flows_cancel = cancel.child_token();
        let mut flows = JoinSet::new();

        for i in 0..n {
            if i > 0 && pause(self.config.timings.stagger, Some(&flows_cancel)).await.is_err() {
                break;
            }
            let flow = self.flow();
            let token = flows_cancel.clone();
            flows.spawn(async move { flow.run(&token).await });
        }

        let mut fatal = None;
        while let Some(joined) = flows.join_next().await {
            match joined {
                Ok(Ok(_)) | Ok(Err(FleetError::Cancelled | FleetError::FleetClosed(_))) => {}
                Ok(Err(e)) if e.is_fatal() => {
                    self.reporter.error(&e.to_string());
                    flows_cancel.cancel();
                    fatal.get_or_insert(e);
                }
                Ok(Err(e)) => self.reporter.warn(&format!("provisioning flow abandoned: {e}")),
                Err(e) => self.reporter.error(&format!("provisioning flow crashed: {e}")),
            }
        }

        match fatal {
            Some(e) => Err(e),
            None => Ok(self.state.summaries().await),
        }
    }

    /// Close the fleet and tear down everything it tracked.
    pub async fn teardown(&self) -> TeardownReport {
        let (records, pending) = self.state.close().await;
        teardown(records, pending, &self.provisioner, self.reporter.as_ref()).await
    }

    fn flow(&self) -> Flow<A, S, P, L> {
        Flow {
            provisioner: Arc::clone(&self.provisioner),
            supervisor: Arc::clone(&self.supervisor),
            ports: Arc::clone(&self.ports),
            log: Arc::clone(&self.log),
            state: Arc::clone(&self.state),
            reporter: Arc::clone(&self.reporter),
        }
    }
}

/// Everything one provisioning flow needs, owned so it can run on its own task.
struct Flow<A, S, P, L> {
    provisioner: Arc<InstanceProvisioner<A>>,
    supervisor: Arc<TunnelSupervisor<S>>,
    ports: Arc<PortAllocator<P>>,
    log: Arc<L>,
    state: Arc<FleetState>,
    reporter: Arc<dyn ProgressReporter>,
}

impl<A, S, P, L> Flow<A, S, P, L>
where
    A: InstanceApi,
    S: TunnelSpawner,
    P: PortProbe,
    L: RecordSink,
{
    /// create → await address → allocate port → establish tunnel → log → publish.
    async fn run(self, cancel: &CancellationToken) -> Result<InstanceSummary, FleetError> {
        let request = self.provisioner.request();
        let created = self.provisioner.create(&request).await?;
        let id = created.id;

        if let Err(e) = self.state.register(id).await {
            self.discard(id, None).await;
            return Err(e);
        }
        self.reporter
            .step(&format!("instance {id} requested in {}", request.region));

        let address = self.provisioner.await_address(id, Some(cancel)).await?;
        let lease = self.ports.allocate().await;
        let tunnel = self.supervisor.establish(address, lease, Some(cancel)).await?;

        let record = InstanceRecord {
            id,
            address,
            created_at: created.created_at,
            tunnel,
        };
        let summary = record.summary();

        if let Err(e) = self.log.append(&summary).await {
            // Leave the instance provisional; teardown destroys it.
            if let Err(kill) = record.tunnel.kill(id).await {
                self.reporter.error(&kill.to_string());
            }
            return Err(FleetError::LogWriteFailed(format!("{e:#}")));
        }

        let pid = record.tunnel.pid();
        if let Err(record) = self.state.publish(record).await {
            self.discard(id, Some(record.tunnel)).await;
            return Err(FleetError::FleetClosed(id));
        }

        tracing::info!(
            instance_id = %id,
            %address,
            local_port = summary.local_port,
            pid = ?pid,
            "instance published"
        );
        self.reporter.success(&format!(
            "instance {id} at {address}: SOCKS tunnel on local port {}",
            summary.local_port
        ));
        Ok(summary)
    }

    /// Clean up an instance the closed fleet no longer tracks.
    async fn discard(&self, id: InstanceId, tunnel: Option<TunnelHandle>) {
        if let Some(tunnel) = tunnel {
            if let Err(e) = tunnel.kill(id).await {
                self.reporter.error(&e.to_string());
            }
        }
        if let Err(e) = self.provisioner.destroy(id).await {
            self.reporter.error(&e.to_string());
        }
    }
}
