//! Local forwarding port allocation.
//!
//! Candidates are drawn uniformly from a fixed range and probed with a
//! bind-then-release. Ports handed out by this allocator stay reserved
//! in-process until their [`PortLease`] is dropped, so two flows never hold
//! the same port at once. The OS can still hand the port to someone else
//! between the probe and the tunnel's own bind; the tunnel supervisor's
//! retry policy absorbs that.

use std::collections::HashSet;
use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex, PoisonError};

use rand::Rng;
use tokio::task::yield_now;

use crate::application::ports::PortProbe;

/// Default candidate range for forwarding ports.
pub const DEFAULT_PORT_RANGE: RangeInclusive<u16> = 8000..=8999;

type Reserved = Arc<Mutex<HashSet<u16>>>;

/// Picks free local TCP ports.
pub struct PortAllocator<P> {
    probe: P,
    range: RangeInclusive<u16>,
    reserved: Reserved,
}

impl<P: PortProbe> PortAllocator<P> {
    #[must_use]
    pub fn new(probe: P) -> Self {
        Self::with_range(probe, DEFAULT_PORT_RANGE)
    }

    #[must_use]
    pub fn with_range(probe: P, range: RangeInclusive<u16>) -> Self {
        Self {
            probe,
            range,
            reserved: Arc::default(),
        }
    }

    /// Allocate a port using the thread-local RNG.
    ///
    /// Retries with fresh candidates until one binds, yielding to the
    /// runtime between rejected candidates. There is no attempt bound; the
    /// range is large relative to fleet sizes.
    pub async fn allocate(&self) -> PortLease {
        loop {
            let picked = self.try_allocate_with(&mut rand::thread_rng());
            if let Some(lease) = picked {
                return lease;
            }
            yield_now().await;
        }
    }

    /// Draw one candidate from `rng` and lease it if it is free.
    pub fn try_allocate_with(&self, rng: &mut impl Rng) -> Option<PortLease> {
        let candidate = rng.gen_range(self.range.clone());
        let mut reserved = self.reserved.lock().unwrap_or_else(PoisonError::into_inner);
        if reserved.contains(&candidate) || !self.probe.try_bind(candidate) {
            return None;
        }
        reserved.insert(candidate);
        tracing::debug!(port = candidate, "reserved local port");
        Some(PortLease {
            port: candidate,
            reserved: Arc::clone(&self.reserved),
        })
    }
}

/// A reserved port. Dropping the lease returns the port to the pool.
#[derive(Debug)]
pub struct PortLease {
    port: u16,
    reserved: Reserved,
}

impl PortLease {
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Drop for PortLease {
    fn drop(&mut self) {
        self.reserved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.port);
    }
}
