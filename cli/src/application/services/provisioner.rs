//! Instance provisioning: create, wait for a public address, destroy.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use tokio_util::sync::CancellationToken;

use crate::application::ports::InstanceApi;
use crate::application::services::wait::pause;
use crate::domain::{CreatedInstance, FleetConfig, FleetError, InstanceId, InstanceRequest};

/// Wraps the provider API with the fleet's create/poll/destroy policy.
pub struct InstanceProvisioner<A> {
    api: Arc<A>,
    config: Arc<FleetConfig>,
}

impl<A: InstanceApi> InstanceProvisioner<A> {
    #[must_use]
    pub fn new(api: Arc<A>, config: Arc<FleetConfig>) -> Self {
        Self { api, config }
    }

    /// Build a creation request with a randomly chosen region.
    #[must_use]
    pub fn request(&self) -> InstanceRequest {
        let region = self
            .config
            .regions
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_default();
        let suffix = chrono::Utc::now().timestamp_subsec_nanos();
        InstanceRequest {
            name: format!("{}-{suffix}", self.config.name_prefix),
            region,
            size: self.config.size.clone(),
            image: self.config.image.clone(),
            ssh_key: self.config.ssh_key.clone(),
        }
    }

    /// Submit a creation request.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::ProviderRejected`] if the provider refuses it.
    pub async fn create(&self, request: &InstanceRequest) -> Result<CreatedInstance, FleetError> {
        tracing::info!(name = %request.name, region = %request.region, "creating instance");
        self.api
            .create_instance(request)
            .await
            .map_err(|e| FleetError::ProviderRejected(format!("{e:#}")))
    }

    /// Poll until the instance reports a public IPv4 address.
    ///
    /// Waits `poll_interval` between lookups with no upper bound. A missing
    /// address is a retry condition; only a failing provider call ends the
    /// wait with [`FleetError::LookupFailed`].
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::LookupFailed`] on a provider error, or
    /// [`FleetError::Cancelled`] if `cancel` fires while waiting.
    pub async fn await_address(
        &self,
        id: InstanceId,
        cancel: Option<&CancellationToken>,
    ) -> Result<Ipv4Addr, FleetError> {
        self.await_address_every(id, self.config.timings.poll_interval, cancel)
            .await
    }

    async fn await_address_every(
        &self,
        id: InstanceId,
        interval: Duration,
        cancel: Option<&CancellationToken>,
    ) -> Result<Ipv4Addr, FleetError> {
        loop {
            match self.api.public_ipv4(id).await {
                Ok(Some(address)) => {
                    tracing::info!(instance_id = %id, %address, "public address assigned");
                    return Ok(address);
                }
                Ok(None) => {
                    tracing::info!(instance_id = %id, "waiting for public address to be assigned");
                }
                Err(e) => {
                    return Err(FleetError::LookupFailed {
                        id,
                        reason: format!("{e:#}"),
                    });
                }
            }
            pause(interval, cancel).await?;
        }
    }

    /// Delete the instance. Never escalates beyond the returned error.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::DestroyFailed`] if the provider call fails.
    pub async fn destroy(&self, id: InstanceId) -> Result<(), FleetError> {
        self.api
            .delete_instance(id)
            .await
            .map_err(|e| FleetError::DestroyFailed {
                id,
                reason: format!("{e:#}"),
            })?;
        tracing::info!(instance_id = %id, "instance destroyed");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::application::services::test_support::{FakeApi, test_config};
    use tokio::time::Instant;

    fn provisioner(api: FakeApi) -> InstanceProvisioner<FakeApi> {
        InstanceProvisioner::new(Arc::new(api), Arc::new(test_config(1)))
    }

    #[test]
    fn test_request_uses_configured_spec() {
        let p = provisioner(FakeApi::default());
        let req = p.request();
        assert!(["nyc1", "lon1"].contains(&req.region.as_str()), "got {}", req.region);
        assert_eq!(req.image, "ubuntu-20-04-x64");
        assert_eq!(req.size, "s-1vcpu-1gb");
        assert_eq!(req.ssh_key, "12345853");
        assert!(req.name.starts_with("droplet-"), "got {}", req.name);
    }

    #[tokio::test]
    async fn test_create_maps_rejection() {
        let api = FakeApi {
            reject_create: true,
            ..FakeApi::default()
        };
        let p = provisioner(api);
        let err = p.create(&p.request()).await.unwrap_err();
        assert!(matches!(err, FleetError::ProviderRejected(_)), "got {err:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_address_polls_at_fixed_interval() {
        let api = FakeApi::default().address_after(InstanceId(1), 3);
        let p = provisioner(api.clone());
        let start = Instant::now();

        let address = p.await_address(InstanceId(1), None).await.expect("address");

        assert_eq!(address, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(api.lookups(InstanceId(1)), 4);
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_address_lookup_error_is_not_retried() {
        let api = FakeApi::default().lookup_error(InstanceId(2));
        let p = provisioner(api.clone());

        let err = p.await_address(InstanceId(2), None).await.unwrap_err();

        assert!(matches!(err, FleetError::LookupFailed { .. }), "got {err:?}");
        assert_eq!(api.lookups(InstanceId(2)), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_address_is_cancellable() {
        let api = FakeApi::default();
        let p = provisioner(api);
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(95)).await;
            trigger.cancel();
        });

        let err = p
            .await_address(InstanceId(3), Some(&token))
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::Cancelled));
    }

    #[tokio::test]
    async fn test_destroy_twice_reports_second_failure() {
        let api = FakeApi::default();
        let p = provisioner(api.clone());
        p.destroy(InstanceId(4)).await.expect("first delete");
        let err = p.destroy(InstanceId(4)).await.unwrap_err();
        assert!(matches!(err, FleetError::DestroyFailed { .. }), "got {err:?}");
        assert_eq!(api.deletes(InstanceId(4)), 2);
    }
}
