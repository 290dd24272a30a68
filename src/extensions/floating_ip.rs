//! Floating IP sub-API, handed out only where the extension exists.

use std::sync::Arc;

use tracing::info;

use crate::api::{ComputeApi, FloatingIp};
use crate::error::ComputeError;
use crate::types::Region;

/// Floating IP operations bound to one region.
#[derive(Clone)]
pub struct FloatingIpHandle {
    api: Arc<dyn ComputeApi>,
    region: Region,
}

impl std::fmt::Debug for FloatingIpHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FloatingIpHandle")
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl FloatingIpHandle {
    pub(super) fn new(api: Arc<dyn ComputeApi>, region: Region) -> Self {
        Self { api, region }
    }

    /// Region the handle operates in.
    #[must_use]
    pub const fn region(&self) -> &Region {
        &self.region
    }

    /// Allocates an address, from `pool` when given.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError`] when the provider rejects the allocation.
    pub async fn allocate(&self, pool: Option<&str>) -> Result<FloatingIp, ComputeError> {
        let address = self.api.allocate_floating_ip(&self.region, pool).await?;
        info!(region = %self.region, ip = %address.ip, "allocated floating ip");
        Ok(address)
    }

    /// Returns `address` to its pool.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError`] when the provider rejects the release.
    pub async fn release(&self, address: &FloatingIp) -> Result<(), ComputeError> {
        self.api
            .release_floating_ip(&self.region, &address.id)
            .await?;
        info!(region = %self.region, ip = %address.ip, "released floating ip");
        Ok(())
    }

    /// Associates `address` with `server_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError`] when the provider rejects the association.
    pub async fn associate(&self, server_id: &str, address: &str) -> Result<(), ComputeError> {
        self.api
            .add_floating_ip(&self.region, server_id, address)
            .await?;
        Ok(())
    }
}
