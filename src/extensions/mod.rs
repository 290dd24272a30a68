//! Per-region registry of advertised API extensions.
//!
//! The registry is built once per session by listing extensions in every
//! region concurrently. Lookups never hit the network afterwards, and an
//! extension a region does not advertise is reported as absent rather than
//! as an error so callers can degrade gracefully.

mod capability;
mod floating_ip;

use std::collections::BTreeMap;
use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{debug, info};

use crate::api::{ComputeApi, Extension};
use crate::error::ComputeError;
use crate::types::Region;

pub use capability::{Capability, CapabilitySet};
pub use floating_ip::FloatingIpHandle;

#[derive(Clone, Debug)]
struct RegionExtensions {
    extensions: Vec<Extension>,
    capabilities: CapabilitySet,
}

/// Extensions and capabilities advertised by each configured region.
#[derive(Clone)]
pub struct ExtensionRegistry {
    api: Arc<dyn ComputeApi>,
    regions: BTreeMap<Region, RegionExtensions>,
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("regions", &self.regions)
            .finish_non_exhaustive()
    }
}

impl ExtensionRegistry {
    /// Lists extensions in every region and caches them for the session.
    ///
    /// # Errors
    ///
    /// Returns the first provider error encountered while listing, so a
    /// region that cannot be queried fails here rather than on lookup.
    pub async fn build(api: Arc<dyn ComputeApi>, regions: &[Region]) -> Result<Self, ComputeError> {
        let listings = join_all(regions.iter().map(|region| {
            let api = Arc::clone(&api);
            async move { (region.clone(), api.list_extensions(region).await) }
        }))
        .await;

        let mut entries = BTreeMap::new();
        for (region, listing) in listings {
            let extensions = listing?;
            let capabilities = CapabilitySet::from_extensions(&extensions);
            info!(
                %region,
                extensions = extensions.len(),
                capabilities = ?capabilities,
                "loaded compute extensions"
            );
            entries.insert(
                region,
                RegionExtensions {
                    extensions,
                    capabilities,
                },
            );
        }

        Ok(Self {
            api,
            regions: entries,
        })
    }

    fn entry(&self, region: &Region) -> Result<&RegionExtensions, ComputeError> {
        self.regions
            .get(region)
            .ok_or_else(|| ComputeError::RegionNotConfigured {
                region: region.to_string(),
            })
    }

    /// Regions known to the registry.
    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.regions.keys()
    }

    /// Whether `region` advertises the extension identified by `key`.
    ///
    /// `key` is usually a namespace URI. Keys naming a recognised capability
    /// (by namespace or alias) resolve through the capability set. Other keys
    /// match an extension's namespace exactly, or the alias or name of an
    /// extension that reports no namespace.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::RegionNotConfigured`] for unknown regions.
    pub fn has_extension(&self, region: &Region, key: &str) -> Result<bool, ComputeError> {
        let entry = self.entry(region)?;
        if let Some(capability) = Capability::identify(key) {
            return Ok(entry.capabilities.contains(capability));
        }
        let found = entry
            .extensions
            .iter()
            .any(|extension| match extension.namespace.as_deref() {
                Some(namespace) => namespace == key,
                None => {
                    capability::loosely_equal(&extension.alias, key)
                        || capability::loosely_equal(&extension.name, key)
                }
            });
        debug!(%region, key, found, "extension lookup");
        Ok(found)
    }

    /// Extensions advertised by `region`, in provider order.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::RegionNotConfigured`] for unknown regions.
    pub fn list(&self, region: &Region) -> Result<&[Extension], ComputeError> {
        Ok(&self.entry(region)?.extensions)
    }

    /// Capabilities advertised by `region`.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::RegionNotConfigured`] for unknown regions.
    pub fn capabilities(&self, region: &Region) -> Result<&CapabilitySet, ComputeError> {
        Ok(&self.entry(region)?.capabilities)
    }

    /// Floating IP operations, present only when `region` advertises them.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::RegionNotConfigured`] for unknown regions.
    pub fn floating_ips(&self, region: &Region) -> Result<Option<FloatingIpHandle>, ComputeError> {
        let entry = self.entry(region)?;
        Ok(entry
            .capabilities
            .contains(Capability::FloatingIps)
            .then(|| FloatingIpHandle::new(Arc::clone(&self.api), region.clone())))
    }
}

#[cfg(test)]
mod tests;
