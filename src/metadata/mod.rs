//! Key/value metadata on servers and images.
//!
//! `set` replaces the whole mapping while `update` merges into it; the two
//! map onto different remote verbs and must not be confused.

use std::sync::Arc;

use tracing::debug;

use crate::api::{ComputeApi, Metadata, ResourceKind};
use crate::catalog::CompositeId;
use crate::error::ComputeError;
use crate::types::Region;

/// Resource carrying metadata.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ResourceRef {
    /// Server or image.
    pub kind: ResourceKind,
    /// Region-qualified identifier.
    pub id: CompositeId,
}

impl ResourceRef {
    /// Reference to a server.
    #[must_use]
    pub const fn server(id: CompositeId) -> Self {
        Self {
            kind: ResourceKind::Server,
            id,
        }
    }

    /// Reference to an image.
    #[must_use]
    pub const fn image(id: CompositeId) -> Self {
        Self {
            kind: ResourceKind::Image,
            id,
        }
    }
}

/// Metadata CRUD scoped to the session's regions.
#[derive(Clone)]
pub struct MetadataStore {
    api: Arc<dyn ComputeApi>,
    regions: Vec<Region>,
}

impl std::fmt::Debug for MetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataStore")
            .field("regions", &self.regions)
            .finish_non_exhaustive()
    }
}

impl MetadataStore {
    /// Creates a store over `regions`.
    #[must_use]
    pub fn new(api: Arc<dyn ComputeApi>, regions: Vec<Region>) -> Self {
        Self { api, regions }
    }

    fn region<'r>(&self, resource: &'r ResourceRef) -> Result<&'r Region, ComputeError> {
        let region = &resource.id.region;
        if self.regions.contains(region) {
            Ok(region)
        } else {
            Err(ComputeError::RegionNotConfigured {
                region: region.to_string(),
            })
        }
    }

    fn check_key(key: &str) -> Result<(), ComputeError> {
        if key.is_empty() {
            return Err(ComputeError::Validation(
                "metadata key must not be empty".to_owned(),
            ));
        }
        Ok(())
    }

    /// Full mapping of `resource`.
    ///
    /// # Errors
    ///
    /// Returns provider errors, including when the resource does not exist.
    pub async fn get(&self, resource: &ResourceRef) -> Result<Metadata, ComputeError> {
        let region = self.region(resource)?;
        Ok(self
            .api
            .get_metadata(region, resource.kind, &resource.id.id)
            .await?)
    }

    /// Replaces the mapping of `resource` with `metadata`.
    ///
    /// # Errors
    ///
    /// Returns provider errors.
    pub async fn set(
        &self,
        resource: &ResourceRef,
        metadata: &Metadata,
    ) -> Result<Metadata, ComputeError> {
        let region = self.region(resource)?;
        debug!(resource = %resource.id, keys = metadata.len(), "replacing metadata");
        Ok(self
            .api
            .replace_metadata(region, resource.kind, &resource.id.id, metadata)
            .await?)
    }

    /// Merges `metadata` into the mapping of `resource`.
    ///
    /// # Errors
    ///
    /// Returns provider errors.
    pub async fn update(
        &self,
        resource: &ResourceRef,
        metadata: &Metadata,
    ) -> Result<Metadata, ComputeError> {
        let region = self.region(resource)?;
        debug!(resource = %resource.id, keys = metadata.len(), "merging metadata");
        Ok(self
            .api
            .merge_metadata(region, resource.kind, &resource.id.id, metadata)
            .await?)
    }

    /// Value stored under `key`, or `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::Validation`] for an empty key and provider
    /// errors.
    pub async fn get_item(
        &self,
        resource: &ResourceRef,
        key: &str,
    ) -> Result<Option<String>, ComputeError> {
        Self::check_key(key)?;
        let region = self.region(resource)?;
        Ok(self
            .api
            .get_metadata_item(region, resource.kind, &resource.id.id, key)
            .await?)
    }

    /// Stores `value` under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::Validation`] for an empty key and provider
    /// errors.
    pub async fn set_item(
        &self,
        resource: &ResourceRef,
        key: &str,
        value: &str,
    ) -> Result<(), ComputeError> {
        Self::check_key(key)?;
        let region = self.region(resource)?;
        self.api
            .put_metadata_item(region, resource.kind, &resource.id.id, key, value)
            .await?;
        Ok(())
    }

    /// Removes `key`; removing an absent key succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::Validation`] for an empty key and provider
    /// errors.
    pub async fn delete_item(&self, resource: &ResourceRef, key: &str) -> Result<(), ComputeError> {
        Self::check_key(key)?;
        let region = self.region(resource)?;
        let removed = self
            .api
            .delete_metadata_item(region, resource.kind, &resource.id.id, key)
            .await?;
        debug!(resource = %resource.id, key, removed, "deleted metadata item");
        Ok(())
    }
}
