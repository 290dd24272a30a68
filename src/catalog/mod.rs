//! Per-region catalogs of images, hardware and locations, and template
//! resolution over them.
//!
//! Catalogs are fetched lazily, once per region, the first time a region is
//! queried. Selection is deterministic: the first matching image in provider
//! order wins, and the smallest hardware by `(cores, ram, disk)` wins with
//! ties kept in provider order.

mod criteria;
mod model;

use std::collections::BTreeMap;
use std::sync::Arc;

use futures_util::future::try_join;
use regex::Regex;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::api::ComputeApi;
use crate::error::{ComputeError, TemplateResolutionError};
use crate::extensions::{Capability, ExtensionRegistry};
use crate::types::Region;

pub use criteria::{ServerOptions, TemplateCriteria, TemplateOverrides};
pub use model::{CompositeId, Hardware, Image, Location, OsFamily};

/// Concrete image, hardware and location for creating servers.
///
/// All three components belong to the same region.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Template {
    /// Boot image.
    pub image: Image,
    /// Hardware profile.
    pub hardware: Hardware,
    /// Placement.
    pub location: Location,
    /// Per-server options.
    pub options: ServerOptions,
}

impl Template {
    /// Region shared by all components.
    #[must_use]
    pub const fn region(&self) -> &Region {
        &self.image.id.region
    }

    /// Re-checks that all components share a region.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateResolutionError::RegionMismatch`] otherwise.
    pub fn check_region(&self) -> Result<(), TemplateResolutionError> {
        let region = &self.image.id.region;
        if &self.hardware.id.region == region && &self.location.region == region {
            return Ok(());
        }
        Err(TemplateResolutionError::RegionMismatch {
            image: self.image.id.region.to_string(),
            hardware: self.hardware.id.region.to_string(),
            location: self.location.region.to_string(),
        })
    }
}

/// Catalog of one region.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RegionCatalog {
    /// Images in provider order.
    pub images: Vec<Image>,
    /// Hardware profiles in provider order.
    pub hardware: Vec<Hardware>,
    /// The region location followed by its available zones.
    pub locations: Vec<Location>,
}

impl RegionCatalog {
    /// First availability zone when zones are listed, else the region.
    #[must_use]
    pub fn default_location(&self) -> Option<&Location> {
        self.locations
            .iter()
            .find(|location| location.zone.is_some())
            .or_else(|| self.locations.first())
    }
}

/// Resolves templates against lazily loaded region catalogs.
pub struct CatalogResolver {
    api: Arc<dyn ComputeApi>,
    registry: Arc<ExtensionRegistry>,
    regions: Vec<Region>,
    catalogs: BTreeMap<Region, OnceCell<Arc<RegionCatalog>>>,
}

impl std::fmt::Debug for CatalogResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogResolver")
            .field("regions", &self.regions)
            .finish_non_exhaustive()
    }
}

impl CatalogResolver {
    /// Creates a resolver for `regions`; nothing is fetched until first use.
    #[must_use]
    pub fn new(
        api: Arc<dyn ComputeApi>,
        registry: Arc<ExtensionRegistry>,
        regions: Vec<Region>,
    ) -> Self {
        let catalogs = regions
            .iter()
            .map(|region| (region.clone(), OnceCell::new()))
            .collect();
        Self {
            api,
            registry,
            regions,
            catalogs,
        }
    }

    /// Catalog of `region`, fetching it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::RegionNotConfigured`] for unknown regions and
    /// provider errors from the initial fetch. A failed fetch is retried on
    /// the next call.
    pub async fn region_catalog(&self, region: &Region) -> Result<Arc<RegionCatalog>, ComputeError> {
        let cell = self
            .catalogs
            .get(region)
            .ok_or_else(|| ComputeError::RegionNotConfigured {
                region: region.to_string(),
            })?;
        cell.get_or_try_init(|| self.fetch(region))
            .await
            .map(Arc::clone)
    }

    async fn fetch(&self, region: &Region) -> Result<Arc<RegionCatalog>, ComputeError> {
        let (images, flavors) =
            try_join(self.api.list_images(region), self.api.list_flavors(region)).await?;

        let mut locations = vec![Location::region(region)];
        if self
            .registry
            .capabilities(region)?
            .contains(Capability::AvailabilityZones)
        {
            let zones = self.api.list_availability_zones(region).await?;
            locations.extend(
                zones
                    .iter()
                    .filter(|zone| zone.available)
                    .map(|zone| Location::zone(region, zone)),
            );
        }

        let catalog = RegionCatalog {
            images: images
                .into_iter()
                .map(|record| Image::from_record(region, record))
                .collect(),
            hardware: flavors
                .into_iter()
                .map(|record| Hardware::from_record(region, record))
                .collect(),
            locations,
        };
        info!(
            %region,
            images = catalog.images.len(),
            hardware = catalog.hardware.len(),
            locations = catalog.locations.len(),
            "loaded region catalog"
        );
        Ok(Arc::new(catalog))
    }

    /// Images of `region`.
    ///
    /// # Errors
    ///
    /// See [`Self::region_catalog`].
    pub async fn images(&self, region: &Region) -> Result<Vec<Image>, ComputeError> {
        Ok(self.region_catalog(region).await?.images.clone())
    }

    /// Hardware profiles of `region`.
    ///
    /// # Errors
    ///
    /// See [`Self::region_catalog`].
    pub async fn hardware(&self, region: &Region) -> Result<Vec<Hardware>, ComputeError> {
        Ok(self.region_catalog(region).await?.hardware.clone())
    }

    /// Locations of `region`.
    ///
    /// # Errors
    ///
    /// See [`Self::region_catalog`].
    pub async fn locations(&self, region: &Region) -> Result<Vec<Location>, ComputeError> {
        Ok(self.region_catalog(region).await?.locations.clone())
    }

    fn search_region(&self, criteria: &TemplateCriteria) -> Result<Region, ComputeError> {
        criteria
            .image_id
            .as_ref()
            .map(|id| id.region.clone())
            .or_else(|| criteria.hardware_id.as_ref().map(|id| id.region.clone()))
            .or_else(|| criteria.location_id.as_deref().map(Location::region_of))
            .or_else(|| criteria.region.clone())
            .or_else(|| self.regions.first().cloned())
            .ok_or_else(|| ComputeError::Config("no regions configured".to_owned()))
    }

    async fn find_image(&self, id: &CompositeId) -> Result<Image, ComputeError> {
        let catalog = self.region_catalog(&id.region).await?;
        catalog
            .images
            .iter()
            .find(|image| &image.id == id)
            .cloned()
            .ok_or_else(|| {
                TemplateResolutionError::ImageNotFound { id: id.to_string() }.into()
            })
    }

    async fn find_hardware(&self, id: &CompositeId) -> Result<Hardware, ComputeError> {
        let catalog = self.region_catalog(&id.region).await?;
        catalog
            .hardware
            .iter()
            .find(|hardware| &hardware.id == id)
            .cloned()
            .ok_or_else(|| {
                TemplateResolutionError::HardwareNotFound { id: id.to_string() }.into()
            })
    }

    async fn find_location(&self, id: &str) -> Result<Location, ComputeError> {
        let catalog = self.region_catalog(&Location::region_of(id)).await?;
        catalog
            .locations
            .iter()
            .find(|location| location.id == id)
            .cloned()
            .ok_or_else(|| {
                TemplateResolutionError::LocationNotFound { id: id.to_owned() }.into()
            })
    }

    /// Resolves criteria into a concrete template.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::TemplateResolution`] when no combination of
    /// image, hardware and location satisfies the criteria or the components
    /// span regions, and catalog errors from [`Self::region_catalog`].
    pub async fn build_template(
        &self,
        criteria: &TemplateCriteria,
    ) -> Result<Template, ComputeError> {
        let region = self.search_region(criteria)?;
        let catalog = self.region_catalog(&region).await?;

        let image = match &criteria.image_id {
            Some(id) => self.find_image(id).await?,
            None => select_image(&catalog, &region, criteria)?,
        };
        let hardware = match &criteria.hardware_id {
            Some(id) => self.find_hardware(id).await?,
            None => select_hardware(&catalog, &region, criteria, &image)?,
        };
        let location = match &criteria.location_id {
            Some(id) => self.find_location(id).await?,
            None => catalog.default_location().cloned().ok_or_else(|| {
                TemplateResolutionError::LocationNotFound {
                    id: region.to_string(),
                }
            })?,
        };

        let template = Template {
            image,
            hardware,
            location,
            options: criteria.options.clone(),
        };
        template.check_region()?;
        debug!(
            image = %template.image.id,
            hardware = %template.hardware.id,
            location = %template.location.id,
            "resolved template"
        );
        Ok(template)
    }

    /// Copies `existing`, replacing the components named in `overrides`.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::TemplateResolution`] when a replacement does
    /// not exist or the result spans regions.
    pub async fn from_template(
        &self,
        existing: &Template,
        overrides: TemplateOverrides,
    ) -> Result<Template, ComputeError> {
        let mut template = existing.clone();
        if let Some(id) = &overrides.image_id {
            template.image = self.find_image(id).await?;
        }
        if let Some(id) = &overrides.hardware_id {
            template.hardware = self.find_hardware(id).await?;
        }
        if let Some(id) = &overrides.location_id {
            template.location = self.find_location(id).await?;
        }
        if let Some(options) = overrides.options {
            template.options = options;
        }
        template.check_region()?;
        Ok(template)
    }
}

fn select_image(
    catalog: &RegionCatalog,
    region: &Region,
    criteria: &TemplateCriteria,
) -> Result<Image, TemplateResolutionError> {
    let version = criteria
        .os_version_matches
        .as_deref()
        .map(|pattern| {
            Regex::new(&format!("^(?:{pattern})$")).map_err(|err| {
                TemplateResolutionError::InvalidVersionPattern {
                    pattern: pattern.to_owned(),
                    message: err.to_string(),
                }
            })
        })
        .transpose()?;

    catalog
        .images
        .iter()
        .filter(|image| image.active)
        .find(|image| {
            criteria
                .os_family
                .is_none_or(|family| image.os_family == family)
                && criteria
                    .os_64bit
                    .is_none_or(|is_64bit| image.is_64bit == is_64bit)
                && version.as_ref().is_none_or(|pattern| {
                    image
                        .os_version
                        .as_deref()
                        .is_some_and(|found| pattern.is_match(found))
                })
        })
        .cloned()
        .ok_or_else(|| TemplateResolutionError::NoMatchingImage {
            region: region.to_string(),
            criteria: criteria.to_string(),
        })
}

fn select_hardware(
    catalog: &RegionCatalog,
    region: &Region,
    criteria: &TemplateCriteria,
    image: &Image,
) -> Result<Hardware, TemplateResolutionError> {
    let min_cores = criteria.min_cores.unwrap_or_default();
    let min_ram = criteria.min_ram_mb.unwrap_or_default().max(image.min_ram_mb);
    let min_disk = criteria.min_disk_gb.unwrap_or_default().max(image.min_disk_gb);

    catalog
        .hardware
        .iter()
        .filter(|hardware| {
            hardware.cores >= min_cores && hardware.ram_mb >= min_ram && hardware.disk_gb >= min_disk
        })
        .min_by_key(|hardware| hardware.size_key())
        .cloned()
        .ok_or_else(|| TemplateResolutionError::NoMatchingHardware {
            region: region.to_string(),
            criteria: criteria.to_string(),
        })
}
