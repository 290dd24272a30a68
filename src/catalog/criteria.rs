//! Template criteria, server options and overrides.

use std::fmt;
use std::str::FromStr;

use crate::api::{BootVolume, DiskConfig, Metadata};
use crate::error::TemplateResolutionError;
use crate::types::Region;

use super::model::{CompositeId, OsFamily};

/// Per-server options carried by a template.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ServerOptions {
    /// User metadata applied at creation.
    pub metadata: Metadata,
    /// Network identifiers to attach.
    pub networks: Vec<String>,
    /// Disk config mode, sent only where the extension exists.
    pub disk_config: Option<DiskConfig>,
    /// Boot from a volume of this size instead of local disk.
    pub boot_volume: Option<BootVolume>,
    /// Allocate and attach a floating IP; `None` uses the configured default.
    pub auto_assign_floating_ip: Option<bool>,
    /// Pool to allocate floating IPs from.
    pub floating_ip_pool: Option<String>,
}

/// Independently optional criteria for building a template.
///
/// The textual form is a comma-separated list of `key=value` pairs, for
/// example `osFamily=UBUNTU,os64Bit=true,osVersionMatches=16.*`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TemplateCriteria {
    /// Exact image.
    pub image_id: Option<CompositeId>,
    /// Exact hardware profile.
    pub hardware_id: Option<CompositeId>,
    /// Exact location (`region` or `region/zone`).
    pub location_id: Option<String>,
    /// Region to search when no explicit id pins one.
    pub region: Option<Region>,
    /// Required OS family.
    pub os_family: Option<OsFamily>,
    /// Regular expression the whole OS version must match.
    pub os_version_matches: Option<String>,
    /// Required word size.
    pub os_64bit: Option<bool>,
    /// Minimum virtual CPUs.
    pub min_cores: Option<u32>,
    /// Minimum RAM in MiB.
    pub min_ram_mb: Option<u64>,
    /// Minimum root disk in GiB.
    pub min_disk_gb: Option<u64>,
    /// Options applied to every server built from the template.
    pub options: ServerOptions,
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, TemplateResolutionError> {
    value.trim().parse().map_err(|_| {
        TemplateResolutionError::InvalidCriteria(format!("invalid value '{value}' for {key}"))
    })
}

impl FromStr for TemplateCriteria {
    type Err = TemplateResolutionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut criteria = Self::default();
        for pair in value.split(',').map(str::trim).filter(|pair| !pair.is_empty()) {
            let (key, raw) = pair.split_once('=').ok_or_else(|| {
                TemplateResolutionError::InvalidCriteria(format!(
                    "expected key=value, got '{pair}'"
                ))
            })?;
            let setting = raw.trim();
            match key.trim() {
                "imageId" => criteria.image_id = Some(setting.parse()?),
                "hardwareId" => criteria.hardware_id = Some(setting.parse()?),
                "locationId" => criteria.location_id = Some(setting.to_owned()),
                "region" => criteria.region = Some(Region::from(setting)),
                "osFamily" => criteria.os_family = Some(setting.parse()?),
                "osVersionMatches" => criteria.os_version_matches = Some(setting.to_owned()),
                "os64Bit" => criteria.os_64bit = Some(parse_value(key, setting)?),
                "minCores" => criteria.min_cores = Some(parse_value(key, setting)?),
                "minRam" => criteria.min_ram_mb = Some(parse_value(key, setting)?),
                "minDisk" => criteria.min_disk_gb = Some(parse_value(key, setting)?),
                other => {
                    return Err(TemplateResolutionError::InvalidCriteria(format!(
                        "unknown criteria key '{other}'"
                    )));
                }
            }
        }
        Ok(criteria)
    }
}

impl fmt::Display for TemplateCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(id) = &self.image_id {
            parts.push(format!("imageId={id}"));
        }
        if let Some(id) = &self.hardware_id {
            parts.push(format!("hardwareId={id}"));
        }
        if let Some(id) = &self.location_id {
            parts.push(format!("locationId={id}"));
        }
        if let Some(region) = &self.region {
            parts.push(format!("region={region}"));
        }
        if let Some(family) = self.os_family {
            parts.push(format!("osFamily={family}"));
        }
        if let Some(pattern) = &self.os_version_matches {
            parts.push(format!("osVersionMatches={pattern}"));
        }
        if let Some(is_64bit) = self.os_64bit {
            parts.push(format!("os64Bit={is_64bit}"));
        }
        if let Some(cores) = self.min_cores {
            parts.push(format!("minCores={cores}"));
        }
        if let Some(ram) = self.min_ram_mb {
            parts.push(format!("minRam={ram}"));
        }
        if let Some(disk) = self.min_disk_gb {
            parts.push(format!("minDisk={disk}"));
        }
        if parts.is_empty() {
            return f.write_str("any");
        }
        f.write_str(&parts.join(","))
    }
}

/// Replacement components for [`super::CatalogResolver::from_template`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TemplateOverrides {
    /// Replacement image.
    pub image_id: Option<CompositeId>,
    /// Replacement hardware profile.
    pub hardware_id: Option<CompositeId>,
    /// Replacement location.
    pub location_id: Option<String>,
    /// Replacement server options.
    pub options: Option<ServerOptions>,
}
