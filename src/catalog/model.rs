//! Region-qualified catalog entries: images, hardware and locations.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::api::{AvailabilityZone, FlavorRecord, ImageRecord};
use crate::error::TemplateResolutionError;
use crate::types::{ProviderId, Region};

static ARCH_IN_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:x86_64|amd64|i[3-6]86|(?:32|64)-?bit)\b").ok());
static DOTTED_VERSION: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)+").ok());
static BARE_VERSION: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\d+").ok());

/// Version embedded in an image name, ignoring architecture tokens and
/// preferring dotted versions over bare numbers.
fn version_from_name(name: &str) -> Option<String> {
    let cleaned = ARCH_IN_NAME
        .as_ref()
        .map_or_else(|| name.to_owned(), |arch| arch.replace_all(name, " ").into_owned());
    [&DOTTED_VERSION, &BARE_VERSION]
        .into_iter()
        .filter_map(|pattern| pattern.as_ref())
        .find_map(|pattern| pattern.find(&cleaned))
        .map(|found| found.as_str().to_owned())
}

/// Stable cross-region identity: `region/providerId`.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct CompositeId {
    /// Region owning the resource.
    pub region: Region,
    /// Identifier within the region.
    pub id: ProviderId,
}

impl CompositeId {
    /// Joins a region and a provider identifier.
    #[must_use]
    pub fn new(region: impl Into<Region>, id: impl Into<ProviderId>) -> Self {
        Self {
            region: region.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for CompositeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.region, self.id)
    }
}

impl FromStr for CompositeId {
    type Err = TemplateResolutionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.split_once('/') {
            Some((region, id)) if !region.is_empty() && !id.is_empty() => {
                Ok(Self::new(region, id))
            }
            _ => Err(TemplateResolutionError::InvalidCriteria(format!(
                "'{value}' is not a region-qualified id (expected region/id)"
            ))),
        }
    }
}

/// Operating system family of an image.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum OsFamily {
    /// Ubuntu.
    Ubuntu,
    /// Debian.
    Debian,
    /// CentOS.
    Centos,
    /// Red Hat Enterprise Linux.
    Rhel,
    /// Fedora.
    Fedora,
    /// openSUSE or SLES.
    Suse,
    /// `CirrOS` test images.
    Cirros,
    /// Microsoft Windows.
    Windows,
    /// Family could not be determined.
    Unrecognized,
}

impl OsFamily {
    const KNOWN: [Self; 8] = [
        Self::Ubuntu,
        Self::Debian,
        Self::Centos,
        Self::Rhel,
        Self::Fedora,
        Self::Suse,
        Self::Cirros,
        Self::Windows,
    ];

    /// Canonical upper-case name used in textual criteria.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ubuntu => "UBUNTU",
            Self::Debian => "DEBIAN",
            Self::Centos => "CENTOS",
            Self::Rhel => "RHEL",
            Self::Fedora => "FEDORA",
            Self::Suse => "SUSE",
            Self::Cirros => "CIRROS",
            Self::Windows => "WINDOWS",
            Self::Unrecognized => "UNRECOGNIZED",
        }
    }

    fn tokens(self) -> &'static [&'static str] {
        match self {
            Self::Ubuntu => &["ubuntu"],
            Self::Debian => &["debian"],
            Self::Centos => &["centos"],
            Self::Rhel => &["rhel", "red hat"],
            Self::Fedora => &["fedora"],
            Self::Suse => &["suse", "sles", "opensuse"],
            Self::Cirros => &["cirros"],
            Self::Windows => &["windows"],
            Self::Unrecognized => &[],
        }
    }

    /// Detects the family from free text such as `os_distro` or an image name.
    #[must_use]
    pub fn detect(text: &str) -> Self {
        let lowered = text.to_ascii_lowercase();
        Self::KNOWN
            .into_iter()
            .find(|family| family.tokens().iter().any(|token| lowered.contains(token)))
            .unwrap_or(Self::Unrecognized)
    }
}

impl FromStr for OsFamily {
    type Err = TemplateResolutionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::KNOWN
            .into_iter()
            .find(|family| family.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| {
                TemplateResolutionError::InvalidCriteria(format!("unknown OS family '{value}'"))
            })
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Image with OS attributes derived from provider metadata.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Image {
    /// Composite identifier.
    pub id: CompositeId,
    /// Image name.
    pub name: String,
    /// Detected OS family.
    pub os_family: OsFamily,
    /// Detected OS version.
    pub os_version: Option<String>,
    /// Whether the image is 64-bit.
    pub is_64bit: bool,
    /// Minimum RAM in MiB.
    pub min_ram_mb: u64,
    /// Minimum disk in GiB.
    pub min_disk_gb: u64,
    /// Whether the provider reports the image as usable.
    pub active: bool,
}

impl Image {
    /// Derives an image from a provider record.
    ///
    /// `os_distro`, `os_version` and `architecture` metadata take precedence;
    /// otherwise the family and version are read from the image name.
    #[must_use]
    pub fn from_record(region: &Region, record: ImageRecord) -> Self {
        let distro = record.metadata.get("os_distro");
        let os_family = distro.map_or_else(
            || OsFamily::detect(&record.name),
            |value| OsFamily::detect(value),
        );
        let os_version = record
            .metadata
            .get("os_version")
            .cloned()
            .or_else(|| version_from_name(&record.name));
        let is_64bit = record.metadata.get("architecture").map_or_else(
            || {
                let name = record.name.to_ascii_lowercase();
                !(name.contains("i386") || name.contains("32bit") || name.contains("32-bit"))
            },
            |arch| !matches!(arch.as_str(), "i386" | "i686" | "x86"),
        );
        Self {
            id: CompositeId::new(region.clone(), record.id),
            active: record.status.eq_ignore_ascii_case("ACTIVE"),
            name: record.name,
            os_family,
            os_version,
            is_64bit,
            min_ram_mb: record.min_ram_mb,
            min_disk_gb: record.min_disk_gb,
        }
    }
}

/// Hardware profile backed by a flavor.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Hardware {
    /// Composite identifier.
    pub id: CompositeId,
    /// Flavor name.
    pub name: String,
    /// Virtual CPU count.
    pub cores: u32,
    /// RAM in MiB.
    pub ram_mb: u64,
    /// Root disk in GiB.
    pub disk_gb: u64,
}

impl Hardware {
    /// Derives hardware from a flavor record.
    #[must_use]
    pub fn from_record(region: &Region, record: FlavorRecord) -> Self {
        Self {
            id: CompositeId::new(region.clone(), record.id),
            name: record.name,
            cores: record.vcpus,
            ram_mb: record.ram_mb,
            disk_gb: record.disk_gb,
        }
    }

    pub(super) const fn size_key(&self) -> (u32, u64, u64) {
        (self.cores, self.ram_mb, self.disk_gb)
    }
}

/// Placement target: a region or an availability zone inside it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Location {
    /// `region` or `region/zone`.
    pub id: String,
    /// Owning region.
    pub region: Region,
    /// Availability zone, when the location is a zone.
    pub zone: Option<String>,
}

impl Location {
    /// The region itself.
    #[must_use]
    pub fn region(region: &Region) -> Self {
        Self {
            id: region.to_string(),
            region: region.clone(),
            zone: None,
        }
    }

    /// An availability zone of `region`.
    #[must_use]
    pub fn zone(region: &Region, zone: &AvailabilityZone) -> Self {
        Self {
            id: format!("{region}/{}", zone.name),
            region: region.clone(),
            zone: Some(zone.name.clone()),
        }
    }

    /// Region named by a location id.
    #[must_use]
    pub fn region_of(location_id: &str) -> Region {
        Region::from(
            location_id
                .split_once('/')
                .map_or(location_id, |(region, _)| region),
        )
    }
}
