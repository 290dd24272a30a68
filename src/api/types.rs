//! Provider records exchanged across the remote compute boundary.

use std::collections::BTreeMap;

use crate::types::ProviderId;

/// Key/value metadata attached to a server or image.
pub type Metadata = BTreeMap<String, String>;

/// Optional API extension advertised by a region.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Extension {
    /// Namespace URI; some providers omit it.
    pub namespace: Option<String>,
    /// Short alias (for example `os-floating-ips`).
    pub alias: String,
    /// Display name (for example `FloatingIps`).
    pub name: String,
    /// Last-updated timestamp as reported by the provider.
    pub updated: Option<String>,
    /// Free-form description.
    pub description: Option<String>,
}

/// Image as listed by the provider.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ImageRecord {
    /// Provider identifier.
    pub id: ProviderId,
    /// Image name.
    pub name: String,
    /// Provider status (`ACTIVE`, `SAVING`, ...).
    pub status: String,
    /// Minimum RAM in MiB required to boot the image.
    pub min_ram_mb: u64,
    /// Minimum root disk in GiB required to boot the image.
    pub min_disk_gb: u64,
    /// Image metadata (may carry `os_distro`, `os_version`, `architecture`).
    pub metadata: Metadata,
}

/// Flavor as listed by the provider.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FlavorRecord {
    /// Provider identifier.
    pub id: ProviderId,
    /// Flavor name.
    pub name: String,
    /// Virtual CPU count.
    pub vcpus: u32,
    /// RAM in MiB.
    pub ram_mb: u64,
    /// Root disk in GiB.
    pub disk_gb: u64,
}

/// Availability zone inside a region.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AvailabilityZone {
    /// Zone name.
    pub name: String,
    /// Whether the zone accepts new servers.
    pub available: bool,
}

/// IP protocol of a security group rule.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum IpProtocol {
    /// TCP.
    Tcp,
    /// UDP.
    Udp,
    /// ICMP.
    Icmp,
}

impl IpProtocol {
    /// Returns the wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Icmp => "icmp",
        }
    }

    /// Parses the wire representation, ignoring case.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "tcp" => Some(Self::Tcp),
            "udp" => Some(Self::Udp),
            "icmp" => Some(Self::Icmp),
            _ => None,
        }
    }
}

/// Ingress rule of a security group.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct SecurityGroupRule {
    /// Protocol.
    pub protocol: IpProtocol,
    /// First port of the range (`-1` for ICMP).
    pub from_port: i32,
    /// Last port of the range (`-1` for ICMP).
    pub to_port: i32,
    /// Source CIDR.
    pub cidr: String,
}

impl SecurityGroupRule {
    /// Single TCP port open to the given CIDR.
    #[must_use]
    pub fn tcp(port: u16, cidr: impl Into<String>) -> Self {
        Self {
            protocol: IpProtocol::Tcp,
            from_port: i32::from(port),
            to_port: i32::from(port),
            cidr: cidr.into(),
        }
    }
}

/// Security group with its ingress rules.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SecurityGroup {
    /// Provider identifier.
    pub id: ProviderId,
    /// Group name; unique within a region.
    pub name: String,
    /// Description.
    pub description: String,
    /// Ingress rules in provider order.
    pub rules: Vec<SecurityGroupRule>,
}

/// Keypair known to the provider.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeyPair {
    /// Keypair name.
    pub name: String,
    /// Public key material.
    pub public_key: String,
    /// Private key, returned by the provider only when it generated the pair.
    pub private_key: Option<String>,
    /// Key fingerprint.
    pub fingerprint: Option<String>,
}

/// Root disk partitioning mode.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DiskConfig {
    /// Provider resizes the root partition to the whole disk.
    Auto,
    /// Partitioning is left as in the image.
    Manual,
}

impl DiskConfig {
    /// Returns the wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "AUTO",
            Self::Manual => "MANUAL",
        }
    }
}

/// Boot volume created from the template image.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BootVolume {
    /// Volume size in GiB.
    pub size_gb: u32,
}

/// Payload for a create-server call.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CreateServer {
    /// Server name.
    pub name: String,
    /// Image identifier.
    pub image_ref: String,
    /// Flavor identifier.
    pub flavor_ref: String,
    /// Metadata applied at creation.
    pub metadata: Metadata,
    /// Keypair injected into the server.
    pub key_name: Option<String>,
    /// Security group names.
    pub security_groups: Vec<String>,
    /// Network identifiers to attach.
    pub networks: Vec<String>,
    /// Availability zone.
    pub availability_zone: Option<String>,
    /// Boot from a volume created from `image_ref` instead of local disk.
    pub boot_volume: Option<BootVolume>,
    /// Disk config extension value.
    pub disk_config: Option<DiskConfig>,
}

/// Lifecycle status of a server.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum NodeStatus {
    /// Server is being built.
    Building,
    /// Server is running.
    Active,
    /// Server failed.
    Error,
    /// Server was deleted.
    Deleted,
    /// Provider reported a status this crate does not recognise.
    Unknown,
}

impl NodeStatus {
    /// Maps a provider status string.
    #[must_use]
    pub fn from_provider(status: &str) -> Self {
        match status.to_ascii_uppercase().as_str() {
            "BUILD" | "REBUILD" => Self::Building,
            "ACTIVE" => Self::Active,
            "ERROR" => Self::Error,
            "DELETED" | "SOFT_DELETED" => Self::Deleted,
            _ => Self::Unknown,
        }
    }

    /// Whether polling can stop.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Active | Self::Error | Self::Deleted)
    }
}

/// Server detail as reported by the provider.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerRecord {
    /// Provider identifier.
    pub id: ProviderId,
    /// Server name.
    pub name: String,
    /// Mapped status.
    pub status: NodeStatus,
    /// Raw provider status.
    pub provider_status: String,
    /// IP addresses across all networks.
    pub addresses: Vec<String>,
    /// Server metadata.
    pub metadata: Metadata,
}

/// Floating IP allocated to the tenant.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FloatingIp {
    /// Provider identifier.
    pub id: ProviderId,
    /// Public address.
    pub ip: String,
    /// Pool the address came from.
    pub pool: Option<String>,
}

/// Kind of resource that carries metadata.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ResourceKind {
    /// Compute server.
    Server,
    /// Image.
    Image,
}

impl ResourceKind {
    /// Collection path segment.
    #[must_use]
    pub const fn collection(self) -> &'static str {
        match self {
            Self::Server => "servers",
            Self::Image => "images",
        }
    }
}
