//! Well-known compute extensions and the per-region capability set.

use std::collections::BTreeSet;

use crate::api::Extension;

/// Optional compute capability advertised through an extension.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Capability {
    /// Floating IP allocation and association.
    FloatingIps,
    /// Security groups and rules.
    SecurityGroups,
    /// Keypair management.
    Keypairs,
    /// Availability zone listing.
    AvailabilityZones,
    /// `OS-DCF:diskConfig` on server create.
    DiskConfig,
    /// Server diagnostics.
    ServerDiagnostics,
    /// Boot from volume through block device mapping v2.
    BlockDeviceMappingV2Boot,
}

impl Capability {
    /// Every recognised capability.
    pub const ALL: [Self; 7] = [
        Self::FloatingIps,
        Self::SecurityGroups,
        Self::Keypairs,
        Self::AvailabilityZones,
        Self::DiskConfig,
        Self::ServerDiagnostics,
        Self::BlockDeviceMappingV2Boot,
    ];

    /// Namespace URI of the extension.
    #[must_use]
    pub const fn namespace(self) -> &'static str {
        match self {
            Self::FloatingIps => "http://docs.openstack.org/compute/ext/floating_ips/api/v1.1",
            Self::SecurityGroups => "http://docs.openstack.org/compute/ext/securitygroups/api/v1.1",
            Self::Keypairs => "http://docs.openstack.org/compute/ext/keypairs/api/v1.1",
            Self::AvailabilityZones => {
                "http://docs.openstack.org/compute/ext/availabilityzone/api/v1.1"
            }
            Self::DiskConfig => "http://docs.openstack.org/compute/ext/disk_config/api/v1.1",
            Self::ServerDiagnostics => {
                "http://docs.openstack.org/compute/ext/server-diagnostics/api/v1.1"
            }
            Self::BlockDeviceMappingV2Boot => {
                "http://docs.openstack.org/compute/ext/block_device_mapping_v2_boot/api/v2"
            }
        }
    }

    /// Extension alias.
    #[must_use]
    pub const fn alias(self) -> &'static str {
        match self {
            Self::FloatingIps => "os-floating-ips",
            Self::SecurityGroups => "os-security-groups",
            Self::Keypairs => "os-keypairs",
            Self::AvailabilityZones => "os-availability-zone",
            Self::DiskConfig => "OS-DCF",
            Self::ServerDiagnostics => "os-server-diagnostics",
            Self::BlockDeviceMappingV2Boot => "os-block-device-mapping-v2-boot",
        }
    }

    /// Extension display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::FloatingIps => "FloatingIps",
            Self::SecurityGroups => "SecurityGroups",
            Self::Keypairs => "Keypairs",
            Self::AvailabilityZones => "AvailabilityZone",
            Self::DiskConfig => "DiskConfig",
            Self::ServerDiagnostics => "ServerDiagnostics",
            Self::BlockDeviceMappingV2Boot => "BlockDeviceMappingV2Boot",
        }
    }

    /// Resolves a lookup key naming a capability by namespace or alias.
    #[must_use]
    pub fn identify(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|capability| {
            capability.namespace() == key || capability.alias().eq_ignore_ascii_case(key)
        })
    }

    /// Whether `extension` advertises this capability.
    ///
    /// Extensions without a namespace match on alias or name instead.
    #[must_use]
    pub fn is_advertised_by(self, extension: &Extension) -> bool {
        match extension.namespace.as_deref() {
            Some(namespace) => namespace == self.namespace(),
            None => {
                loosely_equal(&extension.alias, self.alias())
                    || loosely_equal(&extension.name, self.name())
            }
        }
    }
}

/// Compares ignoring case, `_` and `-` so `Floating_ips` matches `FloatingIps`.
pub(crate) fn loosely_equal(left: &str, right: &str) -> bool {
    let normalise = |value: &str| {
        value
            .chars()
            .filter(|ch| *ch != '_' && *ch != '-')
            .flat_map(char::to_lowercase)
            .collect::<String>()
    };
    !left.is_empty() && normalise(left) == normalise(right)
}

/// Capabilities advertised by one region.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    /// Computes the set from an extension listing.
    #[must_use]
    pub fn from_extensions(extensions: &[Extension]) -> Self {
        Self(
            Capability::ALL
                .into_iter()
                .filter(|capability| {
                    extensions
                        .iter()
                        .any(|extension| capability.is_advertised_by(extension))
                })
                .collect(),
        )
    }

    /// Whether the capability is present.
    #[must_use]
    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    /// Iterates the present capabilities in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }

    /// Whether no capability is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
