//! JSON envelopes of the Nova v2 compute API.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::api::{
    AvailabilityZone, CreateServer, Extension, FlavorRecord, FloatingIp, ImageRecord, IpProtocol,
    KeyPair, Metadata, NodeStatus, SecurityGroup, SecurityGroupRule, ServerRecord,
};
use crate::types::ProviderId;

/// Identifiers arrive as strings from most deployments and as integers from
/// older ones (security groups, rules).
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub(super) enum WireId {
    Text(String),
    Number(i64),
}

impl WireId {
    fn into_provider_id(self) -> ProviderId {
        match self {
            Self::Text(value) => ProviderId::from(value),
            Self::Number(value) => ProviderId::from(value.to_string()),
        }
    }
}

#[derive(Deserialize)]
pub(super) struct ExtensionsEnvelope {
    pub(super) extensions: Vec<WireExtension>,
}

#[derive(Deserialize)]
pub(super) struct WireExtension {
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    alias: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    updated: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl From<WireExtension> for Extension {
    fn from(value: WireExtension) -> Self {
        Self {
            namespace: value.namespace.filter(|ns| !ns.is_empty()),
            alias: value.alias,
            name: value.name,
            updated: value.updated,
            description: value.description,
        }
    }
}

#[derive(Deserialize)]
pub(super) struct ImagesEnvelope {
    pub(super) images: Vec<WireImage>,
}

#[derive(Deserialize)]
pub(super) struct WireImage {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    status: String,
    #[serde(default, rename = "minRam")]
    min_ram: u64,
    #[serde(default, rename = "minDisk")]
    min_disk: u64,
    #[serde(default)]
    metadata: BTreeMap<String, serde_json::Value>,
}

impl From<WireImage> for ImageRecord {
    fn from(value: WireImage) -> Self {
        Self {
            id: ProviderId::from(value.id),
            name: value.name,
            status: value.status,
            min_ram_mb: value.min_ram,
            min_disk_gb: value.min_disk,
            metadata: stringify_map(value.metadata),
        }
    }
}

#[derive(Deserialize)]
pub(super) struct FlavorsEnvelope {
    pub(super) flavors: Vec<WireFlavor>,
}

#[derive(Deserialize)]
pub(super) struct WireFlavor {
    id: WireId,
    #[serde(default)]
    name: String,
    #[serde(default)]
    vcpus: u32,
    #[serde(default)]
    ram: u64,
    #[serde(default)]
    disk: u64,
}

impl From<WireFlavor> for FlavorRecord {
    fn from(value: WireFlavor) -> Self {
        Self {
            id: value.id.into_provider_id(),
            name: value.name,
            vcpus: value.vcpus,
            ram_mb: value.ram,
            disk_gb: value.disk,
        }
    }
}

#[derive(Deserialize)]
pub(super) struct ZonesEnvelope {
    #[serde(rename = "availabilityZoneInfo")]
    pub(super) zones: Vec<WireZone>,
}

#[derive(Deserialize)]
pub(super) struct WireZone {
    #[serde(rename = "zoneName")]
    name: String,
    #[serde(default, rename = "zoneState")]
    state: Option<WireZoneState>,
}

#[derive(Deserialize)]
struct WireZoneState {
    #[serde(default)]
    available: bool,
}

impl From<WireZone> for AvailabilityZone {
    fn from(value: WireZone) -> Self {
        Self {
            name: value.name,
            available: value.state.is_some_and(|state| state.available),
        }
    }
}

#[derive(Deserialize)]
pub(super) struct SecurityGroupsEnvelope {
    pub(super) security_groups: Vec<WireSecurityGroup>,
}

#[derive(Deserialize)]
pub(super) struct SecurityGroupEnvelope {
    pub(super) security_group: WireSecurityGroup,
}

#[derive(Deserialize)]
pub(super) struct WireSecurityGroup {
    id: WireId,
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    rules: Vec<WireRule>,
}

#[derive(Deserialize)]
struct WireRule {
    #[serde(default)]
    ip_protocol: Option<String>,
    #[serde(default)]
    from_port: Option<i32>,
    #[serde(default)]
    to_port: Option<i32>,
    #[serde(default)]
    ip_range: Option<WireIpRange>,
}

#[derive(Deserialize)]
struct WireIpRange {
    #[serde(default)]
    cidr: Option<String>,
}

impl WireRule {
    // Group-sourced rules carry no CIDR and are not managed here.
    fn into_rule(self) -> Option<SecurityGroupRule> {
        let cidr = self.ip_range.and_then(|range| range.cidr)?;
        let protocol = IpProtocol::parse(self.ip_protocol.as_deref()?)?;
        Some(SecurityGroupRule {
            protocol,
            from_port: self.from_port.unwrap_or(-1),
            to_port: self.to_port.unwrap_or(-1),
            cidr,
        })
    }
}

impl From<WireSecurityGroup> for SecurityGroup {
    fn from(value: WireSecurityGroup) -> Self {
        Self {
            id: value.id.into_provider_id(),
            name: value.name,
            description: value.description.unwrap_or_default(),
            rules: value
                .rules
                .into_iter()
                .filter_map(WireRule::into_rule)
                .collect(),
        }
    }
}

#[derive(Serialize)]
pub(super) struct CreateSecurityGroupRequest<'a> {
    pub(super) security_group: NewSecurityGroup<'a>,
}

#[derive(Serialize)]
pub(super) struct NewSecurityGroup<'a> {
    pub(super) name: &'a str,
    pub(super) description: &'a str,
}

#[derive(Serialize)]
pub(super) struct CreateRuleRequest {
    pub(super) security_group_rule: NewRule,
}

/// Rule payload; the API expects ids and ports as strings.
#[derive(Serialize)]
pub(super) struct NewRule {
    parent_group_id: String,
    cidr: String,
    ip_protocol: &'static str,
    from_port: String,
    to_port: String,
}

impl NewRule {
    pub(super) fn new(group_id: &str, rule: &SecurityGroupRule) -> Self {
        Self {
            parent_group_id: group_id.to_owned(),
            cidr: rule.cidr.clone(),
            ip_protocol: rule.protocol.as_str(),
            from_port: rule.from_port.to_string(),
            to_port: rule.to_port.to_string(),
        }
    }
}

#[derive(Deserialize)]
pub(super) struct KeyPairEnvelope {
    pub(super) keypair: WireKeyPair,
}

#[derive(Deserialize)]
pub(super) struct WireKeyPair {
    name: String,
    #[serde(default)]
    public_key: String,
    #[serde(default)]
    private_key: Option<String>,
    #[serde(default)]
    fingerprint: Option<String>,
}

impl From<WireKeyPair> for KeyPair {
    fn from(value: WireKeyPair) -> Self {
        Self {
            name: value.name,
            public_key: value.public_key,
            private_key: value.private_key,
            fingerprint: value.fingerprint,
        }
    }
}

#[derive(Serialize)]
pub(super) struct CreateKeyPairRequest<'a> {
    pub(super) keypair: NewKeyPair<'a>,
}

#[derive(Serialize)]
pub(super) struct NewKeyPair<'a> {
    pub(super) name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) public_key: Option<&'a str>,
}

#[derive(Serialize)]
pub(super) struct CreateServerRequest<'a> {
    server: NewServer<'a>,
}

#[derive(Serialize)]
struct NewServer<'a> {
    name: &'a str,
    #[serde(rename = "imageRef")]
    image_ref: &'a str,
    #[serde(rename = "flavorRef")]
    flavor_ref: &'a str,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    metadata: &'a Metadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    key_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    security_groups: Vec<NamedRef<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    networks: Vec<NetworkRef<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    availability_zone: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    block_device_mapping_v2: Vec<BlockDeviceMapping<'a>>,
    #[serde(rename = "OS-DCF:diskConfig", skip_serializing_if = "Option::is_none")]
    disk_config: Option<&'static str>,
}

#[derive(Serialize)]
struct NamedRef<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct NetworkRef<'a> {
    uuid: &'a str,
}

#[derive(Serialize)]
struct BlockDeviceMapping<'a> {
    volume_size: u32,
    uuid: &'a str,
    destination_type: &'static str,
    source_type: &'static str,
}

impl<'a> CreateServerRequest<'a> {
    pub(super) fn new(request: &'a CreateServer) -> Self {
        let block_device_mapping_v2: Vec<_> = request
            .boot_volume
            .iter()
            .map(|volume| BlockDeviceMapping {
                volume_size: volume.size_gb,
                uuid: &request.image_ref,
                destination_type: "volume",
                source_type: "image",
            })
            .collect();
        // Booting from a volume leaves the image reference empty.
        let image_ref = if block_device_mapping_v2.is_empty() {
            request.image_ref.as_str()
        } else {
            ""
        };
        Self {
            server: NewServer {
                name: &request.name,
                image_ref,
                flavor_ref: &request.flavor_ref,
                metadata: &request.metadata,
                key_name: request.key_name.as_deref(),
                security_groups: request
                    .security_groups
                    .iter()
                    .map(|name| NamedRef { name })
                    .collect(),
                networks: request
                    .networks
                    .iter()
                    .map(|uuid| NetworkRef { uuid })
                    .collect(),
                availability_zone: request.availability_zone.as_deref(),
                block_device_mapping_v2,
                disk_config: request.disk_config.map(|config| config.as_str()),
            },
        }
    }
}

#[derive(Deserialize)]
pub(super) struct CreatedServerEnvelope {
    pub(super) server: CreatedServer,
}

#[derive(Deserialize)]
pub(super) struct CreatedServer {
    pub(super) id: String,
}

#[derive(Deserialize)]
pub(super) struct ServerEnvelope {
    pub(super) server: WireServer,
}

#[derive(Deserialize)]
pub(super) struct ServersEnvelope {
    pub(super) servers: Vec<WireServer>,
}

#[derive(Deserialize)]
pub(super) struct WireServer {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    addresses: BTreeMap<String, Vec<WireAddress>>,
    #[serde(default)]
    metadata: Metadata,
}

#[derive(Deserialize)]
struct WireAddress {
    addr: String,
}

impl From<WireServer> for ServerRecord {
    fn from(value: WireServer) -> Self {
        Self {
            id: ProviderId::from(value.id),
            name: value.name,
            status: NodeStatus::from_provider(&value.status),
            provider_status: value.status,
            addresses: value
                .addresses
                .into_values()
                .flatten()
                .map(|address| address.addr)
                .collect(),
            metadata: value.metadata,
        }
    }
}

#[derive(Serialize)]
pub(super) struct AllocateFloatingIpRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) pool: Option<&'a str>,
}

#[derive(Deserialize)]
pub(super) struct FloatingIpEnvelope {
    pub(super) floating_ip: WireFloatingIp,
}

#[derive(Deserialize)]
pub(super) struct WireFloatingIp {
    id: WireId,
    ip: String,
    #[serde(default)]
    pool: Option<String>,
}

impl From<WireFloatingIp> for FloatingIp {
    fn from(value: WireFloatingIp) -> Self {
        Self {
            id: value.id.into_provider_id(),
            ip: value.ip,
            pool: value.pool,
        }
    }
}

#[derive(Serialize)]
pub(super) struct AddFloatingIpRequest<'a> {
    #[serde(rename = "addFloatingIp")]
    pub(super) add_floating_ip: AddressRef<'a>,
}

#[derive(Serialize)]
pub(super) struct AddressRef<'a> {
    pub(super) address: &'a str,
}

#[derive(Deserialize, Serialize)]
pub(super) struct MetadataEnvelope {
    pub(super) metadata: Metadata,
}

#[derive(Deserialize, Serialize)]
pub(super) struct MetaItemEnvelope {
    pub(super) meta: Metadata,
}

/// Renders non-string values (diagnostics counters, image properties) as text.
pub(super) fn stringify_map(values: BTreeMap<String, serde_json::Value>) -> Metadata {
    values
        .into_iter()
        .map(|(key, value)| {
            let text = match value {
                serde_json::Value::String(text) => text,
                other => other.to_string(),
            };
            (key, text)
        })
        .collect()
}
