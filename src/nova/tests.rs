//! Unit tests for Nova wire payloads and status mapping.

use std::sync::Arc;
use std::time::Duration;

use rstest::rstest;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::{NovaClient, classify, wire};
use crate::api::{
    ApiError, BootVolume, ComputeApi, CreateServer, DiskConfig, IpProtocol, Metadata, NodeStatus,
    ResourceKind, SecurityGroup, SecurityGroupRule, ServerRecord,
};
use crate::session::{CatalogEntry, Session, StaticToken};
use crate::types::Region;

const REGION: &str = "az-1.region-a.geo-1";
const TOKEN: &str = "Auth_4f173437e4b013bee56d1007";

/// Client for one region served by `server` under `/v2/t`.
fn client(server: &MockServer) -> NovaClient {
    let session = Session::from_catalog(
        &[CatalogEntry::compute(REGION, format!("{}/v2/t", server.uri()))],
        &[],
        Arc::new(StaticToken::new(TOKEN)),
    )
    .expect("session builds");
    NovaClient::new(session, Duration::from_secs(5)).expect("client builds")
}

/// Mock answering `verb` on `route` once, only when the token is sent.
fn authed(verb: &str, route: &str, response: ResponseTemplate) -> Mock {
    Mock::given(method(verb))
        .and(path(route))
        .and(header("X-Auth-Token", TOKEN))
        .respond_with(response)
        .expect(1)
}

fn to_json<T: serde::Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).expect("payload serialises")
}

fn base_server() -> CreateServer {
    CreateServer {
        name: "test-1".to_owned(),
        image_ref: "2235".to_owned(),
        flavor_ref: "1".to_owned(),
        ..CreateServer::default()
    }
}

#[test]
fn create_server_payload_omits_unset_options() {
    let request = base_server();
    assert_eq!(
        to_json(&wire::CreateServerRequest::new(&request)),
        json!({"server": {"name": "test-1", "imageRef": "2235", "flavorRef": "1"}})
    );
}

#[test]
fn create_server_payload_carries_placement_and_access() {
    let request = CreateServer {
        metadata: Metadata::from([("cumulus-group".to_owned(), "test".to_owned())]),
        key_name: Some("cumulus-test-0a1b2c3d".to_owned()),
        security_groups: vec!["cumulus-test".to_owned()],
        networks: vec!["4ebd35cf-bfe7-4d93-b0d8-eb468ce2245a".to_owned()],
        availability_zone: Some("nova".to_owned()),
        disk_config: Some(DiskConfig::Auto),
        ..base_server()
    };

    assert_eq!(
        to_json(&wire::CreateServerRequest::new(&request)),
        json!({"server": {
            "name": "test-1",
            "imageRef": "2235",
            "flavorRef": "1",
            "metadata": {"cumulus-group": "test"},
            "key_name": "cumulus-test-0a1b2c3d",
            "security_groups": [{"name": "cumulus-test"}],
            "networks": [{"uuid": "4ebd35cf-bfe7-4d93-b0d8-eb468ce2245a"}],
            "availability_zone": "nova",
            "OS-DCF:diskConfig": "AUTO"
        }})
    );
}

#[test]
fn create_server_payload_boots_from_volume() {
    let request = CreateServer {
        boot_volume: Some(BootVolume { size_gb: 100 }),
        ..base_server()
    };

    assert_eq!(
        to_json(&wire::CreateServerRequest::new(&request)),
        json!({"server": {
            "name": "test-1",
            "imageRef": "",
            "flavorRef": "1",
            "block_device_mapping_v2": [{
                "volume_size": 100,
                "uuid": "2235",
                "destination_type": "volume",
                "source_type": "image"
            }]
        }})
    );
}

#[test]
fn security_group_rule_payload_uses_string_ports() {
    let rule = SecurityGroupRule::tcp(22, "0.0.0.0/0");
    let body = wire::CreateRuleRequest {
        security_group_rule: wire::NewRule::new("160", &rule),
    };
    assert_eq!(
        to_json(&body),
        json!({"security_group_rule": {
            "parent_group_id": "160",
            "cidr": "0.0.0.0/0",
            "ip_protocol": "tcp",
            "from_port": "22",
            "to_port": "22"
        }})
    );
}

#[test]
fn security_group_payload_has_name_and_description() {
    let body = wire::CreateSecurityGroupRequest {
        security_group: wire::NewSecurityGroup {
            name: "cumulus-test",
            description: "cumulus-test",
        },
    };
    assert_eq!(
        to_json(&body),
        json!({"security_group": {"name": "cumulus-test", "description": "cumulus-test"}})
    );
}

#[test]
fn keypair_payload_includes_public_key_only_when_importing() {
    let generate = wire::CreateKeyPairRequest {
        keypair: wire::NewKeyPair {
            name: "cumulus-test-0",
            public_key: None,
        },
    };
    assert_eq!(
        to_json(&generate),
        json!({"keypair": {"name": "cumulus-test-0"}})
    );

    let import = wire::CreateKeyPairRequest {
        keypair: wire::NewKeyPair {
            name: "cumulus-test-1",
            public_key: Some("ssh-rsa AAAA"),
        },
    };
    assert_eq!(
        to_json(&import),
        json!({"keypair": {"name": "cumulus-test-1", "public_key": "ssh-rsa AAAA"}})
    );
}

#[test]
fn floating_ip_allocation_payload_names_pool_when_given() {
    assert_eq!(
        to_json(&wire::AllocateFloatingIpRequest { pool: None }),
        json!({})
    );
    assert_eq!(
        to_json(&wire::AllocateFloatingIpRequest {
            pool: Some("myPool")
        }),
        json!({"pool": "myPool"})
    );
}

#[test]
fn security_group_parses_numeric_ids_and_skips_group_sourced_rules() {
    let body = json!({"security_group": {
        "id": 160,
        "name": "cumulus-test",
        "description": "cumulus-test",
        "rules": [
            {"id": 1, "parent_group_id": 160, "ip_protocol": "tcp",
             "from_port": 22, "to_port": 22, "ip_range": {"cidr": "0.0.0.0/0"}},
            {"id": 2, "parent_group_id": 160, "ip_protocol": "tcp",
             "from_port": 22, "to_port": 22, "ip_range": {},
             "group": {"name": "other", "tenant_id": "t"}}
        ]
    }});
    let envelope: wire::SecurityGroupEnvelope =
        serde_json::from_value(body).expect("security group parses");
    let group = SecurityGroup::from(envelope.security_group);

    assert_eq!(group.id.as_str(), "160");
    assert_eq!(group.rules, vec![SecurityGroupRule::tcp(22, "0.0.0.0/0")]);
    assert_eq!(group.rules.first().map(|rule| rule.protocol), Some(IpProtocol::Tcp));
}

#[test]
fn server_detail_flattens_addresses_and_maps_status() {
    let body = json!({"server": {
        "id": "71752",
        "name": "test-0",
        "status": "BUILD",
        "addresses": {
            "private": [{"addr": "10.0.0.5", "version": 4}],
            "public": [{"addr": "67.23.10.132", "version": 4}]
        },
        "metadata": {"cumulus-group": "test"}
    }});
    let envelope: wire::ServerEnvelope = serde_json::from_value(body).expect("server parses");
    let server = ServerRecord::from(envelope.server);

    assert_eq!(server.status, NodeStatus::Building);
    assert_eq!(server.provider_status, "BUILD");
    assert_eq!(server.addresses, vec!["10.0.0.5", "67.23.10.132"]);
    assert_eq!(
        server.metadata.get("cumulus-group").map(String::as_str),
        Some("test")
    );
}

#[test]
fn extension_without_namespace_parses_as_none() {
    let body = json!({"extensions": [
        {"alias": "os-floating-ips", "name": "Floating_ips", "namespace": "",
         "updated": "2011-06-16T00:00:00+00:00", "description": "Floating IPs support"},
        {"alias": "os-keypairs", "name": "Keypairs",
         "namespace": "http://docs.openstack.org/compute/ext/keypairs/api/v1.1"}
    ]});
    let envelope: wire::ExtensionsEnvelope = serde_json::from_value(body).expect("parses");
    let extensions: Vec<crate::api::Extension> =
        envelope.extensions.into_iter().map(Into::into).collect();

    assert_eq!(extensions.first().and_then(|ext| ext.namespace.clone()), None);
    assert!(extensions.get(1).is_some_and(|ext| ext.namespace.is_some()));
}

#[test]
fn availability_zones_report_state() {
    let body = json!({"availabilityZoneInfo": [
        {"zoneName": "nova", "zoneState": {"available": true}, "hosts": null},
        {"zoneName": "maintenance", "zoneState": {"available": false}}
    ]});
    let envelope: wire::ZonesEnvelope = serde_json::from_value(body).expect("zones parse");
    let zones: Vec<crate::api::AvailabilityZone> =
        envelope.zones.into_iter().map(Into::into).collect();

    assert_eq!(zones.len(), 2);
    assert!(zones.first().is_some_and(|zone| zone.available));
    assert!(zones.get(1).is_some_and(|zone| !zone.available));
}

#[test]
fn metadata_item_payload_uses_meta_key() {
    let body = wire::MetaItemEnvelope {
        meta: Metadata::from([("Server Label".to_owned(), "Web Head 1".to_owned())]),
    };
    assert_eq!(to_json(&body), json!({"meta": {"Server Label": "Web Head 1"}}));
}

#[test]
fn classify_maps_auth_and_conflicts() {
    let region = Region::from("az-1.region-a.geo-1");

    assert_eq!(
        classify(&region, 401, "unauthorized"),
        ApiError::AuthExpired {
            region: region.to_string()
        }
    );
    assert!(matches!(
        classify(&region, 409, "duplicate"),
        ApiError::Conflict { .. }
    ));
    assert!(matches!(
        classify(&region, 400, "Security group cumulus-test already exists"),
        ApiError::Conflict { .. }
    ));
    assert_eq!(
        classify(&region, 400, "bad request"),
        ApiError::Status {
            status: 400,
            message: "bad request".to_owned()
        }
    );
}

#[test]
fn node_status_maps_provider_states() {
    assert_eq!(NodeStatus::from_provider("ACTIVE"), NodeStatus::Active);
    assert_eq!(NodeStatus::from_provider("REBUILD"), NodeStatus::Building);
    assert_eq!(NodeStatus::from_provider("SOFT_DELETED"), NodeStatus::Deleted);
    assert_eq!(NodeStatus::from_provider("ERROR"), NodeStatus::Error);
    assert_eq!(NodeStatus::from_provider("VERIFY_RESIZE"), NodeStatus::Unknown);
}

#[tokio::test]
async fn missing_key_pair_reads_as_absent() {
    let server = MockServer::start().await;
    authed("GET", "/v2/t/os-keypairs/ghost", ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let found = client(&server)
        .get_key_pair(&Region::from(REGION), "ghost")
        .await
        .expect("lookup succeeds");

    assert_eq!(found, None);
}

#[tokio::test]
async fn key_pair_name_is_a_single_encoded_segment() {
    let server = MockServer::start().await;
    authed(
        "GET",
        "/v2/t/os-keypairs/ops%2Fadmin%20key",
        ResponseTemplate::new(200).set_body_json(json!({"keypair": {
            "name": "ops/admin key",
            "public_key": "ssh-rsa AAAA",
            "fingerprint": "fp:ops"
        }})),
    )
    .mount(&server)
    .await;

    let found = client(&server)
        .get_key_pair(&Region::from(REGION), "ops/admin key")
        .await
        .expect("lookup succeeds")
        .expect("keypair exists");

    assert_eq!(found.name, "ops/admin key");
    assert_eq!(found.fingerprint.as_deref(), Some("fp:ops"));
}

#[tokio::test]
async fn missing_server_reads_as_absent() {
    let server = MockServer::start().await;
    authed("GET", "/v2/t/servers/71752", ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let found = client(&server)
        .get_server(&Region::from(REGION), "71752")
        .await
        .expect("lookup succeeds");

    assert_eq!(found, None);
}

#[tokio::test]
async fn server_listing_reads_detail() {
    let server = MockServer::start().await;
    authed(
        "GET",
        "/v2/t/servers/detail",
        ResponseTemplate::new(200).set_body_json(json!({"servers": [{
            "id": "71752",
            "name": "sample-server",
            "status": "ACTIVE",
            "addresses": {"public": [{"addr": "67.23.10.132", "version": 4}]},
            "metadata": {"cumulus-group": "sample"}
        }]})),
    )
    .mount(&server)
    .await;

    let servers = client(&server)
        .list_servers(&Region::from(REGION))
        .await
        .expect("listing succeeds");

    let listed = servers.first().expect("one server");
    assert_eq!(servers.len(), 1);
    assert_eq!(listed.id.as_str(), "71752");
    assert_eq!(listed.name, "sample-server");
    assert_eq!(listed.status, NodeStatus::Active);
}

#[rstest]
#[case(403)]
#[case(404)]
#[case(500)]
#[tokio::test]
async fn unavailable_diagnostics_read_as_absent(#[case] status: u16) {
    let server = MockServer::start().await;
    authed(
        "GET",
        "/v2/t/servers/71752/diagnostics",
        ResponseTemplate::new(status),
    )
    .mount(&server)
    .await;

    let found = client(&server)
        .get_server_diagnostics(&Region::from(REGION), "71752")
        .await
        .expect("diagnostics call succeeds");

    assert_eq!(found, None);
}

#[tokio::test]
async fn diagnostics_values_are_rendered_as_text() {
    let server = MockServer::start().await;
    authed(
        "GET",
        "/v2/t/servers/71752/diagnostics",
        ResponseTemplate::new(200).set_body_json(json!({
            "cpu0_time": 17_300_000_000_u64,
            "vda_errors": -1,
            "memory": 524_288
        })),
    )
    .mount(&server)
    .await;

    let found = client(&server)
        .get_server_diagnostics(&Region::from(REGION), "71752")
        .await
        .expect("diagnostics call succeeds")
        .expect("diagnostics available");

    assert_eq!(found.get("cpu0_time").map(String::as_str), Some("17300000000"));
    assert_eq!(found.get("vda_errors").map(String::as_str), Some("-1"));
}

#[rstest]
#[case(204, true)]
#[case(404, false)]
#[tokio::test]
async fn deleting_a_metadata_item_reports_presence(#[case] status: u16, #[case] expected: bool) {
    let server = MockServer::start().await;
    authed(
        "DELETE",
        "/v2/t/servers/71752/metadata/Server%20Label",
        ResponseTemplate::new(status),
    )
    .mount(&server)
    .await;

    let deleted = client(&server)
        .delete_metadata_item(
            &Region::from(REGION),
            ResourceKind::Server,
            "71752",
            "Server Label",
        )
        .await
        .expect("delete call succeeds");

    assert_eq!(deleted, expected);
}

#[tokio::test]
async fn metadata_item_keys_are_percent_encoded() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v2/t/images/2235/metadata/a%20b%2Fc"))
        .and(header("X-Auth-Token", TOKEN))
        .and(body_json(json!({"meta": {"a b/c": "on"}})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"meta": {"a b/c": "on"}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .put_metadata_item(&Region::from(REGION), ResourceKind::Image, "2235", "a b/c", "on")
        .await
        .expect("item stored");
}

#[tokio::test]
async fn releasing_an_unknown_floating_ip_succeeds() {
    let server = MockServer::start().await;
    authed("DELETE", "/v2/t/os-floating-ips/1", ResponseTemplate::new(404))
        .mount(&server)
        .await;

    client(&server)
        .release_floating_ip(&Region::from(REGION), "1")
        .await
        .expect("release succeeds");
}

#[tokio::test]
async fn rejected_token_is_reported_as_expired() {
    let server = MockServer::start().await;
    authed("GET", "/v2/t/extensions", ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = client(&server)
        .list_extensions(&Region::from(REGION))
        .await
        .expect_err("token rejected");

    assert_eq!(
        err,
        ApiError::AuthExpired {
            region: REGION.to_owned()
        }
    );
}
