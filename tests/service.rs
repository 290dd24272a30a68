//! Integration tests for the compute service facade.

use std::sync::Arc;

use cumulus::test_support::{FakeCompute, extension};
use cumulus::{
    Capability, CatalogEntry, CompositeId, ComputeConfig, ComputeError, ComputeService, Metadata,
    Region, Session, StaticToken, TemplateCriteria,
};
use rstest::rstest;

const REGION: &str = "az-1.region-a.geo-1";

async fn service(fake: &FakeCompute, config: ComputeConfig) -> Result<ComputeService, ComputeError> {
    ComputeService::with_api(Arc::new(fake.clone()), vec![Region::from(REGION)], config).await
}

#[tokio::test]
async fn start_up_lists_extensions_once_and_catalogs_lazily() {
    let fake = FakeCompute::standard(REGION);
    let service = service(&fake, ComputeConfig::default())
        .await
        .unwrap_or_else(|err| panic!("service should start: {err}"));

    assert_eq!(fake.calls("list_extensions"), 1);
    assert_eq!(fake.calls("list_images"), 0);
    assert!(
        service
            .extensions()
            .has_extension(&Region::from(REGION), "os-floating-ips")
            .unwrap_or_else(|err| panic!("region is known: {err}"))
    );
}

#[tokio::test]
async fn create_nodes_in_group_uses_the_default_template() {
    let fake = FakeCompute::standard(REGION);
    let service = service(
        &fake,
        ComputeConfig {
            poll_interval_secs: 1,
            ..ComputeConfig::default()
        },
    )
    .await
    .unwrap_or_else(|err| panic!("service should start: {err}"));
    fake.script_server(REGION, "api-0", &["ACTIVE"]);

    let outcome = service
        .create_nodes_in_group("api", 1, None)
        .await
        .unwrap_or_else(|err| panic!("batch should run: {err}"));

    let node = outcome
        .nodes
        .first()
        .unwrap_or_else(|| panic!("one node expected"));
    assert_eq!(node.name, "api-0");
    assert_eq!(node.group, "api");
    assert_eq!(node.location.id, format!("{REGION}/nova"));
    assert!(node.credentials.is_none());
}

#[tokio::test]
async fn explicit_criteria_override_the_default_template() {
    let fake = FakeCompute::standard(REGION);
    let service = service(&fake, ComputeConfig::default())
        .await
        .unwrap_or_else(|err| panic!("service should start: {err}"));
    fake.script_server(REGION, "db-0", &["ACTIVE"]);
    let criteria: TemplateCriteria = "osFamily=CENTOS,minCores=2"
        .parse()
        .unwrap_or_else(|err| panic!("criteria should parse: {err}"));

    service
        .create_nodes_in_group("db", 1, Some(&criteria))
        .await
        .unwrap_or_else(|err| panic!("batch should run: {err}"));

    let created = fake.created_servers(REGION);
    let server = created
        .first()
        .unwrap_or_else(|| panic!("one server expected"));
    assert_eq!(server.image_ref, "centos-7");
    assert_eq!(server.flavor_ref, "3");
}

#[rstest]
#[case(true)]
#[case(false)]
#[tokio::test]
async fn diagnostics_are_gated_by_the_extension(#[case] advertised: bool) {
    let fake = FakeCompute::standard(REGION);
    if !advertised {
        fake.set_extensions(REGION, vec![extension(Capability::SecurityGroups)]);
    }
    let diagnostics: Metadata = [("cpu0_time".to_owned(), "17300000000".to_owned())]
        .into_iter()
        .collect();
    fake.set_diagnostics(REGION, "srv-1", diagnostics.clone());
    let service = service(&fake, ComputeConfig::default())
        .await
        .unwrap_or_else(|err| panic!("service should start: {err}"));

    let found = service
        .server_diagnostics(&CompositeId::new(REGION, "srv-1"))
        .await
        .unwrap_or_else(|err| panic!("diagnostics should not fail: {err}"));

    assert_eq!(found, advertised.then_some(diagnostics));
    assert_eq!(
        fake.calls("get_server_diagnostics"),
        usize::from(advertised)
    );
}

#[tokio::test]
async fn list_nodes_finds_group_members() {
    let fake = FakeCompute::standard(REGION);
    let service = service(
        &fake,
        ComputeConfig {
            poll_interval_secs: 1,
            ..ComputeConfig::default()
        },
    )
    .await
    .unwrap_or_else(|err| panic!("service should start: {err}"));
    fake.script_server(REGION, "api-0", &["ACTIVE"]);
    service
        .create_nodes_in_group("api", 1, None)
        .await
        .unwrap_or_else(|err| panic!("batch should run: {err}"));

    let nodes = service
        .list_nodes(Some("api"))
        .await
        .unwrap_or_else(|err| panic!("listing should succeed: {err}"));
    let others = service
        .list_nodes(Some("db"))
        .await
        .unwrap_or_else(|err| panic!("listing should succeed: {err}"));

    let node = nodes.first().unwrap_or_else(|| panic!("one node expected"));
    assert_eq!(nodes.len(), 1);
    assert_eq!(node.name, "api-0");
    assert_eq!(node.id.region, Region::from(REGION));
    assert!(others.is_empty());
    assert_eq!(fake.calls("list_servers"), 2);
}

#[tokio::test]
async fn invalid_configuration_is_rejected_at_start_up() {
    let fake = FakeCompute::standard(REGION);

    let err = service(
        &fake,
        ComputeConfig {
            inbound_ports: Vec::new(),
            ..ComputeConfig::default()
        },
    )
    .await
    .expect_err("ports are required");

    assert!(matches!(err, ComputeError::Config(_)));
    assert_eq!(fake.calls("list_extensions"), 0);
}

#[tokio::test]
async fn connect_reports_unreachable_regions() {
    let session = Session::from_catalog(
        &[CatalogEntry::compute(REGION, "http://127.0.0.1:9/v2/tenant")],
        &[],
        Arc::new(StaticToken::new("token")),
    )
    .unwrap_or_else(|err| panic!("session should build: {err}"));

    let err = ComputeService::connect(
        session,
        ComputeConfig {
            http_timeout_secs: 1,
            ..ComputeConfig::default()
        },
    )
    .await
    .expect_err("nothing listens on the discard port");

    assert!(matches!(err, ComputeError::Provider { .. }));
}
