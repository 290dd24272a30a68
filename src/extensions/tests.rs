//! Unit tests for extension lookup and capability gating.

use std::sync::Arc;

use super::{Capability, CapabilitySet, ExtensionRegistry};
use crate::api::{ApiError, Extension};
use crate::error::ComputeError;
use crate::test_support::{FakeCompute, extension};
use crate::types::Region;

const REGION: &str = "az-1.region-a.geo-1";

fn without_namespace(alias: &str, name: &str) -> Extension {
    Extension {
        namespace: None,
        alias: alias.to_owned(),
        name: name.to_owned(),
        updated: None,
        description: None,
    }
}

async fn registry(fake: &FakeCompute) -> ExtensionRegistry {
    ExtensionRegistry::build(Arc::new(fake.clone()), &[Region::from(REGION)])
        .await
        .expect("registry builds")
}

#[tokio::test]
async fn namespace_presence_drives_lookup() {
    let fake = FakeCompute::new();
    fake.set_extensions(REGION, vec![extension(Capability::FloatingIps)]);
    let registry = registry(&fake).await;
    let region = Region::from(REGION);

    assert!(
        registry
            .has_extension(&region, Capability::FloatingIps.namespace())
            .expect("known region")
    );
    assert!(
        registry
            .has_extension(&region, "os-floating-ips")
            .expect("known region")
    );
    assert!(
        !registry
            .has_extension(&region, Capability::Keypairs.namespace())
            .expect("known region")
    );
}

#[tokio::test]
async fn missing_namespace_falls_back_to_alias_or_name() {
    let fake = FakeCompute::new();
    fake.set_extensions(
        REGION,
        vec![
            without_namespace("", "Floating_ips"),
            without_namespace("os-hosts", "Hosts"),
        ],
    );
    let registry = registry(&fake).await;
    let region = Region::from(REGION);

    assert!(
        registry
            .has_extension(&region, "os-floating-ips")
            .expect("known region")
    );
    assert!(registry.has_extension(&region, "os-hosts").expect("known region"));
    assert!(
        registry
            .capabilities(&region)
            .expect("known region")
            .contains(Capability::FloatingIps)
    );
}

#[tokio::test]
async fn namespaced_extension_does_not_match_by_alias_alone() {
    let fake = FakeCompute::new();
    fake.set_extensions(
        REGION,
        vec![Extension {
            namespace: Some("http://example.com/ext/floating".to_owned()),
            alias: "os-floating-ips".to_owned(),
            name: "FloatingIps".to_owned(),
            updated: None,
            description: None,
        }],
    );
    let registry = registry(&fake).await;

    assert!(
        !registry
            .has_extension(&Region::from(REGION), "os-floating-ips")
            .expect("known region")
    );
}

#[tokio::test]
async fn empty_listing_reports_everything_absent() {
    let fake = FakeCompute::new();
    fake.add_region(REGION);
    let registry = registry(&fake).await;
    let region = Region::from(REGION);

    assert!(registry.capabilities(&region).expect("known").is_empty());
    assert!(registry.floating_ips(&region).expect("known").is_none());
    assert!(registry.list(&region).expect("known").is_empty());
}

#[tokio::test]
async fn unknown_region_is_an_error() {
    let fake = FakeCompute::standard(REGION);
    let registry = registry(&fake).await;

    let err = registry
        .has_extension(&Region::from("elsewhere"), "os-floating-ips")
        .expect_err("unknown region");
    assert_eq!(
        err,
        ComputeError::RegionNotConfigured {
            region: "elsewhere".to_owned()
        }
    );
}

#[tokio::test]
async fn listing_failure_surfaces_at_build_time() {
    let fake = FakeCompute::standard(REGION);
    fake.fail_extensions(
        REGION,
        ApiError::Status {
            status: 500,
            message: "boom".to_owned(),
        },
    );

    let err = ExtensionRegistry::build(Arc::new(fake), &[Region::from(REGION)])
        .await
        .expect_err("build should fail");
    assert!(matches!(err, ComputeError::Provider { .. }));
}

#[tokio::test]
async fn regions_are_listed_once_each() {
    let fake = FakeCompute::standard(REGION);
    fake.set_extensions("region-b", vec![extension(Capability::Keypairs)]);
    let registry = ExtensionRegistry::build(
        Arc::new(fake.clone()),
        &[Region::from(REGION), Region::from("region-b")],
    )
    .await
    .expect("registry builds");

    assert_eq!(fake.calls("list_extensions"), 2);
    assert_eq!(registry.regions().count(), 2);
    assert!(
        registry
            .floating_ips(&Region::from(REGION))
            .expect("known")
            .is_some()
    );
    assert!(
        registry
            .floating_ips(&Region::from("region-b"))
            .expect("known")
            .is_none()
    );
}

#[test]
fn capability_identify_accepts_namespace_and_alias() {
    assert_eq!(
        Capability::identify(Capability::DiskConfig.namespace()),
        Some(Capability::DiskConfig)
    );
    assert_eq!(Capability::identify("os-keypairs"), Some(Capability::Keypairs));
    assert_eq!(Capability::identify("os-hosts"), None);
}

#[test]
fn capability_set_collects_advertised_capabilities() {
    let set = CapabilitySet::from_extensions(&[
        extension(Capability::SecurityGroups),
        without_namespace("OS-DCF", "DiskConfig"),
    ]);
    assert_eq!(
        set.iter().collect::<Vec<_>>(),
        vec![Capability::SecurityGroups, Capability::DiskConfig]
    );
}
