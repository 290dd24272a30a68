//! Unit tests for batch provisioning.

use std::sync::Arc;
use std::time::Duration;

use rstest::rstest;

use super::{
    GROUP_METADATA_KEY, NodeBatchRequest, NodeProvisioner, PollConfig, ProvisionSettings,
    SecuritySpec,
};
use crate::api::{BootVolume, DiskConfig, Metadata, NodeStatus, ServerRecord};
use crate::catalog::{CatalogResolver, Template, TemplateCriteria};
use crate::error::ComputeError;
use crate::extensions::{Capability, ExtensionRegistry};
use crate::reconcile::{KeyPairSpec, ResourceReconciler};
use crate::test_support::{FakeCompute, extension};
use crate::types::{ProviderId, Region};

const REGION: &str = "az-1.region-a.geo-1";

const FAST_POLL: PollConfig = PollConfig {
    interval: Duration::from_millis(1),
    timeout: Duration::from_millis(50),
};

struct Harness {
    provisioner: NodeProvisioner,
    template: Template,
}

async fn harness(fake: &FakeCompute, settings: ProvisionSettings) -> Harness {
    let api = Arc::new(fake.clone());
    let regions = vec![Region::from(REGION)];
    let registry = Arc::new(
        ExtensionRegistry::build(api.clone(), &regions)
            .await
            .expect("registry builds"),
    );
    let template = CatalogResolver::new(api.clone(), Arc::clone(&registry), regions)
        .build_template(&TemplateCriteria::default())
        .await
        .expect("template resolves");
    let reconciler =
        ResourceReconciler::new(api.clone(), "cumulus").with_settle_delay(Duration::from_millis(1));
    Harness {
        provisioner: NodeProvisioner::new(api, registry, reconciler, settings),
        template,
    }
}

fn batch(group: &str, count: u32, template: Template) -> NodeBatchRequest {
    NodeBatchRequest {
        poll: Some(FAST_POLL),
        ..NodeBatchRequest::new(group, count, template)
    }
}

#[tokio::test]
async fn nodes_are_named_and_tagged_by_group() {
    let fake = FakeCompute::standard(REGION);
    let harness = harness(&fake, ProvisionSettings::default()).await;

    let outcome = harness
        .provisioner
        .create_nodes(&batch("web", 2, harness.template.clone()))
        .await
        .expect("batch runs");

    assert!(outcome.failures.is_empty());
    let names: Vec<_> = outcome.nodes.iter().map(|node| node.name.as_str()).collect();
    assert_eq!(names, vec!["web-0", "web-1"]);
    assert!(outcome.nodes.iter().all(|node| node.status == NodeStatus::Active));

    let created = fake.created_servers(REGION);
    assert_eq!(created.len(), 2);
    assert!(created.iter().all(|server| {
        server.metadata.get(GROUP_METADATA_KEY).map(String::as_str) == Some("web")
            && server.security_groups == vec!["cumulus-web".to_owned()]
            && server.availability_zone.as_deref() == Some("nova")
    }));
    let group = fake
        .security_group(REGION, "cumulus-web")
        .expect("managed group exists");
    assert_eq!(group.rules.len(), 1);
    assert_eq!(fake.calls("create_security_group"), 1);
}

#[tokio::test]
async fn invalid_batches_fail_before_any_create() {
    let fake = FakeCompute::standard(REGION);
    let harness = harness(&fake, ProvisionSettings::default()).await;

    for request in [
        batch("", 1, harness.template.clone()),
        batch("two words", 1, harness.template.clone()),
        batch("web", 0, harness.template.clone()),
    ] {
        let err = harness
            .provisioner
            .create_nodes(&request)
            .await
            .expect_err("request is invalid");
        assert!(matches!(err, ComputeError::Validation(_)));
    }
    assert_eq!(fake.calls("create_server"), 0);
    assert_eq!(fake.calls("list_security_groups"), 0);
}

#[tokio::test]
async fn missing_key_pair_aborts_the_batch() {
    let fake = FakeCompute::standard(REGION);
    let harness = harness(&fake, ProvisionSettings::default()).await;
    let request = NodeBatchRequest {
        key_pair: KeyPairSpec::Existing {
            name: "ghost".to_owned(),
            private_key: None,
        },
        ..batch("web", 2, harness.template.clone())
    };

    let err = harness
        .provisioner
        .create_nodes(&request)
        .await
        .expect_err("keypair is missing");

    assert!(matches!(err, ComputeError::KeyPairNotFound { .. }));
    assert_eq!(fake.calls("create_server"), 0);
}

#[tokio::test]
async fn per_node_key_pairs_are_distinct() {
    let fake = FakeCompute::standard(REGION);
    let harness = harness(&fake, ProvisionSettings::default()).await;
    let request = NodeBatchRequest {
        key_pair: KeyPairSpec::Generate,
        per_node_key_pairs: true,
        ..batch("web", 2, harness.template.clone())
    };

    let outcome = harness
        .provisioner
        .create_nodes(&request)
        .await
        .expect("batch runs");

    let keys: Vec<_> = outcome
        .nodes
        .iter()
        .map(|node| node.key_name.clone().expect("key injected"))
        .collect();
    assert_eq!(keys, vec!["cumulus-web-0-0", "cumulus-web-1-0"]);
    assert_eq!(fake.key_pair_names(REGION).len(), 2);
}

#[tokio::test]
async fn error_status_fails_only_that_node() {
    let fake = FakeCompute::standard(REGION);
    fake.script_server(REGION, "web-0", &["BUILD", "ERROR"]);
    let harness = harness(&fake, ProvisionSettings::default()).await;

    let outcome = harness
        .provisioner
        .create_nodes(&batch("web", 2, harness.template.clone()))
        .await
        .expect("batch runs");

    assert_eq!(outcome.nodes.len(), 1);
    let failure = outcome.failures.first().expect("one failure");
    assert_eq!(failure.index, 0);
    assert!(matches!(
        &failure.error,
        ComputeError::RemoteStatus { status, .. } if status == "ERROR"
    ));
}

#[tokio::test]
async fn invisible_server_is_polled_until_it_appears() {
    let fake = FakeCompute::standard(REGION);
    fake.script_server(REGION, "web-0", &["404", "404", "BUILD", "ACTIVE"]);
    let harness = harness(&fake, ProvisionSettings::default()).await;

    let outcome = harness
        .provisioner
        .create_nodes(&batch("web", 1, harness.template.clone()))
        .await
        .expect("batch runs");

    assert_eq!(outcome.nodes.len(), 1);
    assert_eq!(fake.calls("get_server"), 4);
}

#[tokio::test]
async fn unbounded_poll_timeout_waits_without_a_deadline() {
    let fake = FakeCompute::standard(REGION);
    fake.script_server(REGION, "web-0", &["BUILD", "ACTIVE"]);
    let harness = harness(&fake, ProvisionSettings::default()).await;
    let request = NodeBatchRequest {
        poll: Some(PollConfig {
            interval: Duration::from_millis(1),
            timeout: Duration::from_secs(u64::MAX),
        }),
        ..NodeBatchRequest::new("web", 1, harness.template.clone())
    };

    let outcome = harness
        .provisioner
        .create_nodes(&request)
        .await
        .expect("batch runs");

    assert!(outcome.failures.is_empty());
    assert_eq!(outcome.nodes.len(), 1);
    assert_eq!(fake.calls("get_server"), 2);
}

fn advertise_all_but(fake: &FakeCompute, missing: Capability) {
    fake.set_extensions(
        REGION,
        Capability::ALL
            .into_iter()
            .filter(|capability| *capability != missing)
            .map(extension)
            .collect(),
    );
}

#[tokio::test]
async fn managed_security_group_is_skipped_without_the_extension() {
    let fake = FakeCompute::standard(REGION);
    advertise_all_but(&fake, Capability::SecurityGroups);
    let harness = harness(&fake, ProvisionSettings::default()).await;

    let outcome = harness
        .provisioner
        .create_nodes(&batch("web", 1, harness.template.clone()))
        .await
        .expect("batch runs");

    assert_eq!(outcome.nodes.len(), 1);
    assert_eq!(fake.calls("list_security_groups"), 0);
    assert_eq!(fake.calls("create_security_group"), 0);
    let created = fake.created_servers(REGION);
    assert!(created.iter().all(|server| server.security_groups.is_empty()));
}

#[rstest]
#[case::generate(KeyPairSpec::Generate)]
#[case::import(KeyPairSpec::Import { public_key: "ssh-rsa AAAAB3Nzaops".to_owned() })]
#[tokio::test]
async fn key_pair_creation_is_refused_without_the_extension(#[case] key_pair: KeyPairSpec) {
    let fake = FakeCompute::standard(REGION);
    advertise_all_but(&fake, Capability::Keypairs);
    let harness = harness(&fake, ProvisionSettings::default()).await;
    let request = NodeBatchRequest {
        key_pair,
        ..batch("web", 1, harness.template.clone())
    };

    let err = harness
        .provisioner
        .create_nodes(&request)
        .await
        .expect_err("keypairs are unsupported");

    assert!(matches!(
        err,
        ComputeError::Unsupported { ref feature, .. } if feature == "keypairs"
    ));
    assert_eq!(fake.calls("create_key_pair"), 0);
    assert_eq!(fake.calls("create_server"), 0);
}

#[tokio::test]
async fn existing_key_pair_is_used_unchecked_without_the_extension() {
    let fake = FakeCompute::standard(REGION);
    advertise_all_but(&fake, Capability::Keypairs);
    let harness = harness(&fake, ProvisionSettings::default()).await;
    let request = NodeBatchRequest {
        key_pair: KeyPairSpec::Existing {
            name: "ops".to_owned(),
            private_key: None,
        },
        ..batch("web", 1, harness.template.clone())
    };

    let outcome = harness
        .provisioner
        .create_nodes(&request)
        .await
        .expect("batch runs");

    assert_eq!(fake.calls("get_key_pair"), 0);
    let node = outcome.nodes.first().expect("node created");
    assert_eq!(node.key_name.as_deref(), Some("ops"));
}

#[tokio::test]
async fn disk_config_is_dropped_without_the_extension() {
    let fake = FakeCompute::standard(REGION);
    fake.set_extensions(REGION, vec![extension(Capability::SecurityGroups)]);
    let harness = harness(&fake, ProvisionSettings::default()).await;
    let mut template = harness.template.clone();
    template.options.disk_config = Some(DiskConfig::Auto);
    template.options.boot_volume = Some(BootVolume { size_gb: 10 });

    harness
        .provisioner
        .create_nodes(&batch("web", 1, template))
        .await
        .expect("batch runs");

    let created = fake.created_servers(REGION);
    let server = created.first().expect("server created");
    assert_eq!(server.disk_config, None);
    assert_eq!(server.boot_volume, Some(BootVolume { size_gb: 10 }));
    assert_eq!(server.availability_zone, None);
}

#[tokio::test]
async fn configured_default_attaches_floating_ips() {
    let fake = FakeCompute::standard(REGION);
    let settings = ProvisionSettings {
        auto_allocate_floating_ips: true,
        ..ProvisionSettings::default()
    };
    let harness = harness(&fake, settings).await;

    let outcome = harness
        .provisioner
        .create_nodes(&batch("web", 1, harness.template.clone()))
        .await
        .expect("batch runs");

    let node = outcome.nodes.first().expect("node created");
    let address = node.floating_ip.clone().expect("floating ip attached");
    assert_eq!(
        fake.floating_ip_associations(REGION),
        vec![(node.id.id.to_string(), address)]
    );
}

#[tokio::test]
async fn unattached_floating_ip_is_released() {
    let fake = FakeCompute::standard(REGION);
    fake.reject_floating_ip_association(REGION);
    let settings = ProvisionSettings {
        auto_allocate_floating_ips: true,
        ..ProvisionSettings::default()
    };
    let harness = harness(&fake, settings).await;

    let outcome = harness
        .provisioner
        .create_nodes(&batch("web", 1, harness.template.clone()))
        .await
        .expect("batch runs");

    assert!(outcome.nodes.is_empty());
    let failure = outcome.failures.first().expect("one failure");
    assert!(matches!(failure.error, ComputeError::Provider { .. }));
    assert_eq!(fake.calls("allocate_floating_ip"), 1);
    assert_eq!(fake.calls("release_floating_ip"), 1);
    assert!(fake.allocated_floating_ips(REGION).is_empty());
}

#[tokio::test]
async fn floating_ip_request_is_skipped_without_the_extension() {
    let fake = FakeCompute::standard(REGION);
    fake.set_extensions(REGION, vec![extension(Capability::SecurityGroups)]);
    let harness = harness(&fake, ProvisionSettings::default()).await;
    let mut template = harness.template.clone();
    template.options.auto_assign_floating_ip = Some(true);

    let outcome = harness
        .provisioner
        .create_nodes(&NodeBatchRequest {
            security: SecuritySpec::Existing(vec!["default".to_owned()]),
            ..batch("web", 1, template)
        })
        .await
        .expect("batch runs");

    assert!(outcome.nodes.iter().all(|node| node.floating_ip.is_none()));
    assert_eq!(fake.calls("allocate_floating_ip"), 0);
    assert_eq!(fake.calls("create_security_group"), 0);
    let created = fake.created_servers(REGION);
    assert_eq!(
        created.first().map(|server| server.security_groups.clone()),
        Some(vec!["default".to_owned()])
    );
}

#[tokio::test]
async fn expired_auth_during_create_is_a_node_failure() {
    let fake = FakeCompute::standard(REGION);
    let harness = harness(&fake, ProvisionSettings::default()).await;
    let request = NodeBatchRequest {
        security: SecuritySpec::None,
        ..batch("web", 1, harness.template.clone())
    };
    fake.expire_auth();

    let outcome = harness
        .provisioner
        .create_nodes(&request)
        .await
        .expect("batch runs");

    assert!(outcome.nodes.is_empty());
    assert!(matches!(
        outcome.failures.first().map(|failure| &failure.error),
        Some(ComputeError::AuthExpired { .. })
    ));
}

#[tokio::test]
async fn listed_nodes_are_narrowed_by_group_tag() {
    let fake = FakeCompute::standard(REGION);
    fake.add_server(
        REGION,
        ServerRecord {
            id: ProviderId::from("71752"),
            name: "sample-server".to_owned(),
            status: NodeStatus::Active,
            provider_status: "ACTIVE".to_owned(),
            addresses: vec!["67.23.10.132".to_owned()],
            metadata: Metadata::new(),
        },
    );
    let harness = harness(&fake, ProvisionSettings::default()).await;
    for group in ["web", "db"] {
        harness
            .provisioner
            .create_nodes(&batch(group, 1, harness.template.clone()))
            .await
            .expect("batch runs");
    }
    let region = Region::from(REGION);

    let web = harness
        .provisioner
        .list_nodes(&region, Some("web"))
        .await
        .expect("listing succeeds");
    let everything = harness
        .provisioner
        .list_nodes(&region, None)
        .await
        .expect("listing succeeds");

    let names: Vec<_> = web.iter().map(|node| node.name.as_str()).collect();
    assert_eq!(names, vec!["web-0"]);
    assert!(web.iter().all(|node| node.group.as_deref() == Some("web")));
    assert_eq!(everything.len(), 3);
    let foreign = everything
        .iter()
        .find(|node| node.name == "sample-server")
        .expect("untagged server listed");
    assert_eq!(foreign.id.to_string(), format!("{REGION}/71752"));
    assert_eq!(foreign.group, None);
    assert_eq!(foreign.status, NodeStatus::Active);
}
