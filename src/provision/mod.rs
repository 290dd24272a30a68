//! Batch node provisioning.
//!
//! A batch reconciles its security group and keypairs, submits one
//! create-server call per node in order, then polls every accepted server
//! concurrently. Failures of individual nodes are collected in the
//! [`BatchOutcome`] and never abort their siblings; anything that fails
//! before the first create-server call fails the whole batch.

mod node;
mod poll;
mod request;

use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::api::{ComputeApi, CreateServer, Metadata};
use crate::catalog::{CompositeId, Template};
use crate::error::ComputeError;
use crate::extensions::{Capability, CapabilitySet, ExtensionRegistry, FloatingIpHandle};
use crate::reconcile::{KeyPairSpec, ReconciledKeyPair, ResourceReconciler, SecurityGroupSpec};
use crate::types::Region;

pub use node::{BatchOutcome, LoginCredentials, Node, NodeFailure, NodeSummary};
pub use poll::PollConfig;
pub use request::{NodeBatchRequest, ProvisionSettings, SecuritySpec};

/// Metadata key tagging servers with their group.
pub const GROUP_METADATA_KEY: &str = "cumulus-group";

/// Server accepted by the provider and awaiting activation.
struct Submitted {
    index: u32,
    name: String,
    server_id: String,
    key_pair: Option<ReconciledKeyPair>,
}

/// Batch-wide context shared by every node while it is finished.
struct BatchContext<'a> {
    region: &'a Region,
    group: &'a str,
    template: &'a Template,
    poll: PollConfig,
    floating_ips: Option<FloatingIpHandle>,
}

/// Creates groups of servers from a resolved template.
#[derive(Clone)]
pub struct NodeProvisioner {
    api: Arc<dyn ComputeApi>,
    registry: Arc<ExtensionRegistry>,
    reconciler: ResourceReconciler,
    settings: ProvisionSettings,
}

impl std::fmt::Debug for NodeProvisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeProvisioner")
            .field("reconciler", &self.reconciler)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl NodeProvisioner {
    /// Creates a provisioner.
    #[must_use]
    pub fn new(
        api: Arc<dyn ComputeApi>,
        registry: Arc<ExtensionRegistry>,
        reconciler: ResourceReconciler,
        settings: ProvisionSettings,
    ) -> Self {
        Self {
            api,
            registry,
            reconciler,
            settings,
        }
    }

    /// Settings applied to batches.
    #[must_use]
    pub const fn settings(&self) -> &ProvisionSettings {
        &self.settings
    }

    /// Servers in `region`, narrowed to those tagged with `group` when given.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::RegionNotConfigured`] for unknown regions and
    /// provider errors from the listing.
    pub async fn list_nodes(
        &self,
        region: &Region,
        group: Option<&str>,
    ) -> Result<Vec<NodeSummary>, ComputeError> {
        let servers = self.api.list_servers(region).await?;
        let nodes: Vec<_> = servers
            .into_iter()
            .filter(|server| {
                group.is_none_or(|wanted| {
                    server.metadata.get(GROUP_METADATA_KEY).map(String::as_str) == Some(wanted)
                })
            })
            .map(|mut server| NodeSummary {
                id: CompositeId::new(region.clone(), server.id),
                group: server.metadata.remove(GROUP_METADATA_KEY),
                status: server.status,
                provider_status: server.provider_status,
                addresses: server.addresses,
                name: server.name,
            })
            .collect();
        debug!(%region, group = group.unwrap_or("*"), found = nodes.len(), "listed nodes");
        Ok(nodes)
    }

    /// Creates every node of `batch` and waits for them to become active.
    ///
    /// # Errors
    ///
    /// Fails without creating any server when the request is invalid, the
    /// template spans regions, or security group or keypair reconciliation
    /// fails. Failures after that point are reported per node in the
    /// returned [`BatchOutcome`].
    pub async fn create_nodes(&self, batch: &NodeBatchRequest) -> Result<BatchOutcome, ComputeError> {
        batch.validate()?;
        let region = batch.template.region();
        let capabilities = self.registry.capabilities(region)?;

        let security_groups = self.reconcile_security(region, capabilities, batch).await?;
        let key_pairs = self.reconcile_key_pairs(region, capabilities, batch).await?;

        let floating_ips = if self.wants_floating_ip(&batch.template) {
            let handle = self.registry.floating_ips(region)?;
            if handle.is_none() {
                warn!(%region, group = %batch.group, "floating IPs not supported; skipping");
            }
            handle
        } else {
            None
        };

        let disk_config = if capabilities.contains(Capability::DiskConfig) {
            batch.template.options.disk_config
        } else {
            None
        };
        if batch.template.options.boot_volume.is_some()
            && !capabilities.contains(Capability::BlockDeviceMappingV2Boot)
        {
            warn!(%region, group = %batch.group, "boot-from-volume extension not advertised");
        }

        let mut outcome = BatchOutcome::default();
        let mut submitted = Vec::new();
        for (index, key_pair) in (0..batch.count).zip(key_pairs) {
            let name = format!("{}-{index}", batch.group);
            let request = CreateServer {
                name: name.clone(),
                image_ref: batch.template.image.id.id.to_string(),
                flavor_ref: batch.template.hardware.id.id.to_string(),
                metadata: server_metadata(batch),
                key_name: key_pair.as_ref().map(|pair| pair.name.clone()),
                security_groups: security_groups.clone(),
                networks: batch.template.options.networks.clone(),
                availability_zone: batch.template.location.zone.clone(),
                boot_volume: batch.template.options.boot_volume,
                disk_config,
            };
            match self.api.create_server(region, &request).await {
                Ok(server_id) => {
                    info!(%region, node = %name, %server_id, "server accepted");
                    submitted.push(Submitted {
                        index,
                        name,
                        server_id,
                        key_pair,
                    });
                }
                Err(err) => {
                    warn!(%region, node = %name, error = %err, "server create failed");
                    outcome.failures.push(NodeFailure {
                        index,
                        name,
                        error: err.into(),
                    });
                }
            }
        }

        let context = BatchContext {
            region,
            group: &batch.group,
            template: &batch.template,
            poll: batch.poll.unwrap_or(self.settings.poll),
            floating_ips,
        };
        let finished = join_all(
            submitted
                .into_iter()
                .map(|server| self.finish_node(&context, server)),
        )
        .await;

        for result in finished {
            match result {
                Ok(node) => outcome.nodes.push(node),
                Err(failure) => {
                    warn!(
                        %region,
                        node = %failure.name,
                        error = %failure.error,
                        "node failed to provision"
                    );
                    outcome.failures.push(failure);
                }
            }
        }
        outcome.nodes.sort_by_key(|node| node.index);
        outcome.failures.sort_by_key(|failure| failure.index);
        info!(
            %region,
            group = %batch.group,
            active = outcome.nodes.len(),
            failed = outcome.failures.len(),
            "batch finished"
        );
        Ok(outcome)
    }

    /// Managed groups are skipped where the region lacks security groups.
    async fn reconcile_security(
        &self,
        region: &Region,
        capabilities: &CapabilitySet,
        batch: &NodeBatchRequest,
    ) -> Result<Vec<String>, ComputeError> {
        let ports = match &batch.security {
            SecuritySpec::None => return Ok(Vec::new()),
            SecuritySpec::Existing(names) => return Ok(names.clone()),
            SecuritySpec::Managed => self.settings.inbound_ports.as_slice(),
            SecuritySpec::ManagedPorts(custom) => custom.as_slice(),
        };
        if !capabilities.contains(Capability::SecurityGroups) {
            warn!(%region, group = %batch.group, "security groups not supported; skipping");
            return Ok(Vec::new());
        }
        let spec = SecurityGroupSpec::for_ports(
            self.reconciler.security_group_name(&batch.group),
            ports,
        );
        let group = self.reconciler.ensure_security_group(region, &spec).await?;
        Ok(vec![group.name])
    }

    /// One keypair per node, all reconciled before any server is created.
    ///
    /// Without the keypairs extension an existing name is passed through
    /// unchecked and anything that would create a keypair is refused.
    async fn reconcile_key_pairs(
        &self,
        region: &Region,
        capabilities: &CapabilitySet,
        batch: &NodeBatchRequest,
    ) -> Result<Vec<Option<ReconciledKeyPair>>, ComputeError> {
        if !capabilities.contains(Capability::Keypairs) {
            let shared = match &batch.key_pair {
                KeyPairSpec::None => None,
                KeyPairSpec::Existing { name, private_key } => {
                    warn!(%region, key_pair = %name, "keypairs not supported; using name unchecked");
                    Some(ReconciledKeyPair {
                        name: name.clone(),
                        private_key: private_key.clone(),
                        fingerprint: None,
                    })
                }
                KeyPairSpec::Generate | KeyPairSpec::Import { .. } => {
                    return Err(ComputeError::Unsupported {
                        feature: "keypairs".to_owned(),
                        region: region.to_string(),
                    });
                }
            };
            return Ok((0..batch.count).map(|_| shared.clone()).collect());
        }
        if !batch.per_node_key_pairs {
            let shared = self
                .reconciler
                .ensure_key_pair(region, &batch.group, &batch.key_pair)
                .await?;
            return Ok((0..batch.count).map(|_| shared.clone()).collect());
        }
        let mut pairs = Vec::new();
        for index in 0..batch.count {
            let node_group = format!("{}-{index}", batch.group);
            pairs.push(
                self.reconciler
                    .ensure_key_pair(region, &node_group, &batch.key_pair)
                    .await?,
            );
        }
        Ok(pairs)
    }

    fn wants_floating_ip(&self, template: &Template) -> bool {
        template
            .options
            .auto_assign_floating_ip
            .unwrap_or(self.settings.auto_allocate_floating_ips)
    }

    async fn finish_node(
        &self,
        context: &BatchContext<'_>,
        server: Submitted,
    ) -> Result<Node, NodeFailure> {
        let Submitted {
            index,
            name,
            server_id,
            key_pair,
        } = server;
        let fail = |error: ComputeError| NodeFailure {
            index,
            name: name.clone(),
            error,
        };

        let record = poll::wait_for_active(
            self.api.as_ref(),
            context.region,
            &name,
            &server_id,
            context.poll,
        )
        .await
        .map_err(fail)?;

        let floating_ip = match &context.floating_ips {
            Some(handle) => {
                let pool = context.template.options.floating_ip_pool.as_deref();
                let address = handle.allocate(pool).await.map_err(fail)?;
                if let Err(err) = handle.associate(&server_id, &address.ip).await {
                    if let Err(release) = handle.release(&address).await {
                        warn!(
                            region = %context.region,
                            ip = %address.ip,
                            error = %release,
                            "failed to release unattached floating ip"
                        );
                    }
                    return Err(fail(err));
                }
                info!(region = %context.region, node = %name, ip = %address.ip, "attached floating ip");
                Some(address.ip)
            }
            None => None,
        };

        let credentials = key_pair
            .as_ref()
            .and_then(|pair| pair.private_key.clone())
            .map(|private_key| LoginCredentials {
                user: self.settings.login_user.clone(),
                private_key,
            });

        Ok(Node {
            id: CompositeId::new(context.region.clone(), record.id),
            group: context.group.to_owned(),
            index,
            status: record.status,
            location: context.template.location.clone(),
            addresses: record.addresses,
            floating_ip,
            key_name: key_pair.map(|pair| pair.name),
            credentials,
            name,
        })
    }
}

/// Caller metadata plus the group tag, which wins on collision.
fn server_metadata(batch: &NodeBatchRequest) -> Metadata {
    let mut metadata = batch.template.options.metadata.clone();
    metadata.insert(GROUP_METADATA_KEY.to_owned(), batch.group.clone());
    metadata
}

#[cfg(test)]
mod tests;
