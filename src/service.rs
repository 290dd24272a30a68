//! Compute service facade wiring the components of one session together.

use std::sync::Arc;

use tracing::{debug, info};

use crate::api::{ComputeApi, Metadata};
use crate::catalog::{CatalogResolver, CompositeId, Template, TemplateCriteria};
use crate::config::ComputeConfig;
use crate::error::ComputeError;
use crate::extensions::{Capability, ExtensionRegistry};
use crate::metadata::MetadataStore;
use crate::nova::NovaClient;
use crate::provision::{BatchOutcome, NodeBatchRequest, NodeProvisioner, NodeSummary};
use crate::reconcile::{KeyPairSpec, ResourceReconciler};
use crate::session::Session;
use crate::types::Region;

/// Entry point for orchestrating compute resources across regions.
#[derive(Clone)]
pub struct ComputeService {
    api: Arc<dyn ComputeApi>,
    regions: Vec<Region>,
    config: ComputeConfig,
    registry: Arc<ExtensionRegistry>,
    catalog: Arc<CatalogResolver>,
    reconciler: ResourceReconciler,
    provisioner: NodeProvisioner,
    metadata: MetadataStore,
}

impl std::fmt::Debug for ComputeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputeService")
            .field("regions", &self.regions)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ComputeService {
    /// Connects to every region of `session` over HTTP.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::Config`] when `config` is invalid and provider
    /// errors from listing extensions.
    pub async fn connect(session: Session, config: ComputeConfig) -> Result<Self, ComputeError> {
        let regions = session.regions().to_vec();
        let client = NovaClient::new(session, config.http_timeout())?;
        Self::with_api(Arc::new(client), regions, config).await
    }

    /// Builds the service over any [`ComputeApi`] implementation.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::Config`] when `config` is invalid or `regions`
    /// is empty, and provider errors from listing extensions.
    pub async fn with_api(
        api: Arc<dyn ComputeApi>,
        regions: Vec<Region>,
        config: ComputeConfig,
    ) -> Result<Self, ComputeError> {
        config.validate()?;
        if regions.is_empty() {
            return Err(ComputeError::Config("no regions configured".to_owned()));
        }

        let registry = Arc::new(ExtensionRegistry::build(Arc::clone(&api), &regions).await?);
        let catalog = Arc::new(CatalogResolver::new(
            Arc::clone(&api),
            Arc::clone(&registry),
            regions.clone(),
        ));
        let reconciler = ResourceReconciler::new(Arc::clone(&api), config.resource_prefix.clone())
            .with_settle_delay(config.settle_delay());
        let provisioner = NodeProvisioner::new(
            Arc::clone(&api),
            Arc::clone(&registry),
            reconciler.clone(),
            config.provision_settings(),
        );
        let metadata = MetadataStore::new(Arc::clone(&api), regions.clone());
        info!(regions = ?regions, "compute service ready");

        Ok(Self {
            api,
            regions,
            config,
            registry,
            catalog,
            reconciler,
            provisioner,
            metadata,
        })
    }

    /// Regions of the session.
    #[must_use]
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Extension registry.
    #[must_use]
    pub fn extensions(&self) -> &ExtensionRegistry {
        &self.registry
    }

    /// Catalog resolver.
    #[must_use]
    pub fn catalog(&self) -> &CatalogResolver {
        &self.catalog
    }

    /// Resource reconciler.
    #[must_use]
    pub const fn reconciler(&self) -> &ResourceReconciler {
        &self.reconciler
    }

    /// Node provisioner.
    #[must_use]
    pub const fn provisioner(&self) -> &NodeProvisioner {
        &self.provisioner
    }

    /// Metadata store.
    #[must_use]
    pub const fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    /// Resolves the configured default criteria.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::Config`] when the criteria do not parse and
    /// resolution errors otherwise.
    pub async fn default_template(&self) -> Result<Template, ComputeError> {
        let criteria = self.config.template_criteria()?;
        self.catalog.build_template(&criteria).await
    }

    /// Batch request with the configured keypair default applied.
    #[must_use]
    pub fn batch(&self, group: &str, count: u32, template: Template) -> NodeBatchRequest {
        let mut request = NodeBatchRequest::new(group, count, template);
        if self.config.auto_generate_keypairs {
            request.key_pair = KeyPairSpec::Generate;
        }
        request
    }

    /// Resolves `criteria` (or the default template) and creates `count`
    /// nodes in `group`.
    ///
    /// # Errors
    ///
    /// See [`CatalogResolver::build_template`] and
    /// [`NodeProvisioner::create_nodes`].
    pub async fn create_nodes_in_group(
        &self,
        group: &str,
        count: u32,
        criteria: Option<&TemplateCriteria>,
    ) -> Result<BatchOutcome, ComputeError> {
        let template = match criteria {
            Some(given) => self.catalog.build_template(given).await?,
            None => self.default_template().await?,
        };
        let request = self.batch(group, count, template);
        self.provisioner.create_nodes(&request).await
    }

    /// Servers across every configured region, narrowed to `group` when
    /// given.
    ///
    /// # Errors
    ///
    /// Returns the first provider error met while listing a region.
    pub async fn list_nodes(&self, group: Option<&str>) -> Result<Vec<NodeSummary>, ComputeError> {
        let mut nodes = Vec::new();
        for region in &self.regions {
            nodes.extend(self.provisioner.list_nodes(region, group).await?);
        }
        Ok(nodes)
    }

    /// Diagnostics of a server, or `None` where the provider offers none.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::RegionNotConfigured`] for unknown regions and
    /// provider errors.
    pub async fn server_diagnostics(
        &self,
        server: &CompositeId,
    ) -> Result<Option<Metadata>, ComputeError> {
        if !self
            .registry
            .capabilities(&server.region)?
            .contains(Capability::ServerDiagnostics)
        {
            debug!(region = %server.region, "server diagnostics not advertised");
            return Ok(None);
        }
        Ok(self
            .api
            .get_server_diagnostics(&server.region, &server.id)
            .await?)
    }
}
