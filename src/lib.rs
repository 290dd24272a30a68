//! Core library for the Cumulus compute orchestration client.
//!
//! The crate talks to an OpenStack Nova style compute API in one or more
//! regions. It discovers which extensions each region advertises, resolves
//! image/hardware/location templates from region catalogs, reconciles the
//! security groups and keypairs servers depend on, and provisions batches of
//! servers (submit → poll until active → attach credentials).

pub mod api;
pub mod catalog;
pub mod config;
pub mod error;
pub mod extensions;
pub mod metadata;
pub mod nova;
pub mod provision;
pub mod reconcile;
pub mod service;
pub mod session;
pub mod test_support;
pub mod types;

pub use api::{ApiError, ComputeApi, Metadata, NodeStatus, ResourceKind};
pub use catalog::{
    CatalogResolver, CompositeId, Hardware, Image, Location, OsFamily, ServerOptions, Template,
    TemplateCriteria, TemplateOverrides,
};
pub use config::{ComputeConfig, ConfigError};
pub use error::{ComputeError, TemplateResolutionError};
pub use extensions::{Capability, CapabilitySet, ExtensionRegistry, FloatingIpHandle};
pub use metadata::{MetadataStore, ResourceRef};
pub use nova::NovaClient;
pub use provision::{
    BatchOutcome, LoginCredentials, Node, NodeBatchRequest, NodeFailure, NodeProvisioner,
    NodeSummary, PollConfig, ProvisionSettings, SecuritySpec,
};
pub use reconcile::{KeyPairSpec, ReconciledKeyPair, ResourceReconciler, SecurityGroupSpec};
pub use service::ComputeService;
pub use session::{CatalogEntry, Session, StaticToken, TokenSupplier};
pub use types::{ProviderId, Region};
