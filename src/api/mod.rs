//! Remote compute boundary.
//!
//! [`ComputeApi`] has one method per remote call the orchestration layer
//! makes. Lookups return `Ok(None)` when the provider reports the resource as
//! absent so callers can implement create-if-absent semantics without
//! inspecting status codes. [`crate::nova::NovaClient`] implements the trait
//! over HTTP; [`crate::test_support::FakeCompute`] implements it in memory.

mod types;

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::types::Region;

pub use types::{
    AvailabilityZone, BootVolume, CreateServer, DiskConfig, Extension, FlavorRecord, FloatingIp,
    ImageRecord, IpProtocol, KeyPair, Metadata, NodeStatus, ResourceKind, SecurityGroup,
    SecurityGroupRule, ServerRecord,
};

/// Future returned by remote compute operations.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send + 'a>>;

/// Errors raised by the remote boundary.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ApiError {
    /// Raised when the credential supplier has no valid token for the region.
    #[error("authentication expired for region {region}")]
    AuthExpired {
        /// Region whose token expired.
        region: String,
    },
    /// Raised when no endpoint is known for the region.
    #[error("no compute endpoint for region {region}")]
    RegionNotConfigured {
        /// Region requested.
        region: String,
    },
    /// Raised when a create collides with an existing resource.
    #[error("conflict: {message}")]
    Conflict {
        /// Provider message.
        message: String,
    },
    /// Raised for any other unsuccessful status.
    #[error("unexpected status {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body.
        message: String,
    },
    /// Raised when the request could not be sent or the body not read.
    #[error("transport error: {message}")]
    Transport {
        /// Underlying error message.
        message: String,
    },
    /// Raised when a response body does not match the expected shape.
    #[error("failed to decode response: {message}")]
    Decode {
        /// Parser message.
        message: String,
    },
}

/// Remote operations against a region-scoped compute service.
pub trait ComputeApi: Send + Sync {
    /// Lists the extensions advertised by the region.
    fn list_extensions<'a>(&'a self, region: &'a Region) -> ApiFuture<'a, Vec<Extension>>;

    /// Lists images with details.
    fn list_images<'a>(&'a self, region: &'a Region) -> ApiFuture<'a, Vec<ImageRecord>>;

    /// Lists flavors with details.
    fn list_flavors<'a>(&'a self, region: &'a Region) -> ApiFuture<'a, Vec<FlavorRecord>>;

    /// Lists availability zones.
    fn list_availability_zones<'a>(
        &'a self,
        region: &'a Region,
    ) -> ApiFuture<'a, Vec<AvailabilityZone>>;

    /// Lists security groups; an absent collection yields an empty list.
    fn list_security_groups<'a>(&'a self, region: &'a Region)
    -> ApiFuture<'a, Vec<SecurityGroup>>;

    /// Fetches a security group by identifier.
    fn get_security_group<'a>(
        &'a self,
        region: &'a Region,
        id: &'a str,
    ) -> ApiFuture<'a, Option<SecurityGroup>>;

    /// Creates a security group without rules.
    fn create_security_group<'a>(
        &'a self,
        region: &'a Region,
        name: &'a str,
        description: &'a str,
    ) -> ApiFuture<'a, SecurityGroup>;

    /// Adds an ingress rule to a security group.
    fn create_security_group_rule<'a>(
        &'a self,
        region: &'a Region,
        group_id: &'a str,
        rule: &'a SecurityGroupRule,
    ) -> ApiFuture<'a, ()>;

    /// Fetches a keypair by name.
    fn get_key_pair<'a>(&'a self, region: &'a Region, name: &'a str)
    -> ApiFuture<'a, Option<KeyPair>>;

    /// Creates a keypair, importing `public_key` when given and generating a
    /// new pair otherwise.
    fn create_key_pair<'a>(
        &'a self,
        region: &'a Region,
        name: &'a str,
        public_key: Option<&'a str>,
    ) -> ApiFuture<'a, KeyPair>;

    /// Submits a create-server request and returns the new server id.
    fn create_server<'a>(
        &'a self,
        region: &'a Region,
        request: &'a CreateServer,
    ) -> ApiFuture<'a, String>;

    /// Lists every server visible in the region, with detail.
    fn list_servers<'a>(&'a self, region: &'a Region) -> ApiFuture<'a, Vec<ServerRecord>>;

    /// Fetches server detail.
    fn get_server<'a>(
        &'a self,
        region: &'a Region,
        id: &'a str,
    ) -> ApiFuture<'a, Option<ServerRecord>>;

    /// Fetches server diagnostics; `None` when unavailable for the server.
    fn get_server_diagnostics<'a>(
        &'a self,
        region: &'a Region,
        id: &'a str,
    ) -> ApiFuture<'a, Option<Metadata>>;

    /// Allocates a floating IP, optionally from a named pool.
    fn allocate_floating_ip<'a>(
        &'a self,
        region: &'a Region,
        pool: Option<&'a str>,
    ) -> ApiFuture<'a, FloatingIp>;

    /// Associates a floating IP with a server.
    fn add_floating_ip<'a>(
        &'a self,
        region: &'a Region,
        server_id: &'a str,
        address: &'a str,
    ) -> ApiFuture<'a, ()>;

    /// Returns an allocated floating IP to its pool; releasing an address
    /// the provider no longer knows succeeds.
    fn release_floating_ip<'a>(&'a self, region: &'a Region, id: &'a str) -> ApiFuture<'a, ()>;

    /// Reads all metadata of a resource.
    fn get_metadata<'a>(
        &'a self,
        region: &'a Region,
        kind: ResourceKind,
        id: &'a str,
    ) -> ApiFuture<'a, Metadata>;

    /// Replaces all metadata of a resource.
    fn replace_metadata<'a>(
        &'a self,
        region: &'a Region,
        kind: ResourceKind,
        id: &'a str,
        metadata: &'a Metadata,
    ) -> ApiFuture<'a, Metadata>;

    /// Merges metadata into a resource.
    fn merge_metadata<'a>(
        &'a self,
        region: &'a Region,
        kind: ResourceKind,
        id: &'a str,
        metadata: &'a Metadata,
    ) -> ApiFuture<'a, Metadata>;

    /// Reads a single metadata item.
    fn get_metadata_item<'a>(
        &'a self,
        region: &'a Region,
        kind: ResourceKind,
        id: &'a str,
        key: &'a str,
    ) -> ApiFuture<'a, Option<String>>;

    /// Sets a single metadata item.
    fn put_metadata_item<'a>(
        &'a self,
        region: &'a Region,
        kind: ResourceKind,
        id: &'a str,
        key: &'a str,
        value: &'a str,
    ) -> ApiFuture<'a, ()>;

    /// Deletes a single metadata item; returns `false` when it was absent.
    fn delete_metadata_item<'a>(
        &'a self,
        region: &'a Region,
        kind: ResourceKind,
        id: &'a str,
        key: &'a str,
    ) -> ApiFuture<'a, bool>;
}
