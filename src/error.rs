//! Error taxonomy for compute orchestration.

use thiserror::Error;

use crate::api::ApiError;
use crate::config::ConfigError;

/// Errors raised while resolving a template from catalog criteria.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum TemplateResolutionError {
    /// Raised when an explicitly requested image does not exist.
    #[error("image {id} not found")]
    ImageNotFound {
        /// Composite image identifier requested by the caller.
        id: String,
    },
    /// Raised when an explicitly requested hardware profile does not exist.
    #[error("hardware {id} not found")]
    HardwareNotFound {
        /// Composite hardware identifier requested by the caller.
        id: String,
    },
    /// Raised when an explicitly requested location does not exist.
    #[error("location {id} not found")]
    LocationNotFound {
        /// Location identifier requested by the caller.
        id: String,
    },
    /// Raised when no active image satisfies the criteria.
    #[error("no image in region {region} matches {criteria}")]
    NoMatchingImage {
        /// Region searched.
        region: String,
        /// Rendered criteria used for the search.
        criteria: String,
    },
    /// Raised when no hardware profile satisfies the minimums.
    #[error("no hardware in region {region} matches {criteria}")]
    NoMatchingHardware {
        /// Region searched.
        region: String,
        /// Rendered criteria used for the search.
        criteria: String,
    },
    /// Raised when the template components span more than one region.
    #[error("template spans regions: image {image}, hardware {hardware}, location {location}")]
    RegionMismatch {
        /// Region of the image.
        image: String,
        /// Region of the hardware profile.
        hardware: String,
        /// Region of the location.
        location: String,
    },
    /// Raised when the OS version pattern is not a valid regular expression.
    #[error("invalid OS version pattern '{pattern}': {message}")]
    InvalidVersionPattern {
        /// Pattern supplied by the caller.
        pattern: String,
        /// Parser message.
        message: String,
    },
    /// Raised when textual criteria cannot be parsed.
    #[error("invalid template criteria: {0}")]
    InvalidCriteria(String),
}

/// Errors raised by compute orchestration operations.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ComputeError {
    /// Raised when the configuration is incomplete.
    #[error("configuration error: {0}")]
    Config(String),
    /// Raised when a request is missing a required field.
    #[error("invalid request: {0}")]
    Validation(String),
    /// Raised when an operation names a region absent from the session.
    #[error("region {region} is not configured")]
    RegionNotConfigured {
        /// Region requested by the caller.
        region: String,
    },
    /// Raised when no template satisfies the requested criteria.
    #[error("template resolution failed: {0}")]
    TemplateResolution(#[from] TemplateResolutionError),
    /// Raised when a caller-named keypair does not exist.
    #[error("keypair {name} not found in region {region}")]
    KeyPairNotFound {
        /// Keypair name supplied by the caller.
        name: String,
        /// Region searched.
        region: String,
    },
    /// Raised when a request needs an extension the region does not offer.
    #[error("region {region} does not support {feature}")]
    Unsupported {
        /// Missing feature (for example `keypairs`).
        feature: String,
        /// Region lacking the feature.
        region: String,
    },
    /// Raised when a create collided with a same-named resource that could
    /// not be fetched afterwards.
    #[error("{resource} {name} in region {region} conflicts with an existing resource")]
    ResourceConflict {
        /// Kind of resource (for example `security group`).
        resource: String,
        /// Resource name.
        name: String,
        /// Region of the resource.
        region: String,
    },
    /// Raised when a server does not become active before the deadline.
    #[error("timeout waiting for node {node} (server {server_id}) to become active")]
    ProvisioningTimeout {
        /// Node name.
        node: String,
        /// Provider server identifier.
        server_id: String,
    },
    /// Raised when a server reaches a terminal failure state.
    #[error("server {server_id} entered state {status}")]
    RemoteStatus {
        /// Provider server identifier.
        server_id: String,
        /// Status reported by the provider.
        status: String,
    },
    /// Raised when the credential for a region is no longer valid.
    #[error("authentication expired for region {region}")]
    AuthExpired {
        /// Region whose credential expired.
        region: String,
    },
    /// Wrapper for other provider level failures.
    #[error("provider error: {message}")]
    Provider {
        /// Message returned by the provider.
        message: String,
    },
}

impl From<ApiError> for ComputeError {
    fn from(value: ApiError) -> Self {
        match value {
            ApiError::AuthExpired { region } => Self::AuthExpired { region },
            ApiError::RegionNotConfigured { region } => Self::RegionNotConfigured { region },
            other => Self::Provider {
                message: other.to_string(),
            },
        }
    }
}

impl From<ConfigError> for ComputeError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value.to_string())
    }
}
