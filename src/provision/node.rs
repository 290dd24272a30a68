//! Provisioned nodes and batch outcomes.

use std::fmt;

use crate::api::NodeStatus;
use crate::catalog::{CompositeId, Location};
use crate::error::ComputeError;

/// Login details for a node.
#[derive(Clone, Eq, PartialEq)]
pub struct LoginCredentials {
    /// Login user.
    pub user: String,
    /// Private key matching the injected keypair.
    pub private_key: String,
}

impl fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("user", &self.user)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Server that reached the active state.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Node {
    /// Region-qualified server id.
    pub id: CompositeId,
    /// Server name, `{group}-{index}`.
    pub name: String,
    /// Group the node belongs to.
    pub group: String,
    /// Position in the batch.
    pub index: u32,
    /// Status at the end of polling.
    pub status: NodeStatus,
    /// Placement.
    pub location: Location,
    /// Addresses across all networks.
    pub addresses: Vec<String>,
    /// Floating address, when one was attached.
    pub floating_ip: Option<String>,
    /// Injected keypair.
    pub key_name: Option<String>,
    /// Present only when the private key is known.
    pub credentials: Option<LoginCredentials>,
}

/// Server found by listing a region.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NodeSummary {
    /// Region-qualified server id.
    pub id: CompositeId,
    /// Server name.
    pub name: String,
    /// Group tag, absent on servers not created through a batch.
    pub group: Option<String>,
    /// Normalised status.
    pub status: NodeStatus,
    /// Status string as reported by the provider.
    pub provider_status: String,
    /// Addresses across all networks.
    pub addresses: Vec<String>,
}

/// Node that could not be provisioned.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NodeFailure {
    /// Position in the batch.
    pub index: u32,
    /// Server name.
    pub name: String,
    /// Cause.
    pub error: ComputeError,
}

/// Result of a batch: successes and failures, each in request order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BatchOutcome {
    /// Active nodes.
    pub nodes: Vec<Node>,
    /// Per-node failures.
    pub failures: Vec<NodeFailure>,
}
