//! Idempotent create-if-absent reconciliation of security groups and
//! keypairs.
//!
//! Concurrent clients may race to create the same group. A create that
//! reports a conflict is resolved by re-reading the named resource once after
//! a short settle delay instead of failing the whole batch.

mod key_pair;
mod security_group;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::api::ComputeApi;

pub use key_pair::{KeyPairSpec, ReconciledKeyPair};
pub use security_group::SecurityGroupSpec;

/// Delay before re-reading a resource whose create reported a conflict.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Ensures security groups and keypairs exist before servers reference them.
#[derive(Clone)]
pub struct ResourceReconciler {
    api: Arc<dyn ComputeApi>,
    settle_delay: Duration,
    prefix: String,
    key_pair_sequences: Arc<Mutex<BTreeMap<String, u32>>>,
}

impl std::fmt::Debug for ResourceReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceReconciler")
            .field("settle_delay", &self.settle_delay)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl ResourceReconciler {
    /// Creates a reconciler naming managed resources with `prefix`.
    #[must_use]
    pub fn new(api: Arc<dyn ComputeApi>, prefix: impl Into<String>) -> Self {
        Self {
            api,
            settle_delay: DEFAULT_SETTLE_DELAY,
            prefix: prefix.into(),
            key_pair_sequences: Arc::default(),
        }
    }

    /// Overrides the conflict settle delay.
    #[must_use]
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Name of the managed security group for `group`.
    #[must_use]
    pub fn security_group_name(&self, group: &str) -> String {
        format!("{}-{group}", self.prefix)
    }
}
