//! Batch requests and provisioner settings.

use crate::catalog::Template;
use crate::error::ComputeError;
use crate::reconcile::KeyPairSpec;

use super::PollConfig;

/// Security groups attached to every server of a batch.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum SecuritySpec {
    /// Reconcile `{prefix}-{group}` with the configured inbound ports.
    #[default]
    Managed,
    /// Reconcile `{prefix}-{group}` opening these TCP ports instead.
    ManagedPorts(Vec<u16>),
    /// Attach these existing groups untouched.
    Existing(Vec<String>),
    /// Attach no group.
    None,
}

/// Request to create `count` servers in `group` from one template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeBatchRequest {
    /// Group tag and name stem.
    pub group: String,
    /// Number of servers.
    pub count: u32,
    /// Resolved template shared by the batch.
    pub template: Template,
    /// Security groups to attach.
    pub security: SecuritySpec,
    /// Keypair to inject.
    pub key_pair: KeyPairSpec,
    /// Reconcile a separate keypair for every node.
    pub per_node_key_pairs: bool,
    /// Poll settings; `None` uses the provisioner default.
    pub poll: Option<PollConfig>,
}

impl NodeBatchRequest {
    /// Batch with a managed security group and no keypair.
    #[must_use]
    pub fn new(group: impl Into<String>, count: u32, template: Template) -> Self {
        Self {
            group: group.into(),
            count,
            template,
            security: SecuritySpec::default(),
            key_pair: KeyPairSpec::default(),
            per_node_key_pairs: false,
            poll: None,
        }
    }

    /// Checks the request before anything is sent.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::Validation`] for an empty or whitespace-bearing
    /// group or a zero count, and [`ComputeError::TemplateResolution`] when the
    /// template spans regions.
    pub fn validate(&self) -> Result<(), ComputeError> {
        if self.group.is_empty() {
            return Err(ComputeError::Validation("group must not be empty".to_owned()));
        }
        if self.group.chars().any(char::is_whitespace) {
            return Err(ComputeError::Validation(format!(
                "group '{}' must not contain whitespace",
                self.group
            )));
        }
        if self.count == 0 {
            return Err(ComputeError::Validation(
                "count must be at least 1".to_owned(),
            ));
        }
        self.template.check_region()?;
        Ok(())
    }
}

/// Defaults applied by [`super::NodeProvisioner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProvisionSettings {
    /// Ports opened by managed security groups.
    pub inbound_ports: Vec<u16>,
    /// User named in login credentials.
    pub login_user: String,
    /// Attach floating IPs when the template does not say.
    pub auto_allocate_floating_ips: bool,
    /// Poll settings for batches that carry none.
    pub poll: PollConfig,
}

impl Default for ProvisionSettings {
    fn default() -> Self {
        Self {
            inbound_ports: vec![22],
            login_user: "root".to_owned(),
            auto_allocate_floating_ips: false,
            poll: PollConfig::default(),
        }
    }
}
