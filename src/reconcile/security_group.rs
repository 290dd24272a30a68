//! Security group reconciliation.

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::api::{ApiError, SecurityGroup, SecurityGroupRule};
use crate::error::ComputeError;
use crate::types::Region;

use super::ResourceReconciler;

const ANY_SOURCE: &str = "0.0.0.0/0";

/// Desired shape of a security group.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SecurityGroupSpec {
    /// Group name.
    pub name: String,
    /// Description used when the group is created; defaults to the name.
    pub description: Option<String>,
    /// Ingress rules the group must contain.
    pub rules: Vec<SecurityGroupRule>,
}

impl SecurityGroupSpec {
    /// Group opening each TCP port in `ports` to any source.
    #[must_use]
    pub fn for_ports(name: impl Into<String>, ports: &[u16]) -> Self {
        Self {
            name: name.into(),
            description: None,
            rules: ports
                .iter()
                .map(|port| SecurityGroupRule::tcp(*port, ANY_SOURCE))
                .collect(),
        }
    }
}

impl ResourceReconciler {
    async fn find_security_group(
        &self,
        region: &Region,
        name: &str,
    ) -> Result<Option<SecurityGroup>, ComputeError> {
        let groups = self.api.list_security_groups(region).await?;
        let Some(summary) = groups.into_iter().find(|group| group.name == name) else {
            return Ok(None);
        };
        // Listings may omit rules; the detail call is authoritative.
        let detail = self.api.get_security_group(region, &summary.id).await?;
        Ok(Some(detail.unwrap_or(summary)))
    }

    async fn create_security_group(
        &self,
        region: &Region,
        spec: &SecurityGroupSpec,
    ) -> Result<SecurityGroup, ComputeError> {
        let description = spec.description.as_deref().unwrap_or(&spec.name);
        match self
            .api
            .create_security_group(region, &spec.name, description)
            .await
        {
            Ok(group) => {
                info!(%region, group = %spec.name, id = %group.id, "created security group");
                Ok(group)
            }
            Err(ApiError::Conflict { message }) => {
                warn!(
                    %region,
                    group = %spec.name,
                    detail = %message,
                    "security group create conflicted; re-reading"
                );
                sleep(self.settle_delay).await;
                self.find_security_group(region, &spec.name)
                    .await?
                    .ok_or_else(|| ComputeError::ResourceConflict {
                        resource: "security group".to_owned(),
                        name: spec.name.clone(),
                        region: region.to_string(),
                    })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Returns the named group, creating it and adding missing rules.
    ///
    /// Existing rules are left in place; only rules absent from the group are
    /// added, each at most once.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::ResourceConflict`] when a create conflicts and
    /// the group still cannot be read after the settle delay, and provider
    /// errors otherwise.
    pub async fn ensure_security_group(
        &self,
        region: &Region,
        spec: &SecurityGroupSpec,
    ) -> Result<SecurityGroup, ComputeError> {
        let mut group = match self.find_security_group(region, &spec.name).await? {
            Some(existing) => {
                debug!(%region, group = %spec.name, "security group already present");
                existing
            }
            None => self.create_security_group(region, spec).await?,
        };

        for rule in &spec.rules {
            if group.rules.contains(rule) {
                continue;
            }
            match self
                .api
                .create_security_group_rule(region, &group.id, rule)
                .await
            {
                Ok(()) | Err(ApiError::Conflict { .. }) => group.rules.push(rule.clone()),
                Err(err) => return Err(err.into()),
            }
            debug!(
                %region,
                group = %spec.name,
                protocol = rule.protocol.as_str(),
                from = rule.from_port,
                to = rule.to_port,
                "authorised ingress rule"
            );
        }
        Ok(group)
    }
}
