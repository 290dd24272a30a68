//! Keypair reconciliation.

use std::sync::PoisonError;

use tracing::{debug, info};

use crate::api::ApiError;
use crate::error::ComputeError;
use crate::types::Region;

use super::ResourceReconciler;

/// How a batch obtains its keypair.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum KeyPairSpec {
    /// Servers are created without a keypair.
    #[default]
    None,
    /// Use a keypair that must already exist.
    Existing {
        /// Keypair name.
        name: String,
        /// Private key held by the caller, used for login credentials.
        private_key: Option<String>,
    },
    /// Ask the provider to generate a fresh keypair.
    Generate,
    /// Upload the caller's public key under a generated name.
    Import {
        /// OpenSSH public key.
        public_key: String,
    },
}

/// Keypair ready to be referenced by servers.
#[derive(Clone, Eq, PartialEq)]
pub struct ReconciledKeyPair {
    /// Keypair name.
    pub name: String,
    /// Private key, known only when generated here or supplied by the caller.
    pub private_key: Option<String>,
    /// Fingerprint reported by the provider.
    pub fingerprint: Option<String>,
}

impl std::fmt::Debug for ReconciledKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciledKeyPair")
            .field("name", &self.name)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

/// Names tried for one generated keypair before giving up.
const MAX_NAME_ATTEMPTS: u32 = 32;

impl ResourceReconciler {
    /// Generated keypair name: `{prefix}-{group}-{sequence}`.
    #[must_use]
    pub fn key_pair_name(&self, group: &str, sequence: u32) -> String {
        format!("{}-{group}-{sequence}", self.prefix)
    }

    /// Next unused sequence number for `group`, starting at zero.
    fn next_sequence(&self, group: &str) -> u32 {
        let mut sequences = self
            .key_pair_sequences
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let next = sequences.entry(group.to_owned()).or_default();
        let current = *next;
        *next = current.saturating_add(1);
        current
    }

    /// Resolves `spec` to a keypair in `region`.
    ///
    /// Returns `Ok(None)` for [`KeyPairSpec::None`].
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::KeyPairNotFound`] when an existing keypair is
    /// named but absent, and provider errors otherwise.
    pub async fn ensure_key_pair(
        &self,
        region: &Region,
        group: &str,
        spec: &KeyPairSpec,
    ) -> Result<Option<ReconciledKeyPair>, ComputeError> {
        match spec {
            KeyPairSpec::None => Ok(None),
            KeyPairSpec::Existing { name, private_key } => {
                let found = self.api.get_key_pair(region, name).await?.ok_or_else(|| {
                    ComputeError::KeyPairNotFound {
                        name: name.clone(),
                        region: region.to_string(),
                    }
                })?;
                Ok(Some(ReconciledKeyPair {
                    name: found.name,
                    private_key: private_key.clone(),
                    fingerprint: found.fingerprint,
                }))
            }
            KeyPairSpec::Generate => self.create_key_pair(region, group, None).await.map(Some),
            KeyPairSpec::Import { public_key } => self
                .create_key_pair(region, group, Some(public_key))
                .await
                .map(Some),
        }
    }

    /// Creates `{prefix}-{group}-{n}`, moving to the next `n` while the
    /// provider reports the name as taken.
    async fn create_key_pair(
        &self,
        region: &Region,
        group: &str,
        public_key: Option<&str>,
    ) -> Result<ReconciledKeyPair, ComputeError> {
        for _ in 0..MAX_NAME_ATTEMPTS {
            let name = self.key_pair_name(group, self.next_sequence(group));
            match self.api.create_key_pair(region, &name, public_key).await {
                Ok(created) => {
                    info!(
                        %region,
                        key_pair = %created.name,
                        imported = public_key.is_some(),
                        "created keypair"
                    );
                    return Ok(ReconciledKeyPair {
                        name: created.name,
                        private_key: created.private_key,
                        fingerprint: created.fingerprint,
                    });
                }
                Err(ApiError::Conflict { .. }) => {
                    debug!(%region, key_pair = %name, "keypair name taken");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(ComputeError::ResourceConflict {
            resource: "keypair".to_owned(),
            name: format!("{}-{group}-*", self.prefix),
            region: region.to_string(),
        })
    }
}
