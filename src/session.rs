//! Authenticated session: region endpoints and the credential supplier.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

use crate::api::ApiError;
use crate::error::ComputeError;
use crate::types::Region;

/// Service type of compute entries in the provider's service catalog.
pub const COMPUTE_SERVICE_TYPE: &str = "compute";

/// Supplies authentication tokens per region.
///
/// Token acquisition and renewal happen outside this crate; the supplier
/// only answers with a currently valid token or reports that it expired.
pub trait TokenSupplier: Send + Sync {
    /// Returns a valid token for `region`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::AuthExpired`] when no valid token is available.
    fn token(&self, region: &Region) -> Result<String, ApiError>;
}

/// Token shared by all regions, optionally with an expiry instant.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StaticToken {
    value: String,
    expires_at: Option<SystemTime>,
}

impl StaticToken {
    /// Token that never expires.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            expires_at: None,
        }
    }

    /// Token that expires at `expires_at`.
    #[must_use]
    pub fn expiring(value: impl Into<String>, expires_at: SystemTime) -> Self {
        Self {
            value: value.into(),
            expires_at: Some(expires_at),
        }
    }
}

impl TokenSupplier for StaticToken {
    fn token(&self, region: &Region) -> Result<String, ApiError> {
        if self
            .expires_at
            .is_some_and(|expiry| SystemTime::now() >= expiry)
        {
            return Err(ApiError::AuthExpired {
                region: region.to_string(),
            });
        }
        Ok(self.value.clone())
    }
}

/// Entry of the provider's service catalog.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CatalogEntry {
    /// Service type (for example `compute`).
    pub service_type: String,
    /// Region served by the endpoint.
    pub region: Region,
    /// Public endpoint URL.
    pub url: String,
}

impl CatalogEntry {
    /// Compute endpoint for `region`.
    #[must_use]
    pub fn compute(region: impl Into<Region>, url: impl Into<String>) -> Self {
        Self {
            service_type: COMPUTE_SERVICE_TYPE.to_owned(),
            region: region.into(),
            url: url.into(),
        }
    }
}

/// Regions and endpoints resolved at session start.
///
/// The region set is immutable for the lifetime of the session.
#[derive(Clone)]
pub struct Session {
    endpoints: BTreeMap<Region, String>,
    regions: Vec<Region>,
    tokens: Arc<dyn TokenSupplier>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("regions", &self.regions)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Builds a session from the compute entries of a service catalog.
    ///
    /// When `allowed` is non-empty only those regions are kept, in the given
    /// order; otherwise regions keep catalog order.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::RegionNotConfigured`] when an allowed region
    /// has no compute endpoint, and [`ComputeError::Config`] when the catalog
    /// has no compute endpoints at all.
    pub fn from_catalog(
        entries: &[CatalogEntry],
        allowed: &[Region],
        tokens: Arc<dyn TokenSupplier>,
    ) -> Result<Self, ComputeError> {
        let mut endpoints = BTreeMap::new();
        let mut catalog_order = Vec::new();
        for entry in entries
            .iter()
            .filter(|entry| entry.service_type == COMPUTE_SERVICE_TYPE)
        {
            if endpoints
                .insert(entry.region.clone(), entry.url.clone())
                .is_none()
            {
                catalog_order.push(entry.region.clone());
            }
        }

        if endpoints.is_empty() {
            return Err(ComputeError::Config(
                "service catalog has no compute endpoints".to_owned(),
            ));
        }

        let regions = if allowed.is_empty() {
            catalog_order
        } else {
            if let Some(missing) = allowed.iter().find(|r| !endpoints.contains_key(*r)) {
                return Err(ComputeError::RegionNotConfigured {
                    region: missing.to_string(),
                });
            }
            endpoints.retain(|region, _| allowed.contains(region));
            allowed.to_vec()
        };

        Ok(Self {
            endpoints,
            regions,
            tokens,
        })
    }

    /// Regions available in this session.
    #[must_use]
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Whether `region` belongs to this session.
    #[must_use]
    pub fn contains(&self, region: &Region) -> bool {
        self.endpoints.contains_key(region)
    }

    /// Compute endpoint of `region`.
    #[must_use]
    pub fn endpoint(&self, region: &Region) -> Option<&str> {
        self.endpoints.get(region).map(String::as_str)
    }

    /// Current token for `region`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::AuthExpired`] when the supplier has no valid token.
    pub fn token(&self, region: &Region) -> Result<String, ApiError> {
        self.tokens.token(region)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn entries() -> Vec<CatalogEntry> {
        vec![
            CatalogEntry::compute("region-b", "https://b.example/v2/t"),
            CatalogEntry {
                service_type: "image".to_owned(),
                region: Region::from("region-a"),
                url: "https://glance.example".to_owned(),
            },
            CatalogEntry::compute("region-a", "https://a.example/v2/t"),
        ]
    }

    #[test]
    fn keeps_catalog_order_without_allow_list() {
        let session = Session::from_catalog(&entries(), &[], Arc::new(StaticToken::new("t")))
            .expect("session builds");
        assert_eq!(
            session.regions(),
            &[Region::from("region-b"), Region::from("region-a")]
        );
        assert_eq!(
            session.endpoint(&Region::from("region-a")),
            Some("https://a.example/v2/t")
        );
    }

    #[test]
    fn allow_list_narrows_regions() {
        let session = Session::from_catalog(
            &entries(),
            &[Region::from("region-a")],
            Arc::new(StaticToken::new("t")),
        )
        .expect("session builds");
        assert_eq!(session.regions(), &[Region::from("region-a")]);
        assert!(!session.contains(&Region::from("region-b")));
    }

    #[test]
    fn allow_list_rejects_unknown_region() {
        let err = Session::from_catalog(
            &entries(),
            &[Region::from("region-z")],
            Arc::new(StaticToken::new("t")),
        )
        .expect_err("unknown region should fail");
        assert_eq!(
            err,
            ComputeError::RegionNotConfigured {
                region: "region-z".to_owned()
            }
        );
    }

    #[test]
    fn expired_token_reports_auth_expired() {
        let token = StaticToken::expiring("t", SystemTime::now() - Duration::from_secs(1));
        let err = token
            .token(&Region::from("region-a"))
            .expect_err("expired token");
        assert!(matches!(err, ApiError::AuthExpired { .. }));
    }
}
