//! Nova v2 HTTP binding of the remote compute boundary.
//!
//! Each call is a single request authenticated with the region's token in
//! the `X-Auth-Token` header. Retries and backoff are left to the caller.

mod wire;

use std::time::Duration;

use reqwest::{Method, RequestBuilder, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::api::{
    ApiError, ApiFuture, AvailabilityZone, ComputeApi, CreateServer, Extension, FlavorRecord,
    FloatingIp, ImageRecord, KeyPair, Metadata, ResourceKind, SecurityGroup, SecurityGroupRule,
    ServerRecord,
};
use crate::session::Session;
use crate::types::Region;

/// Compute API client for an authenticated session.
#[derive(Clone, Debug)]
pub struct NovaClient {
    http: reqwest::Client,
    session: Session,
}

struct RawResponse {
    status: u16,
    body: Vec<u8>,
}

impl RawResponse {
    const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    fn into_success(self, region: &Region) -> Result<Self, ApiError> {
        if self.is_success() {
            return Ok(self);
        }
        Err(classify(
            region,
            self.status,
            &String::from_utf8_lossy(&self.body),
        ))
    }

    fn decode<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_slice(&self.body).map_err(|err| ApiError::Decode {
            message: err.to_string(),
        })
    }
}

/// Maps an unsuccessful status to an [`ApiError`].
///
/// 401 means the token expired. 409, and 400 responses whose body says the
/// resource already exists, are conflicts.
pub(crate) fn classify(region: &Region, status: u16, body: &str) -> ApiError {
    match status {
        401 => ApiError::AuthExpired {
            region: region.to_string(),
        },
        409 => ApiError::Conflict {
            message: body.to_owned(),
        },
        400 if body.to_ascii_lowercase().contains("already exists") => ApiError::Conflict {
            message: body.to_owned(),
        },
        _ => ApiError::Status {
            status,
            message: body.to_owned(),
        },
    }
}

fn transport(err: &reqwest::Error) -> ApiError {
    ApiError::Transport {
        message: err.to_string(),
    }
}

impl NovaClient {
    /// Creates a client for `session` with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Transport`] when the HTTP client cannot be built.
    pub fn new(session: Session, timeout: Duration) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ApiError::Transport {
                message: format!("failed to build HTTP client: {err}"),
            })?;
        Ok(Self { http, session })
    }

    /// Session backing this client.
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    fn url(&self, region: &Region, path: &str) -> Result<Url, ApiError> {
        let endpoint =
            self.session
                .endpoint(region)
                .ok_or_else(|| ApiError::RegionNotConfigured {
                    region: region.to_string(),
                })?;
        let joined = format!("{}{path}", endpoint.trim_end_matches('/'));
        Url::parse(&joined).map_err(|err| ApiError::Transport {
            message: format!("invalid endpoint {joined}: {err}"),
        })
    }

    /// `collection` joined with `item` as one percent-encoded path segment.
    fn item_url(&self, region: &Region, collection: &str, item: &str) -> Result<Url, ApiError> {
        let mut url = self.url(region, collection)?;
        url.path_segments_mut()
            .map_err(|()| ApiError::Transport {
                message: format!("endpoint for region {region} cannot carry a path"),
            })?
            .push(item);
        Ok(url)
    }

    fn metadata_item_url(
        &self,
        region: &Region,
        kind: ResourceKind,
        id: &str,
        key: &str,
    ) -> Result<Url, ApiError> {
        self.item_url(region, &format!("/{}/{id}/metadata", kind.collection()), key)
    }

    async fn dispatch(
        &self,
        region: &Region,
        request: RequestBuilder,
    ) -> Result<RawResponse, ApiError> {
        let token = self.session.token(region)?;
        let response = request
            .header("X-Auth-Token", token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|err| transport(&err))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|err| transport(&err))?
            .to_vec();
        Ok(RawResponse { status, body })
    }

    async fn send(
        &self,
        region: &Region,
        method: Method,
        url: Url,
    ) -> Result<RawResponse, ApiError> {
        debug!(%region, %method, %url, "compute request");
        self.dispatch(region, self.http.request(method, url)).await
    }

    async fn send_json<B: Serialize + Sync + ?Sized>(
        &self,
        region: &Region,
        method: Method,
        url: Url,
        body: &B,
    ) -> Result<RawResponse, ApiError> {
        debug!(%region, %method, %url, "compute request");
        self.dispatch(region, self.http.request(method, url).json(body))
            .await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        region: &Region,
        path: &str,
    ) -> Result<T, ApiError> {
        let url = self.url(region, path)?;
        self.send(region, Method::GET, url)
            .await?
            .into_success(region)?
            .decode()
    }

    async fn get_optional<T: DeserializeOwned>(
        &self,
        region: &Region,
        url: Url,
    ) -> Result<Option<T>, ApiError> {
        let response = self.send(region, Method::GET, url).await?;
        if response.status == 404 {
            return Ok(None);
        }
        response.into_success(region)?.decode().map(Some)
    }
}

impl ComputeApi for NovaClient {
    fn list_extensions<'a>(&'a self, region: &'a Region) -> ApiFuture<'a, Vec<Extension>> {
        Box::pin(async move {
            let envelope: wire::ExtensionsEnvelope = self.get_json(region, "/extensions").await?;
            Ok(envelope.extensions.into_iter().map(Into::into).collect())
        })
    }

    fn list_images<'a>(&'a self, region: &'a Region) -> ApiFuture<'a, Vec<ImageRecord>> {
        Box::pin(async move {
            let envelope: wire::ImagesEnvelope = self.get_json(region, "/images/detail").await?;
            Ok(envelope.images.into_iter().map(Into::into).collect())
        })
    }

    fn list_flavors<'a>(&'a self, region: &'a Region) -> ApiFuture<'a, Vec<FlavorRecord>> {
        Box::pin(async move {
            let envelope: wire::FlavorsEnvelope = self.get_json(region, "/flavors/detail").await?;
            Ok(envelope.flavors.into_iter().map(Into::into).collect())
        })
    }

    fn list_availability_zones<'a>(
        &'a self,
        region: &'a Region,
    ) -> ApiFuture<'a, Vec<AvailabilityZone>> {
        Box::pin(async move {
            let envelope: wire::ZonesEnvelope =
                self.get_json(region, "/os-availability-zone").await?;
            Ok(envelope.zones.into_iter().map(Into::into).collect())
        })
    }

    fn list_security_groups<'a>(
        &'a self,
        region: &'a Region,
    ) -> ApiFuture<'a, Vec<SecurityGroup>> {
        Box::pin(async move {
            let url = self.url(region, "/os-security-groups")?;
            let envelope: Option<wire::SecurityGroupsEnvelope> =
                self.get_optional(region, url).await?;
            Ok(envelope
                .map(|found| found.security_groups.into_iter().map(Into::into).collect())
                .unwrap_or_default())
        })
    }

    fn get_security_group<'a>(
        &'a self,
        region: &'a Region,
        id: &'a str,
    ) -> ApiFuture<'a, Option<SecurityGroup>> {
        Box::pin(async move {
            let url = self.item_url(region, "/os-security-groups", id)?;
            let envelope: Option<wire::SecurityGroupEnvelope> =
                self.get_optional(region, url).await?;
            Ok(envelope.map(|found| found.security_group.into()))
        })
    }

    fn create_security_group<'a>(
        &'a self,
        region: &'a Region,
        name: &'a str,
        description: &'a str,
    ) -> ApiFuture<'a, SecurityGroup> {
        Box::pin(async move {
            let url = self.url(region, "/os-security-groups")?;
            let body = wire::CreateSecurityGroupRequest {
                security_group: wire::NewSecurityGroup { name, description },
            };
            let envelope: wire::SecurityGroupEnvelope = self
                .send_json(region, Method::POST, url, &body)
                .await?
                .into_success(region)?
                .decode()?;
            Ok(envelope.security_group.into())
        })
    }

    fn create_security_group_rule<'a>(
        &'a self,
        region: &'a Region,
        group_id: &'a str,
        rule: &'a SecurityGroupRule,
    ) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            let url = self.url(region, "/os-security-group-rules")?;
            let body = wire::CreateRuleRequest {
                security_group_rule: wire::NewRule::new(group_id, rule),
            };
            self.send_json(region, Method::POST, url, &body)
                .await?
                .into_success(region)?;
            Ok(())
        })
    }

    fn get_key_pair<'a>(
        &'a self,
        region: &'a Region,
        name: &'a str,
    ) -> ApiFuture<'a, Option<KeyPair>> {
        Box::pin(async move {
            let url = self.item_url(region, "/os-keypairs", name)?;
            let envelope: Option<wire::KeyPairEnvelope> = self.get_optional(region, url).await?;
            Ok(envelope.map(|found| found.keypair.into()))
        })
    }

    fn create_key_pair<'a>(
        &'a self,
        region: &'a Region,
        name: &'a str,
        public_key: Option<&'a str>,
    ) -> ApiFuture<'a, KeyPair> {
        Box::pin(async move {
            let url = self.url(region, "/os-keypairs")?;
            let body = wire::CreateKeyPairRequest {
                keypair: wire::NewKeyPair { name, public_key },
            };
            let envelope: wire::KeyPairEnvelope = self
                .send_json(region, Method::POST, url, &body)
                .await?
                .into_success(region)?
                .decode()?;
            Ok(envelope.keypair.into())
        })
    }

    fn create_server<'a>(
        &'a self,
        region: &'a Region,
        request: &'a CreateServer,
    ) -> ApiFuture<'a, String> {
        Box::pin(async move {
            let url = self.url(region, "/servers")?;
            let body = wire::CreateServerRequest::new(request);
            let envelope: wire::CreatedServerEnvelope = self
                .send_json(region, Method::POST, url, &body)
                .await?
                .into_success(region)?
                .decode()?;
            Ok(envelope.server.id)
        })
    }

    fn list_servers<'a>(&'a self, region: &'a Region) -> ApiFuture<'a, Vec<ServerRecord>> {
        Box::pin(async move {
            let envelope: wire::ServersEnvelope = self.get_json(region, "/servers/detail").await?;
            Ok(envelope.servers.into_iter().map(Into::into).collect())
        })
    }

    fn get_server<'a>(
        &'a self,
        region: &'a Region,
        id: &'a str,
    ) -> ApiFuture<'a, Option<ServerRecord>> {
        Box::pin(async move {
            let url = self.item_url(region, "/servers", id)?;
            let envelope: Option<wire::ServerEnvelope> = self.get_optional(region, url).await?;
            Ok(envelope.map(|found| found.server.into()))
        })
    }

    fn get_server_diagnostics<'a>(
        &'a self,
        region: &'a Region,
        id: &'a str,
    ) -> ApiFuture<'a, Option<Metadata>> {
        Box::pin(async move {
            let url = self.url(region, &format!("/servers/{id}/diagnostics"))?;
            let response = self.send(region, Method::GET, url).await?;
            if matches!(response.status, 403 | 404 | 500) {
                return Ok(None);
            }
            let values = response.into_success(region)?.decode()?;
            Ok(Some(wire::stringify_map(values)))
        })
    }

    fn allocate_floating_ip<'a>(
        &'a self,
        region: &'a Region,
        pool: Option<&'a str>,
    ) -> ApiFuture<'a, FloatingIp> {
        Box::pin(async move {
            let url = self.url(region, "/os-floating-ips")?;
            let body = wire::AllocateFloatingIpRequest { pool };
            let envelope: wire::FloatingIpEnvelope = self
                .send_json(region, Method::POST, url, &body)
                .await?
                .into_success(region)?
                .decode()?;
            Ok(envelope.floating_ip.into())
        })
    }

    fn add_floating_ip<'a>(
        &'a self,
        region: &'a Region,
        server_id: &'a str,
        address: &'a str,
    ) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            let url = self.url(region, &format!("/servers/{server_id}/action"))?;
            let body = wire::AddFloatingIpRequest {
                add_floating_ip: wire::AddressRef { address },
            };
            self.send_json(region, Method::POST, url, &body)
                .await?
                .into_success(region)?;
            Ok(())
        })
    }

    fn release_floating_ip<'a>(&'a self, region: &'a Region, id: &'a str) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            let url = self.item_url(region, "/os-floating-ips", id)?;
            let response = self.send(region, Method::DELETE, url).await?;
            if response.status != 404 {
                response.into_success(region)?;
            }
            Ok(())
        })
    }

    fn get_metadata<'a>(
        &'a self,
        region: &'a Region,
        kind: ResourceKind,
        id: &'a str,
    ) -> ApiFuture<'a, Metadata> {
        Box::pin(async move {
            let envelope: wire::MetadataEnvelope = self
                .get_json(region, &format!("/{}/{id}/metadata", kind.collection()))
                .await?;
            Ok(envelope.metadata)
        })
    }

    fn replace_metadata<'a>(
        &'a self,
        region: &'a Region,
        kind: ResourceKind,
        id: &'a str,
        metadata: &'a Metadata,
    ) -> ApiFuture<'a, Metadata> {
        Box::pin(async move {
            let url = self.url(region, &format!("/{}/{id}/metadata", kind.collection()))?;
            let body = wire::MetadataEnvelope {
                metadata: metadata.clone(),
            };
            let envelope: wire::MetadataEnvelope = self
                .send_json(region, Method::PUT, url, &body)
                .await?
                .into_success(region)?
                .decode()?;
            Ok(envelope.metadata)
        })
    }

    fn merge_metadata<'a>(
        &'a self,
        region: &'a Region,
        kind: ResourceKind,
        id: &'a str,
        metadata: &'a Metadata,
    ) -> ApiFuture<'a, Metadata> {
        Box::pin(async move {
            let url = self.url(region, &format!("/{}/{id}/metadata", kind.collection()))?;
            let body = wire::MetadataEnvelope {
                metadata: metadata.clone(),
            };
            let envelope: wire::MetadataEnvelope = self
                .send_json(region, Method::POST, url, &body)
                .await?
                .into_success(region)?
                .decode()?;
            Ok(envelope.metadata)
        })
    }

    fn get_metadata_item<'a>(
        &'a self,
        region: &'a Region,
        kind: ResourceKind,
        id: &'a str,
        key: &'a str,
    ) -> ApiFuture<'a, Option<String>> {
        Box::pin(async move {
            let url = self.metadata_item_url(region, kind, id, key)?;
            let response = self.send(region, Method::GET, url).await?;
            if response.status == 404 {
                return Ok(None);
            }
            let envelope: wire::MetaItemEnvelope = response.into_success(region)?.decode()?;
            Ok(envelope.meta.get(key).cloned())
        })
    }

    fn put_metadata_item<'a>(
        &'a self,
        region: &'a Region,
        kind: ResourceKind,
        id: &'a str,
        key: &'a str,
        value: &'a str,
    ) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            let url = self.metadata_item_url(region, kind, id, key)?;
            let body = wire::MetaItemEnvelope {
                meta: Metadata::from([(key.to_owned(), value.to_owned())]),
            };
            self.send_json(region, Method::PUT, url, &body)
                .await?
                .into_success(region)?;
            Ok(())
        })
    }

    fn delete_metadata_item<'a>(
        &'a self,
        region: &'a Region,
        kind: ResourceKind,
        id: &'a str,
        key: &'a str,
    ) -> ApiFuture<'a, bool> {
        Box::pin(async move {
            let url = self.metadata_item_url(region, kind, id, key)?;
            let response = self.send(region, Method::DELETE, url).await?;
            if response.status == 404 {
                return Ok(false);
            }
            response.into_success(region)?;
            Ok(true)
        })
    }
}

#[cfg(test)]
mod tests;
