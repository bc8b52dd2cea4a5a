use std::path::PathBuf;

use serde::Deserialize;

use crate::config::types::{EndpointOverrides, ProviderConfig};
use crate::error::GrantflowError;

/// Resolved authorization server endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub device_authorization: String,
    pub token: String,
    pub revocation: String,
    pub userinfo: String,
    pub introspection: String,
}

impl Endpoints {
    /// Derive endpoints from an issuer using the `/v1/...` path layout.
    pub fn from_issuer(issuer: &str) -> Self {
        let base = issuer.trim_end_matches('/');
        Self {
            device_authorization: format!("{base}/v1/device/authorize"),
            token: format!("{base}/v1/token"),
            revocation: format!("{base}/v1/revoke"),
            userinfo: format!("{base}/v1/userinfo"),
            introspection: format!("{base}/v1/introspect"),
        }
    }

    /// Replace endpoints that have an explicit override.
    pub fn with_overrides(mut self, overrides: &EndpointOverrides) -> Self {
        let pairs = [
            (&mut self.device_authorization, &overrides.device_authorization),
            (&mut self.token, &overrides.token),
            (&mut self.revocation, &overrides.revocation),
            (&mut self.userinfo, &overrides.userinfo),
            (&mut self.introspection, &overrides.introspection),
        ];
        for (slot, value) in pairs {
            if let Some(v) = value {
                *slot = v.clone();
            }
        }
        self
    }

    fn apply_metadata(mut self, metadata: OidcMetadata) -> Self {
        self.token = metadata.token_endpoint;
        if let Some(v) = metadata.device_authorization_endpoint {
            self.device_authorization = v;
        }
        if let Some(v) = metadata.revocation_endpoint {
            self.revocation = v;
        }
        if let Some(v) = metadata.userinfo_endpoint {
            self.userinfo = v;
        }
        if let Some(v) = metadata.introspection_endpoint {
            self.introspection = v;
        }
        self
    }
}

#[derive(Debug, Deserialize)]
pub struct OidcMetadata {
    pub issuer: String,
    pub token_endpoint: String,
    #[serde(default)]
    pub device_authorization_endpoint: Option<String>,
    #[serde(default)]
    pub revocation_endpoint: Option<String>,
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
    #[serde(default)]
    pub introspection_endpoint: Option<String>,
}

/// Construct the OIDC discovery URL from an issuer.
fn build_discovery_url(issuer: &str) -> String {
    format!(
        "{}/.well-known/openid-configuration",
        issuer.trim_end_matches('/')
    )
}

pub async fn discover_metadata(
    client: &reqwest::Client,
    issuer: &str,
) -> Result<OidcMetadata, GrantflowError> {
    let url = build_discovery_url(issuer);
    let resp = client
        .get(&url)
        .send()
        .await
        .map_err(|e| discovery_error(format!("Failed to fetch metadata from {url}: {e}")))?;

    if !resp.status().is_success() {
        return Err(discovery_error(format!(
            "Metadata endpoint {url} returned status {}",
            resp.status()
        )));
    }

    resp.json()
        .await
        .map_err(|e| discovery_error(format!("Failed to parse metadata: {e}")))
}

/// Resolve endpoints for a provider: discovery (when enabled) or the issuer
/// layout, then explicit overrides on top.
pub async fn resolve_endpoints(
    client: &reqwest::Client,
    provider: &ProviderConfig,
) -> Result<Endpoints, GrantflowError> {
    let mut endpoints = Endpoints::from_issuer(&provider.issuer);
    if provider.discover {
        let metadata = discover_metadata(client, &provider.issuer).await?;
        tracing::debug!(issuer = %metadata.issuer, "discovered authorization server metadata");
        endpoints = endpoints.apply_metadata(metadata);
    }
    Ok(endpoints.with_overrides(&provider.endpoints))
}

fn discovery_error(detail: String) -> GrantflowError {
    GrantflowError::ConfigError {
        path: PathBuf::from("<discovery>"),
        detail,
    }
}
