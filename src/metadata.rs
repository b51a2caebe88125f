use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Error;
use crate::oauth::ProviderConfig;

/// OpenID Provider Configuration, as served from
/// `{authority}/v2.0/.well-known/openid-configuration`.
///
/// Only the endpoints the flow consumes are typed; the document's remaining
/// fields are not retained.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct OpenIdConfiguration {
    pub issuer: String,
    pub authorization_endpoint: Url,
    pub token_endpoint: Url,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_session_endpoint: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<Url>,
}

/// Both provider metadata documents, always from the same fetch pair.
#[derive(Debug, Clone)]
pub struct ProviderMetadata {
    /// Instance discovery document (opaque to the flow, kept for audit).
    pub cloud_discovery: serde_json::Value,
    /// OpenID configuration the flow's endpoints come from.
    pub openid: OpenIdConfiguration,
}

/// Process-wide cache of [`ProviderMetadata`].
///
/// Populated at most once per engine lifetime. Two requests racing on an
/// empty cache both fetch; the first completed pair wins and the loser's
/// fetch is discarded, so the cached value is always internally consistent.
pub struct MetadataCache {
    inner: RwLock<Option<Arc<ProviderMetadata>>>,
}

impl MetadataCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(None),
        }
    }

    /// Returns the cached metadata without fetching.
    #[must_use]
    pub fn get(&self) -> Option<Arc<ProviderMetadata>> {
        self.inner.read().expect("metadata lock poisoned").clone()
    }

    /// Returns cached metadata, fetching both documents in parallel on a
    /// cold cache.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MetadataFetch`] when either document cannot be
    /// fetched or parsed. The flow fails closed: no authorize URL is built
    /// without metadata, and partial metadata is not tolerated because the
    /// token endpoint comes from the OpenID configuration.
    pub async fn get_or_fetch(
        &self,
        http: &reqwest::Client,
        provider: &ProviderConfig,
    ) -> Result<Arc<ProviderMetadata>, Error> {
        if let Some(cached) = self.get() {
            return Ok(cached);
        }

        let (cloud_discovery, openid) = tokio::try_join!(
            fetch_cloud_discovery(http, provider),
            fetch_openid_configuration(http, provider),
        )
        .map_err(|e| {
            tracing::warn!(error = %e, "Provider metadata fetch failed");
            e
        })?;

        let metadata = Arc::new(ProviderMetadata {
            cloud_discovery,
            openid,
        });

        let mut guard = self.inner.write().expect("metadata lock poisoned");
        Ok(guard.get_or_insert_with(|| metadata).clone())
    }
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new()
    }
}

async fn fetch_cloud_discovery(
    http: &reqwest::Client,
    provider: &ProviderConfig,
) -> Result<serde_json::Value, Error> {
    let authorization_endpoint = format!("{}/oauth2/v2.0/authorize", provider.authority());
    let response = http
        .get(provider.discovery_endpoint())
        .query(&[
            ("api-version", "1.1"),
            ("authorization_endpoint", authorization_endpoint.as_str()),
        ])
        .timeout(provider.http_timeout())
        .send()
        .await
        .map_err(|e| Error::MetadataFetch(format!("cloud discovery: {e}")))?;

    let response = ensure_success(response, "cloud discovery").await?;
    response
        .json()
        .await
        .map_err(|e| Error::MetadataFetch(format!("cloud discovery: {e}")))
}

async fn fetch_openid_configuration(
    http: &reqwest::Client,
    provider: &ProviderConfig,
) -> Result<OpenIdConfiguration, Error> {
    let response = http
        .get(provider.openid_configuration_endpoint())
        .timeout(provider.http_timeout())
        .send()
        .await
        .map_err(|e| Error::MetadataFetch(format!("openid configuration: {e}")))?;

    let response = ensure_success(response, "openid configuration").await?;
    response
        .json()
        .await
        .map_err(|e| Error::MetadataFetch(format!("openid configuration: {e}")))
}

async fn ensure_success(
    response: reqwest::Response,
    operation: &'static str,
) -> Result<reqwest::Response, Error> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(Error::MetadataFetch(format!(
        "{operation}: HTTP {status}: {body}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openid_configuration_parses_entra_document() {
        let json = serde_json::json!({
            "issuer": "https://login.microsoftonline.com/tenant-1/v2.0",
            "authorization_endpoint":
                "https://login.microsoftonline.com/tenant-1/oauth2/v2.0/authorize",
            "token_endpoint":
                "https://login.microsoftonline.com/tenant-1/oauth2/v2.0/token",
            "end_session_endpoint":
                "https://login.microsoftonline.com/tenant-1/oauth2/v2.0/logout",
            "jwks_uri":
                "https://login.microsoftonline.com/tenant-1/discovery/v2.0/keys",
            "response_modes_supported": ["query", "fragment", "form_post"],
            "scopes_supported": ["openid", "profile", "email"]
        });

        let config: OpenIdConfiguration = serde_json::from_value(json).unwrap();
        assert!(config.token_endpoint.as_str().ends_with("/oauth2/v2.0/token"));
        assert!(config.end_session_endpoint.is_some());
    }

    #[test]
    fn openid_configuration_tolerates_missing_optional_endpoints() {
        let json = serde_json::json!({
            "issuer": "https://example.com/v2.0",
            "authorization_endpoint": "https://example.com/authorize",
            "token_endpoint": "https://example.com/token",
        });

        let config: OpenIdConfiguration = serde_json::from_value(json).unwrap();
        assert!(config.end_session_endpoint.is_none());
        assert!(config.jwks_uri.is_none());
    }

    #[test]
    fn cache_starts_empty() {
        let cache = MetadataCache::new();
        assert!(cache.get().is_none());
    }
}
