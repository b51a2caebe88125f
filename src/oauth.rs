use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;
use url::Url;

use crate::error::Error;
use crate::metadata::MetadataCache;
use crate::types::IdTokenClaims;

const DEFAULT_CLOUD_INSTANCE: &str = "https://login.microsoftonline.com/";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Identity provider configuration.
///
/// Required fields are constructor parameters — no runtime "missing field"
/// errors.
///
/// ```rust,ignore
/// use entra_login::ProviderConfig;
///
/// let provider = ProviderConfig::new("client-id", "client-secret", "tenant-id");
/// // Optional overrides via chaining:
/// let provider = provider
///     .with_cloud_instance("https://login.microsoftonline.us/".parse()?);
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ProviderConfig {
    pub(crate) client_id: String,
    pub(crate) client_secret: String,
    pub(crate) tenant_id: String,
    pub(crate) cloud_instance: Url,
    pub(crate) scopes: Vec<String>,
    pub(crate) http_timeout: Duration,
}

impl ProviderConfig {
    /// Create a new provider configuration against the public cloud.
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        tenant_id: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            tenant_id: tenant_id.into(),
            cloud_instance: DEFAULT_CLOUD_INSTANCE
                .parse()
                .expect("valid default URL"),
            scopes: vec!["openid".into(), "profile".into()],
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    /// Override the cloud instance base URL (sovereign clouds, test doubles).
    #[must_use]
    pub fn with_cloud_instance(mut self, url: Url) -> Self {
        self.cloud_instance = url;
        self
    }

    /// Override the default scopes (default: `["openid", "profile"]`).
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Override the per-request timeout for provider calls (default: 10s).
    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// OAuth2 client ID.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Tenant identifier.
    #[must_use]
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Default OAuth2 scopes.
    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Per-request timeout for provider calls.
    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        self.http_timeout
    }

    /// Full directory URL: cloud instance + tenant.
    #[must_use]
    pub fn authority(&self) -> String {
        format!(
            "{}/{}",
            self.cloud_instance.as_str().trim_end_matches('/'),
            self.tenant_id
        )
    }

    pub(crate) fn discovery_endpoint(&self) -> String {
        format!(
            "{}/common/discovery/instance",
            self.cloud_instance.as_str().trim_end_matches('/')
        )
    }

    pub(crate) fn openid_configuration_endpoint(&self) -> String {
        format!("{}/v2.0/.well-known/openid-configuration", self.authority())
    }

    pub(crate) fn fallback_logout_endpoint(&self) -> String {
        format!("{}/oauth2/v2.0/logout", self.authority())
    }
}

/// Token response from the provider's token endpoint.
#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// OAuth2 error body from the token endpoint.
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Parameters for exchanging an authorization code.
#[derive(Debug)]
pub(crate) struct ExchangeRequest<'a> {
    pub code: &'a str,
    pub code_verifier: &'a str,
    pub redirect_uri: &'a str,
    pub scopes: &'a [String],
}

/// Confidential OAuth2 client for the configured provider.
///
/// Owns the HTTP client and the process-wide [`MetadataCache`]; one instance
/// serves all sessions.
pub struct AuthClient {
    config: ProviderConfig,
    http: reqwest::Client,
    metadata: MetadataCache,
}

impl AuthClient {
    /// Create a new client for the given provider.
    #[must_use]
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            metadata: MetadataCache::new(),
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// Provider configuration.
    #[must_use]
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Cached provider metadata, if already fetched.
    #[must_use]
    pub fn metadata(&self) -> &MetadataCache {
        &self.metadata
    }

    pub(crate) async fn ensure_metadata(
        &self,
    ) -> Result<std::sync::Arc<crate::metadata::ProviderMetadata>, Error> {
        self.metadata.get_or_fetch(&self.http, &self.config).await
    }

    /// Exchange an authorization code for tokens using PKCE.
    pub(crate) async fn exchange_code(
        &self,
        token_endpoint: &Url,
        request: ExchangeRequest<'_>,
    ) -> Result<TokenResponse, Error> {
        let scope = request.scopes.join(" ");
        let params = [
            ("grant_type", "authorization_code"),
            ("code", request.code),
            ("redirect_uri", request.redirect_uri),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("code_verifier", request.code_verifier),
            ("scope", scope.as_str()),
        ];

        let response = self
            .http
            .post(token_endpoint.clone())
            .form(&params)
            .timeout(self.config.http_timeout)
            .send()
            .await
            .map_err(|e| Error::TokenExchange(e.to_string()))?;

        Self::read_token_response(response, |detail, _| Error::TokenExchange(detail)).await
    }

    /// Redeem a refresh token for fresh tokens.
    pub(crate) async fn redeem_refresh_token(
        &self,
        token_endpoint: &Url,
        refresh_token: &str,
        scopes: &[String],
    ) -> Result<TokenResponse, Error> {
        let scope = scopes.join(" ");
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("scope", scope.as_str()),
        ];

        let response = self
            .http
            .post(token_endpoint.clone())
            .form(&params)
            .timeout(self.config.http_timeout)
            .send()
            .await
            .map_err(|e| Error::SilentAcquisition(e.to_string()))?;

        Self::read_token_response(response, |detail, code| {
            if interaction_required(code) {
                Error::InteractionRequired(detail)
            } else {
                Error::SilentAcquisition(detail)
            }
        })
        .await
    }

    /// Provider logout endpoint, with the optional post-logout redirect.
    ///
    /// Infallible: uses the cached `end_session_endpoint` when metadata is
    /// present and falls back to the authority's `/oauth2/v2.0/logout`
    /// pattern otherwise. Never fetches.
    #[must_use]
    pub fn logout_url(&self, post_logout_redirect_uri: Option<&str>) -> String {
        let endpoint = self
            .metadata
            .get()
            .and_then(|m| m.openid.end_session_endpoint.clone())
            .map_or_else(|| self.config.fallback_logout_endpoint(), Into::into);

        match post_logout_redirect_uri {
            Some(uri) => {
                let mut url = endpoint;
                // endpoint came from a parsed Url or a fixed pattern
                if let Ok(mut parsed) = Url::parse(&url) {
                    parsed
                        .query_pairs_mut()
                        .append_pair("post_logout_redirect_uri", uri);
                    url = parsed.into();
                }
                url
            }
            None => endpoint,
        }
    }

    async fn read_token_response(
        response: reqwest::Response,
        to_error: impl Fn(String, Option<&str>) -> Error,
    ) -> Result<TokenResponse, Error> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| to_error(e.to_string(), None))?;

        if !status.is_success() {
            return match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(err) => {
                    let detail = match &err.error_description {
                        Some(desc) => format!("{}: {desc}", err.error),
                        None => err.error.clone(),
                    };
                    Err(to_error(detail, Some(err.error.as_str())))
                }
                Err(_) => Err(to_error(format!("HTTP {}: {body}", status.as_u16()), None)),
            };
        }

        serde_json::from_str(&body).map_err(|e| to_error(e.to_string(), None))
    }
}

/// OAuth error codes that mean the user must go back through the provider.
fn interaction_required(code: Option<&str>) -> bool {
    matches!(
        code,
        Some("interaction_required" | "invalid_grant" | "login_required" | "consent_required")
    )
}

/// Decodes the claims segment of an ID token.
///
/// The token arrives in the token endpoint's response over the confidential
/// client's direct TLS connection, so the claims are read without local
/// signature verification; callers validate what they rely on.
pub(crate) fn decode_id_token(token: &str) -> Result<IdTokenClaims, Error> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| Error::TokenExchange("malformed id token".into()))?;
    let json = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| Error::TokenExchange(format!("id token payload: {e}")))?;
    serde_json::from_slice(&json)
        .map_err(|e| Error::TokenExchange(format!("id token claims: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ProviderConfig {
        ProviderConfig::new("client-1", "secret-1", "tenant-1")
    }

    fn encode_token(claims: &serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap());
        format!("{header}.{payload}.signature")
    }

    #[test]
    fn authority_joins_cloud_instance_and_tenant() {
        let config = test_config();
        assert_eq!(
            config.authority(),
            "https://login.microsoftonline.com/tenant-1"
        );
        assert_eq!(
            config.openid_configuration_endpoint(),
            "https://login.microsoftonline.com/tenant-1/v2.0/.well-known/openid-configuration"
        );
        assert_eq!(
            config.discovery_endpoint(),
            "https://login.microsoftonline.com/common/discovery/instance"
        );
    }

    #[test]
    fn authority_with_custom_cloud_instance() {
        let config =
            test_config().with_cloud_instance("https://login.example.test:8443/".parse().unwrap());
        assert_eq!(config.authority(), "https://login.example.test:8443/tenant-1");
    }

    #[test]
    fn decode_id_token_reads_claims() {
        let token = encode_token(&serde_json::json!({
            "sub": "sub-1",
            "preferred_username": "jane@example.com",
            "oid": "oid-1",
            "tid": "tid-1",
        }));

        let claims = decode_id_token(&token).unwrap();
        assert_eq!(claims.sub, "sub-1");
        assert_eq!(claims.preferred_username.as_deref(), Some("jane@example.com"));
    }

    #[test]
    fn decode_id_token_rejects_malformed_tokens() {
        assert!(decode_id_token("no-dots-here").is_err());
        assert!(decode_id_token("a.%%%.c").is_err());
    }

    #[test]
    fn interaction_required_classification() {
        assert!(interaction_required(Some("interaction_required")));
        assert!(interaction_required(Some("invalid_grant")));
        assert!(!interaction_required(Some("server_error")));
        assert!(!interaction_required(None));
    }

    #[test]
    fn logout_url_without_metadata_uses_authority_pattern() {
        let client = AuthClient::new(test_config());
        assert_eq!(
            client.logout_url(None),
            "https://login.microsoftonline.com/tenant-1/oauth2/v2.0/logout"
        );
    }

    #[test]
    fn logout_url_appends_post_logout_redirect() {
        let client = AuthClient::new(test_config());
        let url = client.logout_url(Some("https://app.example.com/"));
        assert!(url.starts_with(
            "https://login.microsoftonline.com/tenant-1/oauth2/v2.0/logout?post_logout_redirect_uri="
        ));
        assert!(url.contains("app.example.com"));
    }
}
