use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Error;
use crate::oauth::{AuthClient, ExchangeRequest, ProviderConfig};
use crate::pkce;
use crate::token_cache::{TokenCache, TokenCacheBlob};
use crate::types::Account;

const CHALLENGE_METHOD_S256: &str = "S256";
const RESPONSE_MODE_FORM_POST: &str = "form_post";

/// Payload round-tripped through the provider as the anti-forgery `state`.
///
/// The nonce makes the encoded state unpredictable per flow even when two
/// logins share a `success_redirect`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatePayload {
    pub success_redirect: String,
    pub nonce: String,
}

impl StatePayload {
    #[must_use]
    pub fn new(success_redirect: impl Into<String>) -> Self {
        Self {
            success_redirect: success_redirect.into(),
            nonce: pkce::generate_state(),
        }
    }
}

/// PKCE pair for one flow attempt. The verifier never leaves the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PkceCodes {
    pub verifier: String,
    pub challenge: String,
    pub method: String,
}

/// Authorize-URL parameters retained so the callback can reconstruct the
/// matching token request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAuthRequest {
    pub scopes: Vec<String>,
    pub redirect_uri: String,
    pub response_mode: String,
}

/// Ephemeral per-session login state.
///
/// Exists only between authorize-start and callback completion; the callback
/// consumes it, success or failure. A new login overwrites any pending one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowState {
    /// Anti-forgery state issued with the authorize URL.
    pub state: String,
    pub pkce: PkceCodes,
    pub request: PendingAuthRequest,
}

/// Full per-session snapshot, serialized as JSON into the session store.
///
/// Handlers read the snapshot at entry and write it back at exit;
/// last-writer-wins per session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthSession {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow: Option<FlowState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_cache: Option<TokenCacheBlob>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<Account>,
    #[serde(default)]
    pub is_authenticated: bool,
}

/// Options for one login attempt.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct LoginOptions {
    /// Scopes to request; empty means the provider config defaults.
    pub scopes: Vec<String>,
    /// Absolute redirect URI registered with the provider.
    pub redirect_uri: String,
    /// Where to send the user after a completed login.
    pub success_redirect: String,
}

impl LoginOptions {
    #[must_use]
    pub fn new(redirect_uri: impl Into<String>) -> Self {
        Self {
            scopes: Vec::new(),
            redirect_uri: redirect_uri.into(),
            success_redirect: "/".into(),
        }
    }

    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    #[must_use]
    pub fn with_success_redirect(mut self, target: impl Into<String>) -> Self {
        self.success_redirect = target.into();
        self
    }
}

/// Provider callback body (`response_mode=form_post`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackBody {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

/// Result of a completed callback.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct CallbackOutcome {
    pub account: Account,
    /// Redirect target decoded from the anti-forgery state payload.
    pub success_redirect: Option<String>,
}

/// Tokens produced by a silent acquisition.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct TokenSet {
    pub access_token: String,
    pub id_token: Option<String>,
    /// Unix timestamp the access token expires at, when known.
    pub expires_at: Option<i64>,
}

/// The authorization-code-with-PKCE flow engine.
///
/// One instance serves all sessions; all per-login state lives in the
/// [`AuthSession`] the caller passes in. Operations mutate the session
/// snapshot and the caller persists it afterwards.
pub struct FlowEngine {
    client: AuthClient,
}

impl FlowEngine {
    /// Create an engine for the given provider.
    #[must_use]
    pub fn new(provider: ProviderConfig) -> Self {
        Self {
            client: AuthClient::new(provider),
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.client = self.client.with_http_client(http);
        self
    }

    /// Underlying OAuth2 client.
    #[must_use]
    pub fn client(&self) -> &AuthClient {
        &self.client
    }

    /// Starts a login: generates PKCE and anti-forgery state, stores the
    /// pending [`FlowState`] in the session (overwriting any prior one), and
    /// returns the provider authorize URL to redirect to.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MetadataFetch`] when provider metadata is
    /// unavailable — the engine never builds an authorize URL without it.
    pub async fn start_login(
        &self,
        session: &mut AuthSession,
        options: &LoginOptions,
    ) -> Result<Url, Error> {
        let metadata = self.client.ensure_metadata().await?;

        let scopes = if options.scopes.is_empty() {
            self.client.config().scopes().to_vec()
        } else {
            options.scopes.clone()
        };

        let state = pkce::encode_state(&StatePayload::new(&options.success_redirect))?;
        let verifier = pkce::generate_code_verifier();
        let challenge = pkce::generate_code_challenge(&verifier);

        // Last writer wins: a new login supersedes any pending flow.
        session.flow = Some(FlowState {
            state: state.clone(),
            pkce: PkceCodes {
                verifier,
                challenge: challenge.clone(),
                method: CHALLENGE_METHOD_S256.into(),
            },
            request: PendingAuthRequest {
                scopes: scopes.clone(),
                redirect_uri: options.redirect_uri.clone(),
                response_mode: RESPONSE_MODE_FORM_POST.into(),
            },
        });

        let mut url = metadata.openid.authorization_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("client_id", self.client.config().client_id())
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &options.redirect_uri)
            .append_pair("response_mode", RESPONSE_MODE_FORM_POST)
            .append_pair("scope", &scopes.join(" "))
            .append_pair("state", &state)
            .append_pair("code_challenge", &challenge)
            .append_pair("code_challenge_method", CHALLENGE_METHOD_S256);

        tracing::debug!(tenant = %self.client.config().tenant_id(), "Issued authorize URL");
        Ok(url)
    }

    /// Completes the flow from the provider's `form_post` callback.
    ///
    /// The pending [`FlowState`] is consumed whatever the outcome; a failed
    /// exchange requires a fresh `start_login`.
    ///
    /// # Errors
    ///
    /// - [`Error::MissingState`] when the body carries no `state`; no token
    ///   exchange is attempted.
    /// - [`Error::StaleFlow`] when no login is pending or the state does not
    ///   match the most recently issued one.
    /// - [`Error::TokenExchange`] when the code exchange fails or the ID
    ///   token is unusable.
    pub async fn handle_callback(
        &self,
        session: &mut AuthSession,
        body: &CallbackBody,
    ) -> Result<CallbackOutcome, Error> {
        let state = body
            .state
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(Error::MissingState)?;

        // Consume the pending flow up front: it is invalid after this
        // callback regardless of outcome.
        let flow = session.flow.take().ok_or(Error::StaleFlow)?;
        if state != flow.state {
            tracing::warn!("Callback state does not match most recently issued login");
            return Err(Error::StaleFlow);
        }

        let code = body
            .code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::TokenExchange("callback carried no authorization code".into()))?;

        let metadata = self.client.ensure_metadata().await?;
        let mut cache = load_cache(session);

        let response = self
            .client
            .exchange_code(
                &metadata.openid.token_endpoint,
                ExchangeRequest {
                    code,
                    code_verifier: &flow.pkce.verifier,
                    redirect_uri: &flow.request.redirect_uri,
                    scopes: &flow.request.scopes,
                },
            )
            .await?;

        let id_token = response
            .id_token
            .clone()
            .ok_or_else(|| Error::TokenExchange("token response carried no id token".into()))?;
        let account = Account::from_claims(crate::oauth::decode_id_token(&id_token)?)?;

        // Re-serialize the cache before control returns so a crash from here
        // on cannot lose the freshly acquired tokens.
        cache.apply(&response, &flow.request.scopes);
        session.token_cache = Some(cache.serialize());
        session.id_token = Some(id_token);
        session.access_token = Some(response.access_token.clone());
        session.account = Some(account.clone());
        session.is_authenticated = true;

        let success_redirect = pkce::decode_state::<StatePayload>(&flow.state)
            .ok()
            .map(|p| p.success_redirect);

        tracing::info!(username = %account.username, "Authorization code exchange succeeded");
        Ok(CallbackOutcome {
            account,
            success_redirect,
        })
    }

    /// Acquires tokens without user interaction.
    ///
    /// Serves a still-valid cached access token when it covers the requested
    /// scopes, otherwise redeems the cached refresh token. The cache is
    /// re-serialized into the session immediately after a refresh.
    ///
    /// # Errors
    ///
    /// - [`Error::InteractionRequired`] when no account, refresh token, or
    ///   grant is available — recover by restarting `start_login`.
    /// - [`Error::SilentAcquisition`] for any other failure.
    pub async fn acquire_token_silent(
        &self,
        session: &mut AuthSession,
        scopes: &[String],
    ) -> Result<TokenSet, Error> {
        let account = session
            .account
            .as_ref()
            .ok_or_else(|| Error::InteractionRequired("no account bound to session".into()))?;

        let scopes = if scopes.is_empty() {
            self.client.config().scopes().to_vec()
        } else {
            scopes.to_vec()
        };

        let mut cache = load_cache(session);
        if let Some(token) = cache.valid_access_token(&scopes) {
            tracing::debug!(username = %account.username, "Serving access token from cache");
            return Ok(TokenSet {
                access_token: token.to_string(),
                id_token: cache.id_token.clone(),
                expires_at: cache.expires_at,
            });
        }

        let refresh_token = cache.refresh_token.clone().ok_or_else(|| {
            Error::InteractionRequired("no refresh token cached for this session".into())
        })?;

        let metadata = self.client.ensure_metadata().await?;
        let response = self
            .client
            .redeem_refresh_token(&metadata.openid.token_endpoint, &refresh_token, &scopes)
            .await?;

        cache.apply(&response, &scopes);
        session.token_cache = Some(cache.serialize());
        session.access_token = Some(response.access_token.clone());
        if let Some(id_token) = &response.id_token {
            session.id_token = Some(id_token.clone());
        }

        tracing::debug!(username = %account.username, "Silent token refresh succeeded");
        Ok(TokenSet {
            access_token: response.access_token,
            id_token: response.id_token,
            expires_at: cache.expires_at,
        })
    }

    /// Provider logout URL, optionally with a post-logout redirect.
    ///
    /// Infallible and purely local — logout must never fail visibly even
    /// when metadata was never fetched or the session store is down.
    #[must_use]
    pub fn logout_url(&self, post_logout_redirect_uri: Option<&str>) -> String {
        self.client.logout_url(post_logout_redirect_uri)
    }
}

fn load_cache(session: &AuthSession) -> TokenCache {
    match &session.token_cache {
        Some(blob) => TokenCache::deserialize(blob).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Token cache blob corrupt, starting cold");
            TokenCache::default()
        }),
        None => TokenCache::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> FlowEngine {
        FlowEngine::new(ProviderConfig::new("client-1", "secret-1", "tenant-1"))
    }

    fn pending_session(state: &str) -> AuthSession {
        AuthSession {
            flow: Some(FlowState {
                state: state.into(),
                pkce: PkceCodes {
                    verifier: pkce::generate_code_verifier(),
                    challenge: "challenge".into(),
                    method: CHALLENGE_METHOD_S256.into(),
                },
                request: PendingAuthRequest {
                    scopes: vec!["openid".into()],
                    redirect_uri: "https://app.example.com/cb".into(),
                    response_mode: RESPONSE_MODE_FORM_POST.into(),
                },
            }),
            ..AuthSession::default()
        }
    }

    #[tokio::test]
    async fn callback_without_state_fails_before_any_exchange() {
        let mut session = pending_session("issued-state");
        let body = CallbackBody {
            state: None,
            code: Some("abc123".into()),
        };

        let err = engine().handle_callback(&mut session, &body).await.unwrap_err();
        assert!(matches!(err, Error::MissingState));
        // No exchange was attempted, so the pending flow is untouched.
        assert!(session.flow.is_some());
    }

    #[tokio::test]
    async fn callback_with_empty_state_fails() {
        let mut session = pending_session("issued-state");
        let body = CallbackBody {
            state: Some(String::new()),
            code: Some("abc123".into()),
        };

        let err = engine().handle_callback(&mut session, &body).await.unwrap_err();
        assert!(matches!(err, Error::MissingState));
    }

    #[tokio::test]
    async fn callback_without_pending_flow_is_stale() {
        let mut session = AuthSession::default();
        let body = CallbackBody {
            state: Some("whatever".into()),
            code: Some("abc123".into()),
        };

        let err = engine().handle_callback(&mut session, &body).await.unwrap_err();
        assert!(matches!(err, Error::StaleFlow));
    }

    #[tokio::test]
    async fn callback_with_superseded_state_is_stale_and_consumes_flow() {
        let mut session = pending_session("new-state");
        let body = CallbackBody {
            state: Some("old-state".into()),
            code: Some("abc123".into()),
        };

        let err = engine().handle_callback(&mut session, &body).await.unwrap_err();
        assert!(matches!(err, Error::StaleFlow));
        // The superseded flow was consumed; a replay cannot try again.
        assert!(session.flow.is_none());
        assert!(!session.is_authenticated);
    }

    #[tokio::test]
    async fn silent_acquisition_without_account_requires_interaction() {
        let mut session = AuthSession::default();
        let err = engine()
            .acquire_token_silent(&mut session, &[])
            .await
            .unwrap_err();
        assert!(err.is_interaction_required());
    }

    #[test]
    fn logout_url_is_always_available() {
        // Metadata was never fetched; the authority pattern still serves.
        let url = engine().logout_url(Some("https://app.example.com/"));
        assert!(url.contains("/oauth2/v2.0/logout"));
    }

    #[test]
    fn auth_session_snapshot_roundtrip() {
        let session = pending_session("state-1");
        let value = serde_json::to_value(&session).unwrap();
        let restored: AuthSession = serde_json::from_value(value).unwrap();
        assert_eq!(
            restored.flow.as_ref().map(|f| f.state.as_str()),
            Some("state-1")
        );
        assert!(!restored.is_authenticated);
    }

    #[test]
    fn state_payload_encodes_camel_case() {
        let payload = StatePayload::new("/admin");
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("successRedirect").is_some());
        assert!(json.get("nonce").is_some());
    }
}
