use axum_extra::extract::cookie::Key;
use url::Url;

use super::cookies::CookiePolicy;
use super::error::AuthError;
use crate::credential::ClaimPolicy;
use crate::flow::FlowEngine;
use crate::oauth::ProviderConfig;

/// Shared auth settings used by both config and runtime state.
#[derive(Clone)]
pub(crate) struct AuthSettings {
    pub(crate) cookie_key: Key,
    pub(crate) session_cookie_name: String,
    pub(crate) cookie_prefix: String,
    pub(crate) cookie_policy: CookiePolicy,
    pub(crate) collection_slug: String,
    pub(crate) signing_secret: String,
    pub(crate) token_ttl: time::Duration,
    pub(crate) claim_policy: ClaimPolicy,
    pub(crate) authorize_path: String,
    pub(crate) redirect_path: String,
    pub(crate) refresh_path: String,
    pub(crate) logout_path: String,
    pub(crate) redirect_url: String,
    pub(crate) success_redirect: String,
    pub(crate) error_redirect: String,
    pub(crate) post_logout_redirect: Option<String>,
}

impl AuthSettings {
    fn defaults(redirect_url: String, signing_secret: String) -> Self {
        // The callback route is mounted where the registered redirect URL
        // points, unless overridden.
        let redirect_path = Url::parse(&redirect_url)
            .ok()
            .map(|u| u.path().to_string())
            .filter(|p| p != "/")
            .unwrap_or_else(|| "/msal/redirect".into());

        Self {
            cookie_key: Key::generate(),
            session_cookie_name: "__entra_session".into(),
            cookie_prefix: "entra".into(),
            cookie_policy: CookiePolicy::default(),
            collection_slug: "users".into(),
            signing_secret,
            token_ttl: time::Duration::hours(2),
            claim_policy: ClaimPolicy::default(),
            authorize_path: "/msal/authorize".into(),
            redirect_path,
            refresh_path: "/msal/refresh".into(),
            logout_path: "/msal/logout".into(),
            redirect_url,
            success_redirect: "/admin".into(),
            error_redirect: "/login".into(),
            post_logout_redirect: None,
        }
    }
}

/// Entra authentication configuration.
///
/// Required fields (`engine`, `redirect_url`, `signing_secret`) are
/// constructor parameters — no runtime "missing field" errors.
///
/// Use [`from_env()`](EntraAuthConfig::from_env) for convention-based setup,
/// or [`new()`](EntraAuthConfig::new) with `with_*` methods for full control.
pub struct EntraAuthConfig {
    pub(super) engine: FlowEngine,
    pub(super) settings: AuthSettings,
}

impl EntraAuthConfig {
    /// Create config with the required flow engine, registered redirect URL,
    /// and credential signing secret.
    ///
    /// All optional fields use sensible defaults. Override with `with_*`
    /// methods.
    #[must_use]
    pub fn new(
        engine: FlowEngine,
        redirect_url: impl Into<String>,
        signing_secret: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            settings: AuthSettings::defaults(redirect_url.into(), signing_secret.into()),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `ENTRA_CLIENT_ID`: OAuth2 client ID
    /// - `ENTRA_CLIENT_SECRET`: OAuth2 client secret
    /// - `ENTRA_TENANT_ID`: directory (tenant) identifier
    /// - `ENTRA_REDIRECT_URL`: registered callback URL (must be a valid URL)
    /// - `ENTRA_SIGNING_SECRET`: server secret for signing credentials
    ///
    /// # Optional env vars
    /// - `ENTRA_CLOUD_INSTANCE`: cloud base URL (default `https://login.microsoftonline.com/`)
    /// - `ENTRA_SCOPES`: comma-separated OAuth2 scopes
    /// - `ENTRA_SUCCESS_URL`: post-login redirect (default `/admin`)
    /// - `COOKIE_KEY`: cookie encryption key bytes (at least 64)
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if required env vars are missing or
    /// URLs are invalid.
    pub fn from_env() -> Result<Self, AuthError> {
        let client_id = require_env("ENTRA_CLIENT_ID")?;
        let client_secret = require_env("ENTRA_CLIENT_SECRET")?;
        let tenant_id = require_env("ENTRA_TENANT_ID")?;
        let redirect_url = require_env("ENTRA_REDIRECT_URL")?;
        let signing_secret = require_env("ENTRA_SIGNING_SECRET")?;

        let _: Url = redirect_url
            .parse()
            .map_err(|e| AuthError::Config(format!("ENTRA_REDIRECT_URL: {e}")))?;

        let mut provider = ProviderConfig::new(client_id, client_secret, tenant_id);

        if let Ok(url_str) = std::env::var("ENTRA_CLOUD_INSTANCE") {
            let url: Url = url_str
                .parse()
                .map_err(|e| AuthError::Config(format!("ENTRA_CLOUD_INSTANCE: {e}")))?;
            provider = provider.with_cloud_instance(url);
        }
        if let Ok(scopes) = std::env::var("ENTRA_SCOPES") {
            provider =
                provider.with_scopes(scopes.split(',').map(|s| s.trim().to_string()).collect());
        }

        let cookie_key = match std::env::var("COOKIE_KEY") {
            Ok(k) => Key::try_from(k.as_bytes()).map_err(|_| {
                AuthError::Config(
                    "COOKIE_KEY is set but invalid (must be at least 64 bytes). \
                     Remove the env var to use an ephemeral key, or provide a valid key."
                        .into(),
                )
            })?,
            Err(_) => Key::generate(),
        };

        let mut config = Self::new(FlowEngine::new(provider), redirect_url, signing_secret)
            .with_cookie_key(cookie_key);
        if let Ok(success) = std::env::var("ENTRA_SUCCESS_URL") {
            config = config.with_success_redirect(success);
        }
        Ok(config)
    }

    #[must_use]
    pub fn with_cookie_key(mut self, key: Key) -> Self {
        self.settings.cookie_key = key;
        self
    }

    #[must_use]
    pub fn with_session_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.settings.session_cookie_name = name.into();
        self
    }

    #[must_use]
    pub fn with_cookie_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.settings.cookie_prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn with_cookie_policy(mut self, policy: CookiePolicy) -> Self {
        self.settings.cookie_policy = policy;
        self
    }

    /// Collection name embedded in signed credentials (default `users`).
    #[must_use]
    pub fn with_collection_slug(mut self, slug: impl Into<String>) -> Self {
        self.settings.collection_slug = slug.into();
        self
    }

    #[must_use]
    pub fn with_token_ttl(mut self, ttl: time::Duration) -> Self {
        self.settings.token_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_claim_policy(mut self, policy: ClaimPolicy) -> Self {
        self.settings.claim_policy = policy;
        self
    }

    #[must_use]
    pub fn with_authorize_path(mut self, path: impl Into<String>) -> Self {
        self.settings.authorize_path = path.into();
        self
    }

    #[must_use]
    pub fn with_redirect_path(mut self, path: impl Into<String>) -> Self {
        self.settings.redirect_path = path.into();
        self
    }

    #[must_use]
    pub fn with_refresh_path(mut self, path: impl Into<String>) -> Self {
        self.settings.refresh_path = path.into();
        self
    }

    #[must_use]
    pub fn with_logout_path(mut self, path: impl Into<String>) -> Self {
        self.settings.logout_path = path.into();
        self
    }

    #[must_use]
    pub fn with_success_redirect(mut self, target: impl Into<String>) -> Self {
        self.settings.success_redirect = target.into();
        self
    }

    #[must_use]
    pub fn with_error_redirect(mut self, target: impl Into<String>) -> Self {
        self.settings.error_redirect = target.into();
        self
    }

    #[must_use]
    pub fn with_post_logout_redirect(mut self, target: impl Into<String>) -> Self {
        self.settings.post_logout_redirect = Some(target.into());
        self
    }
}

fn require_env(name: &'static str) -> Result<String, AuthError> {
    std::env::var(name).map_err(|_| AuthError::Config(format!("{name} is required")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> FlowEngine {
        FlowEngine::new(ProviderConfig::new("client-1", "secret-1", "tenant-1"))
    }

    #[test]
    fn redirect_path_derived_from_redirect_url() {
        let config = EntraAuthConfig::new(
            engine(),
            "https://app.example.com/oauth/entra/callback",
            "signing-secret",
        );
        assert_eq!(config.settings.redirect_path, "/oauth/entra/callback");
    }

    #[test]
    fn redirect_path_falls_back_for_bare_urls() {
        let config = EntraAuthConfig::new(engine(), "https://app.example.com/", "signing-secret");
        assert_eq!(config.settings.redirect_path, "/msal/redirect");
    }

    #[test]
    fn builder_overrides_apply() {
        let config = EntraAuthConfig::new(engine(), "https://app.example.com/cb", "s")
            .with_cookie_prefix("myapp")
            .with_collection_slug("members")
            .with_success_redirect("/dashboard")
            .with_token_ttl(time::Duration::minutes(30));

        assert_eq!(config.settings.cookie_prefix, "myapp");
        assert_eq!(config.settings.collection_slug, "members");
        assert_eq!(config.settings.success_redirect, "/dashboard");
        assert_eq!(config.settings.token_ttl, time::Duration::minutes(30));
    }
}
