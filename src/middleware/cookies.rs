use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

/// Cookie attributes taken from the application's policy, not hardcoded.
#[derive(Debug, Clone)]
pub struct CookiePolicy {
    pub secure: bool,
    pub same_site: SameSite,
    pub domain: Option<String>,
}

impl Default for CookiePolicy {
    fn default() -> Self {
        Self {
            secure: true,
            same_site: SameSite::Lax,
            domain: None,
        }
    }
}

/// Create the session-id cookie (encrypted jar, lives for the browser session).
pub(super) fn session_cookie(
    name: &str,
    session_id: &str,
    policy: &CookiePolicy,
) -> Cookie<'static> {
    let mut builder = Cookie::build((name.to_string(), session_id.to_string()))
        .http_only(true)
        .secure(policy.secure)
        .same_site(policy.same_site)
        .path("/".to_string());
    if let Some(domain) = &policy.domain {
        builder = builder.domain(domain.clone());
    }
    builder.build()
}

/// Create removal cookie for the session id.
pub(super) fn clear_session_cookie(name: &str) -> Cookie<'static> {
    Cookie::build((name.to_string(), ""))
        .path("/".to_string())
        .max_age(Duration::ZERO)
        .build()
}

/// Create the signed-credential cookie: `<prefix>-token`, HTTP-only, path `/`.
pub(super) fn credential_cookie(
    prefix: &str,
    token: &str,
    ttl: Duration,
    policy: &CookiePolicy,
) -> Cookie<'static> {
    let mut builder = Cookie::build((format!("{prefix}-token"), token.to_string()))
        .http_only(true)
        .secure(policy.secure)
        .same_site(policy.same_site)
        .path("/".to_string())
        .max_age(ttl);
    if let Some(domain) = &policy.domain {
        builder = builder.domain(domain.clone());
    }
    builder.build()
}

/// Create removal cookie for the signed credential.
pub(super) fn clear_credential_cookie(prefix: &str) -> Cookie<'static> {
    Cookie::build((format!("{prefix}-token"), ""))
        .path("/".to_string())
        .max_age(Duration::ZERO)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_cookie_shape() {
        let cookie = credential_cookie(
            "entra",
            "jwt-value",
            Duration::hours(2),
            &CookiePolicy::default(),
        );
        assert_eq!(cookie.name(), "entra-token");
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.max_age(), Some(Duration::hours(2)));
    }

    #[test]
    fn cookie_policy_is_honored() {
        let policy = CookiePolicy {
            secure: false,
            same_site: SameSite::Strict,
            domain: Some("app.example.com".into()),
        };
        let cookie = credential_cookie("entra", "jwt-value", Duration::hours(1), &policy);
        assert_eq!(cookie.secure(), Some(false));
        assert_eq!(cookie.same_site(), Some(SameSite::Strict));
        assert_eq!(cookie.domain(), Some("app.example.com"));
    }

    #[test]
    fn clear_cookies_expire_immediately() {
        assert_eq!(clear_session_cookie("__entra_session").max_age(), Some(Duration::ZERO));
        assert_eq!(clear_credential_cookie("entra").max_age(), Some(Duration::ZERO));
    }
}
