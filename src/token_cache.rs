use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::oauth::TokenResponse;

/// Margin subtracted from token expiry so a token is never served right at
/// the edge of its lifetime.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Opaque serialized form of a [`TokenCache`], stored in the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenCacheBlob(pub String);

/// Tokens acquired for one session.
///
/// Deserialized from the session blob before each silent attempt and
/// re-serialized immediately after any acquisition, so a crash after a token
/// operation never loses a freshly acquired token.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenCache {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    /// Unix timestamp after which `access_token` is no longer usable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    /// Scopes granted with the current access token.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
}

impl TokenCache {
    /// Restores a cache from its session blob.
    ///
    /// # Errors
    ///
    /// Returns the underlying JSON error when the blob is corrupt; callers
    /// treat that as a cold cache, not a fatal failure.
    pub fn deserialize(blob: &TokenCacheBlob) -> Result<Self, serde_json::Error> {
        serde_json::from_str(&blob.0)
    }

    /// Serializes the cache into its session blob.
    #[must_use]
    pub fn serialize(&self) -> TokenCacheBlob {
        TokenCacheBlob(serde_json::to_string(self).expect("token cache serializes to JSON"))
    }

    /// Records the result of a token acquisition.
    ///
    /// A response without a refresh token keeps the previous one — the
    /// provider may rotate it on some grants and omit it on others.
    pub fn apply(&mut self, response: &TokenResponse, requested_scopes: &[String]) {
        self.access_token = Some(response.access_token.clone());
        if let Some(refresh) = &response.refresh_token {
            self.refresh_token = Some(refresh.clone());
        }
        if let Some(id_token) = &response.id_token {
            self.id_token = Some(id_token.clone());
        }
        self.expires_at = response
            .expires_in
            .map(|secs| OffsetDateTime::now_utc().unix_timestamp() + secs as i64);
        self.scopes = match &response.scope {
            Some(granted) => granted.split_whitespace().map(String::from).collect(),
            None => requested_scopes.to_vec(),
        };
    }

    /// Access token still valid (with skew margin) and covering `scopes`.
    #[must_use]
    pub fn valid_access_token(&self, scopes: &[String]) -> Option<&str> {
        let token = self.access_token.as_deref()?;
        let expires_at = self.expires_at?;
        if OffsetDateTime::now_utc().unix_timestamp() + EXPIRY_SKEW_SECS >= expires_at {
            return None;
        }
        if !scopes.iter().all(|s| self.scopes.contains(s)) {
            return None;
        }
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(expires_in: Option<u64>, scope: Option<&str>) -> TokenResponse {
        serde_json::from_value(serde_json::json!({
            "access_token": "at-1",
            "token_type": "Bearer",
            "expires_in": expires_in,
            "refresh_token": "rt-1",
            "id_token": "id-1",
            "scope": scope,
        }))
        .unwrap()
    }

    #[test]
    fn blob_roundtrip() {
        let mut cache = TokenCache::default();
        cache.apply(&response(Some(3600), Some("openid profile")), &[]);

        let blob = cache.serialize();
        let restored = TokenCache::deserialize(&blob).unwrap();
        assert_eq!(restored.access_token.as_deref(), Some("at-1"));
        assert_eq!(restored.refresh_token.as_deref(), Some("rt-1"));
        assert_eq!(restored.scopes, vec!["openid", "profile"]);
    }

    #[test]
    fn deserialize_rejects_corrupt_blob() {
        assert!(TokenCache::deserialize(&TokenCacheBlob("{not json".into())).is_err());
    }

    #[test]
    fn valid_access_token_honors_expiry_skew() {
        let mut cache = TokenCache::default();
        cache.apply(&response(Some(3600), Some("openid")), &[]);
        assert!(cache.valid_access_token(&["openid".into()]).is_some());

        // 30s of life left is inside the skew margin
        cache.expires_at = Some(OffsetDateTime::now_utc().unix_timestamp() + 30);
        assert!(cache.valid_access_token(&["openid".into()]).is_none());
    }

    #[test]
    fn valid_access_token_requires_scope_coverage() {
        let mut cache = TokenCache::default();
        cache.apply(&response(Some(3600), Some("openid")), &[]);
        assert!(cache.valid_access_token(&["openid".into(), "mail.read".into()]).is_none());
    }

    #[test]
    fn apply_keeps_previous_refresh_token() {
        let mut cache = TokenCache::default();
        cache.apply(&response(Some(3600), None), &["openid".into()]);
        assert_eq!(cache.scopes, vec!["openid"]);

        let without_refresh: TokenResponse = serde_json::from_value(serde_json::json!({
            "access_token": "at-2",
            "token_type": "Bearer",
            "expires_in": 3600,
        }))
        .unwrap();
        cache.apply(&without_refresh, &[]);
        assert_eq!(cache.refresh_token.as_deref(), Some("rt-1"));
        assert_eq!(cache.access_token.as_deref(), Some("at-2"));
    }
}
