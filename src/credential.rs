use jsonwebtoken::{EncodingKey, Header};
use time::OffsetDateTime;

use crate::error::Error;
use crate::types::LocalUser;

/// Which profile fields may be copied into signed credentials.
///
/// Default-deny: only `email`, `id` and `collection` are always present;
/// every other field must be allow-listed explicitly.
#[derive(Debug, Clone, Default)]
pub struct ClaimPolicy {
    fields: Vec<String>,
}

impl ClaimPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark one profile field as claim-eligible.
    #[must_use]
    pub fn allow(mut self, field: impl Into<String>) -> Self {
        self.fields.push(field.into());
        self
    }

    /// Replace the allowlist wholesale.
    #[must_use]
    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = fields;
        self
    }

    /// Claim-eligible profile fields.
    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }
}

/// Signs the local credential for a resolved user.
///
/// Claims are `{email, id, collection, iat, exp}` plus the profile fields
/// the policy allows. Reserved claims cannot be shadowed by profile fields.
///
/// # Errors
///
/// Returns [`Error::Signing`] when encoding fails.
pub fn sign_credential(
    user: &LocalUser,
    collection: &str,
    policy: &ClaimPolicy,
    secret: &str,
    ttl: time::Duration,
) -> Result<String, Error> {
    let now = OffsetDateTime::now_utc().unix_timestamp();

    let mut claims = serde_json::Map::new();
    for field in policy.fields() {
        if let Some(value) = user.profile.get(field) {
            claims.insert(field.clone(), value.clone());
        }
    }
    // Reserved claims go last so an allow-listed field cannot shadow them.
    claims.insert("email".into(), user.email.clone().into());
    claims.insert("id".into(), user.id.to_string().into());
    claims.insert("collection".into(), collection.into());
    claims.insert("iat".into(), now.into());
    claims.insert("exp".into(), (now + ttl.whole_seconds()).into());

    let token = jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}
