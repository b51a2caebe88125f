use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Claims carried in the provider's ID token.
///
/// Standard OIDC claims are typed; anything else the provider asserts is
/// retained in `extra` so no claim is lost between exchange and session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct IdTokenClaims {
    /// Subject identifier, unique per user within the provider.
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    /// Directory object id of the user (Entra-specific).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oid: Option<String>,
    /// Tenant id the user authenticated against (Entra-specific).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Resolved provider identity, immutable once decoded from the ID token.
///
/// `username` is the unique external identifier (an email-shaped string) and
/// is the sole link between the provider identity and the local user record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Account {
    /// `{oid}.{tid}` when both are present, otherwise the `sub` claim.
    pub home_account_id: String,
    /// Email-shaped unique identifier (`preferred_username` or `email` claim).
    pub username: String,
    /// Provider-local account id (`oid` claim, falling back to `sub`).
    pub local_account_id: String,
    /// Display name, when the provider asserts one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Raw ID-token claims as received.
    pub claims: IdTokenClaims,
}

impl Account {
    /// Builds an account from decoded ID-token claims.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TokenExchange`] if the token carries neither a
    /// `preferred_username` nor an `email` claim — without an email-shaped
    /// identifier the identity cannot be bound to a local user.
    pub fn from_claims(claims: IdTokenClaims) -> Result<Self, Error> {
        let username = claims
            .preferred_username
            .clone()
            .or_else(|| claims.email.clone())
            .ok_or_else(|| {
                Error::TokenExchange("id token carries no username or email claim".into())
            })?;

        let home_account_id = match (&claims.oid, &claims.tid) {
            (Some(oid), Some(tid)) => format!("{oid}.{tid}"),
            _ => claims.sub.clone(),
        };
        let local_account_id = claims.oid.clone().unwrap_or_else(|| claims.sub.clone());

        Ok(Self {
            home_account_id,
            username,
            local_account_id,
            name: claims.name.clone(),
            claims,
        })
    }
}

/// Consumer-defined user identifier (opaque string).
///
/// Returned by [`UserStore`](crate::identity::UserStore) implementations.
/// The consumer chooses the format (ULID, UUID, database id, etc.).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct UserId(pub String);

/// Opaque session identifier keyed into the session store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct SessionId(pub String);

/// The application's own identity record.
///
/// `email` equals the provider account's `username` and is unique in the
/// store. `profile` holds whatever fields the application schema defines;
/// only fields allow-listed by a
/// [`ClaimPolicy`](crate::credential::ClaimPolicy) end up in signed
/// credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalUser {
    pub id: UserId,
    pub email: String,
    #[serde(default)]
    pub profile: serde_json::Map<String, serde_json::Value>,
}

/// Record handed to [`UserStore::create`](crate::identity::UserStore::create)
/// when a provider identity logs in for the first time.
///
/// `password` is a generated high-entropy placeholder: authentication is
/// delegated to the provider and the credential is never used interactively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub password: String,
}
