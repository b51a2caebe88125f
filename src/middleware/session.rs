use axum_extra::extract::PrivateCookieJar;
use ulid::Ulid;

use super::error::AuthError;
use super::traits::SessionStore;
use crate::flow::AuthSession;
use crate::types::{Account, SessionId};

pub(super) fn mint_session_id() -> SessionId {
    SessionId(Ulid::new().to_string())
}

/// Read the full session snapshot at handler entry.
///
/// A missing session and an unreadable one both start fresh: the snapshot
/// schema may change between releases and a stale blob must not lock a user
/// out of logging in again.
pub(super) async fn load_session<S: SessionStore>(
    store: &S,
    id: &SessionId,
) -> Result<AuthSession, AuthError> {
    let Some(value) = store
        .get(id)
        .await
        .map_err(|e| AuthError::Store(e.to_string()))?
    else {
        return Ok(AuthSession::default());
    };

    match serde_json::from_value(value) {
        Ok(session) => Ok(session),
        Err(e) => {
            tracing::warn!(error = %e, "Stored session state unreadable, starting fresh");
            Ok(AuthSession::default())
        }
    }
}

/// Write the full session snapshot back at handler exit.
pub(super) async fn save_session<S: SessionStore>(
    store: &S,
    id: &SessionId,
    session: &AuthSession,
) -> Result<(), AuthError> {
    let value = serde_json::to_value(session).map_err(|e| AuthError::Store(e.to_string()))?;
    store
        .set(id, value)
        .await
        .map_err(|e| AuthError::Store(e.to_string()))
}

/// Resolve the authenticated account behind a request, if any.
///
/// For application middleware that wants to know who is logged in without
/// mounting anything: read the session-id cookie from the encrypted jar,
/// load the session, and return the bound account when it is authenticated.
pub async fn resolve_session<S: SessionStore>(
    store: &S,
    jar: &PrivateCookieJar,
    cookie_name: &str,
) -> Option<Account> {
    let cookie = jar.get(cookie_name)?;
    let id = SessionId(cookie.value().to_string());
    let value = store.get(&id).await.ok().flatten()?;
    let session: AuthSession = serde_json::from_value(value).ok()?;
    if session.is_authenticated {
        session.account
    } else {
        None
    }
}
