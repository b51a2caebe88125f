use std::sync::Arc;

use axum::extract::State;
use axum::{Form, Router};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum_extra::extract::{CookieJar, PrivateCookieJar};
use serde::Deserialize;

use super::config::{AuthSettings, EntraAuthConfig};
use super::cookies;
use super::session::{load_session, mint_session_id, save_session};
use super::state::AuthState;
use super::traits::SessionStore;
use crate::credential;
use crate::error::Error;
use crate::flow::{CallbackBody, LoginOptions};
use crate::identity::{self, UserStore};
use crate::types::SessionId;

/// Create the Entra authentication router.
pub fn auth_routes<U, S>(config: EntraAuthConfig, user_store: U, session_store: S) -> Router
where
    U: UserStore,
    S: SessionStore,
{
    let authorize_path = config.settings.authorize_path.clone();
    let redirect_path = config.settings.redirect_path.clone();
    let refresh_path = config.settings.refresh_path.clone();
    let logout_path = config.settings.logout_path.clone();

    let state = AuthState {
        engine: Arc::new(config.engine),
        user_store: Arc::new(user_store),
        session_store: Arc::new(session_store),
        settings: config.settings,
    };

    Router::new()
        .route(&authorize_path, get(authorize::<U, S>))
        .route(&redirect_path, post(callback::<U, S>))
        .route(&refresh_path, get(refresh::<U, S>))
        .route(&logout_path, get(logout::<U, S>).post(logout::<U, S>))
        .with_state(state)
}

// ── Authorize ──────────────────────────────────────────────────────

async fn authorize<U: UserStore, S: SessionStore>(
    State(state): State<AuthState<U, S>>,
    jar: PrivateCookieJar,
) -> Result<(PrivateCookieJar, Redirect), Response> {
    let (session_id, jar) = session_id_or_mint(&state.settings, jar);

    let mut session = load_session(state.session_store.as_ref(), &session_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Session load failed");
            login_error(&state.settings.error_redirect, "session_failed")
        })?;

    let url = state
        .engine
        .start_login(&mut session, &login_options(&state.settings))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Login start failed");
            login_error(&state.settings.error_redirect, error_code(&e))
        })?;

    save_session(state.session_store.as_ref(), &session_id, &session)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Session save failed");
            login_error(&state.settings.error_redirect, "session_failed")
        })?;

    Ok((jar, Redirect::to(url.as_str())))
}

// ── Callback ───────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

async fn callback<U: UserStore, S: SessionStore>(
    State(state): State<AuthState<U, S>>,
    jar: PrivateCookieJar,
    cookie_jar: CookieJar,
    Form(params): Form<CallbackParams>,
) -> Result<(PrivateCookieJar, CookieJar, Redirect), Response> {
    if let Some(error) = &params.error {
        let desc = params.error_description.as_deref().unwrap_or("Unknown error");
        tracing::warn!(error = %error, description = %desc, "OAuth2 error from provider");
        return Err(login_error(&state.settings.error_redirect, desc));
    }

    let session_id = jar
        .get(&state.settings.session_cookie_name)
        .map(|c| SessionId(c.value().to_string()))
        .ok_or_else(|| login_error(&state.settings.error_redirect, "missing_session"))?;

    let mut session = load_session(state.session_store.as_ref(), &session_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Session load failed");
            login_error(&state.settings.error_redirect, "session_failed")
        })?;

    let body = CallbackBody {
        state: params.state,
        code: params.code,
    };

    let outcome = match state.engine.handle_callback(&mut session, &body).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(error = %e, "Provider callback failed");
            // The pending flow was consumed; persist that so a replay of
            // this callback cannot try again with the same verifier.
            if let Err(save_err) =
                save_session(state.session_store.as_ref(), &session_id, &session).await
            {
                tracing::warn!(error = %save_err, "Session save failed after callback error");
            }
            return Err(login_error(&state.settings.error_redirect, error_code(&e)));
        }
    };

    let user = identity::resolve(state.user_store.as_ref(), &outcome.account)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Identity resolution failed");
            login_error(&state.settings.error_redirect, "identity_resolution_failed")
        })?;

    let token = credential::sign_credential(
        &user,
        &state.settings.collection_slug,
        &state.settings.claim_policy,
        &state.settings.signing_secret,
        state.settings.token_ttl,
    )
    .map_err(|e| {
        tracing::error!(error = %e, "Credential signing failed");
        login_error(&state.settings.error_redirect, "signing_failed")
    })?;

    save_session(state.session_store.as_ref(), &session_id, &session)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Session save failed");
            login_error(&state.settings.error_redirect, "session_failed")
        })?;

    let cookie_jar = cookie_jar.add(cookies::credential_cookie(
        &state.settings.cookie_prefix,
        &token,
        state.settings.token_ttl,
        &state.settings.cookie_policy,
    ));

    let target = outcome
        .success_redirect
        .unwrap_or_else(|| state.settings.success_redirect.clone());

    tracing::info!(username = %outcome.account.username, user_id = %user.id, "Login successful");

    Ok((jar, cookie_jar, Redirect::to(&target)))
}

// ── Silent refresh ─────────────────────────────────────────────────

async fn refresh<U: UserStore, S: SessionStore>(
    State(state): State<AuthState<U, S>>,
    jar: PrivateCookieJar,
) -> Result<(PrivateCookieJar, Redirect), Response> {
    let (session_id, jar) = session_id_or_mint(&state.settings, jar);

    let mut session = load_session(state.session_store.as_ref(), &session_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Session load failed");
            login_error(&state.settings.error_redirect, "session_failed")
        })?;

    let redirect = match state.engine.acquire_token_silent(&mut session, &[]).await {
        Ok(_) => Redirect::to(&state.settings.success_redirect),
        Err(e) if e.is_interaction_required() => {
            // Session expired at the provider: transparently re-authenticate
            // instead of surfacing an error.
            tracing::debug!(reason = %e, "Silent acquisition needs interaction, restarting login");
            let url = state
                .engine
                .start_login(&mut session, &login_options(&state.settings))
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, "Login restart failed");
                    login_error(&state.settings.error_redirect, error_code(&e))
                })?;
            Redirect::to(url.as_str())
        }
        Err(e) => {
            tracing::error!(error = %e, "Silent token acquisition failed");
            return Err(login_error(&state.settings.error_redirect, error_code(&e)));
        }
    };

    save_session(state.session_store.as_ref(), &session_id, &session)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Session save failed");
            login_error(&state.settings.error_redirect, "session_failed")
        })?;

    Ok((jar, redirect))
}

// ── Logout ─────────────────────────────────────────────────────────

async fn logout<U: UserStore, S: SessionStore>(
    State(state): State<AuthState<U, S>>,
    jar: PrivateCookieJar,
    cookie_jar: CookieJar,
) -> (PrivateCookieJar, CookieJar, Redirect) {
    // Best effort: logout never fails visibly, whatever the store does.
    if let Some(cookie) = jar.get(&state.settings.session_cookie_name) {
        let session_id = SessionId(cookie.value().to_string());
        if let Err(e) = state.session_store.destroy(&session_id).await {
            tracing::warn!(error = %e, "Session destruction failed during logout");
        }
    }

    let jar = jar.remove(cookies::clear_session_cookie(
        &state.settings.session_cookie_name,
    ));
    let cookie_jar = cookie_jar.remove(cookies::clear_credential_cookie(
        &state.settings.cookie_prefix,
    ));

    let url = state
        .engine
        .logout_url(state.settings.post_logout_redirect.as_deref());

    tracing::info!("Logout completed");
    (jar, cookie_jar, Redirect::to(&url))
}

// ── Helpers ────────────────────────────────────────────────────────

fn session_id_or_mint(
    settings: &AuthSettings,
    jar: PrivateCookieJar,
) -> (SessionId, PrivateCookieJar) {
    if let Some(cookie) = jar.get(&settings.session_cookie_name) {
        (SessionId(cookie.value().to_string()), jar)
    } else {
        let session_id = mint_session_id();
        let cookie = cookies::session_cookie(
            &settings.session_cookie_name,
            &session_id.to_string(),
            &settings.cookie_policy,
        );
        (session_id, jar.add(cookie))
    }
}

fn login_options(settings: &AuthSettings) -> LoginOptions {
    LoginOptions::new(settings.redirect_url.clone())
        .with_success_redirect(settings.success_redirect.clone())
}

fn login_error(error_redirect: &str, code: &str) -> Response {
    let encoded = urlencoding::encode(code);
    Redirect::to(&format!("{error_redirect}?error={encoded}")).into_response()
}

fn error_code(error: &Error) -> &'static str {
    match error {
        Error::MetadataFetch(_) => "metadata_failed",
        Error::MissingState => "missing_state",
        Error::StaleFlow => "state_mismatch",
        Error::InvalidState(_) => "invalid_state",
        Error::TokenExchange(_) => "token_exchange_failed",
        Error::SilentAcquisition(_) => "silent_acquisition_failed",
        Error::InteractionRequired(_) => "interaction_required",
        Error::DuplicateUser(_) => "identity_resolution_failed",
        Error::Signing(_) => "signing_failed",
        Error::Store(_) => "store_failed",
    }
}
