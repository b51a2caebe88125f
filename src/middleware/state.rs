use std::sync::Arc;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;

use super::config::AuthSettings;
use super::traits::SessionStore;
use crate::flow::FlowEngine;
use crate::identity::UserStore;

/// Shared state for auth route handlers.
pub(super) struct AuthState<U, S> {
    pub(super) engine: Arc<FlowEngine>,
    pub(super) user_store: Arc<U>,
    pub(super) session_store: Arc<S>,
    pub(super) settings: AuthSettings,
}

// Manual Clone: avoid derive adding `U: Clone, S: Clone` bounds.
impl<U, S> Clone for AuthState<U, S> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            user_store: self.user_store.clone(),
            session_store: self.session_store.clone(),
            settings: self.settings.clone(),
        }
    }
}

// PrivateCookieJar requires Key to be extractable from state
impl<U: UserStore, S: SessionStore> FromRef<AuthState<U, S>> for Key {
    fn from_ref(state: &AuthState<U, S>) -> Self {
        state.settings.cookie_key.clone()
    }
}
