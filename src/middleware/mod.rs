//! Plug-and-play Entra ID authentication middleware for Axum.
//!
//! This module eliminates OpenID Connect boilerplate for Axum applications
//! delegating login to Microsoft Entra ID (Azure AD): authorization code
//! flow with PKCE, local user binding, and a signed credential cookie.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use entra_login::middleware::{EntraAuthConfig, auth_routes, resolve_session};
//!
//! // 1. Implement UserStore and SessionStore traits for your app
//! // 2. Configure from environment
//! let config = EntraAuthConfig::from_env()?;
//!
//! // 3. Mount auth routes
//! let app = axum::Router::new()
//!     .merge(auth_routes(config, user_store, session_store));
//!
//! // 4. Use resolve_session() in your own middleware
//! let account = resolve_session(&session_store, &jar, "__entra_session").await;
//! ```

mod config;
mod cookies;
mod error;
mod routes;
mod session;
mod state;
mod traits;

pub use config::EntraAuthConfig;
pub use cookies::CookiePolicy;
pub use error::AuthError;
pub use routes::auth_routes;
pub use session::resolve_session;
pub use traits::SessionStore;

/// Re-export cookie types for builder API.
pub use axum_extra::extract::cookie::{Key as CookieKey, SameSite};
