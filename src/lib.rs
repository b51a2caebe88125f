#![doc = include_str!("../README.md")]

pub mod credential;
pub mod error;
pub mod flow;
pub mod identity;
pub mod metadata;
#[cfg(feature = "middleware")]
pub mod middleware;
pub mod oauth;
pub mod pkce;
pub mod token_cache;
pub mod types;

// Re-exports for convenient access
pub use credential::{ClaimPolicy, sign_credential};
pub use error::Error;
pub use flow::{
    AuthSession, CallbackBody, CallbackOutcome, FlowEngine, FlowState, LoginOptions, StatePayload,
    TokenSet,
};
pub use identity::{StoreError, UserStore, resolve};
pub use metadata::{MetadataCache, OpenIdConfiguration, ProviderMetadata};
pub use oauth::{AuthClient, ProviderConfig, TokenResponse};
pub use pkce::{
    decode_state, encode_state, generate_code_challenge, generate_code_verifier, generate_state,
};
pub use token_cache::{TokenCache, TokenCacheBlob};
pub use types::{Account, IdTokenClaims, LocalUser, NewUser, SessionId, UserId};
