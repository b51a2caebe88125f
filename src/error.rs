/// Errors produced by the authentication core.
///
/// Variants map one-to-one onto the failure modes of the login flow so
/// callers can branch without string matching.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Provider discovery or OpenID configuration could not be fetched.
    #[error("provider metadata fetch failed: {0}")]
    MetadataFetch(String),

    /// Callback body carried no `state` parameter.
    #[error("callback response missing state parameter")]
    MissingState,

    /// Callback `state` does not match the most recently issued login,
    /// or no login is pending on this session.
    #[error("callback state does not match pending login")]
    StaleFlow,

    /// The anti-forgery state payload could not be encoded or decoded.
    #[error("invalid state payload: {0}")]
    InvalidState(String),

    /// Authorization code exchange at the token endpoint failed.
    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    /// Silent token acquisition failed and re-authentication will not help.
    #[error("silent token acquisition failed: {0}")]
    SilentAcquisition(String),

    /// Silent token acquisition needs the user back at the provider.
    ///
    /// Recoverable: restart the flow with
    /// [`FlowEngine::start_login`](crate::flow::FlowEngine::start_login).
    #[error("interaction required: {0}")]
    InteractionRequired(String),

    /// A user record for this email appeared concurrently and could not be
    /// read back after the unique-constraint violation.
    #[error("duplicate user for {0}")]
    DuplicateUser(String),

    /// Signing the local credential failed.
    #[error("credential signing failed: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    /// User or session store operation failed.
    #[error("store error: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Whether this error is recovered by restarting the login flow.
    #[must_use]
    pub fn is_interaction_required(&self) -> bool {
        matches!(self, Self::InteractionRequired(_))
    }
}
