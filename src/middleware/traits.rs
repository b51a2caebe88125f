use std::future::Future;

use crate::types::SessionId;

/// Consumer-provided session persistence.
///
/// The store holds arbitrary serializable session state keyed by an opaque
/// [`SessionId`] — it never interprets the payload, so any backing store
/// (database table, Redis, in-memory map) works unchanged.
///
/// # Example
///
/// ```rust,ignore
/// impl SessionStore for MyAppState {
///     async fn get(&self, id: &SessionId) -> Result<Option<serde_json::Value>, ...> {
///         self.db.session_state(id.as_ref()).await
///     }
///
///     async fn set(&self, id: &SessionId, state: serde_json::Value) -> Result<(), ...> {
///         self.db.upsert_session(id.as_ref(), &state).await
///     }
///
///     async fn destroy(&self, id: &SessionId) -> Result<(), ...> {
///         self.db.delete_session(id.as_ref()).await
///     }
/// }
/// ```
pub trait SessionStore: Send + Sync + 'static {
    /// Session state for the ID, or `None` when no session exists.
    fn get(
        &self,
        session_id: &SessionId,
    ) -> impl Future<Output = Result<Option<serde_json::Value>, Box<dyn std::error::Error + Send + Sync>>>
           + Send;

    /// Replace the full session state for the ID.
    fn set(
        &self,
        session_id: &SessionId,
        state: serde_json::Value,
    ) -> impl Future<Output = Result<(), Box<dyn std::error::Error + Send + Sync>>> + Send;

    /// Delete the session (logout).
    fn destroy(
        &self,
        session_id: &SessionId,
    ) -> impl Future<Output = Result<(), Box<dyn std::error::Error + Send + Sync>>> + Send;
}
