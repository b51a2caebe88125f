use std::future::Future;

use rand::Rng;
use rand::distr::Alphanumeric;

use crate::error::Error;
use crate::types::{Account, LocalUser, NewUser};

/// Length of the generated placeholder credential for new users.
const PASSWORD_LEN: usize = 20;

/// Errors a [`UserStore`] implementation can surface.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    /// A unique constraint (the `email` index) rejected the write.
    ///
    /// Surfacing this distinctly is what turns a concurrent first-time
    /// login race into a retryable lookup instead of a duplicate record.
    #[error("unique constraint violation")]
    Duplicate,

    /// Any other store failure.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Consumer-provided user-record store.
///
/// The store is expected to enforce a unique index on `email` and to return
/// matches in a stable order (lowest internal id first).
///
/// # Example
///
/// ```rust,ignore
/// impl UserStore for MyAppState {
///     async fn find_by_email(&self, email: &str) -> Result<Vec<LocalUser>, StoreError> {
///         self.repo.users_by_email(email).await.map_err(|e| StoreError::Other(e.into()))
///     }
///
///     async fn create(&self, user: NewUser) -> Result<LocalUser, StoreError> {
///         match self.repo.insert_user(&user).await {
///             Err(e) if e.is_unique_violation() => Err(StoreError::Duplicate),
///             other => other.map_err(|e| StoreError::Other(e.into())),
///         }
///     }
/// }
/// ```
pub trait UserStore: Send + Sync + 'static {
    /// All users whose `email` equals the argument, in stable order.
    fn find_by_email(
        &self,
        email: &str,
    ) -> impl Future<Output = Result<Vec<LocalUser>, StoreError>> + Send;

    /// Insert a new user record.
    fn create(&self, user: NewUser) -> impl Future<Output = Result<LocalUser, StoreError>> + Send;
}

/// Maps a validated provider account to a local user record.
///
/// Looks up by `account.username`; creates the record with a generated
/// placeholder credential when absent. Safe to call repeatedly for the same
/// account: a unique-constraint race during creation is retried as a lookup.
///
/// # Errors
///
/// - [`Error::DuplicateUser`] when the store reported a duplicate but the
///   retry lookup still found nothing.
/// - [`Error::Store`] for any other store failure.
pub async fn resolve<U: UserStore>(store: &U, account: &Account) -> Result<LocalUser, Error> {
    let email = account.username.as_str();

    if let Some(user) = lookup(store, email).await? {
        return Ok(user);
    }

    let new_user = NewUser {
        email: email.to_string(),
        password: generate_password(PASSWORD_LEN),
    };

    match store.create(new_user).await {
        Ok(user) => {
            tracing::info!(email = %email, "Created local user for provider identity");
            Ok(user)
        }
        Err(StoreError::Duplicate) => {
            tracing::warn!(email = %email, "Concurrent first-time login, retrying as lookup");
            lookup(store, email)
                .await?
                .ok_or_else(|| Error::DuplicateUser(email.to_string()))
        }
        Err(StoreError::Other(e)) => Err(Error::Store(e)),
    }
}

async fn lookup<U: UserStore>(store: &U, email: &str) -> Result<Option<LocalUser>, Error> {
    let mut users = store
        .find_by_email(email)
        .await
        .map_err(|e| Error::Store(Box::new(e)))?;

    if users.len() > 1 {
        tracing::warn!(
            email = %email,
            count = users.len(),
            "Multiple local users share one email; taking the first"
        );
    }

    Ok(if users.is_empty() {
        None
    } else {
        Some(users.remove(0))
    })
}

/// Generates the placeholder credential stored on auto-created users.
///
/// Not derived from any provider secret; never used for interactive login.
fn generate_password(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{IdTokenClaims, UserId};
    use std::sync::Mutex;

    struct MemoryStore {
        users: Mutex<Vec<LocalUser>>,
        passwords: Mutex<Vec<String>>,
        next_id: Mutex<u64>,
        fail_next_create_as_duplicate: Mutex<bool>,
    }

    impl MemoryStore {
        fn new() -> Self {
            Self {
                users: Mutex::new(Vec::new()),
                passwords: Mutex::new(Vec::new()),
                next_id: Mutex::new(1),
                fail_next_create_as_duplicate: Mutex::new(false),
            }
        }

        fn insert(&self, email: &str) -> LocalUser {
            let mut id = self.next_id.lock().unwrap();
            let user = LocalUser {
                id: UserId(format!("user-{}", *id)),
                email: email.to_string(),
                profile: serde_json::Map::new(),
            };
            *id += 1;
            self.users.lock().unwrap().push(user.clone());
            user
        }
    }

    impl UserStore for MemoryStore {
        async fn find_by_email(&self, email: &str) -> Result<Vec<LocalUser>, StoreError> {
            Ok(self
                .users
                .lock()
                .unwrap()
                .iter()
                .filter(|u| u.email == email)
                .cloned()
                .collect())
        }

        async fn create(&self, user: NewUser) -> Result<LocalUser, StoreError> {
            if std::mem::take(&mut *self.fail_next_create_as_duplicate.lock().unwrap()) {
                // another login created the row between our lookup and create
                self.insert(&user.email);
                return Err(StoreError::Duplicate);
            }
            self.passwords.lock().unwrap().push(user.password.clone());
            Ok(self.insert(&user.email))
        }
    }

    fn account(username: &str) -> Account {
        Account::from_claims(
            serde_json::from_value::<IdTokenClaims>(serde_json::json!({
                "sub": format!("sub-{username}"),
                "preferred_username": username,
            }))
            .unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn resolve_creates_then_finds() {
        let store = MemoryStore::new();
        let account = account("jane@example.com");

        let first = resolve(&store, &account).await.unwrap();
        assert_eq!(first.email, "jane@example.com");

        let second = resolve(&store, &account).await.unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(store.users.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn resolve_generates_distinct_nonempty_credentials() {
        let store = MemoryStore::new();
        resolve(&store, &account("a@example.com")).await.unwrap();
        resolve(&store, &account("b@example.com")).await.unwrap();

        let passwords = store.passwords.lock().unwrap();
        assert_eq!(passwords.len(), 2);
        assert_eq!(passwords[0].len(), PASSWORD_LEN);
        assert!(!passwords[0].is_empty());
        assert_ne!(passwords[0], passwords[1]);
    }

    #[tokio::test]
    async fn resolve_retries_duplicate_as_lookup() {
        let store = MemoryStore::new();
        *store.fail_next_create_as_duplicate.lock().unwrap() = true;

        let user = resolve(&store, &account("raced@example.com")).await.unwrap();
        assert_eq!(user.email, "raced@example.com");
        assert_eq!(store.users.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn resolve_takes_first_of_multiple_matches() {
        let store = MemoryStore::new();
        let first = store.insert("dup@example.com");
        store.insert("dup@example.com");

        let user = resolve(&store, &account("dup@example.com")).await.unwrap();
        assert_eq!(user.id, first.id);
        assert_eq!(store.users.lock().unwrap().len(), 2);
    }
}
