//! Local accounts and federated identity reconciliation
//!
//! Local signup/login and federated logins converge on one user per email. A
//! federated login for an email that already has an account attaches to it; the
//! stored record is returned unchanged even if the provider's profile differs.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{IdentityError, StoreError};
use crate::federated::FederatedProfile;
use crate::model::{AuthProvider, NewUser, User};
use crate::password::PasswordHasher;
use crate::store::UserStore;

type Result<T> = std::result::Result<T, IdentityError>;

/// Normalizes an email for storage and lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

pub struct IdentityService {
    users: Arc<dyn UserStore>,
    hasher: PasswordHasher,
    /// Verified against when the email is unknown, so both login failures cost the same
    dummy_hash: String,
}

impl IdentityService {
    pub fn new(users: Arc<dyn UserStore>, hasher: PasswordHasher) -> Result<Self> {
        let dummy_hash = hasher
            .hash("dummy-password-for-unknown-accounts")
            .map_err(|e| IdentityError::Hashing(e.to_string()))?;

        Ok(Self {
            users,
            hasher,
            dummy_hash,
        })
    }

    /// Creates a local account.
    pub async fn signup(&self, username: &str, email: &str, password: &str) -> Result<User> {
        let username = username.trim();
        let email = normalize_email(email);

        if username.is_empty() {
            return Err(IdentityError::InvalidInput("Username is required".to_string()));
        }
        if !is_plausible_email(&email) {
            return Err(IdentityError::InvalidInput("Invalid email address".to_string()));
        }
        if password.is_empty() {
            return Err(IdentityError::InvalidInput("Password is required".to_string()));
        }

        let hasher = self.hasher;
        let password = password.to_owned();
        let password_hash = tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| IdentityError::Hashing(e.to_string()))?
            .map_err(|e| IdentityError::Hashing(e.to_string()))?;

        let new_user = NewUser {
            username: username.to_owned(),
            email,
            password_hash: Some(password_hash),
            auth_provider: AuthProvider::Local,
            federated_id: None,
            profile_picture: None,
        };

        match self.users.insert_user(new_user).await {
            Ok(user) => {
                info!(user_id = %user.id, "User signed up");
                Ok(user)
            }
            Err(StoreError::Conflict(_)) => {
                debug!("Signup rejected, email already registered");
                Err(IdentityError::EmailTaken)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Checks email and password.
    ///
    /// Unknown email, federation-only account and wrong password are all
    /// [`IdentityError::InvalidCredentials`].
    pub async fn login(&self, email: &str, password: &str) -> Result<User> {
        let email = normalize_email(email);
        let user = self.users.find_user_by_email(&email).await?;

        let hash = user
            .as_ref()
            .and_then(|u| u.password_hash.clone())
            .unwrap_or_else(|| self.dummy_hash.clone());

        let hasher = self.hasher;
        let password = password.to_owned();
        let matches = tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .map_err(|e| IdentityError::Hashing(e.to_string()))?;

        match user {
            Some(user) if matches && user.password_hash.is_some() => {
                debug!(user_id = %user.id, "Login succeeded");
                Ok(user)
            }
            _ => {
                debug!("Login rejected");
                Err(IdentityError::InvalidCredentials)
            }
        }
    }

    /// Maps a federated profile to a local user, creating one on first login.
    ///
    /// Concurrent first logins for the same email race on the store's unique email
    /// index; the loser re-reads the winner's record instead of failing.
    pub async fn resolve_federated_user(&self, profile: FederatedProfile) -> Result<User> {
        let email = profile
            .email
            .as_deref()
            .map(normalize_email)
            .filter(|email| !email.is_empty())
            .ok_or(IdentityError::MissingEmail)?;

        if let Some(user) = self.users.find_user_by_email(&email).await? {
            debug!(user_id = %user.id, "Federated login attached to existing user");
            return Ok(user);
        }

        let username = profile
            .display_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_owned());

        let new_user = NewUser {
            username,
            email: email.clone(),
            password_hash: None,
            auth_provider: AuthProvider::Google,
            federated_id: profile.external_id,
            profile_picture: profile.picture,
        };

        match self.users.insert_user(new_user).await {
            Ok(user) => {
                info!(user_id = %user.id, "Federated user created");
                Ok(user)
            }
            Err(StoreError::Conflict(_)) => {
                debug!("Federated user created concurrently, re-fetching");
                self.users
                    .find_user_by_email(&email)
                    .await?
                    .ok_or_else(|| {
                        warn!("User vanished between conflict and re-fetch");
                        IdentityError::Store(StoreError::Unavailable(
                            "user disappeared during reconciliation".to_string(),
                        ))
                    })
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn find_user(&self, id: &str) -> Result<User> {
        self.users
            .find_user_by_id(id)
            .await?
            .ok_or(IdentityError::UserNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::RedbStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn temp_store() -> (Arc<RedbStore>, NamedTempFile) {
        let temp_db = NamedTempFile::new().expect("Failed to create temp file");
        let store = RedbStore::open(temp_db.path().to_str().unwrap(), Duration::from_secs(5))
            .expect("Failed to initialize test database");
        (Arc::new(store), temp_db)
    }

    fn service(store: Arc<dyn UserStore>) -> IdentityService {
        IdentityService::new(store, PasswordHasher::new(4)).unwrap()
    }

    fn google_profile(email: Option<&str>) -> FederatedProfile {
        FederatedProfile {
            email: email.map(str::to_string),
            display_name: Some("Alice G".to_string()),
            external_id: Some("g-1".to_string()),
            picture: Some("https://pics.example/a.png".to_string()),
        }
    }

    #[tokio::test]
    async fn signup_then_login() {
        let (store, _temp_db) = temp_store();
        let identity = service(store);

        let user = identity.signup("alice", "Alice@X.com ", "pw").await.unwrap();
        assert_eq!(user.email, "alice@x.com");
        assert_eq!(user.auth_provider, AuthProvider::Local);

        let logged_in = identity.login("ALICE@x.com", "pw").await.unwrap();
        assert_eq!(logged_in.id, user.id);
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_look_the_same() {
        let (store, _temp_db) = temp_store();
        let identity = service(store);
        identity.signup("alice", "alice@x.com", "pw").await.unwrap();

        let wrong = identity.login("alice@x.com", "wrong-pw").await.unwrap_err();
        let unknown = identity.login("nobody@x.com", "pw").await.unwrap_err();
        assert!(matches!(wrong, IdentityError::InvalidCredentials));
        assert!(matches!(unknown, IdentityError::InvalidCredentials));
    }

    #[tokio::test]
    async fn duplicate_signup_is_email_taken() {
        let (store, _temp_db) = temp_store();
        let identity = service(store);
        identity.signup("alice", "alice@x.com", "pw").await.unwrap();

        let err = identity
            .signup("alice2", "ALICE@x.com", "pw2")
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::EmailTaken));
    }

    #[tokio::test]
    async fn signup_validates_input() {
        let (store, _temp_db) = temp_store();
        let identity = service(store);

        for (username, email, password) in [
            ("", "a@x.com", "pw"),
            ("alice", "not-an-email", "pw"),
            ("alice", "a@x.com", ""),
        ] {
            let err = identity.signup(username, email, password).await.unwrap_err();
            assert!(matches!(err, IdentityError::InvalidInput(_)));
        }
    }

    #[tokio::test]
    async fn federated_login_creates_then_reuses_user() {
        let (store, _temp_db) = temp_store();
        let identity = service(store);

        let first = identity
            .resolve_federated_user(google_profile(Some("alice@x.com")))
            .await
            .unwrap();
        assert_eq!(first.auth_provider, AuthProvider::Google);
        assert!(first.password_hash.is_none());
        assert_eq!(first.username, "Alice G");

        let mut changed = google_profile(Some("Alice@X.com"));
        changed.display_name = Some("Renamed".to_string());
        let second = identity.resolve_federated_user(changed).await.unwrap();
        assert_eq!(second, first);
    }

    #[tokio::test]
    async fn federated_login_attaches_to_local_account() {
        let (store, _temp_db) = temp_store();
        let identity = service(store);
        let local = identity.signup("alice", "alice@x.com", "pw").await.unwrap();

        let federated = identity
            .resolve_federated_user(google_profile(Some("alice@x.com")))
            .await
            .unwrap();
        assert_eq!(federated.id, local.id);
        assert_eq!(federated.auth_provider, AuthProvider::Local);
    }

    #[tokio::test]
    async fn federated_login_without_email_fails() {
        let (store, _temp_db) = temp_store();
        let identity = service(store);

        let err = identity
            .resolve_federated_user(google_profile(None))
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::MissingEmail));

        let err = identity
            .resolve_federated_user(google_profile(Some("  ")))
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::MissingEmail));
    }

    #[tokio::test]
    async fn federated_only_account_cannot_password_login() {
        let (store, _temp_db) = temp_store();
        let identity = service(store);
        identity
            .resolve_federated_user(google_profile(Some("alice@x.com")))
            .await
            .unwrap();

        let err = identity.login("alice@x.com", "").await.unwrap_err();
        assert!(matches!(err, IdentityError::InvalidCredentials));
    }

    #[tokio::test]
    async fn username_falls_back_to_email_local_part() {
        let (store, _temp_db) = temp_store();
        let identity = service(store);

        let mut profile = google_profile(Some("carol@x.com"));
        profile.display_name = None;
        let user = identity.resolve_federated_user(profile).await.unwrap();
        assert_eq!(user.username, "carol");
    }

    #[tokio::test]
    async fn concurrent_federated_logins_produce_one_user() {
        let (store, _temp_db) = temp_store();
        let identity = Arc::new(service(store.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let identity = identity.clone();
                tokio::spawn(async move {
                    identity
                        .resolve_federated_user(google_profile(Some("race@x.com")))
                        .await
                })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap().id);
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);

        let stored = store.find_user_by_email("race@x.com").await.unwrap().unwrap();
        assert_eq!(stored.id, ids[0]);
    }

    /// Misses the first email lookup, as if another instance inserted the user
    /// right after this one looked.
    struct StaleFirstRead {
        inner: Arc<RedbStore>,
        stale: AtomicBool,
    }

    #[async_trait]
    impl UserStore for StaleFirstRead {
        async fn find_user_by_email(&self, email: &str) -> crate::store::Result<Option<User>> {
            if self.stale.swap(false, Ordering::SeqCst) {
                return Ok(None);
            }
            self.inner.find_user_by_email(email).await
        }

        async fn find_user_by_id(&self, id: &str) -> crate::store::Result<Option<User>> {
            self.inner.find_user_by_id(id).await
        }

        async fn insert_user(&self, user: NewUser) -> crate::store::Result<User> {
            self.inner.insert_user(user).await
        }
    }

    #[tokio::test]
    async fn insert_conflict_refetches_existing_user() {
        let (store, _temp_db) = temp_store();
        let winner = service(store.clone())
            .resolve_federated_user(google_profile(Some("alice@x.com")))
            .await
            .unwrap();

        let racing = Arc::new(StaleFirstRead {
            inner: store,
            stale: AtomicBool::new(true),
        });
        let loser = service(racing)
            .resolve_federated_user(google_profile(Some("alice@x.com")))
            .await
            .unwrap();

        assert_eq!(loser.id, winner.id);
    }

    #[tokio::test]
    async fn find_user_by_unknown_id() {
        let (store, _temp_db) = temp_store();
        let err = service(store).find_user("missing").await.unwrap_err();
        assert!(matches!(err, IdentityError::UserNotFound));
    }
}
