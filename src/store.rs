//! Persistence seams used by the services
//!
//! Both traits are implemented by [`crate::database::RedbStore`]. Uniqueness of
//! emails and slugs is the store's responsibility: `insert_*` must fail with
//! [`StoreError::Conflict`] atomically, never via a separate existence check.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::{NewUrlRecord, NewUser, UrlRecord, User};

pub type Result<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait UserStore: Send + Sync + 'static {
    /// Looks up a user by normalized email.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn find_user_by_id(&self, id: &str) -> Result<Option<User>>;

    /// Persists a user and returns it with its assigned id.
    /// Returns `Err(Conflict)` if the email is already registered.
    async fn insert_user(&self, user: NewUser) -> Result<User>;
}

#[async_trait]
pub trait UrlStore: Send + Sync + 'static {
    /// Persists a record and returns it with its assigned id.
    /// Returns `Err(Conflict)` if the slug is already taken.
    async fn insert_url(&self, record: NewUrlRecord) -> Result<UrlRecord>;

    async fn find_url_by_slug(&self, slug: &str) -> Result<Option<UrlRecord>>;

    /// Records owned by `owner_id`, newest first, at most `limit` of them.
    async fn list_urls_by_owner(&self, owner_id: &str, limit: usize) -> Result<Vec<UrlRecord>>;

    /// Removes the record only when both `id` and `owner_id` match.
    /// Returns `true` if a record was removed.
    async fn delete_url(&self, id: &str, owner_id: &str) -> Result<bool>;

    /// Cheap round-trip used by the health check.
    async fn ping(&self) -> Result<()>;
}
