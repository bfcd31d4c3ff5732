//! Database initialization, table definitions and the redb-backed store
//!
//! Documents are stored as JSON strings keyed by their id. Secondary index tables
//! hold the unique keys (email, slug) and the per-owner listing order. Every write
//! that touches a unique index happens inside one write transaction, and redb
//! admits a single writer at a time, so the existence check and the insert cannot
//! interleave with another writer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::{NewUrlRecord, NewUser, UrlRecord, User};
use crate::store::{Result, UrlStore, UserStore};

/// Users keyed by id
///
/// Value: JSON-serialized User
pub const TABLE_USERS: TableDefinition<&str, &str> = TableDefinition::new("users_v1");

/// Unique index: normalized email -> user id
pub const TABLE_EMAIL_INDEX: TableDefinition<&str, &str> = TableDefinition::new("email_index_v1");

/// URL records keyed by id
///
/// Value: JSON-serialized UrlRecord
pub const TABLE_URLS: TableDefinition<&str, &str> = TableDefinition::new("urls_v2");

/// Unique index: slug -> record id
pub const TABLE_SLUG_INDEX: TableDefinition<&str, &str> = TableDefinition::new("slug_index_v1");

/// Index table for listing records by owner
///
/// Key: Composite key in format "{owner_id}:{timestamp_micros:020}:{record_id}"
/// Value: record id
///
/// The zero-padded timestamp keeps lexicographic order chronological, so a reversed
/// range scan yields the newest records first.
pub const TABLE_OWNER_INDEX: TableDefinition<&str, &str> = TableDefinition::new("owner_index_v1");

/// Initializes the embedded database and creates required tables
///
/// # Example
///
/// ```no_run
/// # use shortlink::database::init_db;
/// let db = init_db("data.db").expect("Failed to initialize database");
/// ```
pub fn init_db(db_path: &str) -> std::result::Result<Database, redb::Error> {
    let db = Database::create(db_path)?;

    let write_txn = db.begin_write()?;
    {
        write_txn.open_table(TABLE_USERS)?;
        write_txn.open_table(TABLE_EMAIL_INDEX)?;
        write_txn.open_table(TABLE_URLS)?;
        write_txn.open_table(TABLE_SLUG_INDEX)?;
        write_txn.open_table(TABLE_OWNER_INDEX)?;
    }
    write_txn.commit()?;

    Ok(db)
}

/// Store over an embedded redb database
///
/// redb is synchronous, so each operation runs on tokio's blocking pool and is
/// abandoned with [`StoreError::Timeout`] once `timeout` elapses. Writes that reach
/// their commit after that point are aborted instead, so a caller told to retry
/// does not find its first attempt persisted.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
    timeout: Duration,
}

impl RedbStore {
    pub fn new(db: Database, timeout: Duration) -> Self {
        Self {
            db: Arc::new(db),
            timeout,
        }
    }

    /// Opens (or creates) the database file and its tables.
    pub fn open(db_path: &str, timeout: Duration) -> std::result::Result<Self, redb::Error> {
        Ok(Self::new(init_db(db_path)?, timeout))
    }

    /// Runs `op` on the blocking pool; `op` receives the deadline its caller gives up at.
    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database, Instant) -> Result<T> + Send + 'static,
    {
        let db = self.db.clone();
        let deadline = Instant::now() + self.timeout;
        let task = tokio::task::spawn_blocking(move || op(&db, deadline));

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(StoreError::Unavailable(join_err.to_string())),
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "Store operation timed out");
                Err(StoreError::Timeout)
            }
        }
    }
}

/// Commits unless the caller has already been answered with a timeout
fn commit_before(write_txn: WriteTransaction, deadline: Instant) -> Result<()> {
    if Instant::now() >= deadline {
        write_txn.abort()?;
        warn!("Write finished after its deadline, aborted");
        return Err(StoreError::Timeout);
    }
    write_txn.commit()?;
    Ok(())
}

fn owner_index_key(owner_id: &str, created_at: DateTime<Utc>, id: &str) -> String {
    format!("{}:{:020}:{}", owner_id, created_at.timestamp_micros(), id)
}

fn read_user(db: &Database, id: &str) -> Result<Option<User>> {
    let read_txn = db.begin_read()?;
    let users = read_txn.open_table(TABLE_USERS)?;
    match users.get(id)? {
        Some(doc) => Ok(Some(serde_json::from_str(doc.value())?)),
        None => Ok(None),
    }
}

#[async_trait]
impl UserStore for RedbStore {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let email = email.to_owned();
        self.run(move |db, _| {
            let read_txn = db.begin_read()?;
            let index = read_txn.open_table(TABLE_EMAIL_INDEX)?;
            let id = match index.get(email.as_str())? {
                Some(id) => id.value().to_owned(),
                None => return Ok(None),
            };
            let users = read_txn.open_table(TABLE_USERS)?;
            match users.get(id.as_str())? {
                Some(doc) => Ok(Some(serde_json::from_str(doc.value())?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn find_user_by_id(&self, id: &str) -> Result<Option<User>> {
        let id = id.to_owned();
        self.run(move |db, _| read_user(db, &id)).await
    }

    async fn insert_user(&self, new_user: NewUser) -> Result<User> {
        self.run(move |db, deadline| {
            let write_txn = db.begin_write()?;
            let user = {
                let mut index = write_txn.open_table(TABLE_EMAIL_INDEX)?;
                if index.get(new_user.email.as_str())?.is_some() {
                    return Err(StoreError::Conflict(new_user.email));
                }

                let user = new_user.into_user(Uuid::new_v4().to_string());
                let doc = serde_json::to_string(&user)?;
                index.insert(user.email.as_str(), user.id.as_str())?;

                let mut users = write_txn.open_table(TABLE_USERS)?;
                users.insert(user.id.as_str(), doc.as_str())?;
                user
            };
            commit_before(write_txn, deadline)?;

            debug!(user_id = %user.id, "User persisted");
            Ok(user)
        })
        .await
    }
}

#[async_trait]
impl UrlStore for RedbStore {
    async fn insert_url(&self, new_record: NewUrlRecord) -> Result<UrlRecord> {
        self.run(move |db, deadline| {
            let write_txn = db.begin_write()?;
            let record = {
                let mut slugs = write_txn.open_table(TABLE_SLUG_INDEX)?;
                if slugs.get(new_record.slug.as_str())?.is_some() {
                    return Err(StoreError::Conflict(new_record.slug));
                }

                let record = new_record.into_record(Uuid::new_v4().to_string());
                let doc = serde_json::to_string(&record)?;
                slugs.insert(record.slug.as_str(), record.id.as_str())?;

                let mut urls = write_txn.open_table(TABLE_URLS)?;
                urls.insert(record.id.as_str(), doc.as_str())?;

                let key = owner_index_key(&record.owner_id, record.created_at, &record.id);
                let mut owners = write_txn.open_table(TABLE_OWNER_INDEX)?;
                owners.insert(key.as_str(), record.id.as_str())?;
                record
            };
            commit_before(write_txn, deadline)?;

            Ok(record)
        })
        .await
    }

    async fn find_url_by_slug(&self, slug: &str) -> Result<Option<UrlRecord>> {
        let slug = slug.to_owned();
        self.run(move |db, _| {
            let read_txn = db.begin_read()?;
            let slugs = read_txn.open_table(TABLE_SLUG_INDEX)?;
            let id = match slugs.get(slug.as_str())? {
                Some(id) => id.value().to_owned(),
                None => return Ok(None),
            };
            let urls = read_txn.open_table(TABLE_URLS)?;
            match urls.get(id.as_str())? {
                Some(doc) => Ok(Some(serde_json::from_str(doc.value())?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn list_urls_by_owner(&self, owner_id: &str, limit: usize) -> Result<Vec<UrlRecord>> {
        // ':' sorts before '{', so this range covers every key with the owner prefix
        let start_key = format!("{}:", owner_id);
        let end_key = format!("{}:{{", owner_id);

        self.run(move |db, _| {
            let read_txn = db.begin_read()?;
            let owners = read_txn.open_table(TABLE_OWNER_INDEX)?;
            let urls = read_txn.open_table(TABLE_URLS)?;

            let mut records = Vec::new();
            for entry in owners
                .range(start_key.as_str()..end_key.as_str())?
                .rev()
                .take(limit)
            {
                let (_, id) = entry?;
                if let Some(doc) = urls.get(id.value())? {
                    records.push(serde_json::from_str::<UrlRecord>(doc.value())?);
                }
            }
            Ok(records)
        })
        .await
    }

    async fn delete_url(&self, id: &str, owner_id: &str) -> Result<bool> {
        let id = id.to_owned();
        let owner_id = owner_id.to_owned();
        self.run(move |db, deadline| {
            let write_txn = db.begin_write()?;
            let removed = {
                let mut urls = write_txn.open_table(TABLE_URLS)?;
                let existing = match urls.get(id.as_str())? {
                    Some(doc) => Some(serde_json::from_str::<UrlRecord>(doc.value())?),
                    None => None,
                };

                match existing {
                    Some(record) if record.owner_id == owner_id => {
                        urls.remove(record.id.as_str())?;

                        let mut slugs = write_txn.open_table(TABLE_SLUG_INDEX)?;
                        slugs.remove(record.slug.as_str())?;

                        let key = owner_index_key(&record.owner_id, record.created_at, &record.id);
                        let mut owners = write_txn.open_table(TABLE_OWNER_INDEX)?;
                        owners.remove(key.as_str())?;
                        true
                    }
                    _ => false,
                }
            };

            if removed {
                commit_before(write_txn, deadline)?;
            } else {
                write_txn.abort()?;
            }
            Ok(removed)
        })
        .await
    }

    async fn ping(&self) -> Result<()> {
        self.run(|db, _| {
            let read_txn = db.begin_read()?;
            read_txn.open_table(TABLE_URLS)?;
            Ok(())
        })
        .await
    }
}
