//! Slug generation and the URL record lifecycle
//!
//! Handles:
//! - Destination validation
//! - Random slug draws with bounded retry on collision
//! - Owner-scoped listing and deletion

use chrono::Utc;
use rand::{distr::Alphanumeric, Rng};
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

use crate::error::{ShortenError, StoreError};
use crate::model::{NewUrlRecord, UrlRecord};
use crate::retry::{retry_bounded, Attempt};
use crate::store::UrlStore;

pub const SLUG_LENGTH: usize = 6;

/// Draws before giving up with [`ShortenError::SlugSpaceExhausted`]
pub const MAX_SLUG_ATTEMPTS: usize = 5;

/// Upper bound on the number of records returned by [`ShortenerService::list_owned`]
pub const LIST_LIMIT: usize = 100;

pub const MAX_DESTINATION_LENGTH: usize = 2048;

/// Slugs that would be shadowed by fixed routes
pub const RESERVED_SLUGS: &[&str] = &["health"];

pub trait SlugGenerator: Send + Sync + 'static {
    fn generate(&self) -> String;
}

/// Random alphanumeric slugs of [`SLUG_LENGTH`] characters
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomSlugGenerator;

impl SlugGenerator for RandomSlugGenerator {
    fn generate(&self) -> String {
        rand::rng()
            .sample_iter(&Alphanumeric)
            .take(SLUG_LENGTH)
            .map(char::from)
            .collect()
    }
}

/// Whether `slug` has the shape of a generated slug.
pub fn is_well_formed_slug(slug: &str) -> bool {
    slug.len() == SLUG_LENGTH && slug.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Checks that `raw` is an absolute http(s) URL with a host.
///
/// Returns the URL in serialized form: spaces and non-ASCII characters are
/// percent-encoded and the host is punycoded, so the result is always a valid
/// `Location` header value.
pub fn validate_destination(raw: &str) -> Result<String, ShortenError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ShortenError::InvalidUrl("URL cannot be empty".to_string()));
    }
    if trimmed.len() > MAX_DESTINATION_LENGTH {
        return Err(ShortenError::InvalidUrl(format!(
            "URL longer than {} characters",
            MAX_DESTINATION_LENGTH
        )));
    }

    // the raw string ends up in a Location header
    if trimmed.chars().any(char::is_control) {
        return Err(ShortenError::InvalidUrl(
            "URL contains control characters".to_string(),
        ));
    }

    let parsed = Url::parse(trimmed).map_err(|e| ShortenError::InvalidUrl(e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ShortenError::InvalidUrl(format!(
            "URL scheme must be http or https: {}",
            parsed.scheme()
        )));
    }
    if !matches!(parsed.host_str(), Some(host) if !host.is_empty()) {
        return Err(ShortenError::InvalidUrl("URL must have a host".to_string()));
    }

    let normalized: String = parsed.into();
    if normalized.len() > MAX_DESTINATION_LENGTH {
        return Err(ShortenError::InvalidUrl(format!(
            "URL longer than {} characters once encoded",
            MAX_DESTINATION_LENGTH
        )));
    }
    Ok(normalized)
}

pub struct ShortenerService {
    urls: Arc<dyn UrlStore>,
    generator: Arc<dyn SlugGenerator>,
    max_attempts: usize,
}

impl ShortenerService {
    pub fn new(urls: Arc<dyn UrlStore>, generator: Arc<dyn SlugGenerator>) -> Self {
        Self {
            urls,
            generator,
            max_attempts: MAX_SLUG_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Persists `destination` under a fresh slug owned by `owner_id`.
    ///
    /// Uniqueness is decided by the store's slug index; a collision just triggers
    /// another draw.
    pub async fn shorten(&self, destination: &str, owner_id: &str) -> Result<UrlRecord, ShortenError> {
        let destination = validate_destination(destination)?;

        let created = retry_bounded(self.max_attempts, |attempt| {
            let new_record = NewUrlRecord {
                slug: self.generator.generate(),
                destination: destination.clone(),
                owner_id: owner_id.to_owned(),
                created_at: Utc::now(),
            };

            async move {
                if RESERVED_SLUGS.contains(&new_record.slug.as_str()) {
                    debug!(slug = %new_record.slug, attempt, "Drew a reserved slug");
                    return Ok(Attempt::Retry);
                }

                match self.urls.insert_url(new_record).await {
                    Ok(record) => Ok(Attempt::Done(record)),
                    Err(StoreError::Conflict(slug)) => {
                        debug!(%slug, attempt, "Slug collision, drawing again");
                        Ok(Attempt::Retry)
                    }
                    Err(e) => Err(ShortenError::Store(e)),
                }
            }
        })
        .await?;

        let record = created.ok_or(ShortenError::SlugSpaceExhausted {
            attempts: self.max_attempts,
        })?;

        info!(slug = %record.slug, owner_id = %record.owner_id, "Short URL created");
        Ok(record)
    }

    /// Records owned by `owner_id`, newest first, capped at [`LIST_LIMIT`].
    pub async fn list_owned(&self, owner_id: &str) -> Result<Vec<UrlRecord>, ShortenError> {
        Ok(self.urls.list_urls_by_owner(owner_id, LIST_LIMIT).await?)
    }

    /// Deletes a record owned by `owner_id`.
    ///
    /// A missing record and someone else's record both yield
    /// [`ShortenError::NotFound`].
    pub async fn delete_owned(&self, record_id: &str, owner_id: &str) -> Result<(), ShortenError> {
        if self.urls.delete_url(record_id, owner_id).await? {
            info!(record_id, owner_id, "Short URL deleted");
            Ok(())
        } else {
            debug!(record_id, owner_id, "Delete refused, no such record for owner");
            Err(ShortenError::NotFound)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::RedbStore;
    use std::collections::{HashSet, VecDeque};
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    /// Replays a fixed list of slugs, repeating the last one forever
    struct SequenceGenerator {
        slugs: Mutex<VecDeque<String>>,
    }

    impl SequenceGenerator {
        fn new(slugs: &[&str]) -> Self {
            Self {
                slugs: Mutex::new(slugs.iter().map(|s| s.to_string()).collect()),
            }
        }
    }

    impl SlugGenerator for SequenceGenerator {
        fn generate(&self) -> String {
            let mut slugs = self.slugs.lock().unwrap();
            if slugs.len() > 1 {
                slugs.pop_front().unwrap()
            } else {
                slugs.front().cloned().unwrap()
            }
        }
    }

    fn temp_store() -> (Arc<RedbStore>, NamedTempFile) {
        let temp_db = NamedTempFile::new().expect("Failed to create temp file");
        let store = RedbStore::open(temp_db.path().to_str().unwrap(), Duration::from_secs(5))
            .expect("Failed to initialize test database");
        (Arc::new(store), temp_db)
    }

    fn random_service(store: Arc<RedbStore>) -> ShortenerService {
        ShortenerService::new(store, Arc::new(RandomSlugGenerator))
    }

    #[test]
    fn random_slugs_are_six_alphanumerics() {
        for _ in 0..100 {
            assert!(is_well_formed_slug(&RandomSlugGenerator.generate()));
        }
    }

    #[test]
    fn destination_validation() {
        assert!(validate_destination("https://example.com/a/b").is_ok());
        assert!(validate_destination("http://localhost:8080/x?y=1").is_ok());
        assert_eq!(
            validate_destination("  https://example.com  ").unwrap(),
            "https://example.com/"
        );

        for bad in [
            "",
            "not-a-valid-url",
            "/relative/path",
            "ftp://example.com/file",
            "javascript:alert(1)",
            "mailto:alice@x.com",
            "https://exa\nmple.com",
        ] {
            assert!(
                matches!(validate_destination(bad), Err(ShortenError::InvalidUrl(_))),
                "accepted {:?}",
                bad
            );
        }

        let too_long = format!("https://example.com/{}", "a".repeat(MAX_DESTINATION_LENGTH));
        assert!(validate_destination(&too_long).is_err());

        // each 'é' grows to six bytes once encoded
        let grows_too_long = format!("https://example.com/{}", "é".repeat(800));
        assert!(grows_too_long.len() <= MAX_DESTINATION_LENGTH);
        assert!(validate_destination(&grows_too_long).is_err());
    }

    #[test]
    fn destination_is_stored_encoded() {
        assert_eq!(
            validate_destination("https://example.com/a b?q=x y").unwrap(),
            "https://example.com/a%20b?q=x%20y"
        );
        assert_eq!(
            validate_destination("https://example.com/ü").unwrap(),
            "https://example.com/%C3%BC"
        );
        assert_eq!(
            validate_destination("https://bücher.example/").unwrap(),
            "https://xn--bcher-kva.example/"
        );

        for raw in ["https://example.com/a b", "https://bücher.example/ü"] {
            let stored = validate_destination(raw).unwrap();
            assert!(axum::http::HeaderValue::from_str(&stored).is_ok());
            assert!(stored.is_ascii());
        }
    }

    #[tokio::test]
    async fn shorten_then_lookup_returns_destination() {
        let (store, _temp_db) = temp_store();
        let service = random_service(store.clone());

        let record = service
            .shorten("https://example.com/a/b", "owner")
            .await
            .unwrap();
        assert_eq!(record.slug.len(), SLUG_LENGTH);

        let stored = store.find_url_by_slug(&record.slug).await.unwrap().unwrap();
        assert_eq!(stored.destination, "https://example.com/a/b");
        assert_eq!(stored.owner_id, "owner");
    }

    #[tokio::test]
    async fn invalid_destination_is_rejected_before_storage() {
        let (store, _temp_db) = temp_store();
        let service = random_service(store.clone());

        let err = service.shorten("not a url", "owner").await.unwrap_err();
        assert!(matches!(err, ShortenError::InvalidUrl(_)));
        assert!(store.list_urls_by_owner("owner", 100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn many_slugs_are_unique() {
        let (store, _temp_db) = temp_store();
        let service = random_service(store);

        let mut slugs = HashSet::new();
        for i in 0..300 {
            let record = service
                .shorten(&format!("https://example.com/{}", i), "owner")
                .await
                .unwrap();
            assert!(slugs.insert(record.slug));
        }
    }

    #[tokio::test]
    async fn collision_triggers_another_draw() {
        let (store, _temp_db) = temp_store();
        let generator = SequenceGenerator::new(&["aaaaaa", "aaaaaa", "bbbbbb"]);
        let service = ShortenerService::new(store, Arc::new(generator));

        let first = service.shorten("https://example.com/1", "owner").await.unwrap();
        let second = service.shorten("https://example.com/2", "owner").await.unwrap();

        assert_eq!(first.slug, "aaaaaa");
        assert_eq!(second.slug, "bbbbbb");
    }

    #[tokio::test]
    async fn persistent_collisions_exhaust_slug_space() {
        let (store, _temp_db) = temp_store();
        let generator = SequenceGenerator::new(&["aaaaaa"]);
        let service = ShortenerService::new(store, Arc::new(generator)).with_max_attempts(3);

        service.shorten("https://example.com/1", "owner").await.unwrap();
        let err = service
            .shorten("https://example.com/2", "owner")
            .await
            .unwrap_err();
        assert!(matches!(err, ShortenError::SlugSpaceExhausted { attempts: 3 }));
    }

    #[tokio::test]
    async fn reserved_slugs_are_skipped() {
        let (store, _temp_db) = temp_store();
        let generator = SequenceGenerator::new(&["health", "cccccc"]);
        let service = ShortenerService::new(store, Arc::new(generator));

        let record = service.shorten("https://example.com", "owner").await.unwrap();
        assert_eq!(record.slug, "cccccc");
    }

    #[tokio::test]
    async fn list_owned_is_scoped_and_newest_first() {
        let (store, _temp_db) = temp_store();
        let service = random_service(store);

        let older = service.shorten("https://example.com/old", "alice").await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        let newer = service.shorten("https://example.com/new", "alice").await.unwrap();
        service.shorten("https://example.com/bob", "bob").await.unwrap();

        let listed = service.list_owned("alice").await.unwrap();
        let ids: Vec<_> = listed.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, [newer.id.as_str(), older.id.as_str()]);
    }

    #[tokio::test]
    async fn list_owned_is_capped() {
        let (store, _temp_db) = temp_store();
        let service = random_service(store);

        for i in 0..(LIST_LIMIT + 5) {
            service
                .shorten(&format!("https://example.com/{}", i), "owner")
                .await
                .unwrap();
        }
        assert_eq!(service.list_owned("owner").await.unwrap().len(), LIST_LIMIT);
    }

    #[tokio::test]
    async fn non_owner_delete_is_not_found() {
        let (store, _temp_db) = temp_store();
        let service = random_service(store.clone());
        let record = service.shorten("https://example.com", "alice").await.unwrap();

        let not_owned = service.delete_owned(&record.id, "bob").await.unwrap_err();
        let missing = service.delete_owned("no-such-id", "bob").await.unwrap_err();
        assert!(matches!(not_owned, ShortenError::NotFound));
        assert!(matches!(missing, ShortenError::NotFound));
        assert!(store.find_url_by_slug(&record.slug).await.unwrap().is_some());

        service.delete_owned(&record.id, "alice").await.unwrap();
        assert!(store.find_url_by_slug(&record.slug).await.unwrap().is_none());
    }
}
