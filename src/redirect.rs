//! Public slug resolution for the redirect endpoint

use std::sync::Arc;

use crate::error::ShortenError;
use crate::shortener::is_well_formed_slug;
use crate::store::UrlStore;

/// Public slug lookup
///
/// Read-only and unauthenticated: no counters, no writes, so any number of
/// concurrent calls are safe.
pub struct RedirectResolver {
    urls: Arc<dyn UrlStore>,
}

impl RedirectResolver {
    pub fn new(urls: Arc<dyn UrlStore>) -> Self {
        Self { urls }
    }

    pub async fn resolve(&self, slug: &str) -> Result<String, ShortenError> {
        // anything a generator could not have produced is answered without a lookup
        if !is_well_formed_slug(slug) {
            return Err(ShortenError::NotFound);
        }

        self.urls
            .find_url_by_slug(slug)
            .await?
            .map(|record| record.destination)
            .ok_or(ShortenError::NotFound)
    }
}
