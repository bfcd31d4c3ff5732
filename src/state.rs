//! Application state shared across all request handlers

use std::sync::Arc;
use url::Url;

use crate::config::Config;
use crate::database::RedbStore;
use crate::error::IdentityError;
use crate::federated::{AuthorizationCodeFlow, FederatedVerifier};
use crate::identity::IdentityService;
use crate::password::PasswordHasher;
use crate::redirect::RedirectResolver;
use crate::shortener::{RandomSlugGenerator, ShortenerService};
use crate::store::UrlStore;
use crate::token::TokenService;

/// Services built once at startup and handed to every handler
///
/// Cloning is cheap: every field is reference counted.
#[derive(Clone)]
pub struct AppState {
    pub shortener: Arc<ShortenerService>,
    pub resolver: Arc<RedirectResolver>,
    pub identity: Arc<IdentityService>,
    pub tokens: Arc<TokenService>,
    pub federated: Arc<dyn FederatedVerifier>,
    pub urls: Arc<dyn UrlStore>,
    /// Browser sign-in; `None` when no OAuth client is configured
    pub oauth: Option<Arc<dyn AuthorizationCodeFlow>>,
    /// Public origin prefixed to slugs in responses
    pub base_url: Arc<str>,
    pub frontend_url: Arc<Url>,
}

impl AppState {
    /// Wires every service onto one store.
    pub fn new(
        config: &Config,
        store: Arc<RedbStore>,
        federated: Arc<dyn FederatedVerifier>,
    ) -> Result<Self, IdentityError> {
        let identity = IdentityService::new(store.clone(), PasswordHasher::new(config.bcrypt_cost))?;

        Ok(Self {
            shortener: Arc::new(ShortenerService::new(
                store.clone(),
                Arc::new(RandomSlugGenerator),
            )),
            resolver: Arc::new(RedirectResolver::new(store.clone())),
            identity: Arc::new(identity),
            tokens: Arc::new(TokenService::new(
                config.jwt_secret.as_bytes(),
                config.token_ttl,
            )),
            federated,
            urls: store,
            oauth: None,
            base_url: Arc::from(config.base_url.as_str()),
            frontend_url: Arc::new(config.frontend_url.clone()),
        })
    }

    /// Enables `/auth/google/login` and `/auth/google/callback`.
    pub fn with_oauth(mut self, flow: Arc<dyn AuthorizationCodeFlow>) -> Self {
        self.oauth = Some(flow);
        self
    }
}
