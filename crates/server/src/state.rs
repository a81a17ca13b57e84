//! Application state shared across handlers.

use crate::analytics::Analytics;
use crate::error::{ApiError, ApiResult};
use crate::gitlab::OAuthClient;
use crate::identity::IdentityProvider;
use bloom_core::TokenCipher;
use bloom_core::config::AppConfig;
use bloom_storage::{FilesystemBackend, ObjectStore};
use bloom_store::MetadataStore;
use std::sync::Arc;

/// Shared application state.
///
/// Every external service is an explicitly constructed client, so tests can
/// swap in fakes.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Relational store.
    pub store: Arc<dyn MetadataStore>,
    /// Object storage backend.
    pub storage: Arc<dyn ObjectStore>,
    /// Verifies URLs signed by the filesystem backend. `None` for S3.
    pub signed_objects: Option<Arc<FilesystemBackend>>,
    /// Auth/session service.
    pub identity: Arc<dyn IdentityProvider>,
    /// Third-party OAuth provider.
    pub oauth: Arc<dyn OAuthClient>,
    pub analytics: Analytics,
    /// Token cipher, present when an encryption key is configured.
    pub cipher: Option<TokenCipher>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// Fails when the configured token encryption key is malformed. A missing
    /// key is allowed; routes needing it fail with a configuration error.
    pub fn new(
        config: AppConfig,
        store: Arc<dyn MetadataStore>,
        storage: Arc<dyn ObjectStore>,
        identity: Arc<dyn IdentityProvider>,
        oauth: Arc<dyn OAuthClient>,
    ) -> ApiResult<Self> {
        let configured_key = config
            .oauth
            .token_encryption_key
            .as_deref()
            .filter(|k| !k.trim().is_empty());
        let cipher = match configured_key {
            Some(key) => Some(TokenCipher::from_config(Some(key))?),
            None => None,
        };
        if config.oauth.enabled && cipher.is_none() {
            tracing::warn!("OAuth is enabled without oauth.token_encryption_key; exchanges will fail");
        }

        let analytics = Analytics::new(&config.analytics);

        Ok(Self {
            config: Arc::new(config),
            store,
            storage,
            signed_objects: None,
            identity,
            oauth,
            analytics,
            cipher,
        })
    }

    /// Serve `/storage/v1/object/sign/...` for URLs signed by this backend.
    pub fn with_signed_objects(mut self, backend: Arc<FilesystemBackend>) -> Self {
        self.signed_objects = Some(backend);
        self
    }

    /// The token cipher, or a configuration error when no key is set.
    pub fn require_cipher(&self) -> ApiResult<&TokenCipher> {
        self.cipher
            .as_ref()
            .ok_or_else(|| ApiError::from(bloom_core::CipherError::MissingKey))
    }
}
