//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// HTTP server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Externally visible base URL of the app, used for redirects.
    #[serde(default = "default_public_url")]
    pub public_url: String,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    /// SECURITY: When enabled, restrict this endpoint at the infrastructure level.
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_public_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            public_url: default_public_url(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

/// Identity/session backend (GoTrue-compatible auth service).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the backend (e.g., "http://localhost:8000").
    pub url: String,
    /// Anonymous (public) API key. Safe to hand out to browsers.
    pub anon_key: String,
    /// Service-role key for admin endpoints.
    /// WARNING: Prefer BLOOM_BACKEND__SERVICE_ROLE_KEY over storing it in config files.
    #[serde(default)]
    pub service_role_key: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000".to_string(),
            anon_key: String::new(),
            service_role_key: None,
        }
    }
}

/// Browser session cookie settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Name of the cookie holding the session.
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Mark the session cookie `Secure`.
    #[serde(default)]
    pub secure_cookies: bool,
}

fn default_cookie_name() -> String {
    "sb-localhost-auth-token".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            secure_cookies: false,
        }
    }
}

/// Third-party OAuth (GitLab) integration.
///
/// Disabled by default. While disabled, the provider routes answer with
/// "not logged in" / "no projects" and never touch the provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OAuthConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Provider base URL.
    #[serde(default = "default_gitlab_base_url")]
    pub gitlab_base_url: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Base URL the provider redirects back to.
    pub app_url: Option<String>,
    /// 64 hex characters (256-bit AES key) used to encrypt stored tokens.
    pub token_encryption_key: Option<String>,
}

fn default_gitlab_base_url() -> String {
    "https://gitlab.com".to_string()
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            gitlab_base_url: default_gitlab_base_url(),
            client_id: None,
            client_secret: None,
            app_url: None,
            token_encryption_key: None,
        }
    }
}

impl OAuthConfig {
    /// Validate OAuth configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(key) = &self.token_encryption_key
            && (key.len() != 64 || !key.chars().all(|c| c.is_ascii_hexdigit()))
        {
            return Err("oauth.token_encryption_key must be 64 hex characters".to_string());
        }

        if !self.enabled {
            return Ok(());
        }

        let missing: Vec<&str> = [
            ("client_id", self.client_id.is_none()),
            ("client_secret", self.client_secret.is_none()),
            ("app_url", self.app_url.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(format!(
                "oauth is enabled but missing: {}",
                missing.join(", ")
            ))
        }
    }
}

/// Product analytics.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Mixpanel project token. Page views are only tracked when set.
    pub mixpanel_token: Option<String>,
    #[serde(default = "default_mixpanel_endpoint")]
    pub endpoint: String,
}

fn default_mixpanel_endpoint() -> String {
    "https://api.mixpanel.com/track".to_string()
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            mixpanel_token: None,
            endpoint: default_mixpanel_endpoint(),
        }
    }
}

/// Object storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
        /// Prefix for signed URLs. Relative URLs are issued when unset.
        #[serde(default)]
        public_url: Option<String>,
        /// Secret for signing URLs. A random secret is generated per process when unset.
        #[serde(default)]
        signing_secret: Option<String>,
    },
    /// S3-compatible storage.
    S3 {
        /// Bucket name.
        bucket: String,
        /// Optional endpoint URL (for MinIO, etc.).
        endpoint: Option<String>,
        /// AWS region.
        region: Option<String>,
        /// Optional key prefix.
        prefix: Option<String>,
        /// Falls back to the ambient AWS credential chain if not set.
        access_key_id: Option<String>,
        secret_access_key: Option<String>,
        /// Force path-style URLs (`endpoint/bucket/key`). Required for MinIO.
        #[serde(default)]
        force_path_style: bool,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/storage"),
            public_url: None,
            signing_secret: None,
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::S3 {
                bucket,
                access_key_id,
                secret_access_key,
                ..
            } => {
                if bucket.trim().is_empty() {
                    return Err("s3 config requires a non-empty bucket".to_string());
                }
                match (access_key_id.as_ref(), secret_access_key.as_ref()) {
                    (Some(_), Some(_)) | (None, None) => Ok(()),
                    _ => Err(
                        "s3 config requires both access_key_id and secret_access_key when either is set"
                            .to_string(),
                    ),
                }
            }
            StorageConfig::Filesystem { signing_secret, .. } => match signing_secret {
                Some(secret) if secret.len() < 32 => {
                    Err("storage.signing_secret must be at least 32 characters".to_string())
                }
                _ => Ok(()),
            },
        }
    }
}

/// PostgreSQL SSL mode configuration.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PgSslMode {
    Disable,
    #[default]
    Prefer,
    Require,
}

/// Relational store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    /// SQLite database (development and tests).
    Sqlite {
        /// Database file path.
        path: PathBuf,
        /// Seconds a statement waits on a locked database before failing.
        #[serde(default = "default_sqlite_query_timeout_secs")]
        query_timeout_secs: Option<u64>,
    },
    /// PostgreSQL database (the managed backend's database in production).
    Postgres {
        /// Connection URL. Takes precedence over individual fields.
        url: Option<String>,
        host: Option<String>,
        #[serde(default = "default_pg_port")]
        port: Option<u16>,
        username: Option<String>,
        /// WARNING: Prefer BLOOM_STORE__PASSWORD over storing it in config files.
        password: Option<String>,
        database: Option<String>,
        ssl_mode: Option<PgSslMode>,
        #[serde(default = "default_max_connections")]
        max_connections: u32,
        /// PostgreSQL cancels statements that exceed this duration.
        #[serde(default = "default_statement_timeout_ms")]
        statement_timeout_ms: Option<u64>,
    },
}

fn default_max_connections() -> u32 {
    10
}

fn default_pg_port() -> Option<u16> {
    Some(5432)
}

fn default_statement_timeout_ms() -> Option<u64> {
    Some(30_000)
}

fn default_sqlite_query_timeout_secs() -> Option<u64> {
    Some(30)
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/bloom.db"),
            query_timeout_secs: default_sqlite_query_timeout_secs(),
        }
    }
}

impl StoreConfig {
    /// Validate store configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StoreConfig::Sqlite { .. } => Ok(()),
            StoreConfig::Postgres {
                url,
                host,
                database,
                ..
            } => match (url.as_ref(), host.as_ref(), database.as_ref()) {
                (Some(_), _, _) => Ok(()),
                (None, Some(_), Some(_)) => Ok(()),
                (None, None, _) => {
                    Err("postgres config requires either 'url' or 'host' + 'database'".to_string())
                }
                (None, Some(_), None) => Err(
                    "postgres config requires 'database' when using individual fields".to_string(),
                ),
            },
        }
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Uses filesystem storage, SQLite, a dummy anon key
    /// and a disabled OAuth integration.
    pub fn for_testing() -> Self {
        Self {
            backend: BackendConfig {
                url: "http://127.0.0.1:9".to_string(),
                anon_key: "test-anon-key".to_string(),
                service_role_key: None,
            },
            ..Self::default()
        }
    }

    /// Validate the whole configuration, returning the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.backend.url.trim().is_empty() {
            return Err("backend.url must not be empty".to_string());
        }
        if self.backend.anon_key.trim().is_empty() {
            return Err("backend.anon_key must not be empty".to_string());
        }
        if self.session.cookie_name.trim().is_empty() {
            return Err("session.cookie_name must not be empty".to_string());
        }
        self.oauth.validate()?;
        self.storage.validate()?;
        self.store.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_testing_is_valid() {
        AppConfig::for_testing().validate().unwrap();
    }

    #[test]
    fn test_default_config_requires_anon_key() {
        let err = AppConfig::default().validate().unwrap_err();
        assert!(err.contains("anon_key"));
    }

    #[test]
    fn test_oauth_disabled_by_default() {
        let config = AppConfig::for_testing();
        assert!(!config.oauth.enabled);
        assert_eq!(config.oauth.gitlab_base_url, "https://gitlab.com");
    }

    #[test]
    fn test_oauth_enabled_requires_client_credentials() {
        let mut config = AppConfig::for_testing();
        config.oauth.enabled = true;
        config.oauth.client_id = Some("client".to_string());
        let err = config.validate().unwrap_err();
        assert!(err.contains("client_secret"));
        assert!(err.contains("app_url"));
        assert!(!err.contains("client_id"));
    }

    #[test]
    fn test_oauth_rejects_short_encryption_key() {
        let mut config = AppConfig::for_testing();
        config.oauth.token_encryption_key = Some("abcd".to_string());
        assert!(config.validate().is_err());

        config.oauth.token_encryption_key = Some("0f".repeat(32));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_session_cookie_name_default() {
        let json = r#"{}"#;
        let session: SessionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(session.cookie_name, "sb-localhost-auth-token");
        assert!(!session.secure_cookies);
    }

    #[test]
    fn test_storage_config_s3_validate_partial_credentials() {
        let invalid = StorageConfig::S3 {
            bucket: "bucket".to_string(),
            endpoint: None,
            region: None,
            prefix: None,
            access_key_id: Some("access-key".to_string()),
            secret_access_key: None,
            force_path_style: false,
        };
        assert!(invalid.validate().is_err());

        let empty_bucket = StorageConfig::S3 {
            bucket: " ".to_string(),
            endpoint: None,
            region: None,
            prefix: None,
            access_key_id: None,
            secret_access_key: None,
            force_path_style: false,
        };
        assert!(empty_bucket.validate().is_err());
    }

    #[test]
    fn test_storage_config_filesystem_deserializes_without_optional_fields() {
        let json = r#"{"type":"filesystem","path":"/var/lib/bloom"}"#;
        let config: StorageConfig = serde_json::from_str(json).unwrap();
        match config {
            StorageConfig::Filesystem {
                path,
                public_url,
                signing_secret,
            } => {
                assert_eq!(path, PathBuf::from("/var/lib/bloom"));
                assert!(public_url.is_none());
                assert!(signing_secret.is_none());
            }
            _ => panic!("expected filesystem config"),
        }
    }

    #[test]
    fn test_store_config_postgres_requires_database() {
        let config = StoreConfig::Postgres {
            url: None,
            host: Some("db".to_string()),
            port: Some(5432),
            username: None,
            password: None,
            database: None,
            ssl_mode: None,
            max_connections: 4,
            statement_timeout_ms: None,
        };
        assert!(config.validate().unwrap_err().contains("database"));
    }
}
