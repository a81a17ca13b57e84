//! Server test utilities.

use super::identity::{FakeIdentity, USER_TOKEN};
use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, COOKIE};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use bloom_core::config::{AppConfig, StorageConfig, StoreConfig};
use bloom_server::gitlab::GitLabClient;
use bloom_server::{AppState, create_router};
use bloom_storage::{FilesystemBackend, ObjectStore};
use bloom_store::{MetadataStore, SqliteStore};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

/// Signing secret long enough to pass config validation.
pub const SIGNING_SECRET: &str = "0123456789abcdef0123456789abcdef";

/// 64 hex characters.
pub const TOKEN_KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    /// Concrete store, for seeding with raw SQL.
    pub sqlite: Arc<SqliteStore>,
    pub storage: Arc<FilesystemBackend>,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with temporary storage.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let storage_path = temp_dir.path().join("storage");
        let storage = Arc::new(
            FilesystemBackend::new(&storage_path, None, Some(SIGNING_SECRET.to_string()))
                .await
                .expect("Failed to create storage backend"),
        );

        let db_path = temp_dir.path().join("bloom.db");
        let sqlite = Arc::new(
            SqliteStore::new(&db_path, None)
                .await
                .expect("Failed to create store"),
        );

        let mut config = AppConfig {
            storage: StorageConfig::Filesystem {
                path: storage_path,
                public_url: None,
                signing_secret: Some(SIGNING_SECRET.to_string()),
            },
            store: StoreConfig::Sqlite {
                path: db_path,
                query_timeout_secs: None,
            },
            ..AppConfig::for_testing()
        };
        modifier(&mut config);

        let oauth = Arc::new(
            GitLabClient::new(&config.oauth.gitlab_base_url).expect("Failed to create GitLab client"),
        );
        let store: Arc<dyn MetadataStore> = sqlite.clone();
        let object_store: Arc<dyn ObjectStore> = storage.clone();

        let state = AppState::new(
            config,
            store,
            object_store,
            Arc::new(FakeIdentity::new()),
            oauth,
        )
        .expect("Failed to create state")
        .with_signed_objects(storage.clone());

        let router = create_router(state.clone());

        Self {
            router,
            state,
            sqlite,
            storage,
            _temp_dir: temp_dir,
        }
    }

    /// Test server with the GitLab integration enabled against `gitlab_url`.
    pub async fn with_gitlab(gitlab_url: &str) -> Self {
        let gitlab_url = gitlab_url.to_string();
        Self::with_config(move |config| {
            config.oauth.enabled = true;
            config.oauth.gitlab_base_url = gitlab_url;
            config.oauth.client_id = Some("bloom-client".to_string());
            config.oauth.client_secret = Some("bloom-secret".to_string());
            config.oauth.app_url = Some("http://bloom.test".to_string());
            config.oauth.token_encryption_key = Some(TOKEN_KEY.to_string());
        })
        .await
    }

    /// `Cookie` header value for the seeded user's session.
    pub fn session_cookie(&self) -> String {
        format!("{}={}", self.state.config.session.cookie_name, USER_TOKEN)
    }

    /// Send a request through the router.
    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// GET `uri`, signed in when `signed_in` is set.
    pub async fn get(&self, uri: &str, signed_in: bool) -> Response {
        let mut builder = Request::builder().method("GET").uri(uri);
        if signed_in {
            builder = builder.header(COOKIE, self.session_cookie());
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    /// GET a page as the signed-in user, returning status and HTML.
    pub async fn page(&self, uri: &str) -> (StatusCode, String) {
        let response = self.get(uri, true).await;
        let status = response.status();
        (status, body_text(response).await)
    }

    /// Send a JSON request, returning status and parsed body (`Null` when empty).
    pub async fn json_request(
        &self,
        method: &str,
        uri: &str,
        body: Option<Value>,
        signed_in: bool,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if signed_in {
            builder = builder.header(COOKIE, self.session_cookie());
        }

        let body = match body {
            Some(v) => {
                builder = builder.header(CONTENT_TYPE, "application/json");
                Body::from(serde_json::to_vec(&v).unwrap())
            }
            None => Body::empty(),
        };

        let response = self.send(builder.body(body).unwrap()).await;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();

        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }
}

/// Collect a response body as UTF-8 text.
#[allow(dead_code)]
pub async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// `Location` header of a redirect.
#[allow(dead_code)]
pub fn location(response: &Response) -> &str {
    response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}
