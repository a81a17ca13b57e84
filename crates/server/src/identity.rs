//! Identity and session service client.
//!
//! Users sign in against a GoTrue-compatible auth service. The server never
//! verifies session tokens itself: every request resolves its user by asking
//! the service, see [`IdentityProvider::get_user`].

use async_trait::async_trait;
use bloom_core::config::BackendConfig;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    /// The service refused the credentials or token.
    #[error("{0}")]
    Rejected(String),

    #[error("service role key is not configured")]
    MissingServiceKey,

    #[error("invalid identity service URL: {0}")]
    InvalidUrl(String),

    #[error("identity service request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("identity service error ({status}): {body}")]
    Upstream { status: StatusCode, body: String },
}

pub type IdentityResult<T> = std::result::Result<T, IdentityError>;

/// A signed-in user as reported by the auth service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Token pair issued by the auth service.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub user: Option<User>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve the user owning `access_token`. `None` when the token is not accepted.
    async fn get_user(&self, access_token: &str) -> IdentityResult<Option<User>>;

    /// Adopt a session issued elsewhere (e.g. a browser client), refreshing it
    /// when the access token is no longer accepted.
    async fn set_session(&self, access_token: &str, refresh_token: &str) -> IdentityResult<Session>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> IdentityResult<Session>;

    /// Exchange an auth-callback code for a session.
    async fn exchange_code_for_session(&self, code: &str) -> IdentityResult<Session>;

    /// All users. Requires the service role key.
    async fn list_users(&self) -> IdentityResult<Vec<User>>;
}

#[derive(Deserialize)]
struct UserList {
    users: Vec<User>,
}

/// Error bodies differ between endpoints; take whichever message field is set.
#[derive(Deserialize, Default)]
struct ErrorBody {
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
    error: Option<String>,
}

impl ErrorBody {
    fn message(self) -> Option<String> {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .or(self.error)
    }
}

/// [`IdentityProvider`] over the auth service's REST API.
#[derive(Clone)]
pub struct SupabaseIdentity {
    http: reqwest::Client,
    base_url: Url,
    anon_key: String,
    service_role_key: Option<String>,
}

impl SupabaseIdentity {
    pub fn new(
        base_url: &str,
        anon_key: &str,
        service_role_key: Option<String>,
    ) -> IdentityResult<Self> {
        let base_url =
            Url::parse(base_url).map_err(|e| IdentityError::InvalidUrl(format!("{base_url}: {e}")))?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            anon_key: anon_key.to_string(),
            service_role_key,
        })
    }

    pub fn from_config(config: &BackendConfig) -> IdentityResult<Self> {
        Self::new(&config.url, &config.anon_key, config.service_role_key.clone())
    }

    fn url(&self, path: &str) -> IdentityResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| IdentityError::InvalidUrl(e.to_string()))
    }

    async fn token_grant<B: Serialize>(&self, grant_type: &str, body: &B) -> IdentityResult<Session> {
        let mut url = self.url("/auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", grant_type);

        let response = self
            .http
            .post(url)
            .header("apikey", &self.anon_key)
            .json(body)
            .send()
            .await?;
        read_json(response).await
    }
}

/// Decode a success body, or turn a 4xx into [`IdentityError::Rejected`].
async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> IdentityResult<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let body = response.text().await.unwrap_or_default();
    if status.is_client_error() {
        let message = serde_json::from_str::<ErrorBody>(&body)
            .unwrap_or_default()
            .message()
            .unwrap_or_else(|| format!("request rejected ({status})"));
        return Err(IdentityError::Rejected(message));
    }
    Err(IdentityError::Upstream { status, body })
}

#[async_trait]
impl IdentityProvider for SupabaseIdentity {
    async fn get_user(&self, access_token: &str) -> IdentityResult<Option<User>> {
        let response = self
            .http
            .get(self.url("/auth/v1/user")?)
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            _ => read_json(response).await.map(Some),
        }
    }

    async fn set_session(&self, access_token: &str, refresh_token: &str) -> IdentityResult<Session> {
        if let Some(user) = self.get_user(access_token).await? {
            return Ok(Session {
                access_token: access_token.to_string(),
                refresh_token: refresh_token.to_string(),
                expires_in: None,
                token_type: Some("bearer".to_string()),
                user: Some(user),
            });
        }

        tracing::debug!("access token not accepted, refreshing session");
        self.token_grant(
            "refresh_token",
            &serde_json::json!({ "refresh_token": refresh_token }),
        )
        .await
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> IdentityResult<Session> {
        self.token_grant(
            "password",
            &serde_json::json!({ "email": email, "password": password }),
        )
        .await
    }

    async fn exchange_code_for_session(&self, code: &str) -> IdentityResult<Session> {
        self.token_grant("pkce", &serde_json::json!({ "auth_code": code }))
            .await
    }

    async fn list_users(&self) -> IdentityResult<Vec<User>> {
        let service_key = self
            .service_role_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(IdentityError::MissingServiceKey)?;

        let response = self
            .http
            .get(self.url("/auth/v1/admin/users")?)
            .header("apikey", service_key)
            .bearer_auth(service_key)
            .send()
            .await?;
        let list: UserList = read_json(response).await?;
        Ok(list.users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(server: &MockServer, service_key: Option<&str>) -> SupabaseIdentity {
        SupabaseIdentity::new(&server.base_url(), "anon", service_key.map(str::to_string)).unwrap()
    }

    #[tokio::test]
    async fn test_get_user_accepts_and_rejects() {
        let server = MockServer::start_async().await;
        let ok = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/auth/v1/user")
                    .header("apikey", "anon")
                    .header("authorization", "Bearer good");
                then.status(200)
                    .json_body(json!({ "id": "u-1", "email": "ada@salk.edu" }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/auth/v1/user")
                    .header("authorization", "Bearer bad");
                then.status(401).json_body(json!({ "msg": "invalid JWT" }));
            })
            .await;

        let identity = client(&server, None);
        let user = identity.get_user("good").await.unwrap().unwrap();
        assert_eq!(user.email.as_deref(), Some("ada@salk.edu"));
        assert!(identity.get_user("bad").await.unwrap().is_none());
        ok.assert_async().await;
    }

    #[tokio::test]
    async fn test_sign_in_rejection_carries_message() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/auth/v1/token")
                    .query_param("grant_type", "password");
                then.status(400).json_body(json!({
                    "error": "invalid_grant",
                    "error_description": "Invalid login credentials"
                }));
            })
            .await;

        let err = client(&server, None)
            .sign_in_with_password("ada@salk.edu", "wrong")
            .await
            .unwrap_err();
        match err {
            IdentityError::Rejected(msg) => assert_eq!(msg, "Invalid login credentials"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_set_session_refreshes_expired_token() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/auth/v1/user");
                then.status(401);
            })
            .await;
        let refresh = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/auth/v1/token")
                    .query_param("grant_type", "refresh_token")
                    .json_body(json!({ "refresh_token": "r-1" }));
                then.status(200).json_body(json!({
                    "access_token": "a-2",
                    "refresh_token": "r-2",
                    "expires_in": 3600,
                    "user": { "id": "u-1", "email": "ada@salk.edu" }
                }));
            })
            .await;

        let session = client(&server, None)
            .set_session("a-1", "r-1")
            .await
            .unwrap();
        assert_eq!(session.access_token, "a-2");
        assert_eq!(session.refresh_token, "r-2");
        refresh.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_users_requires_service_key() {
        let server = MockServer::start_async().await;
        let err = client(&server, None).list_users().await.unwrap_err();
        assert!(matches!(err, IdentityError::MissingServiceKey));

        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/auth/v1/admin/users")
                    .header("apikey", "service");
                then.status(200).json_body(json!({
                    "users": [
                        { "id": "u-1", "email": "testuser5@salk.edu" },
                        { "id": "u-2", "email": "testuser6@salk.edu" }
                    ]
                }));
            })
            .await;
        let users = client(&server, Some("service")).list_users().await.unwrap();
        assert_eq!(users.len(), 2);
    }
}
