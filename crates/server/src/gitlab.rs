//! GitLab OAuth and API client.

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OAuthClientError {
    #[error("invalid provider URL: {0}")]
    InvalidUrl(String),

    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider error ({status}): {body}")]
    Upstream { status: StatusCode, body: String },
}

pub type OAuthClientResult<T> = std::result::Result<T, OAuthClientError>;

/// Authorization-code grant with a PKCE verifier.
#[derive(Clone, Debug, Serialize)]
pub struct CodeExchange {
    pub client_id: String,
    pub client_secret: String,
    pub code: String,
    pub grant_type: &'static str,
    pub redirect_uri: String,
    pub code_verifier: String,
}

impl CodeExchange {
    pub fn new(
        client_id: &str,
        client_secret: &str,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> Self {
        Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            code: code.to_string(),
            grant_type: "authorization_code",
            redirect_uri: redirect_uri.to_string(),
            code_verifier: code_verifier.to_string(),
        }
    }
}

/// Token endpoint response.
#[derive(Clone, Debug, Deserialize)]
pub struct ProviderTokens {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    pub expires_in: i64,
    pub refresh_token: String,
    /// Unix seconds.
    pub created_at: i64,
}

/// Provider operations used by the OAuth routes.
#[async_trait]
pub trait OAuthClient: Send + Sync {
    /// POST the code and verifier to the token endpoint.
    async fn exchange_code(&self, exchange: &CodeExchange) -> OAuthClientResult<ProviderTokens>;

    /// The provider account behind `access_token`.
    async fn current_user(&self, access_token: &str) -> OAuthClientResult<serde_json::Value>;

    /// Projects the account is a member of.
    async fn projects(&self, access_token: &str) -> OAuthClientResult<serde_json::Value>;
}

#[derive(Clone)]
pub struct GitLabClient {
    http: reqwest::Client,
    base_url: Url,
}

impl GitLabClient {
    pub fn new(base_url: &str) -> OAuthClientResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| OAuthClientError::InvalidUrl(format!("{base_url}: {e}")))?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
        })
    }

    fn url(&self, path: &str) -> OAuthClientResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| OAuthClientError::InvalidUrl(e.to_string()))
    }

    async fn get_json(&self, url: Url, access_token: &str) -> OAuthClientResult<serde_json::Value> {
        let response = self.http.get(url).bearer_auth(access_token).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OAuthClientError::Upstream { status, body });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl OAuthClient for GitLabClient {
    async fn exchange_code(&self, exchange: &CodeExchange) -> OAuthClientResult<ProviderTokens> {
        let response = self
            .http
            .post(self.url("/oauth/token")?)
            .form(exchange)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OAuthClientError::Upstream { status, body });
        }
        Ok(response.json().await?)
    }

    async fn current_user(&self, access_token: &str) -> OAuthClientResult<serde_json::Value> {
        self.get_json(self.url("/api/v4/user")?, access_token).await
    }

    async fn projects(&self, access_token: &str) -> OAuthClientResult<serde_json::Value> {
        let mut url = self.url("/api/v4/projects")?;
        url.query_pairs_mut().append_pair("membership", "true");
        self.get_json(url, access_token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_exchange_code_posts_form() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/oauth/token")
                    .header("content-type", "application/x-www-form-urlencoded")
                    .x_www_form_urlencoded_tuple("grant_type", "authorization_code")
                    .x_www_form_urlencoded_tuple("code", "c-1")
                    .x_www_form_urlencoded_tuple("code_verifier", "v-1");
                then.status(200).json_body(json!({
                    "access_token": "gl-access",
                    "token_type": "Bearer",
                    "expires_in": 7200,
                    "refresh_token": "gl-refresh",
                    "created_at": 1_700_000_000
                }));
            })
            .await;

        let client = GitLabClient::new(&server.base_url()).unwrap();
        let tokens = client
            .exchange_code(&CodeExchange::new(
                "client",
                "secret",
                "c-1",
                "http://localhost:3000/api/oauth/gitlab/exchange",
                "v-1",
            ))
            .await
            .unwrap();

        assert_eq!(tokens.access_token, "gl-access");
        assert_eq!(tokens.created_at, 1_700_000_000);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_projects_requests_membership() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/v4/projects")
                    .query_param("membership", "true")
                    .header("authorization", "Bearer gl-access");
                then.status(200).json_body(json!([{ "id": 1, "name": "bloom" }]));
            })
            .await;

        let client = GitLabClient::new(&server.base_url()).unwrap();
        let projects = client.projects("gl-access").await.unwrap();
        assert_eq!(projects[0]["name"], "bloom");
    }

    #[tokio::test]
    async fn test_failed_exchange_is_upstream_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/oauth/token");
                then.status(400).json_body(json!({ "error": "invalid_grant" }));
            })
            .await;

        let client = GitLabClient::new(&server.base_url()).unwrap();
        let err = client
            .exchange_code(&CodeExchange::new("c", "s", "bad", "http://x", "v"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OAuthClientError::Upstream { status, .. } if status == StatusCode::BAD_REQUEST
        ));
    }
}
