use anyhow::{Context, Result};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Rows sent per upsert request.
pub const UPSERT_BATCH_SIZE: usize = 100;

/// Client for the backend's REST (`/rest/v1`) and auth admin (`/auth/v1/admin`) APIs,
/// authenticated with the service role key.
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: Url,
    service_key: String,
}

#[derive(Debug, Serialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    pub email_confirm: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreatedUser {
    pub id: String,
    pub email: Option<String>,
}

/// Outcome of creating a user that may already exist.
#[derive(Debug)]
pub enum CreateUserOutcome {
    Created(CreatedUser),
    AlreadyRegistered,
}

impl RestClient {
    pub fn new(base_url: &str, service_key: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).context("invalid API URL")?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            service_key: service_key.to_string(),
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).context("failed to build API URL")
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    async fn send_empty(&self, req: reqwest::RequestBuilder) -> Result<()> {
        let response = self.authorize(req).send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("API error ({}): {}", status, body);
        }
        Ok(())
    }

    /// Create a confirmed user. An email that is already registered is not an error.
    pub async fn create_user(&self, email: &str, password: &str) -> Result<CreateUserOutcome> {
        let url = self.url("/auth/v1/admin/users")?;
        let req = CreateUserRequest {
            email: email.to_string(),
            password: password.to_string(),
            email_confirm: true,
        };
        let response = self.authorize(self.http.post(url).json(&req)).send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status == StatusCode::UNPROCESSABLE_ENTITY && body.contains("already been registered") {
            return Ok(CreateUserOutcome::AlreadyRegistered);
        }
        if !status.is_success() {
            anyhow::bail!("API error ({}): {}", status, body);
        }
        Ok(CreateUserOutcome::Created(serde_json::from_str(&body)?))
    }

    /// Upsert rows into `table`, [`UPSERT_BATCH_SIZE`] rows per request.
    /// Returns the number of rows sent.
    pub async fn upsert_rows(&self, table: &str, rows: &[Map<String, Value>]) -> Result<usize> {
        let url = self.url(&format!("/rest/v1/{table}"))?;
        for (index, batch) in rows.chunks(UPSERT_BATCH_SIZE).enumerate() {
            let req = self
                .http
                .post(url.clone())
                .header("Prefer", "resolution=merge-duplicates")
                .json(batch);
            self.send_empty(req)
                .await
                .with_context(|| format!("batch {} into {table}", index + 1))?;
        }
        Ok(rows.len())
    }
}
