//! GitLab OAuth (PKCE) routes and provider API passthrough.

use crate::auth::{CurrentUser, redirect_found};
use crate::error::{ApiError, ApiResult};
use crate::gitlab::CodeExchange;
use crate::metrics::{self, record_api_request, record_oauth_failure};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use bloom_core::config::OAuthConfig;
use bloom_core::{OAuthProvider, PkceChallenge, pkce};
use bloom_store::models::{NewFlowState, NewOAuthTokens};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

const PROVIDER: OAuthProvider = OAuthProvider::GitLab;

/// Resolved client settings of an enabled integration.
struct GitLabSettings<'a> {
    base_url: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
    app_url: &'a str,
}

impl<'a> GitLabSettings<'a> {
    fn from_config(config: &'a OAuthConfig) -> ApiResult<Self> {
        if !config.enabled {
            return Err(ApiError::Config("GitLab integration is disabled".to_string()));
        }
        let (Some(client_id), Some(client_secret), Some(app_url)) = (
            config.client_id.as_deref(),
            config.client_secret.as_deref(),
            config.app_url.as_deref(),
        ) else {
            return Err(ApiError::Config(
                "GitLab integration is not configured".to_string(),
            ));
        };
        Ok(Self {
            base_url: &config.gitlab_base_url,
            client_id,
            client_secret,
            app_url: app_url.trim_end_matches('/'),
        })
    }

    fn redirect_uri(&self) -> String {
        format!("{}/api/oauth/gitlab/exchange", self.app_url)
    }
}

#[derive(Debug, Serialize)]
pub struct InitiateResponse {
    pub authorization_url: String,
}

/// Persist a fresh PKCE flow for `user`, replacing any pending one, and
/// build the provider authorization URL.
async fn start_flow(state: &AppState, user: &CurrentUser) -> ApiResult<String> {
    let settings = GitLabSettings::from_config(&state.config.oauth)?;

    let challenge = PkceChallenge::generate();
    state
        .store
        .replace_flow_state(&NewFlowState {
            user_id: user.id.clone(),
            provider: PROVIDER.as_str().to_string(),
            state: challenge.state.clone(),
            code_verifier: challenge.verifier.clone(),
            code_challenge: challenge.challenge.clone(),
            created_at: OffsetDateTime::now_utc(),
        })
        .await?;

    let url = pkce::authorization_url(
        settings.base_url,
        settings.client_id,
        &settings.redirect_uri(),
        PROVIDER.scope(),
        &challenge,
    )?;

    metrics::OAUTH_INITIATIONS.inc();
    tracing::info!(user_id = %user.id, provider = PROVIDER.as_str(), "OAuth flow initiated");
    Ok(url.to_string())
}

/// POST /api/oauth/gitlab/initiate
pub async fn initiate_gitlab(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<Json<InitiateResponse>> {
    record_api_request("oauth_initiate");
    let authorization_url = start_flow(&state, &user).await?;
    Ok(Json(InitiateResponse { authorization_url }))
}

/// POST /app/pipelines/connect
///
/// Form submit from the pipelines page; redirects straight to the provider.
pub async fn connect_gitlab(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<Response> {
    record_api_request("oauth_connect");
    let authorization_url = start_flow(&state, &user).await?;
    Ok(redirect_found(&authorization_url))
}

#[derive(Debug, Deserialize)]
pub struct ExchangeQuery {
    pub code: Option<String>,
    pub state: Option<String>,
}

/// GET /api/oauth/gitlab/exchange
pub async fn exchange_gitlab(
    State(state): State<AppState>,
    user: Option<CurrentUser>,
    Query(query): Query<ExchangeQuery>,
) -> Response {
    record_api_request("oauth_exchange");
    if !state.config.oauth.enabled {
        return redirect_found("/");
    }

    match complete_exchange(&state, user, query).await {
        Ok(app_url) => {
            metrics::OAUTH_EXCHANGES.inc();
            redirect_found(&format!("{app_url}/app/pipelines"))
        }
        Err(e) => {
            tracing::error!(error = %e, "OAuth exchange failed");
            ApiError::Internal("OAuth exchange failed".to_string()).into_response()
        }
    }
}

async fn complete_exchange(
    state: &AppState,
    user: Option<CurrentUser>,
    query: ExchangeQuery,
) -> ApiResult<String> {
    let settings = GitLabSettings::from_config(&state.config.oauth)?;
    let user = user.ok_or_else(|| {
        record_oauth_failure("session");
        ApiError::Internal("no session for OAuth exchange".to_string())
    })?;
    let (Some(code), Some(flow_state)) = (query.code, query.state) else {
        record_oauth_failure("callback");
        return Err(ApiError::Internal("missing code or state".to_string()));
    };

    let flow = state
        .store
        .get_flow_state(&user.id, PROVIDER.as_str(), &flow_state)
        .await?
        .ok_or_else(|| {
            record_oauth_failure("flow_state");
            ApiError::Internal("unknown OAuth flow state".to_string())
        })?;

    let cipher = state.require_cipher()?;

    let exchange = CodeExchange::new(
        settings.client_id,
        settings.client_secret,
        &code,
        &settings.redirect_uri(),
        &flow.code_verifier,
    );
    let tokens = state.oauth.exchange_code(&exchange).await.inspect_err(|_| {
        record_oauth_failure("token");
    })?;

    let created_at = OffsetDateTime::from_unix_timestamp(tokens.created_at)
        .map_err(|e| ApiError::Upstream(format!("invalid token created_at: {e}")))?;
    let expires_at = OffsetDateTime::now_utc()
        .checked_add(time::Duration::seconds(tokens.expires_in))
        .ok_or_else(|| ApiError::Upstream("invalid token expires_in".to_string()))?;

    state
        .store
        .replace_tokens(&NewOAuthTokens {
            user_id: user.id.clone(),
            provider: PROVIDER.as_str().to_string(),
            encrypted_access_token: cipher.encrypt(&tokens.access_token),
            encrypted_refresh_token: cipher.encrypt(&tokens.refresh_token),
            created_at,
            expires_at,
        })
        .await?;

    tracing::info!(user_id = %user.id, provider = PROVIDER.as_str(), "OAuth tokens stored");
    Ok(settings.app_url.to_string())
}

#[derive(Debug, Serialize)]
pub struct StoreResponse {
    pub app_url: Option<String>,
}

/// GET /api/oauth/gitlab/store
pub async fn gitlab_store(State(state): State<AppState>) -> Json<StoreResponse> {
    record_api_request("oauth_store");
    Json(StoreResponse {
        app_url: state.config.oauth.app_url.clone(),
    })
}

#[derive(Debug, Serialize)]
pub struct LoggedInResponse {
    pub logged_in: bool,
}

/// GET /api/gitlab/logged-in
pub async fn gitlab_logged_in(
    State(state): State<AppState>,
    user: Option<CurrentUser>,
) -> ApiResult<Json<LoggedInResponse>> {
    record_api_request("gitlab_logged_in");
    let logged_in = match (state.config.oauth.enabled, user) {
        (true, Some(user)) => state
            .store
            .get_tokens(&user.id, PROVIDER.as_str())
            .await?
            .is_some(),
        _ => false,
    };
    Ok(Json(LoggedInResponse { logged_in }))
}

/// Projects of the user's connected provider account, or `None` when the
/// integration is off or the user never connected.
pub(crate) async fn connected_projects(
    state: &AppState,
    user: Option<&CurrentUser>,
) -> ApiResult<Option<serde_json::Value>> {
    let (true, Some(user)) = (state.config.oauth.enabled, user) else {
        return Ok(None);
    };
    let Some(tokens) = state.store.get_tokens(&user.id, PROVIDER.as_str()).await? else {
        return Ok(None);
    };

    let access_token = state.require_cipher()?.decrypt(&tokens.encrypted_access_token)?;
    let account = state.oauth.current_user(&access_token).await?;
    tracing::debug!(provider_user = %account["username"], "listing provider projects");

    Ok(Some(state.oauth.projects(&access_token).await?))
}

/// GET /api/gitlab/projects
///
/// `null` when the integration is off or the user never connected.
pub async fn gitlab_projects(
    State(state): State<AppState>,
    user: Option<CurrentUser>,
) -> ApiResult<Json<serde_json::Value>> {
    record_api_request("gitlab_projects");
    let projects = connected_projects(&state, user.as_ref()).await?;
    Ok(Json(projects.unwrap_or(serde_json::Value::Null)))
}
