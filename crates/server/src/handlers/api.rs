//! JSON API endpoints.

use crate::auth::session_cookie;
use crate::error::{ApiError, ApiResult};
use crate::metrics::record_api_request;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::SET_COOKIE;
use axum::response::{IntoResponse, Response};
use bloom_store::models::SpeciesRow;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// GET /api/species
pub async fn list_species(State(state): State<AppState>) -> ApiResult<Json<Vec<SpeciesRow>>> {
    record_api_request("species");
    Ok(Json(state.store.list_species().await?))
}

#[derive(Debug, Serialize)]
pub struct PingResponse {
    pub ok: bool,
    pub error: Option<String>,
}

/// GET /api/ping_db
pub async fn ping_db(State(state): State<AppState>) -> Json<PingResponse> {
    record_api_request("ping_db");
    match state.store.health_check().await {
        Ok(()) => Json(PingResponse {
            ok: true,
            error: None,
        }),
        Err(e) => {
            tracing::warn!(error = %e, "database ping failed");
            Json(PingResponse {
                ok: false,
                error: Some(e.to_string()),
            })
        }
    }
}

/// GET /api/debug_users
pub async fn debug_users(State(state): State<AppState>) -> Response {
    record_api_request("debug_users");
    match state.identity.list_users().await {
        Ok(users) => {
            let emails: Vec<String> = users.into_iter().filter_map(|u| u.email).collect();
            Json(json!({ "count": emails.len(), "users": emails })).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to list users");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ClientInfo {
    pub api_url: String,
    pub anon_key: String,
}

/// GET /api/client-info
pub async fn client_info(State(state): State<AppState>) -> Json<ClientInfo> {
    record_api_request("client_info");
    Json(ClientInfo {
        api_url: state.config.backend.url.clone(),
        anon_key: state.config.backend.anon_key.clone(),
    })
}

#[derive(Debug, Deserialize)]
pub struct SetSessionRequest {
    pub access_token: String,
    pub refresh_token: String,
}

/// POST /api/auth/set-session
pub async fn set_session(
    State(state): State<AppState>,
    Json(req): Json<SetSessionRequest>,
) -> Response {
    record_api_request("set_session");
    let result: ApiResult<Response> = async {
        let session = state
            .identity
            .set_session(&req.access_token, &req.refresh_token)
            .await?;
        let cookie = session_cookie(&state.config.session, &session)?;
        Ok(([(SET_COOKIE, cookie)], Json(json!({ "data": session }))).into_response())
    }
    .await;

    result.unwrap_or_else(|e: ApiError| {
        tracing::warn!(error = %e, "set-session failed");
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response()
    })
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub store: &'static str,
    pub storage: &'static str,
}

/// GET /health
///
/// Unauthenticated for load balancers and container health checks.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let store_ok = match state.store.health_check().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "store health check failed");
            false
        }
    };
    let storage_ok = match state.storage.health_check().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "storage health check failed");
            false
        }
    };

    let status = if store_ok && storage_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let label = |ok: bool| if ok { "ok" } else { "unavailable" };

    (
        status,
        Json(HealthResponse {
            status: if status == StatusCode::OK { "ok" } else { "degraded" },
            store: label(store_ok),
            storage: label(storage_ok),
        }),
    )
}
