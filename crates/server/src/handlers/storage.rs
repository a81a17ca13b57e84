//! Serves objects behind URLs signed by the filesystem backend.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use bloom_storage::{ObjectStore, content_type_for};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct SignedQuery {
    pub expires: i64,
    pub token: String,
}

/// GET /storage/v1/object/sign/{*key}
pub async fn signed_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<SignedQuery>,
) -> ApiResult<Response> {
    let backend = state
        .signed_objects
        .as_ref()
        .ok_or_else(|| ApiError::NotFound(key.clone()))?;

    backend.verify_signature(&key, query.expires, &query.token)?;

    let meta = backend.head(&key).await?;
    let stream = backend.get_stream(&key).await?;

    Ok((
        [
            (CONTENT_TYPE, content_type_for(&key).to_string()),
            (CONTENT_LENGTH, meta.size.to_string()),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}
