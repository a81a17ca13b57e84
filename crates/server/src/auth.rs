//! Session cookie authentication middleware.
//!
//! The session cookie holds either a raw access token or `base64-` followed by
//! the base64 of the JSON session. Large sessions may be split over
//! `name.0`, `name.1`, ... cookies, which are joined before decoding.

use crate::error::{ApiError, ApiResult};
use crate::identity::Session;
use crate::metrics;
use crate::state::AppState;
use axum::extract::{FromRequestParts, OptionalFromRequestParts, Request, State};
use axum::http::header::{COOKIE, LOCATION};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE, URL_SAFE_NO_PAD};
use bloom_core::config::SessionConfig;
use serde::Deserialize;
use std::collections::HashMap;
use std::convert::Infallible;
use tracing::Instrument;
use uuid::Uuid;

/// Maximum length for trace IDs.
/// Longer trace IDs are truncated to prevent log bloat and potential log injection.
const MAX_TRACE_ID_LEN: usize = 128;

/// Header carrying the trace ID in and out.
pub const TRACE_ID_HEADER: &str = "x-trace-id";

/// Prefix marking a base64-encoded JSON session cookie.
const BASE64_COOKIE_PREFIX: &str = "base64-";

/// Session cookies outlive their tokens; the identity service decides validity.
const SESSION_COOKIE_MAX_AGE_SECS: i64 = 400 * 24 * 60 * 60;

/// Path prefixes reachable without a session.
const PUBLIC_PREFIXES: &[&str] = &[
    "/login", "/auth", "/error", "/api", "/storage", "/metrics", "/health",
];

/// Trace ID for request correlation.
#[derive(Clone, Debug)]
pub struct TraceId(pub String);

impl TraceId {
    /// Generate a new random trace ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create a trace ID from a client-provided value.
    /// The value is truncated to MAX_TRACE_ID_LEN characters and non-printable characters removed.
    pub fn from_client(value: &str) -> Self {
        let sanitized: String = value
            .chars()
            .take(MAX_TRACE_ID_LEN)
            .filter(|c| c.is_ascii_graphic() || *c == ' ')
            .collect();

        if sanitized.is_empty() {
            Self::new()
        } else {
            Self(sanitized)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The signed-in user of a request.
#[derive(Clone, Debug)]
pub struct CurrentUser {
    pub id: String,
    pub email: Option<String>,
    pub access_token: String,
}

impl CurrentUser {
    /// Identifier used for analytics: the email, falling back to the user id.
    pub fn distinct_id(&self) -> &str {
        self.email.as_deref().unwrap_or(&self.id)
    }
}

/// Request extension set by [`session_middleware`] on every request.
#[derive(Clone, Debug)]
struct SessionUser(Option<CurrentUser>);

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionUser>()
            .and_then(|session| session.0.clone())
            .ok_or_else(|| ApiError::Unauthorized("authentication required".to_string()))
    }
}

impl<S: Send + Sync> OptionalFromRequestParts<S> for CurrentUser {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<SessionUser>()
            .and_then(|session| session.0.clone()))
    }
}

/// Whether `path` is served without a session.
pub fn is_public_path(path: &str) -> bool {
    path == "/"
        || PUBLIC_PREFIXES.iter().any(|prefix| {
            path.strip_prefix(prefix)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        })
}

/// Parse `Cookie` headers into name/value pairs.
fn parse_cookies(headers: &HeaderMap) -> HashMap<String, String> {
    let mut cookies = HashMap::new();
    for header in headers.get_all(COOKIE) {
        let Ok(header) = header.to_str() else {
            continue;
        };
        for pair in header.split(';') {
            if let Some((name, value)) = pair.trim().split_once('=') {
                cookies.insert(name.to_string(), value.to_string());
            }
        }
    }
    cookies
}

/// Value of the session cookie, joining `name.N` chunks when present.
fn session_cookie_value(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let mut cookies = parse_cookies(headers);
    if let Some(value) = cookies.remove(cookie_name) {
        return Some(value);
    }

    let mut joined = String::new();
    for index in 0.. {
        match cookies.remove(&format!("{cookie_name}.{index}")) {
            Some(chunk) => joined.push_str(&chunk),
            None => break,
        }
    }
    (!joined.is_empty()).then_some(joined)
}

#[derive(Deserialize)]
struct CookieSession {
    access_token: String,
}

/// Extract the access token from a session cookie value.
pub fn access_token_from_cookie(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let Some(encoded) = value.strip_prefix(BASE64_COOKIE_PREFIX) else {
        return Some(value.to_string());
    };

    let decoded = URL_SAFE_NO_PAD
        .decode(encoded)
        .or_else(|_| URL_SAFE.decode(encoded))
        .or_else(|_| STANDARD.decode(encoded))
        .ok()?;
    serde_json::from_slice::<CookieSession>(&decoded)
        .ok()
        .map(|session| session.access_token)
}

/// `Set-Cookie` value storing `session`.
pub fn session_cookie(config: &SessionConfig, session: &Session) -> ApiResult<HeaderValue> {
    let json = serde_json::to_vec(session)
        .map_err(|e| ApiError::Internal(format!("failed to encode session: {e}")))?;
    let value = format!(
        "{}={}{}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}{}",
        config.cookie_name,
        BASE64_COOKIE_PREFIX,
        URL_SAFE_NO_PAD.encode(json),
        SESSION_COOKIE_MAX_AGE_SECS,
        if config.secure_cookies { "; Secure" } else { "" }
    );
    HeaderValue::from_str(&value)
        .map_err(|e| ApiError::Internal(format!("invalid session cookie: {e}")))
}

/// `Set-Cookie` value that removes the session cookie.
pub fn clear_session_cookie(config: &SessionConfig) -> ApiResult<HeaderValue> {
    HeaderValue::from_str(&format!(
        "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
        config.cookie_name
    ))
    .map_err(|e| ApiError::Internal(format!("invalid session cookie: {e}")))
}

/// 302 redirect.
pub fn redirect_found(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(location) => (StatusCode::FOUND, [(LOCATION, location)]).into_response(),
        Err(_) => ApiError::Internal(format!("invalid redirect target: {location}")).into_response(),
    }
}

/// Extract trace ID from X-Trace-Id header or generate a new one.
fn extract_or_generate_trace_id(req: &Request) -> TraceId {
    req.headers()
        .get(TRACE_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(TraceId::from_client)
        .unwrap_or_else(TraceId::new)
}

async fn resolve_user(state: &AppState, headers: &HeaderMap) -> Option<CurrentUser> {
    let cookie = session_cookie_value(headers, &state.config.session.cookie_name)?;
    let access_token = access_token_from_cookie(&cookie)?;

    match state.identity.get_user(&access_token).await {
        Ok(Some(user)) => Some(CurrentUser {
            id: user.id,
            email: user.email,
            access_token,
        }),
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(error = %e, "failed to resolve session user");
            None
        }
    }
}

/// Resolves the session user and sets up trace context.
///
/// Requests without a user are redirected to `/login` unless the path is public.
pub async fn session_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let trace_id = extract_or_generate_trace_id(&req);
    let trace_id_str = trace_id.0.clone();
    req.extensions_mut().insert(trace_id);

    let span = tracing::info_span!("request", trace_id = %trace_id_str);
    let user = resolve_user(&state, req.headers())
        .instrument(span.clone())
        .await;

    let mut response = if user.is_none() && !is_public_path(req.uri().path()) {
        metrics::AUTH_REDIRECTS.inc();
        span.in_scope(|| tracing::debug!(path = %req.uri().path(), "no session, redirecting to /login"));
        redirect_found("/login")
    } else {
        req.extensions_mut().insert(SessionUser(user));
        next.run(req).instrument(span).await
    };

    if let Ok(value) = HeaderValue::from_str(&trace_id_str) {
        response.headers_mut().insert(TRACE_ID_HEADER, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_paths() {
        for path in ["/", "/login", "/auth/callback", "/api/species", "/storage/v1/object/sign/x", "/health"] {
            assert!(is_public_path(path), "{path} should be public");
        }
        for path in ["/app", "/app/genes", "/logout"] {
            assert!(!is_public_path(path), "{path} should be protected");
        }
    }

    #[test]
    fn test_public_prefix_matches_whole_segments() {
        for path in ["/apiary", "/authors", "/healthz", "/loginx", "/storage-admin"] {
            assert!(!is_public_path(path), "{path} should be protected");
        }
        assert!(is_public_path("/api"));
    }

    #[test]
    fn test_access_token_from_raw_and_encoded_cookie() {
        assert_eq!(access_token_from_cookie("eyJraw").as_deref(), Some("eyJraw"));

        let json = br#"{"access_token":"tok-1","refresh_token":"r"}"#;
        for encoded in [URL_SAFE_NO_PAD.encode(json), STANDARD.encode(json)] {
            let cookie = format!("base64-{encoded}");
            assert_eq!(access_token_from_cookie(&cookie).as_deref(), Some("tok-1"));
        }

        assert!(access_token_from_cookie("base64-!!!").is_none());
        assert!(access_token_from_cookie("").is_none());
    }

    #[test]
    fn test_chunked_session_cookie_is_joined() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("other=1; sb-localhost-auth-token.0=base64-ab; sb-localhost-auth-token.1=cd"),
        );
        assert_eq!(
            session_cookie_value(&headers, "sb-localhost-auth-token").as_deref(),
            Some("base64-abcd")
        );
    }

    #[test]
    fn test_session_cookie_round_trips_access_token() {
        let config = SessionConfig {
            cookie_name: "sb".to_string(),
            secure_cookies: true,
        };
        let session = Session {
            access_token: "tok-2".to_string(),
            refresh_token: "r-2".to_string(),
            expires_in: Some(3600),
            token_type: None,
            user: None,
        };

        let header = session_cookie(&config, &session).unwrap();
        let header = header.to_str().unwrap();
        assert!(header.ends_with("; Secure"));

        let value = header
            .strip_prefix("sb=")
            .and_then(|rest| rest.split(';').next())
            .unwrap();
        assert_eq!(access_token_from_cookie(value).as_deref(), Some("tok-2"));
    }

    #[test]
    fn test_trace_id_sanitized() {
        let long = "a".repeat(300);
        assert_eq!(TraceId::from_client(&long).as_str().len(), MAX_TRACE_ID_LEN);
        assert_eq!(TraceId::from_client("abc\n\tdef").as_str(), "abcdef");
        assert!(!TraceId::from_client("\n").as_str().is_empty());
    }
}
