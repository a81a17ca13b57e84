//! Sign-in, sign-out and the auth callback.

use crate::auth::{CurrentUser, clear_session_cookie, redirect_found, session_cookie};
use crate::error::ApiResult;
use crate::html::{escape, page};
use crate::identity::Session;
use crate::state::AppState;
use axum::Form;
use axum::extract::{Query, State};
use axum::http::header::SET_COOKIE;
use axum::response::{Html, IntoResponse, Response};
use serde::Deserialize;

/// Redirect with the session cookie set.
fn redirect_with_session(state: &AppState, session: &Session, location: &str) -> ApiResult<Response> {
    let cookie = session_cookie(&state.config.session, session)?;
    let mut response = redirect_found(location);
    response.headers_mut().insert(SET_COOKIE, cookie);
    Ok(response)
}

/// GET /
pub async fn home(user: Option<CurrentUser>) -> Response {
    if user.is_some() {
        return redirect_found("/app");
    }
    let body = r#"<p>Bloom is a data-sharing platform for plant biology: root phenotypes, gene candidates, translation projects and single-cell expression.</p>
<p><a href="/login">Sign in</a></p>"#;
    Html(page("Welcome to Bloom", body, false)).into_response()
}

fn login_form(error: Option<&str>) -> String {
    let error = error
        .map(|e| format!(r#"<p class="error">{}</p>"#, escape(e)))
        .unwrap_or_default();
    let body = format!(
        r#"{error}<form method="post" action="/login">
<label>Email <input type="email" name="email" required></label>
<label>Password <input type="password" name="password" required></label>
<button type="submit">Sign in</button>
</form>"#
    );
    page("Sign in", &body, false)
}

/// GET /login
pub async fn login_page() -> Html<String> {
    Html(login_form(None))
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

/// POST /login
pub async fn login(State(state): State<AppState>, Form(form): Form<LoginForm>) -> Response {
    let session = match state
        .identity
        .sign_in_with_password(&form.email, &form.password)
        .await
    {
        Ok(session) => session,
        Err(e) => {
            tracing::info!(email = %form.email, error = %e, "sign-in failed");
            return Html(login_form(Some(&e.to_string()))).into_response();
        }
    };

    tracing::info!(email = %form.email, "signed in");
    redirect_with_session(&state, &session, "/app").unwrap_or_else(IntoResponse::into_response)
}

/// POST /logout
pub async fn logout(State(state): State<AppState>) -> ApiResult<Response> {
    let cookie = clear_session_cookie(&state.config.session)?;
    let mut response = redirect_found("/login");
    response.headers_mut().insert(SET_COOKIE, cookie);
    Ok(response)
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
}

/// GET /auth/callback
pub async fn auth_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> ApiResult<Response> {
    let Some(code) = query.code else {
        return Ok(redirect_found("/"));
    };
    let session = state.identity.exchange_code_for_session(&code).await?;
    redirect_with_session(&state, &session, "/")
}
