//! HTTP request handlers.

pub mod api;
pub mod expression;
pub mod oauth;
pub mod pages;
pub mod phenotypes;
pub mod session;
pub mod storage;

pub use api::*;
pub use expression::*;
pub use oauth::*;
pub use pages::*;
pub use phenotypes::*;
pub use session::*;
pub use storage::*;

use crate::auth::CurrentUser;
use crate::metrics;
use crate::state::AppState;
use axum::http::Uri;
use bloom_core::naming::object_key;
use bloom_store::StoreResult;
use std::time::Duration;

/// Lifetime of signed URLs embedded in pages.
pub const PAGE_URL_TTL: Duration = Duration::from_secs(120);

/// Count the page and send the analytics event.
pub(crate) fn record_page_view(state: &AppState, user: &CurrentUser, uri: &Uri, section: &str) {
    metrics::record_page_view(section);
    state.analytics.track_page_view(user.distinct_id(), &uri.to_string());
}

/// Pages degrade to empty listings when the store fails.
pub(crate) fn or_empty<T: Default>(result: StoreResult<T>, what: &str) -> T {
    result.unwrap_or_else(|e| {
        tracing::error!(error = %e, what, "store query failed, rendering empty");
        T::default()
    })
}

/// Signed URL for `path` in `bucket`, or `None` (logged) when signing fails.
pub(crate) async fn signed_url(state: &AppState, bucket: &str, path: &str) -> Option<String> {
    let key = object_key(bucket, path);
    match state.storage.signed_url(&key, PAGE_URL_TTL).await {
        Ok(url) => {
            metrics::SIGNED_URLS_ISSUED.with_label_values(&[bucket]).inc();
            Some(url)
        }
        Err(e) => {
            tracing::warn!(error = %e, key = %key, "failed to sign object URL");
            None
        }
    }
}
