//! Prometheus metrics for the Bloom server.
//!
//! # Security Note
//!
//! The `/metrics` endpoint is unauthenticated to allow Prometheus scraping.
//! Metrics carry no user data, only aggregate counts.
//!
//! **Deployment Requirement**: The `/metrics` endpoint MUST be network-restricted
//! to authorized Prometheus scraper IPs only.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{self, Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub static PAGE_VIEWS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("bloom_page_views_total", "Rendered app pages by section"),
        &["section"],
    )
    .expect("metric creation failed")
});

pub static API_REQUESTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("bloom_api_requests_total", "JSON API requests by endpoint"),
        &["endpoint"],
    )
    .expect("metric creation failed")
});

pub static AUTH_REDIRECTS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "bloom_auth_redirects_total",
        "Requests without a session redirected to /login",
    )
    .expect("metric creation failed")
});

pub static OAUTH_INITIATIONS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "bloom_oauth_initiations_total",
        "OAuth authorization flows started",
    )
    .expect("metric creation failed")
});

pub static OAUTH_EXCHANGES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "bloom_oauth_exchanges_total",
        "OAuth codes exchanged for stored tokens",
    )
    .expect("metric creation failed")
});

pub static OAUTH_FAILURES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("bloom_oauth_failures_total", "OAuth flow failures by stage"),
        &["stage"],
    )
    .expect("metric creation failed")
});

pub static SIGNED_URLS_ISSUED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("bloom_signed_urls_issued_total", "Signed object URLs issued by bucket"),
        &["bucket"],
    )
    .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// Idempotent, so integration tests can build many routers.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(PAGE_VIEWS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(API_REQUESTS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(AUTH_REDIRECTS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(OAUTH_INITIATIONS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(OAUTH_EXCHANGES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(OAUTH_FAILURES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(SIGNED_URLS_ISSUED.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

pub fn record_page_view(section: &str) {
    PAGE_VIEWS.with_label_values(&[section]).inc();
}

pub fn record_api_request(endpoint: &str) {
    API_REQUESTS.with_label_values(&[endpoint]).inc();
}

pub fn record_oauth_failure(stage: &str) {
    OAUTH_FAILURES.with_label_values(&[stage]).inc();
}
