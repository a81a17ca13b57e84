//! Route configuration.

use crate::auth::session_middleware;
use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/api/species", get(handlers::list_species))
        .route("/api/ping_db", get(handlers::ping_db))
        .route("/api/debug_users", get(handlers::debug_users))
        .route("/api/client-info", get(handlers::client_info))
        .route("/api/auth/set-session", post(handlers::set_session))
        // Provider OAuth
        .route(
            "/api/oauth/gitlab/initiate",
            post(handlers::initiate_gitlab),
        )
        .route("/api/oauth/gitlab/exchange", get(handlers::exchange_gitlab))
        .route("/api/oauth/gitlab/store", get(handlers::gitlab_store))
        .route("/api/gitlab/logged-in", get(handlers::gitlab_logged_in))
        .route("/api/gitlab/projects", get(handlers::gitlab_projects))
        // Health check (intentionally unauthenticated for load balancers/k8s probes)
        .route("/health", get(handlers::health))
        .route(
            "/storage/v1/object/sign/{*key}",
            get(handlers::signed_object),
        );

    let auth_routes = Router::new()
        .route("/", get(handlers::home))
        .route("/login", get(handlers::login_page).post(handlers::login))
        .route("/logout", post(handlers::logout))
        .route("/auth/callback", get(handlers::auth_callback));

    let app_routes = Router::new()
        .route("/app", get(handlers::getting_started))
        .route("/app/phenotypes", get(handlers::phenotypes_index))
        .route(
            "/app/phenotypes/{species_id}",
            get(handlers::phenotypes_species),
        )
        .route(
            "/app/phenotypes/{species_id}/{experiment_id}",
            get(handlers::phenotypes_experiment),
        )
        .route(
            "/app/phenotypes/{species_id}/{experiment_id}/{wave_id}/{accession_id}",
            get(handlers::phenotypes_plants),
        )
        .route(
            "/app/phenotypes/{species_id}/{experiment_id}/{wave_id}/{accession_id}/{scan_id}",
            get(handlers::phenotypes_scan),
        )
        .route("/app/traits", get(handlers::traits_index))
        .route("/app/traits/{species_id}", get(handlers::traits_species))
        .route(
            "/app/traits/{species_id}/{experiment_id}",
            get(handlers::traits_experiment),
        )
        .route(
            "/app/traits/{species_id}/{experiment_id}/{accession}",
            get(handlers::traits_accession),
        )
        .route(
            "/app/traits/{species_id}/{experiment_id}/{accession}/{image_id}",
            get(handlers::traits_image),
        )
        .route("/app/timeline", get(handlers::timeline))
        .route("/app/genes", get(handlers::genes))
        .route("/app/translation", get(handlers::translation))
        .route("/app/expression", get(handlers::expression_index))
        .route(
            "/app/expression/{species_id}",
            get(handlers::expression_species),
        )
        .route(
            "/app/expression/{species_id}/{dataset_id}",
            get(handlers::expression_dataset),
        )
        .route("/app/pipelines", get(handlers::pipelines))
        .route("/app/pipelines/connect", post(handlers::connect_gitlab))
        .route("/app/accessions", get(handlers::accessions))
        .route("/app/genotypes", get(handlers::genotypes))
        .route("/app/greenhouse", get(handlers::greenhouse))
        .route("/app/pygcms", get(handlers::pygcms))
        .route("/app/software", get(handlers::software));

    let mut router = Router::new()
        .merge(api_routes)
        .merge(auth_routes)
        .merge(app_routes);

    // SECURITY: When enabled, this endpoint MUST be network-restricted
    // to authorized Prometheus scraper IPs only.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    // Order of execution: TraceLayer -> Session -> Handler
    router
        .layer(middleware::from_fn_with_state(
            state.clone(),
            session_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
