//! Bloom server binary.

use anyhow::{Context, Result};
use bloom_core::config::AppConfig;
use bloom_server::gitlab::GitLabClient;
use bloom_server::identity::SupabaseIdentity;
use bloom_server::{AppState, create_router};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Bloom - plant biology data sharing
#[derive(Parser, Debug)]
#[command(name = "bloom-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "BLOOM_CONFIG", default_value = "config/server.toml")]
    config: String,
}

/// Load configuration from the TOML file (optional) and `BLOOM_*` variables.
fn load_config(path: &str) -> Result<AppConfig> {
    let config_path = std::path::Path::new(path);
    let mut figment = Figment::new();
    let has_config_file = config_path.exists();

    if has_config_file {
        tracing::info!(config_path = %path, "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::debug!("No config file found at {}", path);
    }

    // BLOOM_CONFIG is just the path
    let has_env_config =
        std::env::vars().any(|(key, _)| key.starts_with("BLOOM_") && key != "BLOOM_CONFIG");

    if !has_config_file && !has_env_config {
        anyhow::bail!(
            "No configuration provided.\n\n\
             Provide configuration via one of:\n  \
             1. Config file: bloom-server --config /path/to/config.toml\n  \
             2. Environment variables: BLOOM_BACKEND__URL=http://127.0.0.1:54321 \
             BLOOM_BACKEND__ANON_KEY=YOUR_ANON_KEY bloom-server\n\n\
             See config/server.toml for an example configuration.\n\
             Set BLOOM_CONFIG env var to specify a default config file path."
        );
    }

    if !has_config_file {
        tracing::info!("Using environment variables for configuration");
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("BLOOM_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Bloom v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;

    bloom_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let storage = bloom_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage")?;
    storage
        .store
        .health_check()
        .await
        .context("storage health check failed")?;
    tracing::info!(
        backend = storage.store.backend_name(),
        "Storage backend connectivity verified"
    );

    let store = bloom_store::from_config(&config.store)
        .await
        .context("failed to initialize store")?;
    tracing::info!("Store initialized");

    let identity = SupabaseIdentity::from_config(&config.backend)
        .context("failed to initialize identity client")?;
    let oauth = GitLabClient::new(&config.oauth.gitlab_base_url)
        .context("failed to initialize GitLab client")?;
    if config.oauth.enabled {
        tracing::info!(base_url = %config.oauth.gitlab_base_url, "GitLab integration enabled");
    }

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;

    let mut state = AppState::new(
        config,
        store,
        storage.store,
        Arc::new(identity),
        Arc::new(oauth),
    )
    .context("failed to create application state")?;
    if let Some(filesystem) = storage.filesystem {
        state = state.with_signed_objects(filesystem);
    }
    if !state.analytics.is_enabled() {
        tracing::info!("Analytics disabled (no analytics.mixpanel_token)");
    }

    let app = create_router(state);

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_config_from_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("server.toml");
        std::fs::write(
            &path,
            r#"
[server]
bind = "127.0.0.1:4000"

[backend]
url = "http://127.0.0.1:54321"
anon_key = "anon"

[store]
type = "sqlite"
path = "/tmp/bloom-test.db"
"#,
        )
        .unwrap();

        let config = load_config(path.to_str().unwrap()).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:4000");
        assert_eq!(config.backend.anon_key, "anon");
        assert!(!config.oauth.enabled);
    }

    #[test]
    fn load_config_rejects_invalid_oauth() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("server.toml");
        std::fs::write(
            &path,
            r#"
[backend]
url = "http://127.0.0.1:54321"
anon_key = "anon"

[oauth]
enabled = true
"#,
        )
        .unwrap();

        let err = load_config(path.to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("client_id"));
    }
}
