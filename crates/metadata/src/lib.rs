//! Relational store for Bloom.
//!
//! This crate owns the data model the web application reads and the CLI
//! writes:
//! - Species, experiments, waves, plants, scans and images
//! - Trait measurements and the per-day scan timeline
//! - Gene candidates, translation projects and people
//! - Single-cell expression datasets
//! - OAuth flow state and encrypted provider tokens

pub mod error;
pub mod models;
pub mod postgres;
pub mod repos;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use postgres::PostgresStore;
pub use store::{MetadataStore, SqliteStore};

use bloom_core::config::StoreConfig;
use std::sync::Arc;

/// Create a store from configuration.
pub async fn from_config(config: &StoreConfig) -> StoreResult<Arc<dyn MetadataStore>> {
    match config {
        StoreConfig::Sqlite {
            path,
            query_timeout_secs,
        } => {
            let store = SqliteStore::new(path, *query_timeout_secs).await?;
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
        StoreConfig::Postgres {
            url,
            host,
            port,
            username,
            password,
            database,
            ssl_mode,
            max_connections,
            statement_timeout_ms,
        } => {
            let store = if let Some(url) = url {
                tracing::info!("Connecting to PostgreSQL using connection URL");
                PostgresStore::from_url(url, *max_connections, *statement_timeout_ms).await?
            } else if let (Some(host), Some(database)) = (host.as_ref(), database.as_ref()) {
                PostgresStore::from_params(
                    host,
                    port.unwrap_or(5432),
                    username.as_deref(),
                    password.as_deref(),
                    database,
                    *ssl_mode,
                    *max_connections,
                    *statement_timeout_ms,
                )
                .await?
            } else {
                return Err(StoreError::Config(
                    "postgres config requires either 'url' or 'host' + 'database'".to_string(),
                ));
            };
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
    }
}
