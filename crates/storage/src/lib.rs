//! Object storage abstraction and backends for Bloom.
//!
//! This crate provides:
//! - Bucket-scoped object keys (`images/...`, `scrna/...`) over one store
//! - Time-limited signed download URLs
//! - Backends: local filesystem and S3-compatible

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::{filesystem::FilesystemBackend, s3::S3Backend};
pub use error::{StorageError, StorageResult};
pub use traits::{ByteStream, ObjectMeta, ObjectStore, content_type_for};

use bloom_core::config::StorageConfig;
use std::sync::Arc;

/// Object store built from configuration.
///
/// The filesystem backend is also returned on its own so the server can
/// verify the URLs it signs.
pub struct ConfiguredStore {
    pub store: Arc<dyn ObjectStore>,
    pub filesystem: Option<Arc<FilesystemBackend>>,
}

/// Create an object store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<ConfiguredStore> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageConfig::Filesystem {
            path,
            public_url,
            signing_secret,
        } => {
            let backend =
                Arc::new(FilesystemBackend::new(path, public_url.clone(), signing_secret.clone()).await?);
            Ok(ConfiguredStore {
                store: backend.clone(),
                filesystem: Some(backend),
            })
        }
        StorageConfig::S3 {
            bucket,
            endpoint,
            region,
            prefix,
            access_key_id,
            secret_access_key,
            force_path_style,
        } => {
            let backend = S3Backend::new(
                bucket,
                endpoint.clone(),
                region.clone(),
                prefix.clone(),
                access_key_id.clone(),
                secret_access_key.clone(),
                *force_path_style,
            )
            .await?;
            Ok(ConfiguredStore {
                store: Arc::new(backend),
                filesystem: None,
            })
        }
    }
}
