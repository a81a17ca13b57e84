//! Local filesystem storage backend.
//!
//! Signed URLs point back at the server's `/storage/v1/object/sign/...` route,
//! which checks them with [`FilesystemBackend::verify_signature`].

use crate::error::{StorageError, StorageResult};
use crate::traits::{ByteStream, ObjectMeta, ObjectStore, content_type_for};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use rand::RngCore;
use sha2::Sha256;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::instrument;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Route prefix that serves signed objects.
pub const SIGNED_OBJECT_PATH: &str = "/storage/v1/object/sign";

/// Characters escaped inside a single path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'/');

/// Local filesystem object store.
pub struct FilesystemBackend {
    root: PathBuf,
    public_url: String,
    signing_key: Vec<u8>,
}

impl FilesystemBackend {
    /// Create a new filesystem backend.
    ///
    /// Without a `signing_secret`, a random key is drawn and URLs signed by this
    /// process stop verifying after a restart.
    pub async fn new(
        root: impl AsRef<Path>,
        public_url: Option<String>,
        signing_secret: Option<String>,
    ) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;

        let signing_key = match signing_secret {
            Some(secret) => secret.into_bytes(),
            None => {
                let mut key = vec![0u8; 32];
                rand::rngs::OsRng.fill_bytes(&mut key);
                key
            }
        };

        Ok(Self {
            root,
            public_url: public_url
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_default(),
            signing_key,
        })
    }

    /// Get the full path for a key, rejecting anything that could leave the root.
    fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() || key.starts_with('/') || key.starts_with('\\') {
            return Err(StorageError::InvalidKey(format!(
                "path traversal not allowed: {key}"
            )));
        }

        for component in Path::new(key).components() {
            if !matches!(component, Component::Normal(_)) {
                return Err(StorageError::InvalidKey(format!(
                    "contains unsafe path component: {key}"
                )));
            }
        }

        Ok(self.root.join(key))
    }

    /// Ensure parent directory exists.
    async fn ensure_parent(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    fn mac(&self, key: &str, expires: i64) -> StorageResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.signing_key)
            .map_err(|e| StorageError::Config(format!("invalid signing key: {e}")))?;
        mac.update(key.as_bytes());
        mac.update(b"|");
        mac.update(expires.to_string().as_bytes());
        Ok(mac)
    }

    /// Hex HMAC-SHA256 over `key|expires`.
    pub fn sign(&self, key: &str, expires: i64) -> StorageResult<String> {
        Ok(hex::encode(self.mac(key, expires)?.finalize().into_bytes()))
    }

    /// Check a signed URL's token and expiry (unix seconds).
    pub fn verify_signature(&self, key: &str, expires: i64, token: &str) -> StorageResult<()> {
        let provided =
            hex::decode(token).map_err(|_| StorageError::InvalidSignature(key.to_string()))?;
        self.mac(key, expires)?
            .verify_slice(&provided)
            .map_err(|_| StorageError::InvalidSignature(key.to_string()))?;

        if expires < OffsetDateTime::now_utc().unix_timestamp() {
            return Err(StorageError::Expired(key.to_string()));
        }
        Ok(())
    }
}

fn not_found_or_io(key: &str) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound(key.to_string())
        } else {
            StorageError::Io(e)
        }
    }
}

#[async_trait]
impl ObjectStore for FilesystemBackend {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        let path = self.key_path(key)?;
        let metadata = fs::metadata(&path).await.map_err(not_found_or_io(key))?;
        if !metadata.is_file() {
            return Err(StorageError::NotFound(key.to_string()));
        }

        Ok(ObjectMeta {
            size: metadata.len(),
            last_modified: metadata.modified().ok().map(|t| t.into()),
            content_type: Some(content_type_for(key).to_string()),
        })
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.key_path(key)?;
        let data = fs::read(&path).await.map_err(not_found_or_io(key))?;
        Ok(Bytes::from(data))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        let path = self.key_path(key)?;
        let file = fs::File::open(&path).await.map_err(not_found_or_io(key))?;
        let stream = ReaderStream::new(file).map(|chunk| chunk.map_err(StorageError::Io));
        Ok(Box::pin(stream))
    }

    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    async fn put(&self, key: &str, data: Bytes, _content_type: Option<&str>) -> StorageResult<()> {
        let path = self.key_path(key)?;
        self.ensure_parent(&path).await?;

        // Unique temp name per write, then rename over the target.
        let temp_name = format!(".tmp.{}", Uuid::new_v4());
        let temp_path = path.with_file_name(
            path.file_name()
                .map(|n| format!("{}{}", n.to_string_lossy(), temp_name))
                .unwrap_or_else(|| temp_name.clone()),
        );
        {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
        }
        fs::rename(&temp_path, &path).await?;

        Ok(())
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn signed_url(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        self.key_path(key)?;
        let expires = OffsetDateTime::now_utc().unix_timestamp() + expires_in.as_secs() as i64;
        let token = self.sign(key, expires)?;
        let encoded: Vec<String> = key
            .split('/')
            .map(|segment| utf8_percent_encode(segment, SEGMENT).to_string())
            .collect();

        Ok(format!(
            "{}{}/{}?expires={}&token={}",
            self.public_url,
            SIGNED_OBJECT_PATH,
            encoded.join("/"),
            expires,
            token
        ))
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn health_check(&self) -> StorageResult<()> {
        let metadata = fs::metadata(&self.root).await.map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("storage root not accessible: {}", e),
            ))
        })?;

        if !metadata.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::NotADirectory,
                format!("storage root is not a directory: {:?}", self.root),
            )));
        }

        Ok(())
    }
}
