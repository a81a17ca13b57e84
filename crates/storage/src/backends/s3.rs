//! S3-compatible storage backend (AWS S3 or MinIO).
//!
//! Bloom buckets map onto key prefixes inside one S3 bucket, so
//! `images/cyl-images/1.png` lives at `{prefix}/images/cyl-images/1.png`.
//! Signed URLs are SigV4 presigned GETs served by S3 itself.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ByteStream, ObjectMeta, ObjectStore};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::get_object::GetObjectOutput;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_smithy_http_client::Builder as SmithyHttpClientBuilder;
use bytes::Bytes;
use futures::StreamExt;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::instrument;

const DEFAULT_REGION: &str = "us-east-1";

/// Bound on the bucket check behind `/health`.
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// S3-backed object store.
pub struct S3Backend {
    client: Client,
    bucket: String,
    prefix: Option<String>,
    endpoint: String,
}

impl std::fmt::Debug for S3Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Backend")
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

/// `minio:9000` style endpoints get an explicit `http://` scheme.
fn normalize_endpoint(endpoint: &str) -> String {
    let lower = endpoint.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("http://{endpoint}")
    }
}

/// 404s become [`StorageError::NotFound`] for `key`; everything else is an S3 error.
fn map_sdk_error<E>(err: SdkError<E>, key: &str) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    match &err {
        SdkError::ServiceError(service_err) if service_err.raw().status().as_u16() == 404 => {
            StorageError::NotFound(key.to_string())
        }
        _ => StorageError::S3(Box::new(err)),
    }
}

impl S3Backend {
    /// Create a new S3 backend.
    ///
    /// Static credentials must be given as a pair; without them the AWS
    /// default chain (environment, profile, instance role) is used.
    /// `force_path_style` selects `endpoint/bucket/key` URLs, which MinIO needs.
    pub async fn new(
        bucket: &str,
        endpoint: Option<String>,
        region: Option<String>,
        prefix: Option<String>,
        access_key_id: Option<String>,
        secret_access_key: Option<String>,
        force_path_style: bool,
    ) -> StorageResult<Self> {
        let static_credentials = match (access_key_id, secret_access_key) {
            (Some(key_id), Some(secret)) => {
                Some(Credentials::new(key_id, secret, None, None, "bloom-config"))
            }
            (None, None) => None,
            _ => {
                return Err(StorageError::Config(
                    "s3 config requires both access_key_id and secret_access_key when either is set"
                        .to_string(),
                ));
            }
        };

        let region = region.unwrap_or_else(|| DEFAULT_REGION.to_string());
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region.clone()));
        if let Some(credentials) = static_credentials {
            loader = loader.credentials_provider(credentials);
        }
        let sdk_config = loader.load().await;

        let mut builder =
            aws_sdk_s3::config::Builder::from(&sdk_config).force_path_style(force_path_style);

        let endpoint = match endpoint.as_deref().map(normalize_endpoint) {
            Some(url) => {
                builder = builder.endpoint_url(&url);
                if url.to_ascii_lowercase().starts_with("http://") {
                    builder = builder.http_client(SmithyHttpClientBuilder::new().build_http());
                }
                url
            }
            None => format!("s3.{region}.amazonaws.com"),
        };

        tracing::debug!(bucket, endpoint = %endpoint, "S3 backend configured");

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: bucket.to_string(),
            prefix: prefix.map(|p| p.trim_end_matches('/').to_string()),
            endpoint,
        })
    }

    /// S3 object key for a Bloom object key.
    fn object_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}/{key}"),
            None => key.to_string(),
        }
    }

    async fn get_object(&self, key: &str) -> StorageResult<GetObjectOutput> {
        self.client
            .get_object()
            .bucket(&self.bucket)
            .key(self.object_key(key))
            .send()
            .await
            .map_err(|e| map_sdk_error(e, key))
    }
}

#[async_trait]
impl ObjectStore for S3Backend {
    #[instrument(skip(self), fields(backend = "s3"))]
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        let output = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(self.object_key(key))
            .send()
            .await
            .map_err(|e| map_sdk_error(e, key))?;

        Ok(ObjectMeta {
            size: output.content_length().map_or(0, |len| len.max(0) as u64),
            last_modified: output
                .last_modified()
                .and_then(|dt| time::OffsetDateTime::from_unix_timestamp(dt.secs()).ok()),
            content_type: output.content_type().map(str::to_string),
        })
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let output = self.get_object(key).await?;
        let body = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::S3(Box::new(e)))?;
        Ok(body.into_bytes())
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        let output = self.get_object(key).await?;
        let stream = ReaderStream::new(output.body.into_async_read())
            .map(|chunk| chunk.map_err(StorageError::Io));
        Ok(Box::pin(stream))
    }

    #[instrument(skip(self, data), fields(backend = "s3", size = data.len()))]
    async fn put(&self, key: &str, data: Bytes, content_type: Option<&str>) -> StorageResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.object_key(key))
            .set_content_type(content_type.map(str::to_string))
            .body(data.into())
            .send()
            .await
            .map_err(|e| map_sdk_error(e, key))?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn signed_url(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        let presigning = PresigningConfig::expires_in(expires_in)
            .map_err(|e| StorageError::Config(format!("invalid presign duration: {e}")))?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.object_key(key))
            .presigned(presigning)
            .await
            .map_err(|e| map_sdk_error(e, key))?;

        Ok(request.uri().to_string())
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }

    /// HEAD the bucket: reachable, credentials accepted, bucket present.
    #[instrument(skip(self), fields(backend = "s3"))]
    async fn health_check(&self) -> StorageResult<()> {
        let head_bucket = self.client.head_bucket().bucket(&self.bucket).send();
        match tokio::time::timeout(HEALTH_CHECK_TIMEOUT, head_bucket).await {
            Ok(result) => result.map(|_| ()).map_err(|e| map_sdk_error(e, &self.bucket)),
            Err(_) => Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("S3 bucket {} did not answer within {HEALTH_CHECK_TIMEOUT:?}", self.bucket),
            ))),
        }
    }
}
