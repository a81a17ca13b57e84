// S3 backend checks: presigning offline, object calls against a mock S3 endpoint.

use bloom_storage::{ObjectStore, S3Backend, StorageError};
use bytes::Bytes;
use futures::StreamExt;
use httpmock::Method::HEAD;
use httpmock::prelude::*;
use std::net::TcpListener;
use std::time::Duration;

fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

async fn backend_at(endpoint: &str, prefix: Option<&str>, path_style: bool) -> S3Backend {
    S3Backend::new(
        "bloom-data",
        Some(endpoint.to_string()),
        Some("us-west-2".to_string()),
        prefix.map(str::to_string),
        Some("minioadmin".to_string()),
        Some("minioadmin".to_string()),
        path_style,
    )
    .await
    .unwrap()
}

async fn backend(prefix: Option<&str>, path_style: bool) -> S3Backend {
    backend_at("http://minio:9000", prefix, path_style).await
}

#[tokio::test]
async fn test_presigned_url_includes_prefix() {
    let backend = backend(Some("prod"), true).await;
    let url = backend
        .signed_url("species_illustrations/arabidopsis.png", Duration::from_secs(300))
        .await
        .unwrap();

    assert!(url.starts_with(
        "http://minio:9000/bloom-data/prod/species_illustrations/arabidopsis.png?"
    ));
    assert!(url.contains("X-Amz-Signature="));
    assert!(url.contains("X-Amz-Expires=300"));
    assert!(url.contains("us-west-2"));
}

#[tokio::test]
async fn test_presign_rejects_oversized_expiry() {
    let backend = backend(None, true).await;
    // SigV4 caps presigned URLs at seven days
    let result = backend
        .signed_url("images/a.png", Duration::from_secs(8 * 24 * 60 * 60))
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_backend_name() {
    let backend = backend(None, false).await;
    assert_eq!(backend.backend_name(), "s3");
}

#[tokio::test]
async fn test_put_get_head_against_endpoint() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start_async().await;
    let key_path = "/bloom-data/prod/images/cyl-images/1.png";
    let frame = Bytes::from_static(b"\x89PNG\r\n\x1a\nframe-1");

    let put = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path(key_path)
                .header("content-type", "image/png")
                .header_exists("authorization");
            then.status(200).header("etag", "\"d41d8cd9\"");
        })
        .await;
    let get = server
        .mock_async(|when, then| {
            when.method(GET).path(key_path);
            then.status(200)
                .header("content-type", "image/png")
                .body(frame.to_vec());
        })
        .await;
    let head = server
        .mock_async(|when, then| {
            when.method(HEAD).path(key_path);
            then.status(200)
                .header("content-type", "image/png")
                .header("last-modified", "Wed, 21 Oct 2015 07:28:00 GMT");
        })
        .await;

    let backend = backend_at(&server.base_url(), Some("prod"), true).await;
    backend
        .put("images/cyl-images/1.png", frame.clone(), Some("image/png"))
        .await
        .unwrap();
    put.assert_async().await;

    assert_eq!(backend.get("images/cyl-images/1.png").await.unwrap(), frame);

    let mut stream = backend.get_stream("images/cyl-images/1.png").await.unwrap();
    let mut streamed = Vec::new();
    while let Some(chunk) = stream.next().await {
        streamed.extend_from_slice(&chunk.unwrap());
    }
    assert_eq!(streamed, frame.to_vec());
    get.assert_hits_async(2).await;

    let meta = backend.head("images/cyl-images/1.png").await.unwrap();
    assert_eq!(meta.content_type.as_deref(), Some("image/png"));
    assert_eq!(
        meta.last_modified.map(|t| t.unix_timestamp()),
        Some(1_445_412_480)
    );
    head.assert_async().await;
}

#[tokio::test]
async fn test_missing_object_maps_to_not_found() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(HEAD).path("/bloom-data/scrna/missing.json");
            then.status(404);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/bloom-data/scrna/missing.json");
            then.status(404)
                .header("content-type", "application/xml")
                .body(
                    "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
                     <Error><Code>NoSuchKey</Code><Message>The specified key does not exist.</Message></Error>",
                );
        })
        .await;

    let backend = backend_at(&server.base_url(), None, true).await;
    assert!(matches!(
        backend.head("scrna/missing.json").await,
        Err(StorageError::NotFound(key)) if key == "scrna/missing.json"
    ));
    assert!(matches!(
        backend.get("scrna/missing.json").await,
        Err(StorageError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_health_check_heads_bucket() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start_async().await;
    let bucket = server
        .mock_async(|when, then| {
            when.method(HEAD);
            then.status(200);
        })
        .await;

    let backend = backend_at(&server.base_url(), None, true).await;
    backend.health_check().await.unwrap();
    bucket.assert_async().await;
}
