mod common;

use bloom_storage::{ObjectStore, StorageError};
use bytes::Bytes;
use common::{filesystem_backend, png_bytes};
use futures::StreamExt;
use std::time::Duration;

#[tokio::test]
async fn test_put_get_roundtrip_overwrites() {
    let (_dir, backend) = filesystem_backend().await;

    backend
        .put("images/cyl-images/1.png", png_bytes(1), Some("image/png"))
        .await
        .unwrap();
    backend
        .put("images/cyl-images/1.png", png_bytes(2), Some("image/png"))
        .await
        .unwrap();

    let data = backend.get("images/cyl-images/1.png").await.unwrap();
    assert_eq!(data, png_bytes(2));
}

#[tokio::test]
async fn test_missing_object_is_not_found() {
    let (_dir, backend) = filesystem_backend().await;

    assert!(matches!(
        backend.get("images/missing.png").await,
        Err(StorageError::NotFound(_))
    ));
    assert!(matches!(
        backend.head("images/missing.png").await,
        Err(StorageError::NotFound(_))
    ));
    assert!(matches!(
        backend.get_stream("images/missing.png").await,
        Err(StorageError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_head_reports_size_and_content_type() {
    let (_dir, backend) = filesystem_backend().await;
    let body = Bytes::from_static(b"{\"counts\":[0,1,2]}");

    backend
        .put("scrna/counts/leaf_1_/AT1G01010.json", body.clone(), None)
        .await
        .unwrap();

    let meta = backend
        .head("scrna/counts/leaf_1_/AT1G01010.json")
        .await
        .unwrap();
    assert_eq!(meta.size, body.len() as u64);
    assert_eq!(meta.content_type.as_deref(), Some("application/json"));
    assert!(meta.last_modified.is_some());
}

#[tokio::test]
async fn test_get_stream_yields_full_content() {
    let (_dir, backend) = filesystem_backend().await;
    let body = Bytes::from(vec![7u8; 200_000]);
    backend
        .put("images/big.png", body.clone(), None)
        .await
        .unwrap();

    let mut stream = backend.get_stream("images/big.png").await.unwrap();
    let mut collected = Vec::new();
    while let Some(chunk) = stream.next().await {
        collected.extend_from_slice(&chunk.unwrap());
    }
    assert_eq!(collected, body.to_vec());
}

#[tokio::test]
async fn test_signed_url_verifies_against_same_backend() {
    let (_dir, backend) = filesystem_backend().await;

    let url = backend
        .signed_url("images/cyl-images/1.png", Duration::from_secs(60))
        .await
        .unwrap();
    let parsed = url::Url::parse(&url).unwrap();
    assert_eq!(
        parsed.path(),
        "/storage/v1/object/sign/images/cyl-images/1.png"
    );

    let query: std::collections::HashMap<_, _> = parsed.query_pairs().into_owned().collect();
    let expires: i64 = query["expires"].parse().unwrap();
    backend
        .verify_signature("images/cyl-images/1.png", expires, &query["token"])
        .unwrap();
    assert!(matches!(
        backend.verify_signature("images/cyl-images/2.png", expires, &query["token"]),
        Err(StorageError::InvalidSignature(_))
    ));
}

#[tokio::test]
async fn test_signed_url_rejects_traversal() {
    let (_dir, backend) = filesystem_backend().await;
    assert!(matches!(
        backend
            .signed_url("../secrets", Duration::from_secs(60))
            .await,
        Err(StorageError::InvalidKey(_))
    ));
}

#[tokio::test]
async fn test_health_check_ok() {
    let (_dir, backend) = filesystem_backend().await;
    backend.health_check().await.unwrap();
    assert_eq!(backend.backend_name(), "filesystem");
}
